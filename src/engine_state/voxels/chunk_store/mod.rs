//! # Chunk Store
//!
//! The `ChunkStore` owns the world's chunk grid and keeps everything that depends on it
//! current:
//!
//! * an invalidation queue of chunks whose geometry must be rebuilt, drained by a
//!   background rebuild worker that hands each visible chunk to the `RenderBackend`
//! * a buffer of committed voxel changes, drained once per tick into the voxel
//!   listeners overlapping each change and into the external `TaskSystem`
//! * a fixed-interval tick thread that runs the liquid simulation and the octree's
//!   deferred updates
//!
//! Voxel writes made through the store become visible to listeners only after the next
//! tick drains the change buffer.
//!
//! ## Threads
//!
//! `start` spawns the two background threads; `shutdown` raises the exit flag, wakes
//! the rebuild worker and joins both. A rebuild in flight when shutdown begins is
//! completed first. Dropping the store shuts it down.

pub mod invalidation;
pub mod pending_changes;
mod workers;

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cgmath::Vector3;
use log::{debug, info, trace, warn};
use lru::LruCache;
use web_time::{Duration, Instant};

use crate::core::MtResource;
use crate::engine_state::config::{clamp_time_scale, interval, EngineConfig};
use crate::engine_state::error::{WorldError, WorldResult};
use crate::engine_state::interfaces::{
    NullRenderBackend, NullTaskSystem, RenderBackend, TaskSystem, VoxelChange,
};
use crate::engine_state::liquids::splash::SplashEvent;
use crate::engine_state::liquids::LiquidSimulator;
use crate::engine_state::spatial::bounds::BoundingBox;
use crate::engine_state::spatial::collision_manager::{CollisionManager, CollisionType};
use crate::engine_state::spatial::octree::Octree;
use crate::engine_state::voxels::block::block_side::VoxelFace;
use crate::engine_state::voxels::block::block_type::{BlockType, LiquidType};
use crate::engine_state::voxels::block::Voxel;
use crate::engine_state::voxels::coordinates::{ChunkCoordinate, GlobalVoxelCoordinate};
use crate::engine_state::voxels::generation::ChunkGenerator;
use crate::engine_state::voxels::world::World;

use invalidation::InvalidationQueue;
use pending_changes::PendingChanges;
use workers::Worker;

/// The external systems the store reports to.
pub struct Collaborators {
    pub render: Arc<dyn RenderBackend>,
    pub tasks: Arc<dyn TaskSystem>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            render: Arc::new(NullRenderBackend),
            tasks: Arc::new(NullTaskSystem),
        }
    }
}

/// What the most recent tick did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Number of ticks run so far, this one included.
    pub tick: u64,
    pub chunks_simulated: usize,
    pub transfers: u64,
    pub evaporations: u64,
    pub reactions: u64,
    /// Splash events dropped on a full queue since the store was created.
    pub splashes_dropped: u64,
    pub changes_drained: usize,
    /// Objects re-placed by the octree's deferred update pass.
    pub objects_updated: usize,
}

/// State shared between the store handle and its background threads.
pub(crate) struct StoreShared {
    world: Arc<World>,
    invalidation: InvalidationQueue,
    pending: PendingChanges,
    octree: Arc<Octree>,
    collisions: MtResource<CollisionManager>,
    render: Arc<dyn RenderBackend>,
    tasks: Arc<dyn TaskSystem>,
    simulator: Mutex<LiquidSimulator>,
    paused: AtomicBool,
    exit: AtomicBool,
    /// Bit pattern of the `f32` time scale.
    time_scale: AtomicU32,
    tick_interval: Duration,
    /// Chunks with live geometry, least recently rebuilt first.
    live: Mutex<LruCache<ChunkCoordinate, ()>>,
    last_tick: Mutex<TickStats>,
    ticks: AtomicU64,
    rebuilds: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StoreShared {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn time_scale(&self) -> f32 {
        f32::from_bits(self.time_scale.load(Ordering::Relaxed))
    }

    /// Hands every buffered voxel change to the listeners overlapping it and then to
    /// the task system.
    fn drain_pending_changes(&self) -> usize {
        let changes = self.pending.drain();
        let mut overlapping = HashSet::new();
        for change in &changes {
            let min = change.position.to_point();
            let region = BoundingBox::new(min, min + Vector3::new(1.0, 1.0, 1.0));

            overlapping.clear();
            self.octree.enumerate_in_box(&region, &mut overlapping, None);
            self.collisions
                .get()
                .query_box(&region, CollisionType::Both, &mut overlapping, None);
            for object in &overlapping {
                if let Some(listener) = object.as_voxel_listener() {
                    listener.on_voxel_changed(change);
                }
            }
            self.tasks.on_voxel_changed(change);
        }
        changes.len()
    }

    /// Runs one world tick.
    fn tick(&self) -> TickStats {
        let changes_drained = self.drain_pending_changes();

        let (outcome, splashes_dropped) = {
            let mut simulator = lock(&self.simulator);
            let outcome = simulator.step(&self.world);
            (outcome, simulator.splashes_dropped())
        };
        for &coordinate in &outcome.touched_chunks {
            let needs_rebuild = self
                .world
                .get_chunk_at(coordinate)
                .is_some_and(|chunk| chunk.get_mut().take_needs_rebuild());
            if needs_rebuild {
                self.invalidation.invalidate(coordinate);
            }
        }

        let objects_updated = self.octree.update(Instant::now());

        let stats = TickStats {
            tick: self.ticks.fetch_add(1, Ordering::AcqRel) + 1,
            chunks_simulated: outcome.chunks_simulated,
            transfers: outcome.transfers,
            evaporations: outcome.evaporations,
            reactions: outcome.reactions,
            splashes_dropped,
            changes_drained,
            objects_updated,
        };
        debug!("Tick {}: {:?}", stats.tick, stats);
        *lock(&self.last_tick) = stats.clone();
        stats
    }

    /// Rebuilds one chunk if it is visible and records it in the live set.
    fn rebuild(&self, coordinate: ChunkCoordinate) {
        if !self.render.is_chunk_visible(coordinate) {
            trace!("Skipping rebuild of invisible chunk {coordinate}");
            return;
        }
        let Some(chunk) = self.world.get_chunk_at(coordinate) else {
            return;
        };

        self.render.rebuild_chunk(coordinate, &chunk.get());
        chunk.get_mut().clear_dirty_slices();
        self.rebuilds.fetch_add(1, Ordering::AcqRel);

        let evicted = lock(&self.live).push(coordinate, ());
        if let Some((evicted, ())) = evicted {
            if evicted != coordinate {
                debug!("Evicting chunk {evicted} from the live set");
                self.render.evict_chunk(evicted);
            }
        }
    }
}

/// Owner of the chunk grid and its background threads.
///
/// # Examples
///
/// ```
/// use voxel_world::engine_state::config::EngineConfig;
/// use voxel_world::engine_state::voxels::chunk_store::{ChunkStore, Collaborators};
/// use voxel_world::engine_state::voxels::block::block_type::BlockType;
/// use voxel_world::engine_state::voxels::coordinates::GlobalVoxelCoordinate;
/// use voxel_world::engine_state::voxels::generation::EmptyGenerator;
///
/// let mut config = EngineConfig::default();
/// config.world.chunks_x = 1;
/// config.world.chunks_y = 1;
/// config.world.chunks_z = 1;
///
/// let store = ChunkStore::new(&config, &EmptyGenerator, Collaborators::default()).unwrap();
/// let position = GlobalVoxelCoordinate::new(1, 2, 3);
/// store.set_block(position, BlockType::STONE).unwrap();
///
/// assert_eq!(store.get_voxel(position).unwrap().block(), BlockType::STONE);
/// assert_eq!(store.tick().changes_drained, 1);
/// ```
pub struct ChunkStore {
    shared: Arc<StoreShared>,
    threads: Mutex<Vec<Worker>>,
}

impl ChunkStore {
    /// Generates the world and sets up the store. Every chunk starts out invalidated so
    /// the rebuild worker builds the initial geometry.
    pub fn new(
        config: &EngineConfig,
        generator: &dyn ChunkGenerator,
        collaborators: Collaborators,
    ) -> WorldResult<Self> {
        config.validate()?;

        let world = Arc::new(World::new(&config.world, generator));
        let octree = Arc::new(Octree::new(*world.bounds(), &config.octree));
        let collisions = MtResource::new(CollisionManager::new(config.spatial_hash.cell_size));
        let simulator = LiquidSimulator::new(&config.liquids, &config.threading, config.world.seed);
        let live_cap =
            NonZeroUsize::new(config.threading.live_chunk_cap).unwrap_or(NonZeroUsize::MIN);

        let invalidation = InvalidationQueue::new();
        for &coordinate in world.chunk_coordinates() {
            invalidation.invalidate(coordinate);
        }

        let shared = StoreShared {
            world,
            invalidation,
            pending: PendingChanges::new(),
            octree,
            collisions,
            render: collaborators.render,
            tasks: collaborators.tasks,
            simulator: Mutex::new(simulator),
            paused: AtomicBool::new(false),
            exit: AtomicBool::new(false),
            time_scale: AtomicU32::new(clamp_time_scale(config.threading.time_scale).to_bits()),
            tick_interval: interval("tick_interval_secs", config.threading.tick_interval_secs)?,
            live: Mutex::new(LruCache::new(live_cap)),
            last_tick: Mutex::new(TickStats::default()),
            ticks: AtomicU64::new(0),
            rebuilds: AtomicU64::new(0),
        };

        Ok(Self {
            shared: Arc::new(shared),
            threads: Mutex::new(Vec::new()),
        })
    }

    pub fn world(&self) -> &Arc<World> {
        &self.shared.world
    }

    pub fn octree(&self) -> &Arc<Octree> {
        &self.shared.octree
    }

    pub fn collisions(&self) -> &MtResource<CollisionManager> {
        &self.shared.collisions
    }

    /// The world-space box covering every chunk.
    pub fn bounds(&self) -> &BoundingBox {
        self.shared.world.bounds()
    }

    /// Reads a voxel. `None` outside the world.
    pub fn get_voxel(&self, position: GlobalVoxelCoordinate) -> Option<Voxel> {
        self.shared.world.get_voxel(position)
    }

    /// Replaces a whole voxel.
    pub fn set_voxel(&self, position: GlobalVoxelCoordinate, voxel: Voxel) -> WorldResult<Voxel> {
        self.modify_voxel(position, |v| *v = voxel)
    }

    pub fn set_block(
        &self,
        position: GlobalVoxelCoordinate,
        block_type: BlockType,
    ) -> WorldResult<Voxel> {
        self.modify_voxel(position, |v| v.set_block(block_type))
    }

    pub fn set_liquid(
        &self,
        position: GlobalVoxelCoordinate,
        liquid: LiquidType,
        level: u8,
    ) -> WorldResult<Voxel> {
        self.modify_voxel(position, |v| v.set_liquid(liquid, level))
    }

    pub fn set_grass(&self, position: GlobalVoxelCoordinate, grass_type: u8) -> WorldResult<Voxel> {
        self.modify_voxel(position, |v| v.grass_type = grass_type)
    }

    /// Applies `change` to one voxel, invalidates the chunks whose geometry it affects
    /// and queues a change notification.
    ///
    /// A voxel on a chunk border also invalidates the neighbouring chunk across that
    /// border, since its faces are part of the neighbour's geometry.
    ///
    /// # Returns
    /// The stored voxel, or `OutOfBounds` when `position` lies outside the world.
    pub fn modify_voxel(
        &self,
        position: GlobalVoxelCoordinate,
        change: impl FnOnce(&mut Voxel),
    ) -> WorldResult<Voxel> {
        let (previous, current, needs_rebuild) = self
            .shared
            .world
            .modify_voxel(position, change)
            .inspect_err(|e| warn!("Rejected voxel write: {e}"))?;

        let chunk = position.chunk();
        if needs_rebuild {
            self.invalidate_chunk(chunk);
        }
        if previous != current {
            if position.local().is_on_border() {
                for face in VoxelFace::all() {
                    let neighbor = position.neighbor(face).chunk();
                    if neighbor != chunk && self.shared.world.get_chunk_at(neighbor).is_some() {
                        self.invalidate_chunk(neighbor);
                    }
                }
            }
            self.notify_changed_voxel(VoxelChange {
                position,
                previous,
                current,
            });
        }
        Ok(current)
    }

    /// Queues a chunk for a rebuild unless it is already queued.
    ///
    /// # Returns
    /// `true` if the chunk was newly queued.
    pub fn invalidate_chunk(&self, coordinate: ChunkCoordinate) -> bool {
        self.shared.invalidation.invalidate(coordinate)
    }

    /// Dequeues the oldest invalidated chunk, if any.
    pub fn pop_invalid_chunk(&self) -> Option<ChunkCoordinate> {
        self.shared.invalidation.pop()
    }

    pub fn invalid_chunk_count(&self) -> usize {
        self.shared.invalidation.len()
    }

    /// Buffers a change for the next tick's notification pass.
    pub fn notify_changed_voxel(&self, change: VoxelChange) {
        self.shared.pending.push(change);
    }

    pub fn pending_change_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Delivers every buffered change immediately.
    ///
    /// # Returns
    /// The number of changes delivered.
    pub fn drain_pending_changes(&self) -> usize {
        self.shared.drain_pending_changes()
    }

    /// Runs one world tick on the calling thread.
    pub fn tick(&self) -> TickStats {
        self.shared.tick()
    }

    /// Statistics of the most recent tick.
    pub fn last_tick_stats(&self) -> TickStats {
        lock(&self.shared.last_tick).clone()
    }

    /// Removes and returns every queued splash event.
    pub fn drain_splashes(&self) -> Vec<SplashEvent> {
        lock(&self.shared.simulator).drain_splashes()
    }

    /// Total number of chunk rebuilds handed to the render backend.
    pub fn rebuild_count(&self) -> u64 {
        self.shared.rebuilds.load(Ordering::Acquire)
    }

    /// Number of chunks currently holding live geometry.
    pub fn live_chunk_count(&self) -> usize {
        lock(&self.shared.live).len()
    }

    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
        info!("World paused");
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
        info!("World resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    /// Sets the ratio of simulated to wall-clock time, clamped to
    /// `[0, MAX_TIME_SCALE]`. NaN pauses simulated time.
    pub fn set_time_scale(&self, scale: f32) {
        self.shared
            .time_scale
            .store(clamp_time_scale(scale).to_bits(), Ordering::Relaxed);
    }

    pub fn time_scale(&self) -> f32 {
        self.shared.time_scale()
    }

    pub fn is_running(&self) -> bool {
        !lock(&self.threads).is_empty()
    }

    /// Spawns the tick thread and the rebuild worker.
    pub fn start(&self) -> WorldResult<()> {
        let mut threads = lock(&self.threads);
        if !threads.is_empty() {
            return Err(WorldError::AlreadyRunning);
        }
        self.shared.exit.store(false, Ordering::Release);
        self.shared.invalidation.reopen();

        let shared = self.shared.clone();
        let rebuild = workers::spawn_worker("chunk-rebuild", move || {
            workers::run_rebuild_loop(shared)
        })?;
        threads.push(rebuild);

        let shared = self.shared.clone();
        match workers::spawn_worker("world-tick", move || workers::run_tick_loop(shared)) {
            Ok(tick) => threads.push(tick),
            Err(e) => {
                drop(threads);
                self.shutdown();
                return Err(e);
            }
        }
        info!("Chunk store started with {} chunks", self.shared.world.chunk_count());
        Ok(())
    }

    /// Stops and joins the background threads. Does nothing if they are not running.
    pub fn shutdown(&self) {
        let threads = std::mem::take(&mut *lock(&self.threads));
        if threads.is_empty() {
            return;
        }
        self.shared.exit.store(true, Ordering::Release);
        self.shared.invalidation.close();
        for thread in threads {
            thread.join();
        }
        info!("Chunk store stopped");
    }
}

impl Drop for ChunkStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}
