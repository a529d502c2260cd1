//! # Engine State Module
//!
//! The top of the voxel world: `EngineState` ties the chunk store to the objects living
//! in the world.
//!
//! ## Key Components
//!
//! * `EngineState` - facade owning the chunk store and the object registry
//! * `config` - every tunable, loadable from JSON
//! * `error` - the `WorldError` type
//! * `interfaces` - traits the renderer, task system and game objects implement
//! * `liquids` - the liquid cellular automaton
//! * `spatial` - bounds, bounded objects, the octree, spatial hashes
//! * `task_management` - the worker pool used by the liquid simulation
//! * `voxels` - coordinates, chunks, the world grid and the chunk store
//!
//! ## Architecture
//!
//! Every spawned object is indexed in the octree, which answers broad region queries,
//! and optionally in one of the collision manager's spatial hashes, which answers the
//! frequent small queries of physics. Objects move by changing what their
//! `bounding_box` returns and then calling `move_object`: the hash is updated at once,
//! the octree on its next deferred update pass.

pub mod config;
pub mod error;
pub mod interfaces;
pub mod liquids;
pub mod spatial;
pub mod task_management;
pub mod voxels;

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use config::EngineConfig;
use error::WorldResult;
use spatial::bounded_object::{ObjectId, ObjectRef};
use spatial::bounds::{BoundingBox, Ray};
use spatial::collision_manager::CollisionType;
use spatial::ObjectFilter;
use voxels::block::Voxel;
use voxels::chunk_store::{ChunkStore, Collaborators, TickStats};
use voxels::coordinates::GlobalVoxelCoordinate;
use voxels::generation::ChunkGenerator;

/// Registry entry of a spawned object.
struct TrackedObject {
    object: ObjectRef,
    /// Bounds the object was last hashed with.
    hashed_bounds: BoundingBox,
    collision: Option<CollisionType>,
}

/// The voxel world together with the objects that live in it.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use cgmath::Point3;
/// use voxel_world::engine_state::EngineState;
/// use voxel_world::engine_state::config::EngineConfig;
/// use voxel_world::engine_state::spatial::bounded_object::{Body, ObjectId};
/// use voxel_world::engine_state::spatial::bounds::BoundingBox;
/// use voxel_world::engine_state::spatial::collision_manager::CollisionType;
/// use voxel_world::engine_state::voxels::chunk_store::Collaborators;
/// use voxel_world::engine_state::voxels::generation::EmptyGenerator;
///
/// let mut config = EngineConfig::default();
/// config.world.chunks_y = 1;
/// let engine = EngineState::new(&config, &EmptyGenerator, Collaborators::default()).unwrap();
///
/// let body = Arc::new(Body::new(
///     ObjectId(7),
///     BoundingBox::new(Point3::new(1.0, 1.0, 1.0), Point3::new(2.0, 2.0, 2.0)),
/// ));
/// assert!(engine.spawn_object(body.clone().into(), Some(CollisionType::Dynamic)));
///
/// let region = BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 4.0, 4.0));
/// assert_eq!(engine.objects_in_box(&region, None).len(), 1);
/// assert!(engine.destroy_object(ObjectId(7)));
/// ```
pub struct EngineState {
    store: ChunkStore,
    objects: Mutex<HashMap<ObjectId, TrackedObject>>,
}

impl EngineState {
    /// Generates the world. Background threads are not started until `start`.
    pub fn new(
        config: &EngineConfig,
        generator: &dyn ChunkGenerator,
        collaborators: Collaborators,
    ) -> WorldResult<Self> {
        let store = ChunkStore::new(config, generator, collaborators)?;
        info!("Engine state created");
        Ok(Self {
            store,
            objects: Mutex::new(HashMap::new()),
        })
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<ObjectId, TrackedObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Indexes a new object in the octree and, when `collision` names one, in the
    /// matching spatial hash.
    ///
    /// # Returns
    /// `false` if an object with the same id already exists or the object's bounds are
    /// not finite.
    pub fn spawn_object(&self, object: ObjectRef, collision: Option<CollisionType>) -> bool {
        let mut objects = self.objects();
        let id = object.id();
        if objects.contains_key(&id) {
            warn!("Object {id} spawned twice");
            return false;
        }
        if !self.store.octree().add_object(object.clone()) {
            return false;
        }

        let bounds = object.bounding_box();
        if let Some(kind) = collision {
            self.store
                .collisions()
                .get_mut()
                .add_object(object.clone(), &bounds, kind);
        }
        objects.insert(
            id,
            TrackedObject {
                object,
                hashed_bounds: bounds,
                collision,
            },
        );
        debug!("Spawned object {id}");
        true
    }

    /// Picks up the current bounds of a moved object.
    ///
    /// The spatial hash is updated immediately; the octree re-places the object on its
    /// next deferred update pass.
    pub fn move_object(&self, id: ObjectId) -> bool {
        let mut objects = self.objects();
        let Some(tracked) = objects.get_mut(&id) else {
            return false;
        };
        let bounds = tracked.object.bounding_box();
        if let Some(kind) = tracked.collision {
            self.store.collisions().get_mut().move_object(
                tracked.object.clone(),
                &tracked.hashed_bounds,
                &bounds,
                kind,
            );
        }
        tracked.hashed_bounds = bounds;
        self.store.octree().add_update(tracked.object.clone());
        true
    }

    /// Removes an object from every index.
    pub fn destroy_object(&self, id: ObjectId) -> bool {
        let Some(tracked) = self.objects().remove(&id) else {
            return false;
        };
        if let Some(kind) = tracked.collision {
            self.store
                .collisions()
                .get_mut()
                .remove_object(id, &tracked.hashed_bounds, kind);
        }
        self.store.octree().remove_object(id);
        debug!("Destroyed object {id}");
        true
    }

    pub fn object_count(&self) -> usize {
        self.objects().len()
    }

    /// Objects whose bounds intersect `region`, searched in the octree.
    pub fn objects_in_box(
        &self,
        region: &BoundingBox,
        filter: ObjectFilter<'_>,
    ) -> HashSet<ObjectRef> {
        let mut found = HashSet::new();
        self.store.octree().enumerate_in_box(region, &mut found, filter);
        found
    }

    /// Objects hit by `ray`, searched in the octree.
    pub fn objects_on_ray(&self, ray: &Ray, filter: ObjectFilter<'_>) -> HashSet<ObjectRef> {
        let mut found = HashSet::new();
        self.store.octree().enumerate_on_ray(ray, &mut found, filter);
        found
    }

    /// Colliders of the given kind whose bounds intersect `region`.
    pub fn colliders_in_box(
        &self,
        region: &BoundingBox,
        kind: CollisionType,
        filter: ObjectFilter<'_>,
    ) -> HashSet<ObjectRef> {
        let mut found = HashSet::new();
        self.store
            .collisions()
            .get()
            .query_box(region, kind, &mut found, filter);
        found
    }

    pub fn get_voxel(&self, position: GlobalVoxelCoordinate) -> Option<Voxel> {
        self.store.get_voxel(position)
    }

    /// Writes a voxel through the chunk store.
    pub fn set_voxel(&self, position: GlobalVoxelCoordinate, voxel: Voxel) -> WorldResult<Voxel> {
        self.store.set_voxel(position, voxel)
    }

    /// Runs one world tick on the calling thread.
    pub fn tick(&self) -> TickStats {
        self.store.tick()
    }

    pub fn start(&self) -> WorldResult<()> {
        self.store.start()
    }

    pub fn shutdown(&self) {
        self.store.shutdown();
    }

    pub fn pause(&self) {
        self.store.pause();
    }

    pub fn resume(&self) {
        self.store.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::spatial::bounded_object::Body;
    use crate::engine_state::voxels::generation::EmptyGenerator;
    use cgmath::{Point3, Vector3};
    use std::sync::Arc;

    fn engine() -> EngineState {
        let mut config = EngineConfig::default();
        config.world.chunks_x = 2;
        config.world.chunks_y = 1;
        config.world.chunks_z = 2;
        config.octree.update_interval_secs = 0.0;
        EngineState::new(&config, &EmptyGenerator, Collaborators::default()).unwrap()
    }

    fn unit_box(x: f32, y: f32, z: f32) -> BoundingBox {
        BoundingBox::new(Point3::new(x, y, z), Point3::new(x + 1.0, y + 1.0, z + 1.0))
    }

    #[test]
    fn test_spawn_rejects_duplicates() {
        let engine = engine();
        let body = Arc::new(Body::new(ObjectId(1), unit_box(1.0, 1.0, 1.0)));
        assert!(engine.spawn_object(body.clone().into(), None));
        assert!(!engine.spawn_object(body.into(), None));
        assert_eq!(engine.object_count(), 1);
    }

    #[test]
    fn test_move_updates_hash_now_and_octree_on_tick() {
        let engine = engine();
        let body = Arc::new(Body::new(ObjectId(1), unit_box(1.0, 1.0, 1.0)));
        engine.spawn_object(body.clone().into(), Some(CollisionType::Dynamic));

        let destination = unit_box(20.0, 1.0, 20.0);
        body.set_bounds(destination);
        assert!(engine.move_object(ObjectId(1)));

        let hits = engine.colliders_in_box(&destination, CollisionType::Dynamic, None);
        assert_eq!(hits.len(), 1);
        assert!(engine
            .colliders_in_box(&unit_box(1.0, 1.0, 1.0), CollisionType::Both, None)
            .is_empty());

        assert_eq!(engine.store().octree().pending_updates(), 1);
        let stats = engine.tick();
        assert_eq!(stats.objects_updated, 1);
        assert_eq!(engine.store().octree().pending_updates(), 0);
        assert_eq!(engine.objects_in_box(&destination, None).len(), 1);
        assert!(engine
            .objects_in_box(&unit_box(1.0, 1.0, 1.0), None)
            .is_empty());
    }

    #[test]
    fn test_destroy_removes_from_every_index() {
        let engine = engine();
        let body = Arc::new(Body::new(ObjectId(4), unit_box(3.0, 3.0, 3.0)));
        engine.spawn_object(body.into(), Some(CollisionType::Static));
        assert!(engine.destroy_object(ObjectId(4)));
        assert!(!engine.destroy_object(ObjectId(4)));

        let region = unit_box(3.0, 3.0, 3.0);
        assert!(engine.objects_in_box(&region, None).is_empty());
        assert!(engine
            .colliders_in_box(&region, CollisionType::Both, None)
            .is_empty());
    }

    #[test]
    fn test_ray_finds_object_in_front() {
        let engine = engine();
        let body = Arc::new(Body::new(ObjectId(9), unit_box(10.0, 2.0, 2.0)));
        engine.spawn_object(body.into(), None);

        let ray = Ray::new(Point3::new(0.5, 2.5, 2.5), Vector3::new(1.0, 0.0, 0.0), 30.0);
        assert_eq!(engine.objects_on_ray(&ray, None).len(), 1);
        let short = Ray::new(Point3::new(0.5, 2.5, 2.5), Vector3::new(1.0, 0.0, 0.0), 5.0);
        assert!(engine.objects_on_ray(&short, None).is_empty());
    }
}
