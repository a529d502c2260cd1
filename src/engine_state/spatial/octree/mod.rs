//! # Adaptive Octree
//!
//! A dynamic octree over game objects, used for region, frustum, sphere and ray queries.
//!
//! ## Placement
//!
//! Every object lives in exactly one leaf: the leaf whose cell contains the centre of the
//! object's bounding box. Inner nodes never hold objects. Because an object can stick out
//! of its cell, every node also keeps a *loose* box that covers all objects stored below
//! it, and queries prune on that loose box. A query therefore visits every node whose
//! loose box intersects the query shape and never misses an object.
//!
//! ## Adaptivity
//!
//! - A leaf holding more than `max_objects_per_node` objects splits into eight children,
//!   unless it is already at `max_depth`.
//! - When a removal leaves a subtree with fewer than `min_objects_per_node` objects, the
//!   subtree collapses back into a single leaf.
//! - An object whose centre falls outside the root cell grows the root (doubling about
//!   its centre) and the whole tree is rebuilt under the write lock.
//!
//! ## Deferred Updates
//!
//! Moving objects are not re-placed immediately. `add_update` records them in a pending
//! set and `update` re-places the whole set at most once per `update_interval_secs`.
//!
//! ## Thread Safety
//!
//! The node arena sits behind one `MtResource`: queries take the read lock and run in
//! parallel, structural changes take the write lock. The pending-update set has its own
//! mutex so recording a move never waits for a query.

pub mod node;

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use log::{info, warn};
use web_time::{Duration, Instant};

use crate::core::MtResource;
use crate::engine_state::config::OctreeConfig;

use super::bounded_object::{BoundedObject, ObjectId, ObjectRef};
use super::bounds::{BoundingBox, BoundingSphere, Frustum, Ray};
use super::ObjectFilter;
use node::{NodeArena, NodeId, ResidentObject};

/// Upper bound on root doublings for a single insertion.
const MAX_EXPANSIONS: u32 = 32;

pub struct Octree {
    arena: MtResource<NodeArena>,
    pending: Mutex<HashMap<ObjectId, ObjectRef>>,
    last_update: Mutex<Option<Instant>>,
    update_interval: Duration,
    config: OctreeConfig,
}

impl Octree {
    /// Creates an empty octree whose root cell is `bounds`.
    pub fn new(bounds: BoundingBox, config: &OctreeConfig) -> Self {
        Self {
            arena: MtResource::new(NodeArena::new(bounds, config)),
            pending: Mutex::new(HashMap::new()),
            last_update: Mutex::new(None),
            update_interval: Duration::try_from_secs_f32(config.update_interval_secs.max(0.0))
                .unwrap_or(Duration::MAX),
            config: config.clone(),
        }
    }

    /// Indexes an object under its current bounding box.
    ///
    /// # Returns
    /// `false` if the object is already indexed or its bounds are not finite.
    pub fn add_object(&self, object: ObjectRef) -> bool {
        let bounds = object.bounding_box();
        let center = bounds.center();
        if !(center.x.is_finite() && center.y.is_finite() && center.z.is_finite()) {
            warn!("Refusing to index object {} with non-finite bounds", object.id());
            return false;
        }

        let mut arena = self.arena.get_mut();
        if arena.contains(object.id()) {
            return false;
        }
        Self::insert_expanding(&mut arena, ResidentObject { object, bounds })
    }

    fn insert_expanding(arena: &mut NodeArena, resident: ResidentObject) -> bool {
        let center = resident.bounds.center();
        let root_bounds = arena.node(arena.root()).bounds;
        if !root_bounds.contains_point(center) {
            let mut grown = root_bounds;
            let mut expansions = 0;
            while !grown.contains_point(center) {
                if expansions == MAX_EXPANSIONS {
                    warn!("Object {} is too far outside the octree", resident.object.id());
                    return false;
                }
                grown = grown.doubled();
                expansions += 1;
            }
            info!(
                "Expanding octree root to {:?}..{:?} for object {}",
                grown.min,
                grown.max,
                resident.object.id()
            );
            arena.rebuild(grown);
        }
        arena.insert(resident)
    }

    /// Removes an object. Also drops any pending update for it.
    pub fn remove_object(&self, id: ObjectId) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        self.arena.get_mut().remove(id).is_some()
    }

    /// Records that an object moved; it is re-placed by the next `update`.
    pub fn add_update(&self, object: ObjectRef) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(object.id(), object);
    }

    pub fn pending_updates(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Re-places pending objects, at most once per update interval.
    ///
    /// # Returns
    /// The number of pending objects processed (zero when rate-limited).
    pub fn update(&self, now: Instant) -> usize {
        {
            let mut last_update = self
                .last_update
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(last) = *last_update {
                if now.saturating_duration_since(last) < self.update_interval {
                    return 0;
                }
            }
            *last_update = Some(now);
        }
        self.flush_updates()
    }

    /// Re-places every pending object immediately, ignoring the rate limit.
    pub fn flush_updates(&self) -> usize {
        let pending = std::mem::take(
            &mut *self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if pending.is_empty() {
            return 0;
        }

        let mut arena = self.arena.get_mut();
        for (id, object) in &pending {
            if !arena.contains(*id) {
                continue;
            }
            let bounds = object.bounding_box();
            if arena.refresh_in_place(*id, bounds) {
                continue;
            }
            if let Some(resident) = arena.remove(*id) {
                Self::insert_expanding(
                    &mut arena,
                    ResidentObject {
                        object: resident.object,
                        bounds,
                    },
                );
            }
        }
        pending.len()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.arena.get().contains(id)
    }

    pub fn len(&self) -> usize {
        self.arena.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current root cell.
    pub fn bounds(&self) -> BoundingBox {
        let arena = self.arena.get();
        arena.node(arena.root()).bounds
    }

    pub fn node_count(&self) -> usize {
        self.arena.get().node_count()
    }

    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// The leaf an object is stored in.
    pub fn leaf_of(&self, id: ObjectId) -> Option<NodeId> {
        self.arena.get().placement(id)
    }

    /// Ids of the objects stored directly in `node`.
    pub fn objects_in_node(&self, node: NodeId) -> Vec<ObjectId> {
        self.arena
            .get()
            .node(node)
            .objects
            .iter()
            .map(|r| r.object.id())
            .collect()
    }

    /// Walks the tree, pruning nodes whose loose box fails `prune`, and inserts every
    /// object whose bounds pass `accept` and the optional filter into `out`.
    fn collect(
        &self,
        prune: impl Fn(&BoundingBox) -> bool,
        accept: impl Fn(&BoundingBox) -> bool,
        out: &mut HashSet<ObjectRef>,
        filter: ObjectFilter<'_>,
    ) {
        let arena = self.arena.get();
        let mut stack = vec![arena.root()];
        while let Some(id) = stack.pop() {
            let node = arena.node(id);
            if !prune(&node.loose) {
                continue;
            }
            for resident in &node.objects {
                if accept(&resident.bounds)
                    && filter.map_or(true, |f| f(&*resident.object as &dyn BoundedObject))
                {
                    out.insert(resident.object.clone());
                }
            }
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
    }

    /// Every indexed object.
    pub fn enumerate_all(&self, out: &mut HashSet<ObjectRef>, filter: ObjectFilter<'_>) {
        self.collect(|_| true, |_| true, out, filter);
    }

    /// Objects whose bounds intersect `region`.
    pub fn enumerate_in_box(
        &self,
        region: &BoundingBox,
        out: &mut HashSet<ObjectRef>,
        filter: ObjectFilter<'_>,
    ) {
        self.collect(|b| b.intersects(region), |b| b.intersects(region), out, filter);
    }

    /// Objects whose bounds intersect `sphere`.
    pub fn enumerate_in_sphere(
        &self,
        sphere: &BoundingSphere,
        out: &mut HashSet<ObjectRef>,
        filter: ObjectFilter<'_>,
    ) {
        self.collect(
            |b| sphere.intersects_box(b),
            |b| sphere.intersects_box(b),
            out,
            filter,
        );
    }

    /// Objects whose bounds intersect `frustum`.
    pub fn enumerate_in_frustum(
        &self,
        frustum: &Frustum,
        out: &mut HashSet<ObjectRef>,
        filter: ObjectFilter<'_>,
    ) {
        self.collect(
            |b| frustum.intersects_box(b),
            |b| frustum.intersects_box(b),
            out,
            filter,
        );
    }

    /// Objects whose bounds the ray hits within its length.
    pub fn enumerate_on_ray(&self, ray: &Ray, out: &mut HashSet<ObjectRef>, filter: ObjectFilter<'_>) {
        let reach = ray.bounding_box();
        self.collect(
            |b| b.intersects(&reach) && ray.intersects_box(b).is_some(),
            |b| ray.intersects_box(b).is_some(),
            out,
            filter,
        );
    }

    #[cfg(test)]
    fn check_invariants(&self) -> Result<(), String> {
        self.arena.get().check_invariants()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::spatial::bounded_object::{of_type, Body};
    use cgmath::{Point3, Vector3};
    use std::sync::Arc;

    fn config(max: usize, min: usize, depth: u32) -> OctreeConfig {
        OctreeConfig {
            max_objects_per_node: max,
            min_objects_per_node: min,
            max_depth: depth,
            update_interval_secs: 0.1,
        }
    }

    fn world_box(size: f32) -> BoundingBox {
        BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(size, size, size))
    }

    fn point_body(id: u64, p: Point3<f32>) -> Arc<Body> {
        Arc::new(Body::new(ObjectId(id), BoundingBox::point(p)))
    }

    fn cube_body(id: u64, center: Point3<f32>, half: f32) -> Arc<Body> {
        Arc::new(Body::new(
            ObjectId(id),
            BoundingBox::from_center_extents(center, Vector3::new(half, half, half)),
        ))
    }

    fn ids(set: &HashSet<ObjectRef>) -> Vec<u64> {
        let mut ids: Vec<u64> = set.iter().map(|o| o.id().0).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_box_query_matches_brute_force() {
        let tree = Octree::new(world_box(100.0), &config(8, 4, 6));
        let mut rng = fastrand::Rng::with_seed(42);
        let mut points = Vec::new();
        for id in 0..1000 {
            let p = Point3::new(rng.f32() * 100.0, rng.f32() * 100.0, rng.f32() * 100.0);
            points.push((id, p));
            assert!(tree.add_object(point_body(id, p).into()));
        }
        tree.check_invariants().unwrap();

        // A box with 10% of the world's volume.
        let side = 100.0 * 0.1f32.cbrt();
        for _ in 0..20 {
            let min = Point3::new(
                rng.f32() * (100.0 - side),
                rng.f32() * (100.0 - side),
                rng.f32() * (100.0 - side),
            );
            let region = BoundingBox::new(min, min + Vector3::new(side, side, side));
            let mut found = HashSet::new();
            tree.enumerate_in_box(&region, &mut found, None);

            let expected: Vec<u64> = points
                .iter()
                .filter(|(_, p)| region.contains_point(*p))
                .map(|(id, _)| *id)
                .collect();
            assert_eq!(ids(&found), expected);
        }
    }

    #[test]
    fn test_every_object_in_exactly_one_leaf() {
        let tree = Octree::new(world_box(64.0), &config(2, 1, 5));
        for id in 0..50 {
            let c = Point3::new((id * 7 % 60) as f32 + 2.0, (id * 13 % 60) as f32 + 2.0, 5.0);
            tree.add_object(cube_body(id, c, 1.5).into());
        }
        tree.check_invariants().unwrap();
        for id in 0..50 {
            let leaf = tree.leaf_of(ObjectId(id)).unwrap();
            assert!(tree.objects_in_node(leaf).contains(&ObjectId(id)));
        }
    }

    #[test]
    fn test_duplicate_add_is_rejected() {
        let tree = Octree::new(world_box(10.0), &config(8, 4, 6));
        let body = point_body(1, Point3::new(1.0, 1.0, 1.0));
        assert!(tree.add_object(body.clone().into()));
        assert!(!tree.add_object(body.into()));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_split_and_merge() {
        let tree = Octree::new(world_box(16.0), &config(2, 2, 4));
        assert_eq!(tree.node_count(), 1);

        tree.add_object(point_body(1, Point3::new(1.0, 1.0, 1.0)).into());
        tree.add_object(point_body(2, Point3::new(15.0, 1.0, 1.0)).into());
        assert_eq!(tree.node_count(), 1);

        tree.add_object(point_body(3, Point3::new(1.0, 15.0, 1.0)).into());
        assert_eq!(tree.node_count(), 9);
        tree.check_invariants().unwrap();

        assert!(tree.remove_object(ObjectId(3)));
        assert!(tree.remove_object(ObjectId(2)));
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.len(), 1);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn test_depth_limit_stops_splitting() {
        let tree = Octree::new(world_box(16.0), &config(1, 0, 2));
        for id in 0..10 {
            tree.add_object(point_body(id, Point3::new(0.5, 0.5, 0.5)).into());
        }
        tree.check_invariants().unwrap();
        assert_eq!(tree.len(), 10);
    }

    #[test]
    fn test_out_of_bounds_object_grows_root() {
        let tree = Octree::new(world_box(10.0), &config(2, 1, 6));
        for id in 0..5 {
            tree.add_object(point_body(id, Point3::new(id as f32 + 1.0, 1.0, 1.0)).into());
        }
        assert!(tree.add_object(point_body(99, Point3::new(35.0, 1.0, 1.0)).into()));
        assert!(tree.bounds().contains_point(Point3::new(35.0, 1.0, 1.0)));
        assert_eq!(tree.len(), 6);
        tree.check_invariants().unwrap();

        let mut found = HashSet::new();
        tree.enumerate_all(&mut found, None);
        assert_eq!(found.len(), 6);
    }

    #[test]
    fn test_large_object_found_through_loose_bounds() {
        let tree = Octree::new(world_box(32.0), &config(1, 0, 4));
        tree.add_object(point_body(1, Point3::new(1.0, 1.0, 1.0)).into());
        // Centre in the lower octant, extends well into the upper ones.
        tree.add_object(cube_body(2, Point3::new(14.0, 14.0, 14.0), 10.0).into());
        tree.check_invariants().unwrap();

        let spot = BoundingBox::point(Point3::new(22.0, 22.0, 22.0));
        let mut found = HashSet::new();
        tree.enumerate_in_box(&spot, &mut found, None);
        assert_eq!(ids(&found), vec![2]);
    }

    #[test]
    fn test_deferred_update_is_rate_limited() {
        let tree = Octree::new(world_box(32.0), &config(1, 0, 4));
        let mover = point_body(1, Point3::new(1.0, 1.0, 1.0));
        tree.add_object(mover.clone().into());
        tree.add_object(point_body(2, Point3::new(30.0, 30.0, 30.0)).into());

        let start = Instant::now();
        assert_eq!(tree.update(start), 0);

        mover.set_bounds(BoundingBox::point(Point3::new(29.0, 29.0, 29.0)));
        tree.add_update(mover.clone().into());
        assert_eq!(tree.update(start + Duration::from_millis(10)), 0);
        assert_eq!(tree.pending_updates(), 1);

        assert_eq!(tree.update(start + Duration::from_millis(200)), 1);
        tree.check_invariants().unwrap();

        let mut found = HashSet::new();
        tree.enumerate_in_box(
            &BoundingBox::new(Point3::new(28.0, 28.0, 28.0), Point3::new(32.0, 32.0, 32.0)),
            &mut found,
            None,
        );
        assert_eq!(ids(&found), vec![1, 2]);
    }

    #[test]
    fn test_removed_object_skips_pending_update() {
        let tree = Octree::new(world_box(8.0), &config(8, 4, 6));
        let body = point_body(1, Point3::new(1.0, 1.0, 1.0));
        tree.add_object(body.clone().into());
        tree.add_update(body.into());
        tree.remove_object(ObjectId(1));
        assert_eq!(tree.flush_updates(), 0);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_sphere_ray_and_filter_queries() {
        struct Other;
        let tree = Octree::new(world_box(20.0), &config(2, 1, 4));
        tree.add_object(cube_body(1, Point3::new(5.0, 5.0, 5.0), 0.5).into());
        tree.add_object(cube_body(2, Point3::new(15.0, 5.0, 5.0), 0.5).into());
        tree.add_object(cube_body(3, Point3::new(5.0, 15.0, 5.0), 0.5).into());

        let mut found = HashSet::new();
        tree.enumerate_in_sphere(&BoundingSphere::new(Point3::new(5.0, 5.0, 5.0), 2.0), &mut found, None);
        assert_eq!(ids(&found), vec![1]);

        found.clear();
        let ray = Ray::new(Point3::new(0.0, 5.0, 5.0), Vector3::new(1.0, 0.0, 0.0), 12.0);
        tree.enumerate_on_ray(&ray, &mut found, None);
        assert_eq!(ids(&found), vec![1]);

        found.clear();
        let long_ray = Ray::new(Point3::new(0.0, 5.0, 5.0), Vector3::new(1.0, 0.0, 0.0), 100.0);
        tree.enumerate_on_ray(&long_ray, &mut found, None);
        assert_eq!(ids(&found), vec![1, 2]);

        found.clear();
        let bodies = of_type::<Body>();
        tree.enumerate_all(&mut found, Some(&bodies));
        assert_eq!(found.len(), 3);
        found.clear();
        let others = of_type::<Other>();
        tree.enumerate_all(&mut found, Some(&others));
        assert!(found.is_empty());
    }

    #[test]
    fn test_frustum_query() {
        use crate::engine_state::spatial::bounds::tests::looking_down_negative_z;

        let tree = Octree::new(
            BoundingBox::new(Point3::new(-50.0, -50.0, -50.0), Point3::new(50.0, 50.0, 50.0)),
            &config(2, 1, 5),
        );
        tree.add_object(cube_body(1, Point3::new(0.0, 0.0, -10.0), 0.5).into());
        tree.add_object(cube_body(2, Point3::new(0.0, 0.0, 10.0), 0.5).into());
        tree.add_object(cube_body(3, Point3::new(40.0, 0.0, -5.0), 0.5).into());

        let mut found = HashSet::new();
        tree.enumerate_in_frustum(&looking_down_negative_z(), &mut found, None);
        assert_eq!(ids(&found), vec![1]);
    }

    fn root_loose(tree: &Octree) -> BoundingBox {
        let arena = tree.arena.get();
        arena.node(arena.root()).loose
    }

    #[test]
    fn test_loose_bounds_shrink_after_remove_and_move() {
        let tree = Octree::new(world_box(100.0), &config(4, 2, 4));
        let mut rng = fastrand::Rng::with_seed(11);
        for id in 0..20 {
            let p = Point3::new(rng.f32() * 100.0, rng.f32() * 100.0, rng.f32() * 100.0);
            tree.add_object(point_body(id, p).into());
        }
        assert!(tree.node_count() > 1);
        assert_eq!(root_loose(&tree), world_box(100.0));

        let sticking_out = cube_body(100, Point3::new(95.0, 95.0, 95.0), 20.0);
        tree.add_object(sticking_out.into());
        assert_eq!(root_loose(&tree).max, Point3::new(115.0, 115.0, 115.0));
        assert!(tree.remove_object(ObjectId(100)));
        assert_eq!(root_loose(&tree), world_box(100.0));
        tree.check_invariants().unwrap();

        // Shrinking in place.
        let big = cube_body(200, Point3::new(5.0, 5.0, 5.0), 10.0);
        tree.add_object(big.clone().into());
        assert_eq!(root_loose(&tree).min, Point3::new(-5.0, -5.0, -5.0));
        big.set_bounds(BoundingBox::from_center_extents(
            Point3::new(5.0, 5.0, 5.0),
            Vector3::new(1.0, 1.0, 1.0),
        ));
        tree.add_update(big.clone().into());
        assert_eq!(tree.flush_updates(), 1);
        assert_eq!(root_loose(&tree), world_box(100.0));

        // Leaving its leaf.
        big.set_bounds(BoundingBox::from_center_extents(
            Point3::new(98.0, 50.0, 50.0),
            Vector3::new(4.0, 1.0, 1.0),
        ));
        tree.add_update(big.into());
        tree.flush_updates();
        assert_eq!(root_loose(&tree).max.x, 102.0);
        assert_eq!(root_loose(&tree).min, Point3::new(0.0, 0.0, 0.0));
        tree.check_invariants().unwrap();
    }
}
