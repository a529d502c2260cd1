//! # Collision Manager
//!
//! Two spatial hashes side by side: one for static objects (terrain props, buildings)
//! and one for dynamic ones (creatures, projectiles). Every query names which of the two
//! to search, or both, and results are merged into one set.

use std::collections::HashSet;

use cgmath::Point3;
use log::debug;

use super::bounded_object::{ObjectId, ObjectRef};
use super::bounds::{BoundingBox, BoundingSphere, Frustum, Ray};
use super::spatial_hash::SpatialHash;
use super::ObjectFilter;

/// Which hash an object lives in, or which hashes a query searches.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CollisionType {
    Static,
    Dynamic,
    Both,
}

impl CollisionType {
    fn includes_static(self) -> bool {
        matches!(self, CollisionType::Static | CollisionType::Both)
    }

    fn includes_dynamic(self) -> bool {
        matches!(self, CollisionType::Dynamic | CollisionType::Both)
    }
}

pub struct CollisionManager {
    static_hash: SpatialHash,
    dynamic_hash: SpatialHash,
}

impl CollisionManager {
    pub fn new(cell_size: f32) -> Self {
        Self {
            static_hash: SpatialHash::new(cell_size),
            dynamic_hash: SpatialHash::new(cell_size),
        }
    }

    fn hashes(&self, kind: CollisionType) -> impl Iterator<Item = &SpatialHash> {
        let statics = kind.includes_static().then_some(&self.static_hash);
        let dynamics = kind.includes_dynamic().then_some(&self.dynamic_hash);
        statics.into_iter().chain(dynamics)
    }

    /// Adds an object to the hash(es) named by `kind`.
    pub fn add_object(&mut self, object: ObjectRef, bounds: &BoundingBox, kind: CollisionType) {
        debug!("Adding object {} to the {:?} collision hash", object.id(), kind);
        if kind.includes_static() {
            self.static_hash.add_object(object.clone(), bounds);
        }
        if kind.includes_dynamic() {
            self.dynamic_hash.add_object(object, bounds);
        }
    }

    /// Removes an object that was added with `bounds` and `kind`.
    pub fn remove_object(&mut self, id: ObjectId, bounds: &BoundingBox, kind: CollisionType) -> bool {
        let mut removed = false;
        if kind.includes_static() {
            removed |= self.static_hash.remove_object(id, bounds);
        }
        if kind.includes_dynamic() {
            removed |= self.dynamic_hash.remove_object(id, bounds);
        }
        removed
    }

    /// Moves an object from `old_bounds` to `new_bounds` within the same hash(es).
    pub fn move_object(
        &mut self,
        object: ObjectRef,
        old_bounds: &BoundingBox,
        new_bounds: &BoundingBox,
        kind: CollisionType,
    ) {
        self.remove_object(object.id(), old_bounds, kind);
        self.add_object(object, new_bounds, kind);
    }

    pub fn query_point(
        &self,
        p: Point3<f32>,
        kind: CollisionType,
        out: &mut HashSet<ObjectRef>,
        filter: ObjectFilter<'_>,
    ) {
        for hash in self.hashes(kind) {
            hash.query_point(p, out, filter);
        }
    }

    pub fn query_box(
        &self,
        region: &BoundingBox,
        kind: CollisionType,
        out: &mut HashSet<ObjectRef>,
        filter: ObjectFilter<'_>,
    ) {
        for hash in self.hashes(kind) {
            hash.query_box(region, out, filter);
        }
    }

    pub fn query_sphere(
        &self,
        sphere: &BoundingSphere,
        kind: CollisionType,
        out: &mut HashSet<ObjectRef>,
        filter: ObjectFilter<'_>,
    ) {
        for hash in self.hashes(kind) {
            hash.query_sphere(sphere, out, filter);
        }
    }

    pub fn query_frustum(
        &self,
        frustum: &Frustum,
        kind: CollisionType,
        out: &mut HashSet<ObjectRef>,
        filter: ObjectFilter<'_>,
    ) {
        for hash in self.hashes(kind) {
            hash.query_frustum(frustum, out, filter);
        }
    }

    pub fn query_ray(
        &self,
        ray: &Ray,
        kind: CollisionType,
        out: &mut HashSet<ObjectRef>,
        filter: ObjectFilter<'_>,
    ) {
        for hash in self.hashes(kind) {
            hash.query_ray(ray, out, filter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::spatial::bounded_object::Body;
    use std::sync::Arc;

    fn body(id: u64, x: f32) -> (ObjectRef, BoundingBox) {
        let bounds = BoundingBox::new(Point3::new(x, 0.0, 0.0), Point3::new(x + 1.0, 1.0, 1.0));
        (Arc::new(Body::new(ObjectId(id), bounds)).into(), bounds)
    }

    #[test]
    fn test_queries_respect_collision_type() {
        let mut manager = CollisionManager::new(4.0);
        let (wall, wall_bounds) = body(1, 0.0);
        let (creature, creature_bounds) = body(2, 0.5);
        manager.add_object(wall, &wall_bounds, CollisionType::Static);
        manager.add_object(creature, &creature_bounds, CollisionType::Dynamic);

        let region = BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 2.0, 2.0));
        let mut out = HashSet::new();
        manager.query_box(&region, CollisionType::Static, &mut out, None);
        assert_eq!(out.len(), 1);

        out.clear();
        manager.query_box(&region, CollisionType::Both, &mut out, None);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_move_updates_buckets() {
        let mut manager = CollisionManager::new(2.0);
        let (object, old_bounds) = body(1, 0.0);
        let new_bounds = BoundingBox::new(Point3::new(10.0, 0.0, 0.0), Point3::new(11.0, 1.0, 1.0));
        manager.add_object(object.clone(), &old_bounds, CollisionType::Dynamic);
        manager.move_object(object, &old_bounds, &new_bounds, CollisionType::Dynamic);

        let mut out = HashSet::new();
        manager.query_point(Point3::new(0.5, 0.5, 0.5), CollisionType::Both, &mut out, None);
        assert!(out.is_empty());
        // The object still reports its original bounds, so the exact test uses those;
        // only bucket membership moved.
        assert!(manager.remove_object(ObjectId(1), &new_bounds, CollisionType::Dynamic));
    }
}
