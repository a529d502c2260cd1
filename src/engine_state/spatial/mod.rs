//! # Spatial Indices
//!
//! Two complementary indices over game objects:
//!
//! * `octree` - an adaptive octree for broad region, frustum, sphere and ray queries
//! * `collision_manager` - a pair of uniform spatial hashes (static and dynamic) for
//!   fast local collision queries
//!
//! Both take an optional object filter and merge results into a caller-provided set.

pub mod bounded_object;
pub mod bounds;
pub mod collision_manager;
pub mod octree;
pub mod spatial_hash;

use bounded_object::BoundedObject;

/// Optional predicate applied to every candidate of a query.
pub type ObjectFilter<'a> = Option<&'a dyn Fn(&dyn BoundedObject) -> bool>;
