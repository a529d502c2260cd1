//! # Spatial Hash
//!
//! A uniform grid of cubic cells keyed by integer cell coordinates. An object is listed
//! in every cell its bounding box touches: cells `floor(min / cell_size)` through
//! `floor(max / cell_size)` on each axis, inclusive.
//!
//! Queries gather the candidates of every cell the query shape touches and then test
//! each candidate's bounds exactly. Region queries walk the occupied cells instead when
//! there are fewer of them than the region covers. Rays walk the grid cell by cell
//! (3D DDA) up to their maximum length or the far side of the occupied cells, whichever
//! comes first.

use std::collections::{HashMap, HashSet};

use cgmath::Point3;

use super::bounded_object::{ObjectId, ObjectRef};
use super::bounds::{BoundingBox, BoundingSphere, Frustum, Ray};
use super::ObjectFilter;

/// Integer coordinate of a grid cell.
pub type CellCoordinate = Point3<i32>;

pub struct SpatialHash {
    cell_size: f32,
    cells: HashMap<CellCoordinate, Vec<ObjectRef>>,
    /// Lowest and highest cell ever occupied since the hash was last empty. Only grows.
    occupied: Option<(CellCoordinate, CellCoordinate)>,
}

impl SpatialHash {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            cells: HashMap::new(),
            occupied: None,
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// The cell containing `p`.
    pub fn cell_of(&self, p: Point3<f32>) -> CellCoordinate {
        Point3::new(
            (p.x / self.cell_size).floor() as i32,
            (p.y / self.cell_size).floor() as i32,
            (p.z / self.cell_size).floor() as i32,
        )
    }

    /// Every cell a box touches.
    pub fn cells_for_box(&self, bounds: &BoundingBox) -> impl Iterator<Item = CellCoordinate> {
        let lo = self.cell_of(bounds.min);
        let hi = self.cell_of(bounds.max);
        (lo.x..=hi.x).flat_map(move |x| {
            (lo.y..=hi.y).flat_map(move |y| (lo.z..=hi.z).map(move |z| Point3::new(x, y, z)))
        })
    }

    /// Lists `object` in every cell touched by `bounds`.
    pub fn add_object(&mut self, object: ObjectRef, bounds: &BoundingBox) {
        let (lo, hi) = (self.cell_of(bounds.min), self.cell_of(bounds.max));
        self.occupied = Some(match self.occupied {
            Some((a, b)) => (
                Point3::new(a.x.min(lo.x), a.y.min(lo.y), a.z.min(lo.z)),
                Point3::new(b.x.max(hi.x), b.y.max(hi.y), b.z.max(hi.z)),
            ),
            None => (lo, hi),
        });
        let cells: Vec<_> = self.cells_for_box(bounds).collect();
        for cell in cells {
            let bucket = self.cells.entry(cell).or_default();
            if !bucket.iter().any(|o| o.id() == object.id()) {
                bucket.push(object.clone());
            }
        }
    }

    /// Removes `id` from every cell touched by `bounds`, which must be the bounds the
    /// object was added with.
    ///
    /// # Returns
    /// `true` if the object was found in at least one cell.
    pub fn remove_object(&mut self, id: ObjectId, bounds: &BoundingBox) -> bool {
        let cells: Vec<_> = self.cells_for_box(bounds).collect();
        let mut removed = false;
        for cell in cells {
            if let Some(bucket) = self.cells.get_mut(&cell) {
                let before = bucket.len();
                bucket.retain(|o| o.id() != id);
                removed |= bucket.len() != before;
                if bucket.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
        if self.cells.is_empty() {
            self.occupied = None;
        }
        removed
    }

    /// The objects listed in one cell.
    pub fn bucket(&self, cell: CellCoordinate) -> &[ObjectRef] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of non-empty cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Cells worth visiting for a query reaching over `reach`: the covered cells, or
    /// every occupied cell when there are fewer of those.
    fn candidate_cells(&self, reach: &BoundingBox) -> Vec<CellCoordinate> {
        let (lo, hi) = (self.cell_of(reach.min), self.cell_of(reach.max));
        let span = |a: i32, b: i32| (i64::from(b) - i64::from(a) + 1).max(0) as u64;
        let covered = span(lo.x, hi.x)
            .saturating_mul(span(lo.y, hi.y))
            .saturating_mul(span(lo.z, hi.z));
        if (self.cell_count() as u64) < covered {
            self.cells.keys().copied().collect()
        } else {
            self.cells_for_box(reach).collect()
        }
    }

    /// Distance from `origin` to the farthest corner of the occupied cells, or `None`
    /// when the hash is empty.
    fn occupied_reach(&self, origin: Point3<f32>) -> Option<f32> {
        let (lo, hi) = self.occupied?;
        let mut squared = 0.0f32;
        for axis in 0..3 {
            let near = lo[axis] as f32 * self.cell_size;
            let far = (hi[axis] as f32 + 1.0) * self.cell_size;
            let d = (origin[axis] - near).abs().max((origin[axis] - far).abs());
            squared += d * d;
        }
        Some(squared.sqrt())
    }

    fn gather(
        &self,
        cells: impl Iterator<Item = CellCoordinate>,
        accept: impl Fn(&BoundingBox) -> bool,
        out: &mut HashSet<ObjectRef>,
        filter: ObjectFilter<'_>,
    ) {
        for cell in cells {
            let Some(bucket) = self.cells.get(&cell) else {
                continue;
            };
            for object in bucket {
                if out.contains(object) {
                    continue;
                }
                if accept(&object.bounding_box()) && filter.map_or(true, |f| f(&**object)) {
                    out.insert(object.clone());
                }
            }
        }
    }

    /// Objects whose bounds contain `p`.
    pub fn query_point(&self, p: Point3<f32>, out: &mut HashSet<ObjectRef>, filter: ObjectFilter<'_>) {
        self.gather(
            std::iter::once(self.cell_of(p)),
            |b| b.contains_point(p),
            out,
            filter,
        );
    }

    /// Objects whose bounds intersect `region`.
    pub fn query_box(&self, region: &BoundingBox, out: &mut HashSet<ObjectRef>, filter: ObjectFilter<'_>) {
        self.gather(
            self.candidate_cells(region).into_iter(),
            |b| b.intersects(region),
            out,
            filter,
        );
    }

    /// Objects whose bounds intersect `sphere`.
    pub fn query_sphere(
        &self,
        sphere: &BoundingSphere,
        out: &mut HashSet<ObjectRef>,
        filter: ObjectFilter<'_>,
    ) {
        self.gather(
            self.candidate_cells(&sphere.bounding_box()).into_iter(),
            |b| sphere.intersects_box(b),
            out,
            filter,
        );
    }

    /// Objects whose bounds intersect `frustum`. Cells come from the frustum's bounding
    /// box.
    pub fn query_frustum(
        &self,
        frustum: &Frustum,
        out: &mut HashSet<ObjectRef>,
        filter: ObjectFilter<'_>,
    ) {
        self.gather(
            self.candidate_cells(&frustum.bounding_box()).into_iter(),
            |b| frustum.intersects_box(b),
            out,
            filter,
        );
    }

    /// Objects whose bounds the ray hits within its length.
    pub fn query_ray(&self, ray: &Ray, out: &mut HashSet<ObjectRef>, filter: ObjectFilter<'_>) {
        self.gather(
            self.ray_cells(ray).into_iter(),
            |b| ray.intersects_box(b).is_some(),
            out,
            filter,
        );
    }

    /// The cells a ray passes through, in order, using Amanatides-Woo traversal.
    ///
    /// The walk ends at the ray's length or once it is past every occupied cell, so an
    /// unbounded ray stays finite. An empty hash yields only the origin cell.
    pub fn ray_cells(&self, ray: &Ray) -> Vec<CellCoordinate> {
        let mut cell = self.cell_of(ray.origin);
        let mut cells = vec![cell];
        let Some(occupied) = self.occupied_reach(ray.origin) else {
            return cells;
        };
        let reach = ray.max_distance.min(occupied);
        if !(reach > 0.0) {
            return cells;
        }

        let mut step = [0i32; 3];
        let mut t_max = [f32::INFINITY; 3];
        let mut t_delta = [f32::INFINITY; 3];
        for axis in 0..3 {
            let dir = ray.direction[axis];
            if dir.abs() < f32::EPSILON {
                continue;
            }
            let index = cell[axis];
            let boundary = if dir > 0.0 {
                step[axis] = 1;
                (index as f32 + 1.0) * self.cell_size
            } else {
                step[axis] = -1;
                index as f32 * self.cell_size
            };
            t_max[axis] = (boundary - ray.origin[axis]) / dir;
            t_delta[axis] = self.cell_size / dir.abs();
        }

        let limit = ((reach / self.cell_size).ceil() as usize)
            .saturating_add(2)
            .saturating_mul(3);
        for _ in 0..limit {
            let axis = if t_max[0] <= t_max[1] && t_max[0] <= t_max[2] {
                0
            } else if t_max[1] <= t_max[2] {
                1
            } else {
                2
            };
            if t_max[axis] > reach {
                break;
            }
            let Some(next) = cell[axis].checked_add(step[axis]) else {
                break;
            };
            cell[axis] = next;
            t_max[axis] += t_delta[axis];
            cells.push(cell);
        }
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::spatial::bounded_object::Body;
    use cgmath::Vector3;
    use std::sync::Arc;

    fn body(id: u64, min: [f32; 3], max: [f32; 3]) -> ObjectRef {
        Arc::new(Body::new(
            ObjectId(id),
            BoundingBox::new(Point3::from(min), Point3::from(max)),
        ))
        .into()
    }

    #[test]
    fn test_object_listed_in_every_touched_cell() {
        let mut hash = SpatialHash::new(4.0);
        let object = body(1, [3.0, 0.0, 0.0], [9.0, 1.0, 1.0]);
        let bounds = object.bounding_box();
        hash.add_object(object, &bounds);

        // x spans cells 0, 1 and 2.
        for x in 0..=2 {
            assert_eq!(hash.bucket(Point3::new(x, 0, 0)).len(), 1);
        }
        assert!(hash.bucket(Point3::new(3, 0, 0)).is_empty());
        assert_eq!(hash.cell_count(), 3);

        assert!(hash.remove_object(ObjectId(1), &bounds));
        assert_eq!(hash.cell_count(), 0);
        assert!(!hash.remove_object(ObjectId(1), &bounds));
    }

    #[test]
    fn test_negative_coordinates_use_floor() {
        let hash = SpatialHash::new(4.0);
        assert_eq!(hash.cell_of(Point3::new(-0.1, 0.0, 4.0)), Point3::new(-1, 0, 1));
    }

    #[test]
    fn test_queries_are_exact_and_deduplicated() {
        let mut hash = SpatialHash::new(2.0);
        for object in [
            body(1, [0.0, 0.0, 0.0], [5.0, 5.0, 5.0]),
            body(2, [1.5, 1.5, 1.5], [1.8, 1.8, 1.8]),
            body(3, [10.0, 0.0, 0.0], [11.0, 1.0, 1.0]),
        ] {
            let bounds = object.bounding_box();
            hash.add_object(object, &bounds);
        }

        let mut out = HashSet::new();
        hash.query_point(Point3::new(1.0, 1.0, 1.0), &mut out, None);
        assert_eq!(out.len(), 1);

        out.clear();
        hash.query_box(
            &BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 4.0, 4.0)),
            &mut out,
            None,
        );
        assert_eq!(out.len(), 2);

        out.clear();
        hash.query_sphere(&BoundingSphere::new(Point3::new(10.5, 0.5, 0.5), 0.5), &mut out, None);
        assert_eq!(out.iter().map(|o| o.id().0).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_ray_walks_cells_in_order() {
        let mut hash = SpatialHash::new(1.0);
        let far = body(1, [9.0, 9.0, 9.0], [9.5, 9.5, 9.5]);
        let bounds = far.bounding_box();
        hash.add_object(far, &bounds);
        let ray = Ray::new(Point3::new(0.5, 0.5, 0.5), Vector3::new(1.0, 0.0, 0.0), 3.0);
        let cells = hash.ray_cells(&ray);
        assert_eq!(
            cells,
            vec![
                Point3::new(0, 0, 0),
                Point3::new(1, 0, 0),
                Point3::new(2, 0, 0),
                Point3::new(3, 0, 0),
            ]
        );

        let diagonal = Ray::new(Point3::new(0.5, 0.5, 0.5), Vector3::new(1.0, 1.0, 0.0), 1.5);
        let cells = hash.ray_cells(&diagonal);
        assert_eq!(cells.first(), Some(&Point3::new(0, 0, 0)));
        assert!(cells.contains(&Point3::new(1, 1, 0)));
        for pair in cells.windows(2) {
            let d = pair[1] - pair[0];
            assert_eq!(d.x.abs() + d.y.abs() + d.z.abs(), 1);
        }
    }

    #[test]
    fn test_ray_query_respects_length() {
        let mut hash = SpatialHash::new(2.0);
        let near = body(1, [3.0, 0.0, 0.0], [4.0, 1.0, 1.0]);
        let far = body(2, [20.0, 0.0, 0.0], [21.0, 1.0, 1.0]);
        for object in [near, far] {
            let bounds = object.bounding_box();
            hash.add_object(object, &bounds);
        }

        let mut out = HashSet::new();
        let ray = Ray::new(Point3::new(0.0, 0.5, 0.5), Vector3::new(1.0, 0.0, 0.0), 10.0);
        hash.query_ray(&ray, &mut out, None);
        assert_eq!(out.iter().map(|o| o.id().0).collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_unbounded_ray_finds_distant_object() {
        let mut hash = SpatialHash::new(2.0);
        let target = body(1, [10.0, 0.0, 0.0], [11.0, 1.0, 1.0]);
        let bounds = target.bounding_box();
        hash.add_object(target, &bounds);

        let ray = Ray::new(Point3::new(0.0, 0.5, 0.5), Vector3::new(1.0, 0.0, 0.0), f32::INFINITY);
        let mut out = HashSet::new();
        hash.query_ray(&ray, &mut out, None);
        assert_eq!(out.iter().map(|o| o.id().0).collect::<Vec<_>>(), vec![1]);

        // The walk stops past the occupied cells.
        let cells = hash.ray_cells(&ray);
        assert!(cells.len() <= 8);
        assert!(cells.contains(&Point3::new(5, 0, 0)));

        let away = Ray::new(Point3::new(0.0, 0.5, 0.5), Vector3::new(-1.0, 0.0, 0.0), f32::INFINITY);
        out.clear();
        hash.query_ray(&away, &mut out, None);
        assert!(out.is_empty());

        assert!(hash.remove_object(ObjectId(1), &bounds));
        assert_eq!(hash.ray_cells(&ray), vec![Point3::new(0, 0, 0)]);
    }

    #[test]
    fn test_huge_regions_walk_occupied_cells() {
        let mut hash = SpatialHash::new(1.0);
        let inside = body(1, [5.0, 5.0, 5.0], [6.0, 6.0, 6.0]);
        let outside = body(2, [-5.0e6, 0.0, 0.0], [-5.0e6 + 1.0, 1.0, 1.0]);
        for object in [inside, outside] {
            let bounds = object.bounding_box();
            hash.add_object(object, &bounds);
        }

        // About 1e18 covered cells; only feasible through the occupied ones.
        let region = BoundingBox::new(Point3::new(-1.0e6, -1.0e6, -1.0e6), Point3::new(1.0e6, 1.0e6, 1.0e6));
        let mut out = HashSet::new();
        hash.query_box(&region, &mut out, None);
        assert_eq!(out.iter().map(|o| o.id().0).collect::<Vec<_>>(), vec![1]);

        out.clear();
        hash.query_sphere(&BoundingSphere::new(Point3::new(0.0, 0.0, 0.0), 1.0e6), &mut out, None);
        assert_eq!(out.iter().map(|o| o.id().0).collect::<Vec<_>>(), vec![1]);

        // Small regions still answer from their own cells.
        out.clear();
        let small = BoundingBox::new(Point3::new(4.5, 4.5, 4.5), Point3::new(5.5, 5.5, 5.5));
        assert_eq!(hash.candidate_cells(&small).len(), 8);
        hash.query_box(&small, &mut out, None);
        assert_eq!(out.len(), 1);
    }
}
