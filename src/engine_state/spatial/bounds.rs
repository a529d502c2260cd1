//! # Bounding Volumes
//!
//! Query shapes shared by both spatial indices: axis-aligned boxes, spheres, rays and
//! view frusta. All boxes are closed, so two boxes that only share a face intersect.

use cgmath::{InnerSpace, Matrix, Matrix4, Point3, Vector3, Vector4};

/// An axis-aligned bounding box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl BoundingBox {
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    /// A degenerate box containing a single point.
    pub fn point(p: Point3<f32>) -> Self {
        Self { min: p, max: p }
    }

    pub fn from_center_extents(center: Point3<f32>, half_extents: Vector3<f32>) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn center(&self) -> Point3<f32> {
        Point3::new(
            (self.min.x + self.max.x) * 0.5,
            (self.min.y + self.max.y) * 0.5,
            (self.min.z + self.max.z) * 0.5,
        )
    }

    pub fn half_extents(&self) -> Vector3<f32> {
        (self.max - self.min) * 0.5
    }

    pub fn volume(&self) -> f32 {
        let size = self.max - self.min;
        size.x * size.y * size.z
    }

    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, p: Point3<f32>) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Whether `other` lies entirely inside this box.
    pub fn contains_box(&self, other: &BoundingBox) -> bool {
        self.contains_point(other.min) && self.contains_point(other.max)
    }

    /// The smallest box covering both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: Point3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Point3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }

    /// The eight octant boxes of this box, indexed by `x | y << 1 | z << 2` where a set
    /// bit selects the upper half of that axis.
    pub fn octants(&self) -> [BoundingBox; 8] {
        let c = self.center();
        std::array::from_fn(|i| {
            let (lx, hx) = if i & 1 == 0 { (self.min.x, c.x) } else { (c.x, self.max.x) };
            let (ly, hy) = if i & 2 == 0 { (self.min.y, c.y) } else { (c.y, self.max.y) };
            let (lz, hz) = if i & 4 == 0 { (self.min.z, c.z) } else { (c.z, self.max.z) };
            BoundingBox::new(Point3::new(lx, ly, lz), Point3::new(hx, hy, hz))
        })
    }

    /// Index of the octant containing `p`. Points on the split plane go to the upper half.
    pub fn octant_of(&self, p: Point3<f32>) -> usize {
        let c = self.center();
        (p.x >= c.x) as usize | ((p.y >= c.y) as usize) << 1 | ((p.z >= c.z) as usize) << 2
    }

    /// A box with the same centre and twice the extents on every axis.
    pub fn doubled(&self) -> BoundingBox {
        BoundingBox::from_center_extents(self.center(), self.half_extents() * 2.0)
    }
}

/// A sphere query shape.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Point3<f32>,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn new(center: Point3<f32>, radius: f32) -> Self {
        Self { center, radius }
    }

    /// The tightest box around the sphere.
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_center_extents(
            self.center,
            Vector3::new(self.radius, self.radius, self.radius),
        )
    }

    pub fn intersects_box(&self, b: &BoundingBox) -> bool {
        let closest = Point3::new(
            self.center.x.clamp(b.min.x, b.max.x),
            self.center.y.clamp(b.min.y, b.max.y),
            self.center.z.clamp(b.min.z, b.max.z),
        );
        (closest - self.center).magnitude2() <= self.radius * self.radius
    }
}

/// A half-line with a maximum length.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ray {
    pub origin: Point3<f32>,
    /// Unit direction.
    pub direction: Vector3<f32>,
    pub max_distance: f32,
}

impl Ray {
    /// Creates a ray. The direction is normalised.
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>, max_distance: f32) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
            max_distance,
        }
    }

    pub fn end(&self) -> Point3<f32> {
        self.origin + self.direction * self.max_distance
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::point(self.origin).union(&BoundingBox::point(self.end()))
    }

    /// Distance along the ray to the first point inside `b`, if it is reached within
    /// `max_distance`. Slab method.
    pub fn intersects_box(&self, b: &BoundingBox) -> Option<f32> {
        let mut t_min = 0.0f32;
        let mut t_max = self.max_distance;
        for axis in 0..3 {
            let origin = self.origin[axis];
            let dir = self.direction[axis];
            let (lo, hi) = (b.min[axis], b.max[axis]);
            if dir.abs() < f32::EPSILON {
                if origin < lo || origin > hi {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let mut t0 = (lo - origin) * inv;
            let mut t1 = (hi - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

/// A plane `normal · p + distance = 0`, normalised.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vector3<f32>,
    pub distance: f32,
}

impl Plane {
    fn from_coefficients(v: Vector4<f32>) -> Self {
        let normal = Vector3::new(v.x, v.y, v.z);
        let length = normal.magnitude();
        if length > 0.0 {
            Self {
                normal: normal / length,
                distance: v.w / length,
            }
        } else {
            Self {
                normal: Vector3::new(0.0, 0.0, 0.0),
                distance: 0.0,
            }
        }
    }

    pub fn distance_to_point(&self, p: Point3<f32>) -> f32 {
        self.normal.dot(Vector3::new(p.x, p.y, p.z)) + self.distance
    }
}

/// A view frustum bounded by six inward-facing planes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
    corners: [Point3<f32>; 8],
}

impl Frustum {
    /// Extracts the planes of a view-projection matrix (Gribb-Hartmann) and its eight
    /// corners (by unprojecting the clip-space cube). Depth is assumed to map to
    /// `[-1, 1]`, as produced by `cgmath::perspective`.
    ///
    /// Returns `None` for a singular matrix.
    pub fn from_view_projection(view_projection: Matrix4<f32>) -> Option<Self> {
        use cgmath::SquareMatrix;

        let m = view_projection.transpose();
        let (r0, r1, r2, r3) = (m.x, m.y, m.z, m.w);
        let planes = [
            Plane::from_coefficients(r3 + r0),
            Plane::from_coefficients(r3 - r0),
            Plane::from_coefficients(r3 + r1),
            Plane::from_coefficients(r3 - r1),
            Plane::from_coefficients(r3 + r2),
            Plane::from_coefficients(r3 - r2),
        ];

        let inverse = view_projection.invert()?;
        let corners = std::array::from_fn(|i| {
            let ndc = Vector4::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
                1.0,
            );
            let world = inverse * ndc;
            Point3::new(world.x / world.w, world.y / world.w, world.z / world.w)
        });

        Some(Self { planes, corners })
    }

    pub fn corners(&self) -> &[Point3<f32>; 8] {
        &self.corners
    }

    /// A conservative box around the whole frustum.
    pub fn bounding_box(&self) -> BoundingBox {
        self.corners[1..]
            .iter()
            .fold(BoundingBox::point(self.corners[0]), |acc, c| {
                acc.union(&BoundingBox::point(*c))
            })
    }

    /// Tests a box against every plane using the positive-vertex shortcut.
    pub fn intersects_box(&self, b: &BoundingBox) -> bool {
        self.planes.iter().all(|plane| {
            let p_vertex = Point3::new(
                if plane.normal.x >= 0.0 { b.max.x } else { b.min.x },
                if plane.normal.y >= 0.0 { b.max.y } else { b.min.y },
                if plane.normal.z >= 0.0 { b.max.z } else { b.min.z },
            );
            plane.distance_to_point(p_vertex) >= 0.0
        })
    }

    pub fn contains_point(&self, p: Point3<f32>) -> bool {
        self.planes.iter().all(|plane| plane.distance_to_point(p) >= 0.0)
    }
}
