//! Rays and axis-aligned boxes for hit-testing.

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Transform, Vector3, Vector4};

/// A ray with its reciprocal direction and per-axis sign precomputed for the
/// slab test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Point3<f32>,
    pub direction: Vector3<f32>,
    inv_direction: Vector3<f32>,
    sign: [usize; 3],
}

impl Ray {
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Self {
        let direction = direction.normalize();
        let inv_direction = Vector3::new(1.0 / direction.x, 1.0 / direction.y, 1.0 / direction.z);
        let sign = [
            (inv_direction.x < 0.0) as usize,
            (inv_direction.y < 0.0) as usize,
            (inv_direction.z < 0.0) as usize,
        ];
        Self {
            origin,
            direction,
            inv_direction,
            sign,
        }
    }

    /// A ray starting at the matrix's origin and pointing down its -Z axis,
    /// which is how pointer poses are delivered.
    pub fn from_matrix(matrix: &Matrix4<f32>) -> Self {
        let origin = matrix.transform_point(Point3::origin());
        let direction = matrix * Vector4::new(0.0, 0.0, -1.0, 0.0);
        Self::new(origin, direction.truncate())
    }

    pub fn at(&self, t: f32) -> Point3<f32> {
        self.origin + self.direction * t
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    /// Slab intersection. Returns the nearest non-negative ray parameter, or
    /// the exit parameter when the origin lies inside the box.
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        let bounds = [self.min, self.max];
        let o = ray.origin;
        let inv = ray.inv_direction;

        let mut t_min = (bounds[ray.sign[0]].x - o.x) * inv.x;
        let mut t_max = (bounds[1 - ray.sign[0]].x - o.x) * inv.x;
        let ty_min = (bounds[ray.sign[1]].y - o.y) * inv.y;
        let ty_max = (bounds[1 - ray.sign[1]].y - o.y) * inv.y;

        if t_min > ty_max || ty_min > t_max {
            return None;
        }
        if ty_min > t_min {
            t_min = ty_min;
        }
        if ty_max < t_max {
            t_max = ty_max;
        }

        let tz_min = (bounds[ray.sign[2]].z - o.z) * inv.z;
        let tz_max = (bounds[1 - ray.sign[2]].z - o.z) * inv.z;

        if t_min > tz_max || tz_min > t_max {
            return None;
        }
        if tz_min > t_min {
            t_min = tz_min;
        }
        if tz_max < t_max {
            t_max = tz_max;
        }

        if t_max < 0.0 || t_max.is_nan() {
            return None;
        }
        Some(if t_min >= 0.0 { t_min } else { t_max })
    }

    /// Grows the box to include `point`.
    pub fn extend(&mut self, point: Point3<f32>) {
        self.min = Point3::new(
            self.min.x.min(point.x),
            self.min.y.min(point.y),
            self.min.z.min(point.z),
        );
        self.max = Point3::new(
            self.max.x.max(point.x),
            self.max.y.max(point.y),
            self.max.z.max(point.z),
        );
    }
}
