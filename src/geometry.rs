//! Small geometric value types used by the view-factor engine.

use nalgebra::{Point3, Rotation3, Unit, Vector3};

/// A triangle in 3D space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    vertices: [Point3<f64>; 3],
}

impl Triangle {
    pub fn new(a: Point3<f64>, b: Point3<f64>, c: Point3<f64>) -> Self {
        Self { vertices: [a, b, c] }
    }

    pub fn vertices(&self) -> &[Point3<f64>; 3] {
        &self.vertices
    }

    pub fn centroid(&self) -> Point3<f64> {
        let [a, b, c] = &self.vertices;
        Point3::from((a.coords + b.coords + c.coords) / 3.0)
    }

    /// Unit normal by the right-hand rule over the vertex order.
    /// Degenerate triangles yield the zero vector.
    pub fn normal(&self) -> Vector3<f64> {
        let [a, b, c] = &self.vertices;
        let n = (b - a).cross(&(c - a));
        let norm = n.norm();
        if norm == 0.0 {
            Vector3::zeros()
        } else {
            n / norm
        }
    }

    pub fn area(&self) -> f64 {
        let [a, b, c] = &self.vertices;
        0.5 * (b - a).cross(&(c - a)).norm()
    }

    /// Distance from `point` to the closest point of the triangle, interior
    /// and edges included. A lower bound on the distance to any point of
    /// the triangle, which the vertex distances alone are not.
    pub fn closest_point_distance(&self, point: &Point3<f64>) -> f64 {
        (self.closest_point(point) - point).norm()
    }

    /// Closest point of the triangle to `point`, using the Voronoi-region
    /// classification over vertices, edges and face.
    pub fn closest_point(&self, point: &Point3<f64>) -> Point3<f64> {
        let [a, b, c] = &self.vertices;
        let ab = b - a;
        let ac = c - a;

        let ap = point - a;
        let d1 = ab.dot(&ap);
        let d2 = ac.dot(&ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return *a;
        }

        let bp = point - b;
        let d3 = ab.dot(&bp);
        let d4 = ac.dot(&bp);
        if d3 >= 0.0 && d4 <= d3 {
            return *b;
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return a + ab * v;
        }

        let cp = point - c;
        let d5 = ab.dot(&cp);
        let d6 = ac.dot(&cp);
        if d6 >= 0.0 && d5 <= d6 {
            return *c;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return a + ac * w;
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return b + (c - b) * w;
        }

        let denom = 1.0 / (va + vb + vc);
        let v = vb * denom;
        let w = vc * denom;
        a + ab * v + ac * w
    }

    /// Möller-Trumbore ray-triangle intersection.
    ///
    /// Returns the ray parameter `t` such that the intersection point is
    /// `origin + t * direction`, or `None` if the ray misses. `direction`
    /// does not need to be normalized; `t` is expressed in units of its
    /// length. Intersections behind the origin (`t <= 0`) are misses.
    pub fn intersect_ray(&self, origin: &Point3<f64>, direction: &Vector3<f64>) -> Option<f64> {
        const PARALLEL_EPS: f64 = 1e-14;
        let [a, b, c] = &self.vertices;
        let edge1 = b - a;
        let edge2 = c - a;

        let pvec = direction.cross(&edge2);
        let det = edge1.dot(&pvec);
        if det.abs() < PARALLEL_EPS {
            return None;
        }
        let inv_det = 1.0 / det;

        let tvec = origin - a;
        let u = tvec.dot(&pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let qvec = tvec.cross(&edge1);
        let v = direction.dot(&qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = edge2.dot(&qvec) * inv_det;
        (t > 0.0).then_some(t)
    }
}

/// A plane in point-normal form.
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    point: Point3<f64>,
    normal: Vector3<f64>,
}

impl Plane {
    /// Plane through three points. The normal follows the right-hand rule;
    /// collinear points yield `None`.
    pub fn from_points(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<Self> {
        let n = (b - a).cross(&(c - a));
        let norm = n.norm();
        (norm > 0.0).then(|| Self {
            point: *a,
            normal: n / norm,
        })
    }

    /// Intersect the ray `origin + t * direction` with the plane, returning
    /// the intersection point for `t > 0`.
    pub fn intersect_ray(&self, origin: &Point3<f64>, direction: &Vector3<f64>) -> Option<Point3<f64>> {
        let denom = self.normal.dot(direction);
        if denom.abs() < 1e-14 {
            return None;
        }
        let t = self.normal.dot(&(self.point - origin)) / denom;
        (t > 0.0).then(|| origin + direction * t)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f64>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut min = *first;
        let mut max = *first;
        for p in iter {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        Some(Self { min, max })
    }

    pub fn diagonal(&self) -> f64 {
        (self.max - self.min).norm()
    }

    /// Grow the box by `margin` in every direction.
    pub fn inflated(&self, margin: f64) -> Self {
        let m = Vector3::from_element(margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        (0..3).all(|i| self.min[i] <= other.max[i] && self.max[i] >= other.min[i])
    }
}

/// Rotation taking the local `+x` axis onto `direction`.
///
/// The hemicube is generated in a local frame whose depth axis is `+x`;
/// this rotation carries local pixel positions into world space. The
/// rotation about the view axis itself is arbitrary.
pub fn rotation_onto_x(direction: &Vector3<f64>) -> Rotation3<f64> {
    let dir = Unit::new_normalize(*direction);
    match Rotation3::rotation_between(&Vector3::x(), &dir) {
        Some(r) => r,
        // Antiparallel case: any half-turn about an axis orthogonal to x.
        None => Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::PI),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrixcompare::assert_scalar_eq;

    fn unit_triangle() -> Triangle {
        Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        )
    }

    #[test]
    fn triangle_measures() {
        let tri = unit_triangle();
        assert_scalar_eq!(tri.area(), 0.5, comp = abs, tol = 1e-14);
        assert_eq!(tri.normal(), Vector3::new(0.0, 0.0, 1.0));
        let c = tri.centroid();
        assert_scalar_eq!(c.x, 1.0 / 3.0, comp = abs, tol = 1e-14);
        assert_scalar_eq!(c.y, 1.0 / 3.0, comp = abs, tol = 1e-14);
    }

    #[test]
    fn closest_point_covers_face_edge_and_vertex_regions() {
        let tri = unit_triangle();
        // Above the interior: closest point is the plane projection, far
        // closer than any vertex.
        let above = Point3::new(0.25, 0.25, 3.0);
        assert_scalar_eq!(tri.closest_point_distance(&above), 3.0, comp = abs, tol = 1e-14);
        assert!(tri.closest_point_distance(&above) < (tri.vertices()[0] - above).norm());
        // Beyond an edge.
        let beside = Point3::new(0.5, -2.0, 0.0);
        assert_scalar_eq!(tri.closest_point_distance(&beside), 2.0, comp = abs, tol = 1e-14);
        // Beyond a vertex.
        let past = Point3::new(-3.0, -4.0, 0.0);
        assert_scalar_eq!(tri.closest_point_distance(&past), 5.0, comp = abs, tol = 1e-14);
    }

    #[test]
    fn ray_hits_triangle_interior() {
        let tri = unit_triangle();
        let origin = Point3::new(0.25, 0.25, 2.0);
        let t = tri.intersect_ray(&origin, &Vector3::new(0.0, 0.0, -1.0)).unwrap();
        assert_scalar_eq!(t, 2.0, comp = abs, tol = 1e-12);
    }

    #[test]
    fn ray_misses_outside_and_behind() {
        let tri = unit_triangle();
        // Outside the triangle footprint.
        assert!(tri
            .intersect_ray(&Point3::new(2.0, 2.0, 1.0), &Vector3::new(0.0, 0.0, -1.0))
            .is_none());
        // Pointing away.
        assert!(tri
            .intersect_ray(&Point3::new(0.25, 0.25, 1.0), &Vector3::new(0.0, 0.0, 1.0))
            .is_none());
        // Parallel to the plane.
        assert!(tri
            .intersect_ray(&Point3::new(0.0, 0.0, 1.0), &Vector3::new(1.0, 0.0, 0.0))
            .is_none());
    }

    #[test]
    fn plane_ray_intersection() {
        let plane = Plane::from_points(
            &Point3::new(0.0, 0.0, 1.0),
            &Point3::new(1.0, 0.0, 1.0),
            &Point3::new(0.0, 1.0, 1.0),
        )
        .unwrap();
        let hit = plane
            .intersect_ray(&Point3::origin(), &Vector3::new(0.0, 0.0, 2.0))
            .unwrap();
        assert_scalar_eq!(hit.z, 1.0, comp = abs, tol = 1e-14);
    }

    #[test]
    fn aabb_overlap_with_inflation() {
        let a = Aabb::from_points([Point3::origin(), Point3::new(1.0, 1.0, 1.0)].iter()).unwrap();
        let b = Aabb::from_points([Point3::new(1.5, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0)].iter()).unwrap();
        assert!(!a.intersects(&b));
        assert!(a.inflated(0.6).intersects(&b));
    }

    #[test]
    fn rotation_maps_x_onto_direction() {
        for dir in [
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::new(-1.0, 0.0, 0.0),
            Vector3::new(1.0, 2.0, 3.0),
        ] {
            let r = rotation_onto_x(&dir);
            let mapped = r * Vector3::x();
            assert!((mapped - dir.normalize()).norm() < 1e-12);
        }
    }
}
