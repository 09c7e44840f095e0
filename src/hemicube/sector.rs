//! One rectangular tile of a hemicube face.

use nalgebra::{Point3, Rotation3, Vector3};

use crate::geometry::{Aabb, Plane, Triangle};
use crate::hemicube::pixel::HemiCubePixel;

/// Fraction of the sector bounding-box diagonal used to inflate the box
/// during the visibility overlap test.
const BBOX_INFLATION: f64 = 1e-2;

/// The 12 logical face orientations of a hemicube.
///
/// The local frame has `+x` as the view (depth) axis, `+y` east and `+z`
/// north. The front face (perpendicular to the view axis) is split into its
/// four quadrants; each of the four side half-faces is split along the view
/// axis' orthogonal direction, giving twelve sectors in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorKind {
    FrontNorthEast,
    FrontNorthWest,
    FrontSouthEast,
    FrontSouthWest,
    EastNorth,
    EastSouth,
    WestNorth,
    WestSouth,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl SectorKind {
    pub const ALL: [SectorKind; 12] = [
        SectorKind::FrontNorthEast,
        SectorKind::FrontNorthWest,
        SectorKind::FrontSouthEast,
        SectorKind::FrontSouthWest,
        SectorKind::EastNorth,
        SectorKind::EastSouth,
        SectorKind::WestNorth,
        SectorKind::WestSouth,
        SectorKind::NorthEast,
        SectorKind::NorthWest,
        SectorKind::SouthEast,
        SectorKind::SouthWest,
    ];

    /// Map face coordinates `(u, v)` in `[0, 1]^2` to a local position on
    /// this sector's face of a hemicube with half-extent `size`.
    fn local_point(&self, size: f64, u: f64, v: f64) -> Vector3<f64> {
        let s = size;
        match self {
            Self::FrontNorthEast => Vector3::new(s, u * s, v * s),
            Self::FrontNorthWest => Vector3::new(s, -u * s, v * s),
            Self::FrontSouthEast => Vector3::new(s, u * s, -v * s),
            Self::FrontSouthWest => Vector3::new(s, -u * s, -v * s),
            Self::EastNorth => Vector3::new(u * s, s, v * s),
            Self::EastSouth => Vector3::new(u * s, s, -v * s),
            Self::WestNorth => Vector3::new(u * s, -s, v * s),
            Self::WestSouth => Vector3::new(u * s, -s, -v * s),
            Self::NorthEast => Vector3::new(u * s, v * s, s),
            Self::NorthWest => Vector3::new(u * s, -v * s, s),
            Self::SouthEast => Vector3::new(u * s, v * s, -s),
            Self::SouthWest => Vector3::new(u * s, -v * s, -s),
        }
    }
}

/// A `resolution x resolution` pixel grid covering one sub-tile of one
/// hemicube face, with z-buffered triangle rasterization.
#[derive(Debug, Clone)]
pub struct HemiCubeSector {
    kind: SectorKind,
    resolution: usize,
    eye_position: Point3<f64>,
    eye_direction: Vector3<f64>,
    pixels: Vec<HemiCubePixel>,
    bounding_box: Aabb,
    limit_plane: Plane,
}

impl HemiCubeSector {
    /// Build the sector covering sub-tile `(sub_i, sub_j)` of an
    /// `n_sub x n_sub` subdivision of the face, rotated into world space by
    /// `rotation` and centered at `eye_position`.
    ///
    /// Each pixel's weight is the differential solid-angle factor
    /// `x / (pi * (x^2 + y^2 + z^2)^2)` in local coordinates, with `x` the
    /// pixel's depth-axis coordinate (constant on the front face, varying
    /// along the side faces). The weights are later normalized across the
    /// whole hemicube.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: SectorKind,
        eye_position: Point3<f64>,
        rotation: &Rotation3<f64>,
        size: f64,
        resolution: usize,
        sub_i: usize,
        sub_j: usize,
        n_sub: usize,
    ) -> Self {
        assert!(resolution > 0 && n_sub > 0);
        assert!(sub_i < n_sub && sub_j < n_sub);

        let mut pixels = Vec::with_capacity(resolution * resolution);
        let uv = |cell: usize, sub: usize| (sub as f64 + (cell as f64 + 0.5) / resolution as f64) / n_sub as f64;
        for row in 0..resolution {
            let v = uv(row, sub_j);
            for col in 0..resolution {
                let u = uv(col, sub_i);
                let local = kind.local_point(size, u, v);
                let r2 = local.norm_squared();
                let weight = local.x / (std::f64::consts::PI * r2 * r2);
                let world = eye_position + rotation * local;
                pixels.push(HemiCubePixel::new(world, weight));
            }
        }

        let bounding_box =
            Aabb::from_points(pixels.iter().map(|p| p.position())).expect("sector has pixels");

        // Plane through three corner pixels of the grid. For a single-pixel
        // grid the corners coincide, so fall back to the face plane spanned
        // by the rotated tangent directions.
        let corner = |row: usize, col: usize| *pixels[row * resolution + col].position();
        let limit_plane = Plane::from_points(
            &corner(0, 0),
            &corner(0, resolution - 1),
            &corner(resolution - 1, 0),
        )
        .unwrap_or_else(|| {
            let a = corner(0, 0);
            let du = rotation * kind.local_point(size, 1.0, 0.0);
            let dv = rotation * kind.local_point(size, 0.0, 1.0);
            Plane::from_points(&a, &(a + du), &(a + dv)).expect("face plane is well defined")
        });

        Self {
            kind,
            resolution,
            eye_position,
            eye_direction: rotation * Vector3::x(),
            pixels,
            bounding_box,
            limit_plane,
        }
    }

    pub fn kind(&self) -> SectorKind {
        self.kind
    }

    pub fn pixels(&self) -> &[HemiCubePixel] {
        &self.pixels
    }

    pub(crate) fn pixels_mut(&mut self) -> &mut [HemiCubePixel] {
        &mut self.pixels
    }

    /// Cheap two-stage reject deciding whether `triangle` can contribute
    /// any pixel of this sector:
    ///
    /// 1. the triangle center must be in front of the eye *and* the
    ///    triangle must face the eye;
    /// 2. when every vertex lies strictly within 90 degrees of the view
    ///    axis, the vertex rays projected onto the sector's limit plane must
    ///    produce a bounding box overlapping the sector's own
    ///    (epsilon-inflated) bounding box.
    ///
    /// Stage 2 is only conservative when all three vertices project: a
    /// vertex at or behind 90 degrees from the view axis has no finite
    /// projection, so the triangle may cross the sector anywhere and is
    /// accepted outright.
    fn test_visibility(&self, triangle: &Triangle) -> bool {
        let to_center = triangle.centroid() - self.eye_position;
        if to_center.dot(&self.eye_direction) <= 0.0 {
            return false;
        }
        if to_center.dot(&triangle.normal()) >= 0.0 {
            return false;
        }

        let mut projections = Vec::with_capacity(3);
        for vertex in triangle.vertices() {
            let ray = vertex - self.eye_position;
            if ray.dot(&self.eye_direction) <= 0.0 {
                return true;
            }
            match self.limit_plane.intersect_ray(&self.eye_position, &ray) {
                Some(hit) => projections.push(hit),
                None => return true,
            }
        }
        let Some(projection_box) = Aabb::from_points(projections.iter()) else {
            return true;
        };

        let margin = BBOX_INFLATION * self.bounding_box.diagonal();
        self.bounding_box.inflated(margin).intersects(&projection_box)
    }

    /// Rasterize `triangle` into the pixel grid with z-buffering, tagging
    /// covered pixels with `color`. Returns the number of pixels written.
    ///
    /// Pixels already colored by a candidate strictly closer than the
    /// triangle's closest point to the eye are skipped without an
    /// intersection test; the bound holds for every ray, so the skip cannot
    /// depend on the order in which triangles are traced.
    /// Row scanning stops at the first miss after a hit within the row, and
    /// the sector scan stops at the first hit-free row after a row with
    /// hits; both early exits assume the projected footprint is row-convex.
    pub fn ray_trace_triangle(&mut self, triangle: &Triangle, color: u32) -> usize {
        if !self.test_visibility(triangle) {
            return 0;
        }

        let nearest = triangle.closest_point_distance(&self.eye_position);
        let mut written = 0;
        let mut previous_rows_hit = false;

        for row in 0..self.resolution {
            let mut row_hit = false;
            for col in 0..self.resolution {
                let index = row * self.resolution + col;
                let pixel = &mut self.pixels[index];

                if !pixel.is_empty() && pixel.depth() < nearest {
                    continue;
                }

                let ray = pixel.position() - self.eye_position;
                match triangle.intersect_ray(&self.eye_position, &ray) {
                    Some(t) => {
                        row_hit = true;
                        let distance = t * ray.norm();
                        if pixel.is_empty() || distance < pixel.depth() {
                            pixel.set_color(color);
                            pixel.set_depth(distance);
                            written += 1;
                        }
                    }
                    None => {
                        if row_hit {
                            break;
                        }
                    }
                }
            }
            if row_hit {
                previous_rows_hit = true;
            } else if previous_rows_hit {
                break;
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rotation_onto_x;

    fn front_sector(resolution: usize) -> HemiCubeSector {
        let rotation = rotation_onto_x(&Vector3::x());
        HemiCubeSector::new(
            SectorKind::FrontNorthEast,
            Point3::origin(),
            &rotation,
            100.0,
            resolution,
            0,
            0,
            1,
        )
    }

    #[test]
    fn pixel_grid_lies_on_front_face() {
        let sector = front_sector(8);
        assert_eq!(sector.pixels().len(), 64);
        for pixel in sector.pixels() {
            assert!((pixel.position().x - 100.0).abs() < 1e-9);
            assert!(pixel.position().y >= 0.0 && pixel.position().y <= 100.0);
            assert!(pixel.position().z >= 0.0 && pixel.position().z <= 100.0);
            assert!(pixel.weight() > 0.0);
        }
    }

    #[test]
    fn facing_triangle_is_rasterized() {
        let mut sector = front_sector(16);
        // Large wall in front of the eye, normal towards the eye.
        let triangle = Triangle::new(
            Point3::new(5.0, -10.0, -10.0),
            Point3::new(5.0, -10.0, 30.0),
            Point3::new(5.0, 30.0, 10.0),
        );
        assert!(triangle.normal().x < 0.0);
        let written = sector.ray_trace_triangle(&triangle, 3);
        assert!(written > 0);
        assert!(sector.pixels().iter().any(|p| p.color() == 3));
    }

    #[test]
    fn back_facing_triangle_is_rejected() {
        let mut sector = front_sector(16);
        // Same wall with reversed winding: facing away from the eye.
        let triangle = Triangle::new(
            Point3::new(5.0, -10.0, -10.0),
            Point3::new(5.0, 30.0, 10.0),
            Point3::new(5.0, -10.0, 30.0),
        );
        assert_eq!(sector.ray_trace_triangle(&triangle, 3), 0);
    }

    #[test]
    fn triangle_behind_eye_is_rejected() {
        let mut sector = front_sector(16);
        let triangle = Triangle::new(
            Point3::new(-5.0, -10.0, -10.0),
            Point3::new(-5.0, -10.0, 30.0),
            Point3::new(-5.0, 30.0, 10.0),
        );
        assert_eq!(sector.ray_trace_triangle(&triangle, 3), 0);
    }

    #[test]
    fn closer_triangle_wins_depth_test() {
        let mut sector = front_sector(16);
        let far = Triangle::new(
            Point3::new(50.0, -100.0, -100.0),
            Point3::new(50.0, -100.0, 300.0),
            Point3::new(50.0, 300.0, 100.0),
        );
        let near = Triangle::new(
            Point3::new(5.0, -100.0, -100.0),
            Point3::new(5.0, -100.0, 300.0),
            Point3::new(5.0, 300.0, 100.0),
        );
        sector.ray_trace_triangle(&far, 1);
        sector.ray_trace_triangle(&near, 2);
        // Every pixel covered by both must show the near triangle.
        assert!(sector.pixels().iter().filter(|p| !p.is_empty()).all(|p| p.color() == 2));
    }

    #[test]
    fn depth_test_is_independent_of_trace_order() {
        // The near wall's vertices are much farther from the eye than the
        // far wall's pixels, so a skip keyed on vertex distance would keep
        // the far wall whenever it is traced first. The interior of the
        // near wall is still closest and must win either way.
        let far = Triangle::new(
            Point3::new(50.0, -100.0, -100.0),
            Point3::new(50.0, -100.0, 300.0),
            Point3::new(50.0, 300.0, 100.0),
        );
        let near = Triangle::new(
            Point3::new(5.0, -2000.0, -2000.0),
            Point3::new(5.0, -2000.0, 6000.0),
            Point3::new(5.0, 6000.0, 2000.0),
        );

        let mut far_first = front_sector(16);
        far_first.ray_trace_triangle(&far, 1);
        far_first.ray_trace_triangle(&near, 2);

        let mut near_first = front_sector(16);
        near_first.ray_trace_triangle(&near, 2);
        near_first.ray_trace_triangle(&far, 1);

        for (a, b) in far_first.pixels().iter().zip(near_first.pixels()) {
            assert_eq!(a.color(), b.color());
            assert_eq!(a.color(), 2);
        }
    }
}
