//! Hemicube rasterizer for radiative view factors.
//!
//! A hemicube is placed at an emitting patch's centroid, oriented along its
//! average normal, and candidate receiver triangles are rasterized onto its
//! faces with z-buffering. The per-pixel solid-angle weights then turn pixel
//! coverage counts into view factors.

mod pixel;
mod sector;

pub use pixel::{HemiCubePixel, EMPTY_COLOR};
pub use sector::{HemiCubeSector, SectorKind};

use nalgebra::{Point3, Vector3};
use rustc_hash::FxHashMap;

use crate::geometry::{rotation_onto_x, Triangle};

/// Half-extent of the hemicube. View factors are ratios of normalized
/// weights, so the absolute size only sets the numeric scale of the
/// intermediate geometry.
pub const HEMICUBE_SIZE: f64 = 100.0;

/// Each face sector is subdivided into this many tiles per direction, so
/// that the visibility pre-tests and early exits operate on smaller pixel
/// blocks.
const FACE_SUBDIVISION: usize = 5;

/// The full pixel grid of one hemicube placement.
pub struct HemiCube {
    sectors: Vec<HemiCubeSector>,
}

impl HemiCube {
    /// Build a hemicube at `eye_position` looking along `direction`, with
    /// roughly `resolution` pixels per face edge. The pixel weights are
    /// normalized so they sum to one over the whole hemicube.
    pub fn new(eye_position: Point3<f64>, direction: &Vector3<f64>, resolution: usize) -> Self {
        let n_sub = FACE_SUBDIVISION;
        let tile_resolution = ((resolution + n_sub - 1) / n_sub).max(1);
        let rotation = rotation_onto_x(direction);

        let mut sectors = Vec::with_capacity(SectorKind::ALL.len() * n_sub * n_sub);
        for kind in SectorKind::ALL {
            for sub_j in 0..n_sub {
                for sub_i in 0..n_sub {
                    sectors.push(HemiCubeSector::new(
                        kind,
                        eye_position,
                        &rotation,
                        HEMICUBE_SIZE,
                        tile_resolution,
                        sub_i,
                        sub_j,
                        n_sub,
                    ));
                }
            }
        }

        let total: f64 = sectors
            .iter()
            .flat_map(|s| s.pixels())
            .map(|p| p.weight())
            .sum();
        let inv_total = 1.0 / total;
        for sector in &mut sectors {
            for pixel in sector.pixels_mut() {
                pixel.scale_weight(inv_total);
            }
        }

        Self { sectors }
    }

    pub fn sectors(&self) -> &[HemiCubeSector] {
        &self.sectors
    }

    /// Rasterize `triangle` into every sector, tagging covered pixels with
    /// `color`. Returns the total number of pixels written.
    pub fn ray_trace_triangle(&mut self, triangle: &Triangle, color: u32) -> usize {
        self.sectors
            .iter_mut()
            .map(|sector| sector.ray_trace_triangle(triangle, color))
            .sum()
    }

    /// Accumulate the normalized weights of covered pixels per color. The
    /// resulting values are the view factors from the hemicube's patch to
    /// each rasterized patch.
    pub fn view_factors(&self) -> FxHashMap<u32, f64> {
        let mut factors = FxHashMap::default();
        for pixel in self.sectors.iter().flat_map(|s| s.pixels()) {
            if !pixel.is_empty() {
                *factors.entry(pixel.color()).or_insert(0.0) += pixel.weight();
            }
        }
        factors
    }

    /// Fraction of pixels covered by any triangle. Useful as a diagnostic:
    /// in a closed enclosure the ratio approaches one.
    pub fn fill_ratio(&self) -> f64 {
        let mut covered = 0usize;
        let mut total = 0usize;
        for pixel in self.sectors.iter().flat_map(|s| s.pixels()) {
            total += 1;
            if !pixel.is_empty() {
                covered += 1;
            }
        }
        covered as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrixcompare::assert_scalar_eq;

    #[test]
    fn weights_are_normalized() {
        let cube = HemiCube::new(Point3::origin(), &Vector3::x(), 20);
        let total: f64 = cube
            .sectors()
            .iter()
            .flat_map(|s| s.pixels())
            .map(|p| p.weight())
            .sum();
        assert_scalar_eq!(total, 1.0, comp = abs, tol = 1e-12);
    }

    #[test]
    fn sector_count_and_resolution() {
        let cube = HemiCube::new(Point3::origin(), &Vector3::z(), 20);
        assert_eq!(cube.sectors().len(), 12 * 25);
        // ceil(20 / 5) = 4 pixels per tile edge.
        assert!(cube.sectors().iter().all(|s| s.pixels().len() == 16));
    }

    #[test]
    fn enclosing_box_fills_the_hemicube() {
        // Eye near the back wall of a large box, looking along +x. Every
        // forward pixel ray must hit one of the five walls ahead of it.
        let eye = Point3::new(-900.0, 0.0, 0.0);
        let mut cube = HemiCube::new(eye, &Vector3::x(), 10);
        let s = 1000.0;

        // Quad corners per wall; winding is fixed up to face the eye.
        let p = Point3::new;
        let walls = [
            [p(s, -s, -s), p(s, -s, s), p(s, s, s), p(s, s, -s)],
            [p(-s, s, -s), p(-s, s, s), p(s, s, s), p(s, s, -s)],
            [p(-s, -s, -s), p(-s, -s, s), p(s, -s, s), p(s, -s, -s)],
            [p(-s, -s, s), p(-s, s, s), p(s, s, s), p(s, -s, s)],
            [p(-s, -s, -s), p(-s, s, -s), p(s, s, -s), p(s, -s, -s)],
        ];
        for (color, [a, b, c, d]) in walls.iter().enumerate() {
            for tri in [Triangle::new(*a, *b, *c), Triangle::new(*a, *c, *d)] {
                let tri = if tri.normal().dot(&(tri.centroid() - eye)) < 0.0 {
                    tri
                } else {
                    let [v0, v1, v2] = *tri.vertices();
                    Triangle::new(v0, v2, v1)
                };
                cube.ray_trace_triangle(&tri, color as u32);
            }
        }
        assert!(cube.fill_ratio() > 0.9);
        let sum: f64 = cube.view_factors().values().sum();
        assert!(sum > 0.9 && sum <= 1.0 + 1e-9);
    }
}
