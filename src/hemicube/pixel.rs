//! A single rasterized hemicube sample.

use nalgebra::Point3;

/// Sentinel color meaning "no patch seen through this pixel".
pub const EMPTY_COLOR: u32 = u32::MAX;

/// One rasterized sample of a hemicube face.
///
/// Position and weight are fixed at construction; color and depth are the
/// mutable z-buffer state updated while candidate triangles are traced.
/// The pixel lives for exactly one view-factor computation of one eye patch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HemiCubePixel {
    position: Point3<f64>,
    color: u32,
    depth: f64,
    weight: f64,
}

impl HemiCubePixel {
    pub fn new(position: Point3<f64>, weight: f64) -> Self {
        debug_assert!(weight >= 0.0);
        Self {
            position,
            color: EMPTY_COLOR,
            depth: f64::INFINITY,
            weight,
        }
    }

    /// World-space position of the sample on the hemicube face.
    pub fn position(&self) -> &Point3<f64> {
        &self.position
    }

    pub fn color(&self) -> u32 {
        self.color
    }

    pub fn is_empty(&self) -> bool {
        self.color == EMPTY_COLOR
    }

    /// Distance from the eye to the nearest intersection seen so far.
    pub fn depth(&self) -> f64 {
        self.depth
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_color(&mut self, color: u32) {
        self.color = color;
    }

    pub fn set_depth(&mut self, depth: f64) {
        self.depth = depth;
    }

    pub(crate) fn scale_weight(&mut self, factor: f64) {
        self.weight *= factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_at_infinite_depth() {
        let pixel = HemiCubePixel::new(Point3::new(1.0, 0.0, 0.0), 0.25);
        assert!(pixel.is_empty());
        assert_eq!(pixel.depth(), f64::INFINITY);
        assert_eq!(pixel.weight(), 0.25);
    }
}
