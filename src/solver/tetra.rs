//! Closed-form shape-function data for linear tetrahedra.
//!
//! Linear tetrahedra have constant shape-function gradients, so element
//! matrices reduce to single closed-form evaluations instead of a
//! quadrature loop.

use nalgebra::{Matrix3, Matrix3x4, Point3};

/// Constant shape-function gradients and volume of a linear tetrahedron.
///
/// Column `i` of `gradients` is the gradient of shape function `N_i`.
/// Returns `None` for degenerate or inverted elements.
pub fn shape_gradients(p: &[Point3<f64>]) -> Option<(Matrix3x4<f64>, f64)> {
    assert_eq!(p.len(), 4);
    let jacobian = Matrix3::from_columns(&[p[1] - p[0], p[2] - p[0], p[3] - p[0]]);
    let volume = jacobian.determinant() / 6.0;
    if volume <= 0.0 {
        return None;
    }
    // Gradients of N1..N3 in the columns of J^{-T}; N0 closes the
    // partition of unity.
    let inv_t = jacobian.try_inverse()?.transpose();
    let mut gradients = Matrix3x4::zeros();
    for i in 0..3 {
        gradients.set_column(i + 1, &inv_t.column(i).into_owned());
    }
    let g0 = -(gradients.column(1) + gradients.column(2) + gradients.column(3));
    gradients.set_column(0, &g0);
    Some((gradients, volume))
}

/// Characteristic element length used by stabilization terms.
pub fn characteristic_length(volume: f64) -> f64 {
    volume.cbrt()
}
