use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;

use crate::LinearOperator;

/// Jacobi (diagonal) preconditioner `P = diag(A)^-1`.
///
/// Missing or zero diagonal entries are replaced by 1 so that the
/// preconditioner stays well defined for rows that were condensed out.
pub struct JacobiPreconditioner {
    inv_diag: DVector<f64>,
}

impl JacobiPreconditioner {
    pub fn from_csr(matrix: &CsrMatrix<f64>) -> Self {
        assert_eq!(matrix.nrows(), matrix.ncols());
        let mut inv_diag = DVector::from_element(matrix.nrows(), 1.0);
        for (i, j, v) in matrix.triplet_iter() {
            if i == j && *v != 0.0 {
                inv_diag[i] = 1.0 / v;
            }
        }
        Self { inv_diag }
    }
}

impl LinearOperator for JacobiPreconditioner {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) {
        y.copy_from(&x);
        y.component_mul_assign(&self.inv_diag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    #[test]
    fn inverts_diagonal() {
        let mut coo = CooMatrix::new(3, 3);
        coo.push(0, 0, 2.0);
        coo.push(1, 1, 4.0);
        coo.push(0, 1, 7.0);
        // Row 2 has no diagonal entry.
        let precond = JacobiPreconditioner::from_csr(&CsrMatrix::from(&coo));

        let x = DVector::from_vec(vec![2.0, 4.0, 5.0]);
        let mut y = DVector::zeros(3);
        precond.apply((&mut y).into(), (&x).into());
        assert_eq!(y, DVector::from_vec(vec![1.0, 1.0, 5.0]));
    }
}
