//! Iterative solvers for the sparse linear systems assembled by `radfem`.
//!
//! The systems produced by finite element assembly are large, sparse and
//! (for the heat and stress problems) symmetric positive definite, so the
//! workhorse here is a preconditioned Conjugate Gradient method. Advection
//! dominated transport produces nonsymmetric matrices, for which a restarted
//! GMRES implementation is provided. Both solvers operate on
//! [`nalgebra_sparse::CsrMatrix`] through the [`LinearOperator`] abstraction
//! so that they can also be tested against dense operators.

use core::fmt;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;

mod cg;
mod gmres;
mod precond;

pub use cg::conjugate_gradient;
pub use gmres::gmres;
pub use precond::JacobiPreconditioner;

/// An operator `A` that can compute `y = A x` for dense vectors.
pub trait LinearOperator {
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>);
}

impl<'a, A> LinearOperator for &'a A
where
    A: ?Sized + LinearOperator,
{
    fn apply(&self, y: DVectorViewMut<f64>, x: DVectorView<f64>) {
        <A as LinearOperator>::apply(self, y, x)
    }
}

impl LinearOperator for CsrMatrix<f64> {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) {
        spmm_csr_dense(0.0, &mut y, 1.0, Op::NoOp(self), Op::NoOp(&x));
    }
}

/// The do-nothing preconditioner.
pub struct IdentityOperator;

impl LinearOperator for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) {
        y.copy_from(&x);
    }
}

/// Iterative method selection, configured by name from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverMethod {
    ConjugateGradient,
    Gmres,
}

impl SolverMethod {
    /// Parse a configured method name. Recognizes `"CG"` and `"GMRES"`
    /// (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "CG" => Some(Self::ConjugateGradient),
            "GMRES" => Some(Self::Gmres),
            _ => None,
        }
    }
}

/// Convergence configuration for an iterative solve.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub method: SolverMethod,
    /// Cap on outer iterations (restarts for GMRES, updates for CG).
    pub max_outer: usize,
    /// Krylov subspace dimension per restart cycle (GMRES only).
    pub max_inner: usize,
    /// Relative residual tolerance `||r|| <= tol * ||b||`.
    ///
    /// Note that both solvers test the *recurrence* residual. For
    /// ill-conditioned problems the recurrence residual may converge while
    /// the true residual stagnates; in those cases a better preconditioner
    /// is required anyway.
    pub tol: f64,
    /// Log the residual every this many iterations (0 disables).
    pub output_frequency: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            method: SolverMethod::ConjugateGradient,
            max_outer: 10_000,
            max_inner: 30,
            tol: 1e-10,
            output_frequency: 0,
        }
    }
}

/// Outcome of a successful solve.
#[derive(Debug, Clone)]
pub struct SolveStats {
    /// Number of updates applied to the solution vector.
    pub iterations: usize,
    /// Final relative recurrence residual.
    pub rel_residual: f64,
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    /// `p^T A p <= 0` encountered; the operator is not positive definite.
    IndefiniteOperator,
    /// `z^T r <= 0` encountered; the preconditioner is not positive definite.
    IndefinitePreconditioner,
    /// The Krylov recurrence broke down (zero division guard).
    Breakdown,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndefiniteOperator => write!(f, "operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "preconditioner appears to be indefinite"),
            Self::Breakdown => write!(f, "Krylov recurrence breakdown"),
            Self::MaxIterationsReached { max_iter } => {
                write!(f, "max iterations ({}) reached", max_iter)
            }
        }
    }
}

/// Error returned by a failed iterative solve.
///
/// The partially converged solution is left in the caller's solution vector,
/// and the number of iterations taken so far is reported alongside the cause.
#[derive(Debug)]
pub struct SolveError {
    pub iterations: usize,
    pub kind: SolveErrorKind,
}

impl fmt::Display for SolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iterative solve failed after {} iterations: {}", self.iterations, self.kind)
    }
}

impl std::error::Error for SolveError {}

/// Solve `A x = b` with the configured method and a Jacobi preconditioner
/// built from the diagonal of `A`. `x` doubles as the initial guess.
pub fn solve_csr(
    a: &CsrMatrix<f64>,
    b: &DVector<f64>,
    x: &mut DVector<f64>,
    config: &SolverConfig,
) -> Result<SolveStats, SolveError> {
    let precond = JacobiPreconditioner::from_csr(a);
    match config.method {
        SolverMethod::ConjugateGradient => conjugate_gradient(a, &precond, b, x, config),
        SolverMethod::Gmres => gmres(a, &precond, b, x, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn laplacian_1d(n: usize) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            coo.push(i, i, 2.0);
            if i > 0 {
                coo.push(i, i - 1, -1.0);
            }
            if i + 1 < n {
                coo.push(i, i + 1, -1.0);
            }
        }
        CsrMatrix::from(&coo)
    }

    #[test]
    fn method_names_parse() {
        assert_eq!(SolverMethod::from_name("cg"), Some(SolverMethod::ConjugateGradient));
        assert_eq!(SolverMethod::from_name("GMRES"), Some(SolverMethod::Gmres));
        assert_eq!(SolverMethod::from_name("direct"), None);
    }

    #[test]
    fn cg_solves_laplacian() {
        let a = laplacian_1d(20);
        let x_expected = DVector::from_fn(20, |i, _| (i as f64).sin() + 1.0);
        let mut b = DVector::zeros(20);
        a.apply((&mut b).into(), (&x_expected).into());

        let mut x = DVector::zeros(20);
        let config = SolverConfig::default();
        let stats = solve_csr(&a, &b, &mut x, &config).unwrap();
        assert!(stats.iterations <= 20);
        assert!((&x - &x_expected).norm() < 1e-8 * x_expected.norm());
    }

    #[test]
    fn gmres_solves_nonsymmetric() {
        // Advection-like upper-shifted system.
        let n = 15;
        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            coo.push(i, i, 3.0);
            if i + 1 < n {
                coo.push(i, i + 1, -2.0);
            }
            if i > 0 {
                coo.push(i, i - 1, -0.5);
            }
        }
        let a = CsrMatrix::from(&coo);
        let x_expected = DVector::from_fn(n, |i, _| 0.1 * i as f64 - 0.5);
        let mut b = DVector::zeros(n);
        a.apply((&mut b).into(), (&x_expected).into());

        let mut x = DVector::zeros(n);
        let config = SolverConfig {
            method: SolverMethod::Gmres,
            ..SolverConfig::default()
        };
        solve_csr(&a, &b, &mut x, &config).unwrap();
        assert!((&x - &x_expected).norm() < 1e-8 * x_expected.norm());
    }

    #[test]
    fn cg_rejects_indefinite_operator() {
        let mut coo = CooMatrix::new(2, 2);
        coo.push(0, 0, 1.0);
        coo.push(1, 1, -1.0);
        let a = CsrMatrix::from(&coo);
        let b = DVector::from_vec(vec![1.0, 1.0]);
        let mut x = DVector::zeros(2);
        let err = conjugate_gradient(&a, &IdentityOperator, &b, &mut x, &SolverConfig::default())
            .unwrap_err();
        assert!(matches!(err.kind, SolveErrorKind::IndefiniteOperator));
    }

    #[test]
    fn zero_rhs_yields_zero_solution() {
        let a = laplacian_1d(5);
        let b = DVector::zeros(5);
        let mut x = DVector::from_element(5, 3.0);
        let stats = solve_csr(&a, &b, &mut x, &SolverConfig::default()).unwrap();
        assert_eq!(stats.iterations, 0);
        assert!(x.iter().all(|&v| v == 0.0));
    }
}
