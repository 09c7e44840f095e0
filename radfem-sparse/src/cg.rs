use log::debug;
use nalgebra::DVector;

use crate::{LinearOperator, SolveError, SolveErrorKind, SolveStats, SolverConfig};

/// Preconditioned Conjugate Gradient.
///
/// `x` holds the initial guess on entry and the solution on exit. Requires
/// both the operator and the preconditioner to be symmetric positive
/// definite; indefiniteness detected during the recurrence is reported as an
/// error rather than silently producing garbage.
#[allow(non_snake_case)]
pub fn conjugate_gradient(
    a: impl LinearOperator,
    precond: impl LinearOperator,
    b: &DVector<f64>,
    x: &mut DVector<f64>,
    config: &SolverConfig,
) -> Result<SolveStats, SolveError> {
    assert_eq!(b.len(), x.len());
    let n = x.len();

    let b_norm = b.norm();
    if b_norm == 0.0 {
        x.fill(0.0);
        return Ok(SolveStats {
            iterations: 0,
            rel_residual: 0.0,
        });
    }

    let mut r = DVector::zeros(n);
    let mut z = DVector::zeros(n);
    let mut p = DVector::zeros(n);
    let mut Ap = DVector::zeros(n);

    // r = b - A x
    a.apply((&mut r).into(), (&*x).into());
    r.axpy(1.0, b, -1.0);

    // z = P r, p = z
    precond.apply((&mut z).into(), (&r).into());
    p.copy_from(&z);

    let mut zTr = z.dot(&r);
    let mut iterations = 0;

    loop {
        let rel_residual = r.norm() / b_norm;
        if rel_residual <= config.tol {
            return Ok(SolveStats {
                iterations,
                rel_residual,
            });
        }
        if iterations >= config.max_outer {
            return Err(SolveError {
                iterations,
                kind: SolveErrorKind::MaxIterationsReached {
                    max_iter: config.max_outer,
                },
            });
        }
        if config.output_frequency > 0 && iterations % config.output_frequency == 0 {
            debug!("cg iteration {}: rel residual {:.3e}", iterations, rel_residual);
        }

        a.apply((&mut Ap).into(), (&p).into());
        let pAp = p.dot(&Ap);
        if pAp <= 0.0 {
            return Err(SolveError {
                iterations,
                kind: SolveErrorKind::IndefiniteOperator,
            });
        }
        if zTr <= 0.0 {
            return Err(SolveError {
                iterations,
                kind: SolveErrorKind::IndefinitePreconditioner,
            });
        }

        let alpha = zTr / pAp;
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &Ap, 1.0);
        iterations += 1;

        precond.apply((&mut z).into(), (&r).into());
        let zTr_next = z.dot(&r);
        let beta = zTr_next / zTr;

        // p <- z + beta p
        p.axpy(1.0, &z, beta);

        zTr = zTr_next;
    }
}
