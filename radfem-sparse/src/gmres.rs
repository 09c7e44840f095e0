use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::{LinearOperator, SolveError, SolveErrorKind, SolveStats, SolverConfig};

/// Restarted GMRES with left preconditioning.
///
/// The Krylov dimension per restart cycle is `config.max_inner` and the
/// number of restart cycles is capped by `config.max_outer`. Unlike CG this
/// places no symmetry requirement on the operator, which is what the
/// advection-dominated transport systems need.
pub fn gmres(
    a: impl LinearOperator,
    precond: impl LinearOperator,
    b: &DVector<f64>,
    x: &mut DVector<f64>,
    config: &SolverConfig,
) -> Result<SolveStats, SolveError> {
    assert_eq!(b.len(), x.len());
    let n = x.len();
    let m = config.max_inner.max(1).min(n);

    let b_norm = b.norm();
    if b_norm == 0.0 {
        x.fill(0.0);
        return Ok(SolveStats {
            iterations: 0,
            rel_residual: 0.0,
        });
    }

    // ||P b|| for the preconditioned relative residual.
    let mut pb = DVector::zeros(n);
    precond.apply((&mut pb).into(), b.into());
    let pb_norm = pb.norm();
    if pb_norm == 0.0 {
        return Err(SolveError {
            iterations: 0,
            kind: SolveErrorKind::Breakdown,
        });
    }

    let mut scratch = DVector::zeros(n);
    let mut residual = DVector::zeros(n);
    let mut iterations = 0;

    for _restart in 0..config.max_outer {
        // residual = P (b - A x)
        a.apply((&mut scratch).into(), (&*x).into());
        scratch.axpy(1.0, b, -1.0);
        precond.apply((&mut residual).into(), (&scratch).into());

        let beta = residual.norm();
        let rel_residual = beta / pb_norm;
        if rel_residual <= config.tol {
            return Ok(SolveStats {
                iterations,
                rel_residual,
            });
        }
        if config.output_frequency > 0 && iterations % config.output_frequency == 0 {
            debug!("gmres iteration {}: rel residual {:.3e}", iterations, rel_residual);
        }

        // Arnoldi with modified Gram-Schmidt; the Hessenberg system is solved
        // incrementally with Givens rotations.
        let mut basis: Vec<DVector<f64>> = Vec::with_capacity(m + 1);
        basis.push(&residual / beta);
        let mut h = DMatrix::zeros(m + 1, m);
        let mut g = DVector::zeros(m + 1);
        g[0] = beta;
        let mut cs = vec![0.0_f64; m];
        let mut sn = vec![0.0_f64; m];

        let mut k_used = 0;
        for k in 0..m {
            // w = P A v_k
            a.apply((&mut scratch).into(), (&basis[k]).into());
            let mut w = DVector::zeros(n);
            precond.apply((&mut w).into(), (&scratch).into());

            for (i, v) in basis.iter().enumerate() {
                h[(i, k)] = w.dot(v);
                w.axpy(-h[(i, k)], v, 1.0);
            }
            let w_norm = w.norm();
            h[(k + 1, k)] = w_norm;

            // Apply prior Givens rotations to the new column, then the new one.
            for i in 0..k {
                let tmp = cs[i] * h[(i, k)] + sn[i] * h[(i + 1, k)];
                h[(i + 1, k)] = -sn[i] * h[(i, k)] + cs[i] * h[(i + 1, k)];
                h[(i, k)] = tmp;
            }
            let denom = (h[(k, k)] * h[(k, k)] + h[(k + 1, k)] * h[(k + 1, k)]).sqrt();
            if denom == 0.0 {
                return Err(SolveError {
                    iterations,
                    kind: SolveErrorKind::Breakdown,
                });
            }
            cs[k] = h[(k, k)] / denom;
            sn[k] = h[(k + 1, k)] / denom;
            h[(k, k)] = denom;
            h[(k + 1, k)] = 0.0;
            g[k + 1] = -sn[k] * g[k];
            g[k] *= cs[k];

            iterations += 1;
            k_used = k + 1;

            let converged = g[k + 1].abs() / pb_norm <= config.tol;
            // w_norm == 0 is the lucky breakdown: the Krylov space is invariant
            // and the least-squares solution below is exact.
            if converged || w_norm == 0.0 || k + 1 == m {
                break;
            }
            basis.push(&w / w_norm);
        }

        // Back substitution for y in H y = g.
        let mut y = DVector::zeros(k_used);
        for i in (0..k_used).rev() {
            let mut sum = g[i];
            for j in (i + 1)..k_used {
                sum -= h[(i, j)] * y[j];
            }
            y[i] = sum / h[(i, i)];
        }
        for (j, v) in basis.iter().take(k_used).enumerate() {
            x.axpy(y[j], v, 1.0);
        }
    }

    // Final residual check after exhausting restarts.
    a.apply((&mut scratch).into(), (&*x).into());
    scratch.axpy(1.0, b, -1.0);
    precond.apply((&mut residual).into(), (&scratch).into());
    let rel_residual = residual.norm() / pb_norm;
    if rel_residual <= config.tol {
        Ok(SolveStats {
            iterations,
            rel_residual,
        })
    } else {
        Err(SolveError {
            iterations,
            kind: SolveErrorKind::MaxIterationsReached {
                max_iter: config.max_outer,
            },
        })
    }
}
