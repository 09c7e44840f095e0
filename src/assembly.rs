//! Parallel assembly of global linear systems from element contributions.
//!
//! Each physics solver provides an [`ElementAssembler`] producing dense
//! element matrices and load vectors. The global loop runs element
//! computations in parallel and serializes only the scatter into the
//! shared triplet matrix. Prescribed degrees of freedom are condensed out
//! during the scatter, so the assembled system contains enabled rows and
//! columns only.

use std::sync::atomic::{AtomicBool, Ordering};

use log::error;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::error::SolverError;
use crate::node_book::{NodeBook, NodeState};

/// Dense contribution of a single element: the stiffness (or system)
/// matrix and load vector over the element's nodes, `solution_dim` degrees
/// of freedom per node, node-major ordering.
#[derive(Debug, Clone)]
pub struct ElementSystem {
    pub nodes: Vec<usize>,
    pub matrix: DMatrix<f64>,
    pub rhs: DVector<f64>,
}

/// Produces element matrices and load vectors for one physics.
///
/// Implementations must be `Sync`; `assemble_element` is called from a
/// parallel loop. Returning `Ok(None)` skips an element that does not
/// contribute to this physics (wrong dimensionality, no material, outside
/// the computed domain).
pub trait ElementAssembler: Sync {
    fn num_elements(&self) -> usize;

    /// Degrees of freedom per node (1 for scalar fields, 3 for vector
    /// fields).
    fn solution_dim(&self) -> usize;

    fn assemble_element(&self, element_id: usize) -> Result<Option<ElementSystem>, SolverError>;
}

/// An assembled global system over the enabled degrees of freedom.
#[derive(Debug)]
pub struct GlobalSystem {
    pub matrix: CsrMatrix<f64>,
    pub rhs: DVector<f64>,
}

/// Assemble the global system in parallel.
///
/// `prescribed` holds one value per node degree of freedom of the full
/// mesh; only the entries of disabled nodes are read, and their columns are
/// folded into the right-hand side. Element failures do not stop the loop:
/// each is logged, and after the loop drains they are aggregated into a
/// single [`SolverError::ElementFailures`]. The abort flag is checked at
/// element granularity.
pub fn assemble_system<A: ElementAssembler>(
    assembler: &A,
    book: &NodeBook,
    prescribed: &DVector<f64>,
    abort: &AtomicBool,
) -> Result<GlobalSystem, SolverError> {
    let dim = assembler.solution_dim();
    assert_eq!(prescribed.len(), book.n_nodes() * dim);
    let n = book.n_enabled() * dim;

    let system = Mutex::new((CooMatrix::new(n, n), DVector::<f64>::zeros(n)));
    let failures: Mutex<Vec<SolverError>> = Mutex::new(Vec::new());

    (0..assembler.num_elements()).into_par_iter().for_each(|element_id| {
        if abort.load(Ordering::Relaxed) {
            return;
        }
        let local = match assembler.assemble_element(element_id) {
            Ok(Some(local)) => local,
            Ok(None) => return,
            Err(err) => {
                error!("element {element_id} failed during assembly: {err}");
                failures.lock().push(err);
                return;
            }
        };

        let n_local = local.nodes.len() * dim;
        debug_assert_eq!(local.matrix.nrows(), n_local);
        debug_assert_eq!(local.matrix.ncols(), n_local);
        debug_assert_eq!(local.rhs.len(), n_local);

        // Build the scatter outside the lock.
        let mut entries: Vec<(usize, usize, f64)> = Vec::new();
        let mut loads: Vec<(usize, f64)> = Vec::new();
        for (i_local, &node_i) in local.nodes.iter().enumerate() {
            let Some(pos_i) = book.enabled_position(node_i) else {
                continue;
            };
            for a in 0..dim {
                let row_local = i_local * dim + a;
                let row = pos_i * dim + a;
                let mut load = local.rhs[row_local];
                for (j_local, &node_j) in local.nodes.iter().enumerate() {
                    match book.state(node_j) {
                        NodeState::Enabled(pos_j) => {
                            for b in 0..dim {
                                let value = local.matrix[(row_local, j_local * dim + b)];
                                if value != 0.0 {
                                    entries.push((row, pos_j * dim + b, value));
                                }
                            }
                        }
                        NodeState::Disabled => {
                            // Static condensation of the prescribed value.
                            for b in 0..dim {
                                load -= local.matrix[(row_local, j_local * dim + b)]
                                    * prescribed[node_j * dim + b];
                            }
                        }
                        NodeState::Excluded => {}
                    }
                }
                if load != 0.0 {
                    loads.push((row, load));
                }
            }
        }

        let mut guard = system.lock();
        let (coo, rhs) = &mut *guard;
        for (row, col, value) in entries {
            coo.push(row, col, value);
        }
        for (row, load) in loads {
            rhs[row] += load;
        }
    });

    if abort.load(Ordering::Relaxed) {
        return Err(SolverError::Aborted);
    }
    let failures = failures.into_inner();
    let count = failures.len();
    if let Some(first) = failures.into_iter().next() {
        return Err(SolverError::ElementFailures {
            count,
            first: Box::new(first),
        });
    }

    let (coo, rhs) = system.into_inner();
    Ok(GlobalSystem {
        matrix: CsrMatrix::from(&coo),
        rhs,
    })
}
