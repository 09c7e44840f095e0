//! Error taxonomy for solver runs.
//!
//! Configuration errors (missing condition components or material
//! properties) are fatal to the current physics run and carry enough
//! context to name the offending field. Element-level failures inside
//! parallel loops are logged individually and aggregated into a single
//! error after the loop drains. Linear-solver failures are wrapped and
//! propagated. I/O problems on artifact files are *not* represented here;
//! they are downgraded to log warnings at the call site.

use core::fmt;

use crate::condition::{ComponentKind, ConditionType};
use crate::material::Property;

#[derive(Debug)]
#[non_exhaustive]
pub enum SolverError {
    /// A boundary/initial/environment condition lacks a required component.
    MissingComponent {
        condition: ConditionType,
        component: ComponentKind,
    },
    /// A material lacks a property required by the physics.
    MissingProperty { material: String, property: Property },
    /// A single element failed during local matrix/vector computation.
    ElementFailure { element: usize, message: String },
    /// Aggregate of element failures collected from a parallel loop.
    ElementFailures { count: usize, first: Box<SolverError> },
    /// The iterative linear solver failed.
    LinearSolver(radfem_sparse::SolveError),
    /// The mesh or model violates a structural invariant.
    InvalidModel { message: String },
    /// The run was cancelled through the abort flag.
    Aborted,
}

impl fmt::Display for SolverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingComponent { condition, component } => {
                write!(f, "condition {:?} is missing required component {:?}", condition, component)
            }
            Self::MissingProperty { material, property } => {
                write!(f, "material '{}' is missing required property {:?}", material, property)
            }
            Self::ElementFailure { element, message } => {
                write!(f, "element {} failed: {}", element, message)
            }
            Self::ElementFailures { count, first } => {
                write!(f, "{} element(s) failed, first failure: {}", count, first)
            }
            Self::LinearSolver(err) => write!(f, "linear solver failed: {}", err),
            Self::InvalidModel { message } => write!(f, "invalid model: {}", message),
            Self::Aborted => write!(f, "solver run aborted"),
        }
    }
}

impl std::error::Error for SolverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::LinearSolver(err) => Some(err),
            Self::ElementFailures { first, .. } => Some(first),
            _ => None,
        }
    }
}

impl From<radfem_sparse::SolveError> for SolverError {
    fn from(err: radfem_sparse::SolveError) -> Self {
        Self::LinearSolver(err)
    }
}
