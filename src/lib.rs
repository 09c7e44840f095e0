//! Finite element solvers for coupled thermal, radiative, structural and
//! particle-transport analysis on tetrahedral meshes.
//!
//! The crate is organized around a [`model::Model`] describing the mesh,
//! element groups, materials and boundary conditions, and a set of physics
//! solvers implementing [`solver::PhysicsSolver`]. Solvers exchange fields
//! through [`shared_data::SharedData`] and are orchestrated by
//! [`solver::SolverDriver`], which also manages geometry scaling,
//! convergence logging and run statistics.
//!
//! Radiative exchange is resolved with a hemicube rasterizer
//! ([`hemicube`]) that produces per-patch view factors
//! ([`view_factor`]), cached to disk between runs.

pub mod assembly;
pub mod condition;
pub mod convection;
pub mod convergence;
pub mod error;
pub mod geometry;
pub mod hemicube;
pub mod material;
pub mod mesh;
pub mod model;
pub mod node_book;
pub mod patch;
pub mod rotation;
pub mod scales;
pub mod shared_data;
pub mod solver;
pub mod variable;
pub mod view_factor;

/// Relative tolerance used by the solvers' convergence criteria.
pub const EPS: f64 = 1e-5;

/// Stefan-Boltzmann constant in W m^-2 K^-4.
pub const SIGMA: f64 = 5.670374419e-8;
