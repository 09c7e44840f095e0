//! Linear elastic stress analysis on tetrahedral meshes.
//!
//! Constant-strain tetrahedra with an isotropic material law; body forces
//! from the gravity environment condition, surface tractions from force
//! conditions. Nodes carrying a `LocalDirection` condition have their
//! three degrees of freedom expressed in the rotated frame, so skewed
//! supports can be prescribed componentwise.

use std::sync::atomic::AtomicBool;

use log::{debug, info};
use nalgebra::{DMatrix, DVector, Matrix3, Matrix6, Point3, Vector3, Vector6};

use crate::assembly::{assemble_system, ElementAssembler, ElementSystem, GlobalSystem};
use crate::condition::{ComponentKind, ConditionType};
use crate::error::SolverError;
use crate::material::{generate_material_vector, Property};
use crate::mesh::{ElementType, Mesh};
use crate::model::{GroupKind, Model};
use crate::node_book::NodeBook;
use crate::rotation::LocalRotation;
use crate::solver::{tetra, PhysicsKind, PhysicsSolver};
use crate::variable::{VariableKind, VariableValues};

pub struct StressSolver {
    computable: Vec<bool>,
    book: NodeBook,
    /// Prescribed displacement per node dof, in the node's own frame.
    prescribed: DVector<f64>,
    /// Working displacements per node dof, in the node's own frame.
    displacements: DVector<f64>,
    rotations: LocalRotation,
    system: Option<GlobalSystem>,
    von_mises: Vec<f64>,
    iterations: usize,
}

impl Default for StressSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl StressSolver {
    pub fn new() -> Self {
        Self {
            computable: Vec::new(),
            book: NodeBook::build(&[], &[]),
            prescribed: DVector::zeros(0),
            displacements: DVector::zeros(0),
            rotations: LocalRotation::identity(0),
            system: None,
            von_mises: Vec::new(),
            iterations: 0,
        }
    }

    /// Displacements per node in the global frame.
    pub fn global_displacements(&self) -> DVector<f64> {
        let mut global = self.displacements.clone();
        self.rotations.rotate_results_vector(&mut global, false);
        global
    }
}

/// Strain-displacement matrix of a linear tetrahedron (engineering shear
/// ordering xx, yy, zz, xy, yz, zx).
fn strain_displacement(gradients: &nalgebra::Matrix3x4<f64>) -> DMatrix<f64> {
    let mut b = DMatrix::zeros(6, 12);
    for i in 0..4 {
        let g = gradients.column(i);
        let c = 3 * i;
        b[(0, c)] = g.x;
        b[(1, c + 1)] = g.y;
        b[(2, c + 2)] = g.z;
        b[(3, c)] = g.y;
        b[(3, c + 1)] = g.x;
        b[(4, c + 1)] = g.z;
        b[(4, c + 2)] = g.y;
        b[(5, c)] = g.z;
        b[(5, c + 2)] = g.x;
    }
    b
}

/// Isotropic elasticity matrix from Young's modulus and Poisson's ratio.
fn elasticity(young: f64, poisson: f64) -> Matrix6<f64> {
    let lambda = young * poisson / ((1.0 + poisson) * (1.0 - 2.0 * poisson));
    let mu = young / (2.0 * (1.0 + poisson));
    let mut c = Matrix6::zeros();
    for i in 0..3 {
        for j in 0..3 {
            c[(i, j)] = if i == j { lambda + 2.0 * mu } else { lambda };
        }
        c[(i + 3, i + 3)] = mu;
    }
    c
}

fn von_mises(stress: &Vector6<f64>) -> f64 {
    let (sx, sy, sz) = (stress[0], stress[1], stress[2]);
    let (txy, tyz, tzx) = (stress[3], stress[4], stress[5]);
    (0.5 * ((sx - sy).powi(2) + (sy - sz).powi(2) + (sz - sx).powi(2))
        + 3.0 * (txy * txy + tyz * tyz + tzx * tzx))
        .sqrt()
}

impl PhysicsSolver for StressSolver {
    fn kind(&self) -> PhysicsKind {
        PhysicsKind::Stress
    }

    fn update_books(&mut self, model: &Model) -> Result<(), SolverError> {
        let mesh = model.mesh();
        let n_elements = mesh.elements().len();
        let n_nodes = mesh.nodes().len();

        let required = [Property::YoungModulus, Property::PoissonRatio];
        let mut computable = vec![false; n_elements];
        let mut node_computable = vec![false; n_nodes];
        for group in model.groups() {
            if group.kind != GroupKind::Volume {
                continue;
            }
            let Some(material) = group.material.and_then(|id| model.material(id)) else {
                continue;
            };
            if !material.has_all(&required) {
                continue;
            }
            for &el in &group.element_ids {
                computable[el] = true;
                for &node in mesh.elements()[el].node_ids() {
                    node_computable[node] = true;
                }
            }
        }
        if !computable.iter().any(|&c| c) {
            return Err(SolverError::InvalidModel {
                message: "no element group carries elastic material properties".to_string(),
            });
        }

        self.rotations = LocalRotation::from_model(model);

        let mut disabled = vec![false; n_nodes];
        let mut prescribed = DVector::zeros(3 * n_nodes);
        for (node, condition) in model.node_conditions(ConditionType::Displacement) {
            disabled[node] = true;
            prescribed[3 * node] = condition.get_or(ComponentKind::X, 0.0);
            prescribed[3 * node + 1] = condition.get_or(ComponentKind::Y, 0.0);
            prescribed[3 * node + 2] = condition.get_or(ComponentKind::Z, 0.0);
        }

        self.book = NodeBook::build(&node_computable, &disabled);
        self.computable = computable;
        self.prescribed = prescribed;
        info!(
            "stress: {} unknowns of {} nodes",
            3 * self.book.n_enabled(),
            n_nodes
        );
        Ok(())
    }

    fn recover(&mut self, model: &Model) {
        let n_nodes = model.mesh().nodes().len();
        let stored = model
            .variable(VariableKind::Displacement)
            .and_then(|v| v.as_node_vector())
            .filter(|v| v.len() == n_nodes);
        let mut displacements = DVector::zeros(3 * n_nodes);
        if let Some(values) = stored {
            for (node, u) in values.iter().enumerate() {
                // Stored results are global; work in the node frame.
                let local = self.rotations.rotate_vector_inverse(node, u);
                displacements[3 * node] = local.x;
                displacements[3 * node + 1] = local.y;
                displacements[3 * node + 2] = local.z;
            }
        }
        for node in 0..n_nodes {
            if self.book.is_disabled(node) {
                for c in 0..3 {
                    displacements[3 * node + c] = self.prescribed[3 * node + c];
                }
            }
        }
        self.displacements = displacements;
    }

    fn prepare(&mut self, model: &Model, abort: &AtomicBool) -> Result<(), SolverError> {
        let mesh = model.mesh();
        let n_elements = mesh.elements().len();

        let young = generate_material_vector(model, Property::YoungModulus, 0.0);
        let poisson = generate_material_vector(model, Property::PoissonRatio, 0.0);
        let density = generate_material_vector(model, Property::Density, 0.0);

        let gravity = model
            .environment_condition(ConditionType::Gravity)
            .map(|c| {
                Vector3::new(
                    c.get_or(ComponentKind::X, 0.0),
                    c.get_or(ComponentKind::Y, 0.0),
                    c.get_or(ComponentKind::Z, 0.0),
                )
            })
            .unwrap_or_else(Vector3::zeros);

        // Surface tractions per element from force conditions.
        let mut tractions = vec![Vector3::zeros(); n_elements];
        for group in model.groups() {
            let Some(condition) = group.condition(ConditionType::Force) else {
                continue;
            };
            let t = Vector3::new(
                condition.get_or(ComponentKind::X, 0.0),
                condition.get_or(ComponentKind::Y, 0.0),
                condition.get_or(ComponentKind::Z, 0.0),
            );
            for &el in &group.element_ids {
                tractions[el] += t;
            }
        }

        let assembler = StressAssembler {
            mesh,
            computable: &self.computable,
            young: &young.values,
            poisson: &poisson.values,
            density: &density.values,
            gravity,
            tractions: &tractions,
            rotations: &self.rotations,
        };
        self.system = Some(assemble_system(&assembler, &self.book, &self.prescribed, abort)?);
        Ok(())
    }

    fn solve(&mut self, model: &Model) -> Result<(), SolverError> {
        let Some(system) = self.system.take() else {
            return Err(SolverError::InvalidModel {
                message: "stress system was not assembled".to_string(),
            });
        };
        let mut x = DVector::zeros(3 * self.book.n_enabled());
        for (node, pos) in self.book.iter_enabled() {
            for c in 0..3 {
                x[3 * pos + c] = self.displacements[3 * node + c];
            }
        }
        let stats = radfem_sparse::solve_csr(
            &system.matrix,
            &system.rhs,
            &mut x,
            &model.matrix_solver.to_config(),
        )?;
        self.iterations = stats.iterations;
        debug!(
            "stress: linear solve took {} iterations (rel residual {:.3e})",
            stats.iterations, stats.rel_residual
        );
        for (node, pos) in self.book.iter_enabled() {
            for c in 0..3 {
                self.displacements[3 * node + c] = x[3 * pos + c];
            }
        }
        Ok(())
    }

    fn process(&mut self, model: &Model) -> Result<(), SolverError> {
        let mesh = model.mesh();
        let young = generate_material_vector(model, Property::YoungModulus, 0.0);
        let poisson = generate_material_vector(model, Property::PoissonRatio, 0.0);
        let global = self.global_displacements();

        let mut stresses = vec![0.0; mesh.elements().len()];
        for (el, element) in mesh.elements().iter().enumerate() {
            if !self.computable[el] || element.element_type() != ElementType::Tetra4 {
                continue;
            }
            let positions = mesh.element_positions(el);
            let Some((gradients, _)) = tetra::shape_gradients(&positions) else {
                continue;
            };
            let b = strain_displacement(&gradients);
            let mut u = DVector::zeros(12);
            for (i, &node) in element.node_ids().iter().enumerate() {
                for c in 0..3 {
                    u[3 * i + c] = global[3 * node + c];
                }
            }
            let strain = &b * u;
            let c = elasticity(young.values[el], poisson.values[el]);
            let stress = c * Vector6::from_iterator(strain.iter().copied());
            stresses[el] = von_mises(&stress);
        }
        self.von_mises = stresses;
        Ok(())
    }

    fn store(&mut self, model: &mut Model) {
        let global = self.global_displacements();
        let n_nodes = model.mesh().nodes().len();
        let vectors: Vec<Vector3<f64>> = (0..n_nodes)
            .map(|node| Vector3::new(global[3 * node], global[3 * node + 1], global[3 * node + 2]))
            .collect();
        model.set_variable(VariableKind::Displacement, VariableValues::NodeVector(vectors));
        model.set_variable(
            VariableKind::VonMisesStress,
            VariableValues::ElementScalar(self.von_mises.clone()),
        );
    }

    fn statistics(&self) -> Vec<(&'static str, f64)> {
        vec![("matrix-iterations", self.iterations as f64)]
    }

    fn result_variables(&self) -> Vec<VariableKind> {
        vec![VariableKind::Displacement, VariableKind::VonMisesStress]
    }
}

struct StressAssembler<'a> {
    mesh: &'a Mesh,
    computable: &'a [bool],
    young: &'a [f64],
    poisson: &'a [f64],
    density: &'a [f64],
    gravity: Vector3<f64>,
    tractions: &'a [Vector3<f64>],
    rotations: &'a LocalRotation,
}

impl StressAssembler<'_> {
    /// Express the element system in each node's own frame: rows and
    /// columns of rotated nodes are transformed by the node rotation.
    fn rotate_into_node_frames(&self, nodes: &[usize], matrix: &mut DMatrix<f64>, rhs: &mut DVector<f64>) {
        for (i, &node) in nodes.iter().enumerate() {
            let Some(inverse) = self.rotations.inverse(node) else {
                continue;
            };
            let rotation = inverse.transpose();
            // K <- R_i^T K (rows), then columns below; f <- R_i^T f.
            for (j, _) in nodes.iter().enumerate() {
                let mut block: Matrix3<f64> =
                    matrix.fixed_view::<3, 3>(3 * i, 3 * j).into_owned();
                block = inverse * block;
                matrix.view_mut((3 * i, 3 * j), (3, 3)).copy_from(&block);
            }
            for (j, _) in nodes.iter().enumerate() {
                let mut block: Matrix3<f64> =
                    matrix.fixed_view::<3, 3>(3 * j, 3 * i).into_owned();
                block *= rotation;
                matrix.view_mut((3 * j, 3 * i), (3, 3)).copy_from(&block);
            }
            let f = Vector3::new(rhs[3 * i], rhs[3 * i + 1], rhs[3 * i + 2]);
            let f = inverse * f;
            rhs[3 * i] = f.x;
            rhs[3 * i + 1] = f.y;
            rhs[3 * i + 2] = f.z;
        }
    }
}

impl ElementAssembler for StressAssembler<'_> {
    fn num_elements(&self) -> usize {
        self.mesh.elements().len()
    }

    fn solution_dim(&self) -> usize {
        3
    }

    fn assemble_element(&self, el: usize) -> Result<Option<ElementSystem>, SolverError> {
        let element = &self.mesh.elements()[el];

        if self.computable[el] && element.element_type() == ElementType::Tetra4 {
            let positions: Vec<Point3<f64>> = self.mesh.element_positions(el);
            let Some((gradients, volume)) = tetra::shape_gradients(&positions) else {
                return Err(SolverError::ElementFailure {
                    element: el,
                    message: "degenerate tetrahedron".to_string(),
                });
            };
            let b = strain_displacement(&gradients);
            let c = elasticity(self.young[el], self.poisson[el]);
            let mut matrix = b.transpose() * DMatrix::from_fn(6, 6, |i, j| c[(i, j)]) * &b;
            matrix *= volume;

            let mut rhs = DVector::zeros(12);
            let body = self.density[el] * volume / 4.0 * self.gravity;
            for i in 0..4 {
                rhs[3 * i] += body.x;
                rhs[3 * i + 1] += body.y;
                rhs[3 * i + 2] += body.z;
            }

            let nodes = element.node_ids().to_vec();
            self.rotate_into_node_frames(&nodes, &mut matrix, &mut rhs);
            return Ok(Some(ElementSystem { nodes, matrix, rhs }));
        }

        if element.element_type().is_surface() {
            let traction = self.tractions[el];
            if traction == Vector3::zeros() {
                return Ok(None);
            }
            let n = element.node_ids().len();
            let load = traction * (self.mesh.element_area(el) / n as f64);
            let mut rhs = DVector::zeros(3 * n);
            for i in 0..n {
                rhs[3 * i] = load.x;
                rhs[3 * i + 1] = load.y;
                rhs[3 * i + 2] = load.z;
            }
            let nodes = element.node_ids().to_vec();
            let mut matrix = DMatrix::zeros(3 * n, 3 * n);
            self.rotate_into_node_frames(&nodes, &mut matrix, &mut rhs);
            return Ok(Some(ElementSystem { nodes, matrix, rhs }));
        }

        Ok(None)
    }
}
