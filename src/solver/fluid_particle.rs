//! Advection-diffusion transport of particle concentration.
//!
//! The concentration field is advected by a per-element velocity (shared
//! by a fluid solver or given as a result variable) and diffused with the
//! material's diffusion coefficient. Advection-dominated elements get SUPG
//! (streamline-upwind Petrov-Galerkin) stabilization.

use std::sync::atomic::AtomicBool;

use log::{debug, info};
use nalgebra::{DMatrix, DVector, Vector3};

use crate::assembly::{assemble_system, ElementAssembler, ElementSystem, GlobalSystem};
use crate::condition::{ComponentKind, ConditionType};
use crate::error::SolverError;
use crate::material::{generate_material_vector, Property};
use crate::mesh::{ElementType, Mesh};
use crate::model::{GroupKind, Model};
use crate::node_book::NodeBook;
use crate::shared_data::{keys, SharedData};
use crate::solver::{tetra, PhysicsKind, PhysicsSolver};
use crate::variable::{VariableKind, VariableValues};

/// SUPG stabilization time scale.
///
/// Above the Peclet threshold the full streamline time scale `h / (2|v|)`
/// applies; below it the scale is damped linearly so diffusion-dominated
/// elements are left essentially unstabilized.
pub(crate) fn supg_tau(speed: f64, length: f64, diffusion: f64) -> f64 {
    if speed <= 0.0 {
        return 0.0;
    }
    let tau = length / (2.0 * speed);
    if diffusion <= 0.0 {
        return tau;
    }
    let peclet = speed * length / (2.0 * diffusion);
    if peclet >= 3.0 {
        tau
    } else {
        tau * peclet / 3.0
    }
}

pub struct FluidParticleSolver {
    /// Generalized trapezoidal parameter of the time integration.
    pub theta: f64,
    transient: bool,
    computable: Vec<bool>,
    book: NodeBook,
    prescribed: DVector<f64>,
    concentrations: DVector<f64>,
    /// Advecting velocity per element.
    velocities: Vec<Vector3<f64>>,
    system: Option<GlobalSystem>,
    previous: Option<DVector<f64>>,
    delta: f64,
    iterations: usize,
}

impl Default for FluidParticleSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl FluidParticleSolver {
    pub fn new() -> Self {
        Self {
            theta: 0.5,
            transient: false,
            computable: Vec::new(),
            book: NodeBook::build(&[], &[]),
            prescribed: DVector::zeros(0),
            concentrations: DVector::zeros(0),
            velocities: Vec::new(),
            system: None,
            previous: None,
            delta: f64::INFINITY,
            iterations: 0,
        }
    }

    pub fn concentrations(&self) -> &DVector<f64> {
        &self.concentrations
    }
}

impl PhysicsSolver for FluidParticleSolver {
    fn kind(&self) -> PhysicsKind {
        PhysicsKind::FluidParticle
    }

    fn update_books(&mut self, model: &Model) -> Result<(), SolverError> {
        let mesh = model.mesh();
        let n_elements = mesh.elements().len();
        let n_nodes = mesh.nodes().len();
        self.transient = model.time.enabled;

        let mut computable = vec![false; n_elements];
        let mut node_computable = vec![false; n_nodes];
        for group in model.groups() {
            if group.kind != GroupKind::Volume {
                continue;
            }
            let Some(material) = group.material.and_then(|id| model.material(id)) else {
                continue;
            };
            if material.get(Property::DiffusionCoefficient).is_none() {
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
                message: "no element group carries a particle diffusion coefficient".to_string(),
            });
        }

        let mut disabled = vec![false; n_nodes];
        let mut prescribed = DVector::zeros(n_nodes);
        for (node, condition) in model.node_conditions(ConditionType::ParticleConcentration) {
            disabled[node] = true;
            prescribed[node] = condition.require(ComponentKind::Value)?;
        }

        self.book = NodeBook::build(&node_computable, &disabled);
        self.computable = computable;
        self.prescribed = prescribed;
        self.previous = None;
        info!(
            "fluid-particle: {} unknowns of {} nodes",
            self.book.n_enabled(),
            n_nodes
        );
        Ok(())
    }

    fn recover_shared(&mut self, model: &Model, shared: &SharedData) {
        let n_elements = model.mesh().elements().len();
        if let Some(v) = shared
            .get(keys::ELEMENT_VELOCITY)
            .filter(|v| v.len() == 3 * n_elements)
        {
            self.velocities = (0..n_elements)
                .map(|el| Vector3::new(v[3 * el], v[3 * el + 1], v[3 * el + 2]))
                .collect();
        }
    }

    fn recover(&mut self, model: &Model) {
        let mesh = model.mesh();
        let n_nodes = mesh.nodes().len();
        let n_elements = mesh.elements().len();

        let stored = model
            .variable(VariableKind::ParticleConcentration)
            .and_then(|v| v.as_node_scalar())
            .filter(|v| v.len() == n_nodes);
        let mut concentrations = match stored {
            Some(values) => DVector::from_row_slice(values),
            None => {
                let mut c = DVector::zeros(n_nodes);
                for (node, condition) in
                    model.node_conditions(ConditionType::InitialParticleConcentration)
                {
                    if let Some(value) = condition.get(ComponentKind::Value) {
                        c[node] = value;
                    }
                }
                c
            }
        };
        for node in 0..n_nodes {
            if self.book.is_disabled(node) {
                concentrations[node] = self.prescribed[node];
            }
        }
        self.concentrations = concentrations;

        // Velocity: shared field wins; otherwise the stored result
        // variable, otherwise per-group initial conditions.
        if self.velocities.len() != n_elements {
            let stored = model
                .variable(VariableKind::ParticleVelocity)
                .and_then(|v| v.as_element_vector())
                .filter(|v| v.len() == n_elements)
                .map(<[Vector3<f64>]>::to_vec);
            self.velocities = stored.unwrap_or_else(|| {
                let mut velocities = vec![Vector3::zeros(); n_elements];
                for group in model.groups() {
                    let Some(condition) = group.condition(ConditionType::InitialVelocity) else {
                        continue;
                    };
                    let v = Vector3::new(
                        condition.get_or(ComponentKind::X, 0.0),
                        condition.get_or(ComponentKind::Y, 0.0),
                        condition.get_or(ComponentKind::Z, 0.0),
                    );
                    for &el in &group.element_ids {
                        velocities[el] = v;
                    }
                }
                velocities
            });
        }
    }

    fn prepare(&mut self, model: &Model, abort: &AtomicBool) -> Result<(), SolverError> {
        let mesh = model.mesh();
        let n_elements = mesh.elements().len();
        let diffusion = generate_material_vector(model, Property::DiffusionCoefficient, 0.0);

        // Particle sources, distributed over the group by element measure.
        let mut sources = vec![0.0; n_elements];
        for group in model.groups() {
            let Some(condition) = group.condition(ConditionType::ParticleRate) else {
                continue;
            };
            let total = condition.require(ComponentKind::Value)?;
            let group_measure: f64 = group
                .element_ids
                .iter()
                .map(|&el| mesh.element_measure(el))
                .sum();
            if group_measure > 0.0 {
                for &el in &group.element_ids {
                    sources[el] += total * mesh.element_measure(el) / group_measure;
                }
            }
        }

        let assembler = TransportAssembler {
            mesh,
            computable: &self.computable,
            diffusion: &diffusion.values,
            velocities: &self.velocities,
            sources: &sources,
            concentrations: &self.concentrations,
            transient: self.transient,
            dt: model.time.dt,
            theta: self.theta,
        };
        self.system = Some(assemble_system(&assembler, &self.book, &self.prescribed, abort)?);
        Ok(())
    }

    fn solve(&mut self, model: &Model) -> Result<(), SolverError> {
        let Some(system) = self.system.take() else {
            return Err(SolverError::InvalidModel {
                message: "transport system was not assembled".to_string(),
            });
        };
        let mut x = DVector::zeros(self.book.n_enabled());
        for (node, pos) in self.book.iter_enabled() {
            x[pos] = self.concentrations[node];
        }
        let stats = radfem_sparse::solve_csr(
            &system.matrix,
            &system.rhs,
            &mut x,
            &model.matrix_solver.to_config(),
        )?;
        self.iterations = stats.iterations;
        debug!(
            "fluid-particle: linear solve took {} iterations (rel residual {:.3e})",
            stats.iterations, stats.rel_residual
        );
        for (node, pos) in self.book.iter_enabled() {
            self.concentrations[node] = x[pos];
        }

        let norm = self.concentrations.norm();
        self.delta = match &self.previous {
            Some(prev) if norm > 0.0 => (&self.concentrations - prev).norm() / norm,
            Some(_) => 0.0,
            None => f64::INFINITY,
        };
        self.previous = Some(self.concentrations.clone());
        Ok(())
    }

    fn process(&mut self, _model: &Model) -> Result<(), SolverError> {
        Ok(())
    }

    fn store(&mut self, model: &mut Model) {
        model.set_variable(
            VariableKind::ParticleConcentration,
            VariableValues::NodeScalar(self.concentrations.iter().copied().collect()),
        );
        model.set_variable(
            VariableKind::ParticleVelocity,
            VariableValues::ElementVector(self.velocities.clone()),
        );
    }

    fn statistics(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("concentration-delta", self.delta),
            ("matrix-iterations", self.iterations as f64),
        ]
    }

    fn result_variables(&self) -> Vec<VariableKind> {
        vec![VariableKind::ParticleConcentration]
    }

    fn has_converged(&self) -> bool {
        self.delta < crate::EPS
    }
}

struct TransportAssembler<'a> {
    mesh: &'a Mesh,
    computable: &'a [bool],
    diffusion: &'a [f64],
    velocities: &'a [Vector3<f64>],
    sources: &'a [f64],
    concentrations: &'a DVector<f64>,
    transient: bool,
    dt: f64,
    theta: f64,
}

impl ElementAssembler for TransportAssembler<'_> {
    fn num_elements(&self) -> usize {
        self.mesh.elements().len()
    }

    fn solution_dim(&self) -> usize {
        1
    }

    fn assemble_element(&self, el: usize) -> Result<Option<ElementSystem>, SolverError> {
        let element = &self.mesh.elements()[el];
        if !self.computable[el] || element.element_type() != ElementType::Tetra4 {
            return Ok(None);
        }
        let positions = self.mesh.element_positions(el);
        let Some((gradients, volume)) = tetra::shape_gradients(&positions) else {
            return Err(SolverError::ElementFailure {
                element: el,
                message: "degenerate tetrahedron".to_string(),
            });
        };

        let d = self.diffusion[el];
        let k = gradients.transpose() * gradients * (d * volume);
        let mut stiffness = DMatrix::from_fn(4, 4, |i, j| k[(i, j)]);

        let velocity = self.velocities[el];
        let speed = velocity.norm();
        if speed > 0.0 {
            // Streamline derivative of each shape function.
            let vg: Vec<f64> = (0..4).map(|i| velocity.dot(&gradients.column(i))).collect();
            let tau = supg_tau(speed, tetra::characteristic_length(volume), d);
            for i in 0..4 {
                for j in 0..4 {
                    stiffness[(i, j)] += vg[j] * volume / 4.0 + tau * vg[i] * vg[j] * volume;
                }
            }
        }

        let load = DVector::from_element(4, self.sources[el] / 4.0);
        let nodes = element.node_ids().to_vec();
        if self.transient {
            let mut mass = DMatrix::zeros(4, 4);
            let m = volume / 20.0;
            for i in 0..4 {
                for j in 0..4 {
                    mass[(i, j)] = if i == j { 2.0 * m } else { m };
                }
            }
            let c_old =
                DVector::from_iterator(4, nodes.iter().map(|&node| self.concentrations[node]));
            let matrix = &mass + &stiffness * (self.theta * self.dt);
            let rhs = (&mass - &stiffness * ((1.0 - self.theta) * self.dt)) * c_old + load * self.dt;
            Ok(Some(ElementSystem { nodes, matrix, rhs }))
        } else {
            Ok(Some(ElementSystem {
                nodes,
                matrix: stiffness,
                rhs: load,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;
    use crate::material::Material;
    use crate::mesh::Mesh;
    use crate::model::ElementGroup;
    use matrixcompare::assert_scalar_eq;

    #[test]
    fn supg_time_scale_damps_below_peclet_threshold() {
        let (h, v) = (0.1, 2.0);
        let tau_full = h / (2.0 * v);
        // Pe = v h / (2 D); D small -> advection dominates.
        assert_scalar_eq!(supg_tau(v, h, 1e-6), tau_full, comp = abs, tol = 1e-12);
        // Pe = 1 -> damped by 1/3.
        let d = v * h / 2.0;
        assert_scalar_eq!(supg_tau(v, h, d), tau_full / 3.0, comp = abs, tol = 1e-12);
        assert_eq!(supg_tau(0.0, h, 1.0), 0.0);
    }

    #[test]
    fn steady_diffusion_with_uniform_dirichlet() {
        let mut model = Model::new(Mesh::unit_tetra_mesh());
        let medium = model.add_material(
            Material::new("medium").with_property(Property::DiffusionCoefficient, 1e-3),
        );
        let mut body = ElementGroup::new(1, "body", GroupKind::Volume, vec![0]);
        body.material = Some(medium);
        model.add_group(body);
        let mut inlet = ElementGroup::new(2, "inlet", GroupKind::Surface, vec![1]);
        inlet
            .conditions
            .push(Condition::scalar(ConditionType::ParticleConcentration, 1.0));
        model.add_group(inlet);

        let mut solver = FluidParticleSolver::new();
        let abort = AtomicBool::new(false);
        solver.update_books(&model).unwrap();
        solver.recover(&model);
        solver.prepare(&model, &abort).unwrap();
        solver.solve(&model).unwrap();
        assert_scalar_eq!(solver.concentrations()[3], 1.0, comp = abs, tol = 1e-8);
    }
}
