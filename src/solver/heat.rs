//! Steady and transient heat conduction.
//!
//! Volume elements contribute conduction stiffness and capacity mass;
//! surface elements contribute convection, flux and heat-rate loads, plus
//! radiative heats shared by the radiative-heat solver. Time integration
//! uses the generalized trapezoidal scheme `A = M + theta dt K`.

use std::sync::atomic::AtomicBool;

use log::{debug, info};
use nalgebra::{DMatrix, DVector, Vector3};
use rustc_hash::FxHashMap;

use crate::assembly::{assemble_system, ElementAssembler, ElementSystem, GlobalSystem};
use crate::condition::{ComponentKind, ConditionType};
use crate::convection::{self, ConvectionCoefficient, ConvectionRegime};
use crate::error::SolverError;
use crate::material::{generate_material_vector, Property};
use crate::mesh::{ElementType, Mesh};
use crate::model::{GroupKind, Model};
use crate::node_book::NodeBook;
use crate::shared_data::{keys, SharedData};
use crate::solver::{tetra, PhysicsKind, PhysicsSolver};
use crate::variable::{VariableKind, VariableValues};

/// Fallback temperature when neither stored results, initial conditions
/// nor the environment provide one.
pub const DEFAULT_TEMPERATURE: f64 = 293.15;

pub struct HeatSolver {
    /// Generalized trapezoidal parameter (0.5 = Crank-Nicolson).
    pub theta: f64,
    transient: bool,
    computable: Vec<bool>,
    included_surface: Vec<bool>,
    book: NodeBook,
    prescribed: DVector<f64>,
    temperatures: DVector<f64>,
    previous: Option<DVector<f64>>,
    radiative_heat: Option<DVector<f64>>,
    system: Option<GlobalSystem>,
    heat_flux: Vec<Vector3<f64>>,
    delta: f64,
    iterations: usize,
}

impl Default for HeatSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl HeatSolver {
    pub fn new() -> Self {
        Self {
            theta: 0.5,
            transient: false,
            computable: Vec::new(),
            included_surface: Vec::new(),
            book: NodeBook::build(&[], &[]),
            prescribed: DVector::zeros(0),
            temperatures: DVector::zeros(0),
            previous: None,
            radiative_heat: None,
            system: None,
            heat_flux: Vec::new(),
            delta: f64::INFINITY,
            iterations: 0,
        }
    }

    pub fn temperatures(&self) -> &DVector<f64> {
        &self.temperatures
    }

    fn element_temperature(&self, mesh: &Mesh, element_id: usize) -> f64 {
        let ids = mesh.elements()[element_id].node_ids();
        ids.iter().map(|&n| self.temperatures[n]).sum::<f64>() / ids.len() as f64
    }
}

impl PhysicsSolver for HeatSolver {
    fn kind(&self) -> PhysicsKind {
        PhysicsKind::Heat
    }

    fn update_books(&mut self, model: &Model) -> Result<(), SolverError> {
        let mesh = model.mesh();
        let n_elements = mesh.elements().len();
        let n_nodes = mesh.nodes().len();
        self.transient = model.time.enabled;

        let required: &[Property] = if self.transient {
            &[
                Property::ThermalConductivity,
                Property::Density,
                Property::HeatCapacity,
            ]
        } else {
            &[Property::ThermalConductivity]
        };
        let mut computable = vec![false; n_elements];
        let mut node_computable = vec![false; n_nodes];
        for group in model.groups() {
            if group.kind != GroupKind::Volume {
                continue;
            }
            let Some(material) = group.material.and_then(|id| model.material(id)) else {
                continue;
            };
            if !material.has_all(required) {
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
                message: "no element group carries the material properties required for heat conduction"
                    .to_string(),
            });
        }

        // Surface elements feed boundary terms only when they sit on the
        // skin of a computable volume with their normal pointing away from
        // it. Inward-wound surfaces are dropped, not flipped.
        let mut volumes_of_node: Vec<Vec<usize>> = vec![Vec::new(); n_nodes];
        for (el, &is_computable) in computable.iter().enumerate() {
            if is_computable {
                for &node in mesh.elements()[el].node_ids() {
                    volumes_of_node[node].push(el);
                }
            }
        }
        let mut included = vec![false; n_elements];
        for group in model.groups() {
            if group.kind != GroupKind::Surface {
                continue;
            }
            for &el in &group.element_ids {
                included[el] = faces_away_from_volume(mesh, el, &volumes_of_node);
            }
        }

        let mut disabled = vec![false; n_nodes];
        let mut prescribed = DVector::zeros(n_nodes);
        for (node, condition) in model.node_conditions(ConditionType::Temperature) {
            disabled[node] = true;
            prescribed[node] = condition.require(ComponentKind::Value)?;
        }

        self.book = NodeBook::build(&node_computable, &disabled);
        self.computable = computable;
        self.included_surface = included;
        self.prescribed = prescribed;
        self.previous = None;
        info!("heat: {} unknowns of {} nodes", self.book.n_enabled(), n_nodes);
        Ok(())
    }

    fn recover_shared(&mut self, model: &Model, shared: &SharedData) {
        self.radiative_heat = shared
            .get(keys::ELEMENT_RADIATIVE_HEAT)
            .filter(|v| v.len() == model.mesh().elements().len())
            .cloned();
    }

    fn recover(&mut self, model: &Model) {
        let n_nodes = model.mesh().nodes().len();
        let ambient = model
            .environment_condition(ConditionType::AmbientTemperature)
            .and_then(|c| c.get(ComponentKind::Value))
            .unwrap_or(DEFAULT_TEMPERATURE);

        let stored = model
            .variable(VariableKind::Temperature)
            .and_then(|v| v.as_node_scalar())
            .filter(|v| v.len() == n_nodes);
        let mut temperatures = match stored {
            Some(values) => DVector::from_row_slice(values),
            None => {
                let mut t = DVector::from_element(n_nodes, ambient);
                for (node, condition) in model.node_conditions(ConditionType::InitialTemperature) {
                    if let Some(value) = condition.get(ComponentKind::Value) {
                        t[node] = value;
                    }
                }
                t
            }
        };
        for node in 0..n_nodes {
            if self.book.is_disabled(node) {
                temperatures[node] = self.prescribed[node];
            }
        }
        self.temperatures = temperatures;
    }

    fn prepare(&mut self, model: &Model, abort: &AtomicBool) -> Result<(), SolverError> {
        let mesh = model.mesh();
        let n_elements = mesh.elements().len();

        let conductivity = generate_material_vector(model, Property::ThermalConductivity, 0.0);
        let density = generate_material_vector(model, Property::Density, 0.0);
        let capacity = generate_material_vector(model, Property::HeatCapacity, 0.0);
        let rho_c: Vec<f64> = density
            .values
            .iter()
            .zip(&capacity.values)
            .map(|(rho, c)| rho * c)
            .collect();

        let mut loads = vec![0.0; n_elements];
        let mut convection: Vec<Option<ConvectionCoefficient>> = vec![None; n_elements];
        for group in model.groups() {
            for condition in &group.conditions {
                match condition.condition_type() {
                    ConditionType::HeatFlux => {
                        let q = condition.require(ComponentKind::Value)?;
                        for &el in &group.element_ids {
                            loads[el] += q * mesh.element_area(el);
                        }
                    }
                    ConditionType::HeatRate => {
                        // Total group heat, distributed by element measure.
                        let total = condition.require(ComponentKind::Value)?;
                        let group_measure: f64 = group
                            .element_ids
                            .iter()
                            .map(|&el| mesh.element_measure(el))
                            .sum();
                        if group_measure > 0.0 {
                            for &el in &group.element_ids {
                                loads[el] += total * mesh.element_measure(el) / group_measure;
                            }
                        }
                    }
                    ConditionType::SimpleConvection => {
                        let c = convection::simple_convection(condition)?;
                        for &el in &group.element_ids {
                            convection[el] = Some(c);
                        }
                    }
                    ConditionType::ForcedConvection => {
                        let regime =
                            ConvectionRegime::of_condition(condition, ConvectionRegime::ForcedExternal);
                        let c = convection::forced_convection(condition, regime)?;
                        for &el in &group.element_ids {
                            convection[el] = Some(c);
                        }
                    }
                    ConditionType::NaturalConvection => {
                        let regime = ConvectionRegime::of_condition(
                            condition,
                            ConvectionRegime::NaturalExternalVerticalPlane,
                        );
                        for &el in &group.element_ids {
                            let t = self.element_temperature(mesh, el);
                            convection[el] =
                                Some(convection::natural_convection(condition, regime, t)?);
                        }
                    }
                    _ => {}
                }
            }
        }
        if let Some(radiative) = &self.radiative_heat {
            for el in 0..n_elements {
                loads[el] += radiative[el];
            }
        }

        let assembler = HeatAssembler {
            mesh,
            computable: &self.computable,
            included_surface: &self.included_surface,
            conductivity: &conductivity.values,
            rho_c: &rho_c,
            convection: &convection,
            loads: &loads,
            temperatures: &self.temperatures,
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
                message: "heat system was not assembled".to_string(),
            });
        };
        let mut x = DVector::zeros(self.book.n_enabled());
        for (node, pos) in self.book.iter_enabled() {
            x[pos] = self.temperatures[node];
        }
        let stats = radfem_sparse::solve_csr(
            &system.matrix,
            &system.rhs,
            &mut x,
            &model.matrix_solver.to_config(),
        )?;
        self.iterations = stats.iterations;
        debug!(
            "heat: linear solve took {} iterations (rel residual {:.3e})",
            stats.iterations, stats.rel_residual
        );
        for (node, pos) in self.book.iter_enabled() {
            self.temperatures[node] = x[pos];
        }

        let norm = self.temperatures.norm();
        self.delta = match &self.previous {
            Some(prev) if norm > 0.0 => (&self.temperatures - prev).norm() / norm,
            _ => f64::INFINITY,
        };
        self.previous = Some(self.temperatures.clone());
        Ok(())
    }

    fn process(&mut self, model: &Model) -> Result<(), SolverError> {
        let mesh = model.mesh();
        let conductivity = generate_material_vector(model, Property::ThermalConductivity, 0.0);
        let mut flux = vec![Vector3::zeros(); mesh.elements().len()];
        for (el, element) in mesh.elements().iter().enumerate() {
            if !self.computable[el] || element.element_type() != ElementType::Tetra4 {
                continue;
            }
            let positions = mesh.element_positions(el);
            let Some((gradients, _)) = tetra::shape_gradients(&positions) else {
                continue;
            };
            let mut grad_t = Vector3::zeros();
            for (i, &node) in element.node_ids().iter().enumerate() {
                grad_t += gradients.column(i) * self.temperatures[node];
            }
            flux[el] = -conductivity.values[el] * grad_t;
        }
        self.heat_flux = flux;
        Ok(())
    }

    fn store(&mut self, model: &mut Model) {
        model.set_variable(
            VariableKind::Temperature,
            VariableValues::NodeScalar(self.temperatures.iter().copied().collect()),
        );
        model.set_variable(
            VariableKind::HeatFlux,
            VariableValues::ElementVector(self.heat_flux.clone()),
        );
    }

    fn share(&self, model: &Model, shared: &mut SharedData) {
        let mesh = model.mesh();
        let n_elements = mesh.elements().len();
        let element_temperatures = DVector::from_iterator(
            n_elements,
            (0..n_elements).map(|el| self.element_temperature(mesh, el)),
        );
        shared.set(keys::ELEMENT_TEMPERATURE, element_temperatures);
        shared.set(keys::NODE_TEMPERATURE, self.temperatures.clone());
    }

    fn statistics(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("temperature-delta", self.delta),
            ("matrix-iterations", self.iterations as f64),
        ]
    }

    fn result_variables(&self) -> Vec<VariableKind> {
        vec![VariableKind::Temperature, VariableKind::HeatFlux]
    }

    fn has_converged(&self) -> bool {
        self.delta < crate::EPS
    }
}

/// Whether a surface element lies on the boundary of a computable volume
/// with its normal pointing out of that volume.
///
/// The volume adjacent to the surface is the computable element sharing
/// the most surface nodes, at least three (a shared face). Its center lies
/// inside the solid, so an outward surface normal points away from it.
fn faces_away_from_volume(mesh: &Mesh, surface: usize, volumes_of_node: &[Vec<usize>]) -> bool {
    let mut shared: FxHashMap<usize, usize> = FxHashMap::default();
    for &node in mesh.elements()[surface].node_ids() {
        for &volume in &volumes_of_node[node] {
            *shared.entry(volume).or_insert(0) += 1;
        }
    }
    let Some(volume) = shared
        .into_iter()
        .filter(|&(_, count)| count >= 3)
        .max_by_key(|&(_, count)| count)
        .map(|(volume, _)| volume)
    else {
        return false;
    };
    let outward = mesh.element_center(surface) - mesh.element_center(volume);
    mesh.element_normal(surface).dot(&outward) > 0.0
}

struct HeatAssembler<'a> {
    mesh: &'a Mesh,
    computable: &'a [bool],
    included_surface: &'a [bool],
    conductivity: &'a [f64],
    rho_c: &'a [f64],
    convection: &'a [Option<ConvectionCoefficient>],
    loads: &'a [f64],
    temperatures: &'a DVector<f64>,
    transient: bool,
    dt: f64,
    theta: f64,
}

impl HeatAssembler<'_> {
    /// Fold a local (K, M, f) triple through the generalized trapezoidal
    /// scheme; steady problems get the stiffness and load untouched.
    fn theta_system(
        &self,
        nodes: Vec<usize>,
        stiffness: DMatrix<f64>,
        mass: DMatrix<f64>,
        load: DVector<f64>,
    ) -> ElementSystem {
        if self.transient {
            let t_old = DVector::from_iterator(
                nodes.len(),
                nodes.iter().map(|&node| self.temperatures[node]),
            );
            let matrix = &mass + &stiffness * (self.theta * self.dt);
            let rhs = (&mass - &stiffness * ((1.0 - self.theta) * self.dt)) * t_old + load * self.dt;
            ElementSystem { nodes, matrix, rhs }
        } else {
            ElementSystem {
                nodes,
                matrix: stiffness,
                rhs: load,
            }
        }
    }
}

impl ElementAssembler for HeatAssembler<'_> {
    fn num_elements(&self) -> usize {
        self.mesh.elements().len()
    }

    fn solution_dim(&self) -> usize {
        1
    }

    fn assemble_element(&self, el: usize) -> Result<Option<ElementSystem>, SolverError> {
        let element = &self.mesh.elements()[el];

        if self.computable[el] && element.element_type() == ElementType::Tetra4 {
            let positions = self.mesh.element_positions(el);
            let Some((gradients, volume)) = tetra::shape_gradients(&positions) else {
                return Err(SolverError::ElementFailure {
                    element: el,
                    message: "degenerate tetrahedron".to_string(),
                });
            };
            let k = gradients.transpose() * gradients * (self.conductivity[el] * volume);
            let stiffness = DMatrix::from_fn(4, 4, |i, j| k[(i, j)]);
            let mut mass = DMatrix::zeros(4, 4);
            if self.transient {
                let m = self.rho_c[el] * volume / 20.0;
                for i in 0..4 {
                    for j in 0..4 {
                        mass[(i, j)] = if i == j { 2.0 * m } else { m };
                    }
                }
            }
            let load = DVector::from_element(4, self.loads[el] / 4.0);
            return Ok(Some(self.theta_system(
                element.node_ids().to_vec(),
                stiffness,
                mass,
                load,
            )));
        }

        if element.element_type().is_surface() && self.included_surface[el] {
            let n = element.node_ids().len();
            let area = self.mesh.element_area(el);
            let mut stiffness = DMatrix::zeros(n, n);
            let mut load = DVector::from_element(n, self.loads[el] / n as f64);
            if let Some(c) = &self.convection[el] {
                match element.element_type() {
                    ElementType::Tri3 => {
                        let h = c.coefficient * area / 12.0;
                        for i in 0..3 {
                            for j in 0..3 {
                                stiffness[(i, j)] += if i == j { 2.0 * h } else { h };
                            }
                        }
                    }
                    // Lumped matrix for other surface shapes.
                    _ => {
                        let h = c.coefficient * area / n as f64;
                        for i in 0..n {
                            stiffness[(i, i)] += h;
                        }
                    }
                }
                let ambient_load = c.coefficient * c.ambient_temperature * area / n as f64;
                for i in 0..n {
                    load[i] += ambient_load;
                }
            }
            if stiffness.iter().all(|&v| v == 0.0) && load.iter().all(|&v| v == 0.0) {
                return Ok(None);
            }
            let mass = DMatrix::zeros(n, n);
            return Ok(Some(self.theta_system(
                element.node_ids().to_vec(),
                stiffness,
                mass,
                load,
            )));
        }

        Ok(None)
    }
}
