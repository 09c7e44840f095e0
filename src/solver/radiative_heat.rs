//! Gray-body radiative heat exchange between surface patches.
//!
//! Surfaces are grouped into patches; view factors between patches come
//! from the hemicube engine (or a stored matrix when the model is
//! unchanged). Each run evaluates the net patch heats from the current
//! temperature field and shares them with the heat solver as element
//! loads; the coupled task iterates until the patch heats settle.

use std::sync::atomic::AtomicBool;

use log::{debug, info};
use nalgebra::DVector;

use crate::condition::{ComponentKind, ConditionType};
use crate::error::SolverError;
use crate::material::Property;
use crate::model::Model;
use crate::patch::PatchBook;
use crate::shared_data::{keys, SharedData};
use crate::solver::heat::DEFAULT_TEMPERATURE;
use crate::solver::{PhysicsKind, PhysicsSolver};
use crate::variable::{VariableKind, VariableValues};
use crate::view_factor::{self, ViewFactorMatrix};

pub struct RadiativeHeatSolver {
    patch_book: Option<PatchBook>,
    view_factors: Option<ViewFactorMatrix>,
    patch_temperatures: DVector<f64>,
    patch_heats: DVector<f64>,
    previous_heats: Option<DVector<f64>>,
    element_heat: DVector<f64>,
    element_temperatures: Option<DVector<f64>>,
    delta: f64,
}

impl Default for RadiativeHeatSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl RadiativeHeatSolver {
    pub fn new() -> Self {
        Self {
            patch_book: None,
            view_factors: None,
            patch_temperatures: DVector::zeros(0),
            patch_heats: DVector::zeros(0),
            previous_heats: None,
            element_heat: DVector::zeros(0),
            element_temperatures: None,
            delta: f64::INFINITY,
        }
    }

    /// Net radiative heat gained per element, in watts.
    pub fn element_heat(&self) -> &DVector<f64> {
        &self.element_heat
    }

    fn book(&self) -> Result<&PatchBook, SolverError> {
        self.patch_book.as_ref().ok_or_else(|| SolverError::InvalidModel {
            message: "radiative patches were not built".to_string(),
        })
    }

    /// Emissivity of a patch from its surface group's material; gray-body
    /// default is a black surface.
    fn emissivity(model: &Model, surface_id: u32) -> f64 {
        model
            .groups()
            .iter()
            .find(|g| g.id == surface_id)
            .and_then(|g| g.material)
            .and_then(|id| model.material(id))
            .and_then(|m| m.get(Property::Emissivity))
            .unwrap_or(1.0)
    }
}

impl PhysicsSolver for RadiativeHeatSolver {
    fn kind(&self) -> PhysicsKind {
        PhysicsKind::RadiativeHeat
    }

    fn update_books(&mut self, model: &Model) -> Result<(), SolverError> {
        if model.radiation.patch_inputs.is_empty() {
            return Err(SolverError::InvalidModel {
                message: "radiative heat requires at least one patch input".to_string(),
            });
        }
        let rebuild = !matches!(&self.patch_book, Some(book) if book.is_valid_for(model));
        if rebuild {
            let book = PatchBook::build(model);
            info!("radiative heat: {} patches", book.patches().len());
            self.patch_book = Some(book);
            self.view_factors = None;
            self.previous_heats = None;
        }
        if self.book()?.patches().is_empty() {
            return Err(SolverError::InvalidModel {
                message: "radiative patch inputs produced no patches".to_string(),
            });
        }
        Ok(())
    }

    fn recover_shared(&mut self, model: &Model, shared: &SharedData) {
        self.element_temperatures = shared
            .get(keys::ELEMENT_TEMPERATURE)
            .filter(|v| v.len() == model.mesh().elements().len())
            .cloned();
    }

    fn recover(&mut self, model: &Model) {
        let mesh = model.mesh();
        let ambient = model
            .environment_condition(ConditionType::AmbientTemperature)
            .and_then(|c| c.get(ComponentKind::Value))
            .unwrap_or(DEFAULT_TEMPERATURE);

        // Element temperatures: shared field, else node results, else
        // ambient.
        let node_temperatures = model
            .variable(VariableKind::Temperature)
            .and_then(|v| v.as_node_scalar())
            .filter(|v| v.len() == mesh.nodes().len());
        let element_temperature = |el: usize| -> f64 {
            if let Some(shared) = &self.element_temperatures {
                return shared[el];
            }
            match node_temperatures {
                Some(temps) => {
                    let ids = mesh.elements()[el].node_ids();
                    ids.iter().map(|&n| temps[n]).sum::<f64>() / ids.len() as f64
                }
                None => ambient,
            }
        };

        let Some(book) = &self.patch_book else {
            return;
        };
        let mut temperatures = DVector::zeros(book.patches().len());
        for patch in book.patches() {
            let mut area = 0.0;
            let mut weighted = 0.0;
            for &el in patch.element_ids() {
                let a = mesh.element_area(el);
                area += a;
                weighted += a * element_temperature(el);
            }
            temperatures[patch.id() as usize] = if area > 0.0 { weighted / area } else { ambient };
        }
        self.patch_temperatures = temperatures;
    }

    fn prepare(&mut self, model: &Model, _abort: &AtomicBool) -> Result<(), SolverError> {
        if self.view_factors.is_none() {
            let book = self.book()?;
            self.view_factors = Some(view_factor::load_or_compute(model, book));
        }
        Ok(())
    }

    fn solve(&mut self, model: &Model) -> Result<(), SolverError> {
        let book = self.book()?;
        let factors = self.view_factors.as_ref().ok_or_else(|| SolverError::InvalidModel {
            message: "view factors were not computed".to_string(),
        })?;
        let mesh = model.mesh();
        let sigma = crate::SIGMA;

        let n = book.patches().len();
        let mut heats = DVector::zeros(n);
        for patch in book.patches() {
            if !patch.is_emitter() {
                continue;
            }
            let p = patch.id() as usize;
            let t4 = self.patch_temperatures[p].powi(4);
            let mut incoming = 0.0;
            if let Some(row) = factors.row(patch.id()) {
                for &(q, factor) in &row.factors {
                    incoming += factor * self.patch_temperatures[q as usize].powi(4);
                }
            }
            let emissivity = Self::emissivity(model, patch.surface_id());
            // Net exchanged flux [W/m^2], positive when the patch loses
            // heat.
            let flux = emissivity * sigma * (t4 - incoming);
            heats[p] = flux * patch.area(mesh);
        }

        let norm = heats.norm();
        self.delta = match &self.previous_heats {
            Some(previous) if norm > 0.0 => (&heats - previous).norm() / norm,
            Some(_) => 0.0,
            None => f64::INFINITY,
        };
        self.previous_heats = Some(heats.clone());
        self.patch_heats = heats;
        debug!("radiative heat: patch-heat delta {:.3e}", self.delta);
        Ok(())
    }

    fn process(&mut self, model: &Model) -> Result<(), SolverError> {
        let book = self.book()?;
        let mesh = model.mesh();
        let mut element_heat = DVector::zeros(mesh.elements().len());
        for patch in book.patches() {
            let area = patch.area(mesh);
            if area <= 0.0 {
                continue;
            }
            let heat = self.patch_heats[patch.id() as usize];
            for &el in patch.element_ids() {
                // Scatter by area fraction; the element gains what the
                // patch loses with opposite sign.
                element_heat[el] = -heat * mesh.element_area(el) / area;
            }
        }
        self.element_heat = element_heat;
        Ok(())
    }

    fn store(&mut self, model: &mut Model) {
        model.set_variable(
            VariableKind::RadiativeHeat,
            VariableValues::ElementScalar(self.element_heat.iter().copied().collect()),
        );
    }

    fn share(&self, _model: &Model, shared: &mut SharedData) {
        shared.set(keys::ELEMENT_RADIATIVE_HEAT, self.element_heat.clone());
    }

    fn statistics(&self) -> Vec<(&'static str, f64)> {
        vec![("radiative-heat-delta", self.delta)]
    }

    fn result_variables(&self) -> Vec<VariableKind> {
        vec![VariableKind::RadiativeHeat]
    }

    fn has_converged(&self) -> bool {
        self.delta < crate::EPS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Material;
    use crate::mesh::{Element, ElementType, Mesh, Node};
    use crate::model::{ElementGroup, GroupKind};
    use crate::patch::PatchInput;
    use crate::view_factor::{ViewFactorHeader, ViewFactorRow};
    use matrixcompare::assert_scalar_eq;

    /// Two opposing unit triangles, one patch each.
    fn two_patch_model() -> Model {
        let nodes = vec![
            Node::new(0.0, 0.0, 0.0),
            Node::new(1.0, 0.0, 0.0),
            Node::new(0.0, 1.0, 0.0),
            Node::new(0.0, 0.0, 1.0),
            Node::new(1.0, 0.0, 1.0),
            Node::new(0.0, 1.0, 1.0),
        ];
        let elements = vec![
            Element::new(ElementType::Tri3, vec![0, 1, 2]),
            Element::new(ElementType::Tri3, vec![3, 5, 4]),
        ];
        let mut model = Model::new(Mesh::new(nodes, elements).unwrap());
        let black = model.add_material(Material::new("black").with_property(Property::Emissivity, 1.0));
        for (id, el) in [(1u32, 0usize), (2, 1)] {
            let mut group =
                ElementGroup::new(id, format!("plate-{id}"), GroupKind::Surface, vec![el]);
            group.material = Some(black);
            model.add_group(group);
        }
        model.radiation.resolution = 10;
        model.radiation.patch_inputs = vec![
            PatchInput { surface_id: 1, emitter: true, receiver: true, patch_size: 0 },
            PatchInput { surface_id: 2, emitter: true, receiver: true, patch_size: 0 },
        ];
        model
    }

    fn solver_with_factors(model: &Model, factor: f64) -> RadiativeHeatSolver {
        let mut solver = RadiativeHeatSolver::new();
        solver.update_books(model).unwrap();
        solver.view_factors = Some(ViewFactorMatrix::new(
            ViewFactorHeader::from_model(model),
            vec![
                ViewFactorRow { patch: 0, factors: vec![(1, factor)] },
                ViewFactorRow { patch: 1, factors: vec![(0, factor)] },
            ],
        ));
        solver
    }

    #[test]
    fn net_exchange_between_hot_and_cold_plates() {
        let model = two_patch_model();
        let mut solver = solver_with_factors(&model, 0.5);
        solver.patch_temperatures = DVector::from_vec(vec![500.0, 300.0]);
        solver.solve(&model).unwrap();
        solver.process(&model).unwrap();

        let area = 0.5;
        let expected_hot = crate::SIGMA * (500f64.powi(4) - 0.5 * 300f64.powi(4)) * area;
        assert_scalar_eq!(solver.patch_heats[0], expected_hot, comp = abs, tol = 1e-8);
        // The hot plate loses heat, so its element gains a negative load.
        assert!(solver.element_heat()[0] < 0.0);
        assert!(solver.patch_heats[0] > 0.0 && solver.patch_heats[1] < 0.0);
    }

    #[test]
    fn isothermal_enclosure_exchanges_nothing() {
        // Full mutual view and equal temperatures: emission and absorption
        // cancel on both patches.
        let model = two_patch_model();
        let mut solver = solver_with_factors(&model, 1.0);
        solver.patch_temperatures = DVector::from_element(2, 450.0);
        solver.solve(&model).unwrap();
        solver.process(&model).unwrap();
        assert_scalar_eq!(solver.patch_heats[0], 0.0, comp = abs, tol = 1e-9);
        assert_scalar_eq!(solver.patch_heats[1], 0.0, comp = abs, tol = 1e-9);
        assert_scalar_eq!(solver.element_heat()[0], 0.0, comp = abs, tol = 1e-9);
    }

    #[test]
    fn repeated_solve_converges() {
        let model = two_patch_model();
        let mut solver = solver_with_factors(&model, 0.5);
        solver.patch_temperatures = DVector::from_vec(vec![400.0, 350.0]);
        solver.solve(&model).unwrap();
        assert!(!solver.has_converged());
        solver.solve(&model).unwrap();
        assert!(solver.has_converged());
    }
}
