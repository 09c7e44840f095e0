//! Non-dimensionalization of the model before assembly.
//!
//! Working in scaled units keeps the assembled matrices well conditioned
//! when the mesh is very small or very large compared to unit size. The
//! model is downscaled before `recover`/`prepare` and upscaled after
//! `store`; mesh-only problems skip both.

use crate::model::Model;
use crate::variable::VariableKind;

/// Base scale factors (physical units per non-dimensional unit). Derived
/// quantities (velocity, flux, stress) are combinations of the four bases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scales {
    pub length: f64,
    pub time: f64,
    pub temperature: f64,
    pub mass: f64,
}

impl Default for Scales {
    fn default() -> Self {
        Self {
            length: 1.0,
            time: 1.0,
            temperature: 1.0,
            mass: 1.0,
        }
    }
}

impl Scales {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Physical-units-per-scaled-unit factor for a variable kind.
    pub fn variable_factor(&self, kind: VariableKind) -> f64 {
        match kind {
            VariableKind::Temperature => self.temperature,
            // W/m^2 = kg/s^3
            VariableKind::HeatFlux => self.mass / self.time.powi(3),
            // W = kg m^2 / s^3
            VariableKind::RadiativeHeat => self.mass * self.length.powi(2) / self.time.powi(3),
            VariableKind::Displacement => self.length,
            // Pa = kg/(m s^2)
            VariableKind::VonMisesStress => self.mass / (self.length * self.time.powi(2)),
            VariableKind::ParticleConcentration => 1.0,
            VariableKind::ParticleVelocity => self.length / self.time,
        }
    }

    /// Scale the model into non-dimensional units.
    pub fn downscale(&self, model: &mut Model) {
        self.apply(model, true)
    }

    /// Scale the model back into physical units.
    pub fn upscale(&self, model: &mut Model) {
        self.apply(model, false)
    }

    fn apply(&self, model: &mut Model, down: bool) {
        if self.is_identity() {
            return;
        }
        let length_factor = if down { 1.0 / self.length } else { self.length };
        for node in model.mesh_mut().nodes_mut() {
            node.position.coords *= length_factor;
        }
        let time_factor = if down { 1.0 / self.time } else { self.time };
        model.time.dt *= time_factor;

        for variable in model.variables_mut() {
            let factor = self.variable_factor(variable.kind());
            variable.scale_in_place(if down { 1.0 / factor } else { factor });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Element, ElementType, Mesh, Node};
    use crate::variable::VariableValues;
    use matrixcompare::assert_scalar_eq;

    #[test]
    fn down_up_round_trip() {
        let nodes = vec![Node::new(0.0, 0.0, 0.0), Node::new(10.0, 0.0, 0.0)];
        let elements = vec![Element::new(ElementType::Line2, vec![0, 1])];
        let mut model = Model::new(Mesh::new(nodes, elements).unwrap());
        model.set_variable(
            VariableKind::Temperature,
            VariableValues::NodeScalar(vec![300.0, 400.0]),
        );

        let scales = Scales {
            length: 10.0,
            temperature: 100.0,
            ..Scales::identity()
        };
        scales.downscale(&mut model);
        assert_scalar_eq!(model.mesh().node_position(1).x, 1.0, comp = abs, tol = 1e-14);
        assert_scalar_eq!(
            model.variable(VariableKind::Temperature).unwrap().as_node_scalar().unwrap()[1],
            4.0,
            comp = abs,
            tol = 1e-14
        );

        scales.upscale(&mut model);
        assert_scalar_eq!(model.mesh().node_position(1).x, 10.0, comp = abs, tol = 1e-12);
        assert_scalar_eq!(
            model.variable(VariableKind::Temperature).unwrap().as_node_scalar().unwrap()[0],
            300.0,
            comp = abs,
            tol = 1e-12
        );
    }
}
