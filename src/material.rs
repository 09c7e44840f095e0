//! Materials and per-element material vectors.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::SolverError;
use crate::model::Model;

/// Material property kinds used across the physics solvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Property {
    Density,
    ThermalConductivity,
    HeatCapacity,
    Emissivity,
    YoungModulus,
    PoissonRatio,
    DynamicViscosity,
    DiffusionCoefficient,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    name: String,
    properties: FxHashMap<Property, f64>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn with_property(mut self, property: Property, value: f64) -> Self {
        self.properties.insert(property, value);
        self
    }

    pub fn get(&self, property: Property) -> Option<f64> {
        self.properties.get(&property).copied()
    }

    pub fn require(&self, property: Property) -> Result<f64, SolverError> {
        self.get(property).ok_or_else(|| SolverError::MissingProperty {
            material: self.name.clone(),
            property,
        })
    }

    pub fn has_all(&self, properties: &[Property]) -> bool {
        properties.iter().all(|p| self.properties.contains_key(p))
    }
}

/// A dense per-element scalar vector together with flags recording which
/// elements had the value set explicitly (as opposed to defaulted).
#[derive(Debug, Clone)]
pub struct ElementVector {
    pub values: Vec<f64>,
    pub explicit: Vec<bool>,
}

impl ElementVector {
    pub fn with_default(n_elements: usize, default: f64) -> Self {
        Self {
            values: vec![default; n_elements],
            explicit: vec![false; n_elements],
        }
    }

    pub fn set(&mut self, element: usize, value: f64) {
        self.values[element] = value;
        self.explicit[element] = true;
    }
}

/// Scan all element groups and fill a per-element vector with the group
/// material's value of `property`. Elements whose group has no material, or
/// whose material lacks the property, keep `default` and stay un-flagged.
pub fn generate_material_vector(model: &Model, property: Property, default: f64) -> ElementVector {
    let mut out = ElementVector::with_default(model.mesh().elements().len(), default);
    for group in model.groups() {
        let Some(material) = group.material.and_then(|id| model.material(id)) else {
            continue;
        };
        let Some(value) = material.get(property) else {
            continue;
        };
        for &element_id in &group.element_ids {
            out.set(element_id, value);
        }
    }
    out
}

/// Dense per-element vector from a stored element-scalar result variable.
/// Missing variable, wrong layout or wrong length all fall back to
/// `default` with the explicit flags cleared.
pub fn generate_variable_vector(
    model: &Model,
    kind: crate::variable::VariableKind,
    default: f64,
) -> ElementVector {
    let n_elements = model.mesh().elements().len();
    let mut out = ElementVector::with_default(n_elements, default);
    let stored = model.variable(kind).map(|v| v.values());
    if let Some(crate::variable::VariableValues::ElementScalar(values)) = stored {
        if values.len() == n_elements {
            for (element_id, &value) in values.iter().enumerate() {
                out.set(element_id, value);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_reports_missing_property() {
        let mat = Material::new("steel").with_property(Property::Density, 7850.0);
        assert_eq!(mat.require(Property::Density).unwrap(), 7850.0);
        let err = mat.require(Property::ThermalConductivity).unwrap_err();
        assert!(err.to_string().contains("steel"));
        assert!(err.to_string().contains("ThermalConductivity"));
    }

    #[test]
    fn variable_vector_falls_back_on_layout_mismatch() {
        use crate::variable::{VariableKind, VariableValues};

        let mut model = Model::new(crate::mesh::Mesh::unit_tetra_mesh());
        let out = generate_variable_vector(&model, VariableKind::RadiativeHeat, 0.0);
        assert!(out.explicit.iter().all(|&e| !e));

        model.set_variable(
            VariableKind::RadiativeHeat,
            VariableValues::ElementScalar(vec![1.5, -2.0]),
        );
        let out = generate_variable_vector(&model, VariableKind::RadiativeHeat, 0.0);
        assert_eq!(out.values, vec![1.5, -2.0]);
        assert!(out.explicit.iter().all(|&e| e));

        // Node-scalar layout is not a per-element vector.
        model.set_variable(VariableKind::Temperature, VariableValues::NodeScalar(vec![0.0; 4]));
        let out = generate_variable_vector(&model, VariableKind::Temperature, 300.0);
        assert_eq!(out.values, vec![300.0, 300.0]);
    }
}
