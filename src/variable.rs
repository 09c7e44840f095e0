//! Named result variables stored on the model.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableKind {
    Temperature,
    HeatFlux,
    RadiativeHeat,
    Displacement,
    VonMisesStress,
    ParticleConcentration,
    ParticleVelocity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariableValues {
    NodeScalar(Vec<f64>),
    NodeVector(Vec<Vector3<f64>>),
    ElementScalar(Vec<f64>),
    ElementVector(Vec<Vector3<f64>>),
}

impl VariableValues {
    pub fn len(&self) -> usize {
        match self {
            Self::NodeScalar(v) | Self::ElementScalar(v) => v.len(),
            Self::NodeVector(v) | Self::ElementVector(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar magnitudes, used for display ranges and statistics.
    pub fn magnitudes(&self) -> Vec<f64> {
        match self {
            Self::NodeScalar(v) | Self::ElementScalar(v) => v.clone(),
            Self::NodeVector(v) | Self::ElementVector(v) => v.iter().map(|x| x.norm()).collect(),
        }
    }
}

/// A named result variable with a display range.
///
/// The display range is recorded when the variable is first created and is
/// deliberately *not* updated on subsequent stores, so that time-stepped
/// results keep a stable color scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    kind: VariableKind,
    values: VariableValues,
    display_range: Option<(f64, f64)>,
}

impl Variable {
    pub fn new(kind: VariableKind, values: VariableValues) -> Self {
        let display_range = Self::range_of(&values);
        Self {
            kind,
            values,
            display_range,
        }
    }

    fn range_of(values: &VariableValues) -> Option<(f64, f64)> {
        let mags = values.magnitudes();
        let min = mags.iter().copied().fold(f64::INFINITY, f64::min);
        let max = mags.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (min <= max).then_some((min, max))
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn values(&self) -> &VariableValues {
        &self.values
    }

    pub fn display_range(&self) -> Option<(f64, f64)> {
        self.display_range
    }

    /// Overwrite the values, keeping the original display range.
    pub fn update(&mut self, values: VariableValues) {
        self.values = values;
    }

    pub fn scale_in_place(&mut self, factor: f64) {
        match &mut self.values {
            VariableValues::NodeScalar(v) | VariableValues::ElementScalar(v) => {
                v.iter_mut().for_each(|x| *x *= factor)
            }
            VariableValues::NodeVector(v) | VariableValues::ElementVector(v) => {
                v.iter_mut().for_each(|x| *x *= factor)
            }
        }
    }

    pub fn as_node_scalar(&self) -> Option<&[f64]> {
        match &self.values {
            VariableValues::NodeScalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_element_scalar(&self) -> Option<&[f64]> {
        match &self.values {
            VariableValues::ElementScalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_node_vector(&self) -> Option<&[Vector3<f64>]> {
        match &self.values {
            VariableValues::NodeVector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_element_vector(&self) -> Option<&[Vector3<f64>]> {
        match &self.values {
            VariableValues::ElementVector(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_range_fixed_at_creation() {
        let mut var = Variable::new(
            VariableKind::Temperature,
            VariableValues::NodeScalar(vec![280.0, 300.0, 320.0]),
        );
        assert_eq!(var.display_range(), Some((280.0, 320.0)));

        var.update(VariableValues::NodeScalar(vec![100.0, 500.0, 200.0]));
        assert_eq!(var.display_range(), Some((280.0, 320.0)));
    }

    #[test]
    fn vector_magnitudes() {
        let values = VariableValues::ElementVector(vec![Vector3::new(3.0, 4.0, 0.0)]);
        assert_eq!(values.magnitudes(), vec![5.0]);
    }
}
