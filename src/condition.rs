//! Boundary, initial and environment conditions.
//!
//! A condition is a typed bag of named numeric components. Lookups of
//! required components fail with a configuration error that names both the
//! missing component and the owning condition type, which is what surfaces
//! in the log when a model is under-specified.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::SolverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    // Boundary conditions.
    Temperature,
    HeatRate,
    HeatFlux,
    SimpleConvection,
    ForcedConvection,
    NaturalConvection,
    Displacement,
    Force,
    Pressure,
    ParticleConcentration,
    ParticleRate,
    /// Requests a locally rotated coordinate frame at the affected nodes.
    LocalDirection,
    // Initial conditions.
    InitialTemperature,
    InitialParticleConcentration,
    InitialVelocity,
    // Environment conditions.
    AmbientTemperature,
    Gravity,
}

impl ConditionType {
    /// Explicit conditions prescribe the primary unknown and remove the
    /// affected nodes from the unknown vector.
    pub fn is_explicit(&self) -> bool {
        matches!(
            self,
            Self::Temperature | Self::Displacement | Self::ParticleConcentration
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    Value,
    X,
    Y,
    Z,
    ConvectionCoefficient,
    AmbientTemperature,
    /// Numeric convection-regime selector, decoded by the convection module.
    Regime,
    Velocity,
    CharacteristicLength,
    FluidConductivity,
    FluidDensity,
    FluidViscosity,
    FluidHeatCapacity,
    FluidThermalExpansion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    condition_type: ConditionType,
    components: FxHashMap<ComponentKind, f64>,
}

impl Condition {
    pub fn new(condition_type: ConditionType) -> Self {
        Self {
            condition_type,
            components: FxHashMap::default(),
        }
    }

    pub fn condition_type(&self) -> ConditionType {
        self.condition_type
    }

    pub fn with_component(mut self, kind: ComponentKind, value: f64) -> Self {
        self.components.insert(kind, value);
        self
    }

    /// Convenience for scalar conditions carrying a single `Value`.
    pub fn scalar(condition_type: ConditionType, value: f64) -> Self {
        Self::new(condition_type).with_component(ComponentKind::Value, value)
    }

    /// Convenience for vector-valued conditions (displacement, force, ...).
    pub fn vector(condition_type: ConditionType, x: f64, y: f64, z: f64) -> Self {
        Self::new(condition_type)
            .with_component(ComponentKind::X, x)
            .with_component(ComponentKind::Y, y)
            .with_component(ComponentKind::Z, z)
    }

    pub fn get(&self, kind: ComponentKind) -> Option<f64> {
        self.components.get(&kind).copied()
    }

    pub fn get_or(&self, kind: ComponentKind, default: f64) -> f64 {
        self.get(kind).unwrap_or(default)
    }

    pub fn require(&self, kind: ComponentKind) -> Result<f64, SolverError> {
        self.get(kind).ok_or(SolverError::MissingComponent {
            condition: self.condition_type,
            component: kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_names_missing_component() {
        let bc = Condition::new(ConditionType::SimpleConvection)
            .with_component(ComponentKind::ConvectionCoefficient, 12.5);
        assert_eq!(bc.require(ComponentKind::ConvectionCoefficient).unwrap(), 12.5);

        let err = bc.require(ComponentKind::AmbientTemperature).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("SimpleConvection"));
        assert!(msg.contains("AmbientTemperature"));
    }

    #[test]
    fn explicit_classification() {
        assert!(ConditionType::Temperature.is_explicit());
        assert!(ConditionType::Displacement.is_explicit());
        assert!(!ConditionType::HeatFlux.is_explicit());
    }
}
