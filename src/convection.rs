//! Convective heat-transfer coefficients.
//!
//! Three boundary-condition flavours feed the heat solver:
//!
//! - *simple* convection: the coefficient is given directly;
//! - *forced* convection: the coefficient comes from a Nusselt-number
//!   correlation selected by regime (internal laminar/turbulent, external);
//! - *natural* convection: the coefficient comes from buoyancy-driven
//!   correlations (Grashof/Rayleigh based), evaluated per element with the
//!   current element temperature.
//!
//! The correlations are the standard engineering power laws; they are not
//! meant to be high-accuracy across all ranges, only consistent with common
//! handbook practice.

use crate::condition::{ComponentKind, Condition};
use crate::error::SolverError;

/// Standard gravity used by the natural-convection correlations.
pub const GRAVITY: f64 = 9.80665;

/// Named convection regimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvectionRegime {
    NaturalExternalVerticalPlane,
    NaturalExternalVerticalCylinder,
    NaturalExternalHorizontalPlate,
    NaturalExternalHorizontalCylinder,
    NaturalExternalSphere,
    ForcedInternalLaminar,
    ForcedInternalTurbulent,
    ForcedExternal,
}

impl ConvectionRegime {
    /// Decode the numeric `Regime` component carried by convection
    /// conditions.
    pub fn from_code(code: f64) -> Option<Self> {
        match code as i64 {
            0 => Some(Self::NaturalExternalVerticalPlane),
            1 => Some(Self::NaturalExternalVerticalCylinder),
            2 => Some(Self::NaturalExternalHorizontalPlate),
            3 => Some(Self::NaturalExternalHorizontalCylinder),
            4 => Some(Self::NaturalExternalSphere),
            5 => Some(Self::ForcedInternalLaminar),
            6 => Some(Self::ForcedInternalTurbulent),
            7 => Some(Self::ForcedExternal),
            _ => None,
        }
    }

    /// Regime requested by a condition, falling back to `default` when the
    /// component is absent or out of range.
    pub fn of_condition(condition: &Condition, default: Self) -> Self {
        condition
            .get(ComponentKind::Regime)
            .and_then(Self::from_code)
            .unwrap_or(default)
    }
}

/// Grashof number `g beta dT L^3 / nu^2`.
pub fn grashof(beta: f64, delta_t: f64, length: f64, kinematic_viscosity: f64) -> f64 {
    GRAVITY * beta * delta_t.abs() * length.powi(3) / kinematic_viscosity.powi(2)
}

/// Prandtl number `mu c / k`.
pub fn prandtl(dynamic_viscosity: f64, heat_capacity: f64, conductivity: f64) -> f64 {
    dynamic_viscosity * heat_capacity / conductivity
}

/// Rayleigh number `Gr Pr`.
pub fn rayleigh(gr: f64, pr: f64) -> f64 {
    gr * pr
}

/// Reynolds number `rho v L / mu`.
pub fn reynolds(density: f64, velocity: f64, length: f64, dynamic_viscosity: f64) -> f64 {
    density * velocity.abs() * length / dynamic_viscosity
}

/// Nusselt number for a given regime.
///
/// Natural regimes use the Rayleigh number, forced regimes the Reynolds and
/// Prandtl numbers. Laminar internal flow returns the fully developed
/// constant-wall-temperature value.
pub fn nusselt(regime: ConvectionRegime, ra: f64, re: f64, pr: f64) -> f64 {
    match regime {
        ConvectionRegime::NaturalExternalVerticalPlane
        | ConvectionRegime::NaturalExternalVerticalCylinder => {
            if ra < 1e9 {
                0.59 * ra.powf(0.25)
            } else {
                0.10 * ra.powf(1.0 / 3.0)
            }
        }
        ConvectionRegime::NaturalExternalHorizontalPlate => 0.54 * ra.powf(0.25),
        ConvectionRegime::NaturalExternalHorizontalCylinder => 0.53 * ra.powf(0.25),
        ConvectionRegime::NaturalExternalSphere => 2.0 + 0.43 * ra.powf(0.25),
        ConvectionRegime::ForcedInternalLaminar => 3.66,
        ConvectionRegime::ForcedInternalTurbulent => 0.023 * re.powf(0.8) * pr.powf(0.4),
        ConvectionRegime::ForcedExternal => 0.664 * re.sqrt() * pr.powf(1.0 / 3.0),
    }
}

/// Heat-transfer coefficient and ambient temperature of a convection BC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvectionCoefficient {
    pub coefficient: f64,
    pub ambient_temperature: f64,
}

/// Simple convection: coefficient given directly on the condition.
pub fn simple_convection(condition: &Condition) -> Result<ConvectionCoefficient, SolverError> {
    Ok(ConvectionCoefficient {
        coefficient: condition.require(ComponentKind::ConvectionCoefficient)?,
        ambient_temperature: condition.require(ComponentKind::AmbientTemperature)?,
    })
}

/// Forced convection: coefficient from a Reynolds/Prandtl correlation.
pub fn forced_convection(
    condition: &Condition,
    regime: ConvectionRegime,
) -> Result<ConvectionCoefficient, SolverError> {
    let velocity = condition.require(ComponentKind::Velocity)?;
    let length = condition.require(ComponentKind::CharacteristicLength)?;
    let k = condition.require(ComponentKind::FluidConductivity)?;
    let mu = condition.require(ComponentKind::FluidViscosity)?;
    let rho = condition.require(ComponentKind::FluidDensity)?;
    let c = condition.require(ComponentKind::FluidHeatCapacity)?;

    let re = reynolds(rho, velocity, length, mu);
    let pr = prandtl(mu, c, k);
    let nu = nusselt(regime, 0.0, re, pr);
    Ok(ConvectionCoefficient {
        coefficient: nu * k / length,
        ambient_temperature: condition.require(ComponentKind::AmbientTemperature)?,
    })
}

/// Natural convection: coefficient from buoyancy correlations, evaluated
/// with the current element (surface) temperature.
pub fn natural_convection(
    condition: &Condition,
    regime: ConvectionRegime,
    element_temperature: f64,
) -> Result<ConvectionCoefficient, SolverError> {
    let ambient = condition.require(ComponentKind::AmbientTemperature)?;
    let length = condition.require(ComponentKind::CharacteristicLength)?;
    let k = condition.require(ComponentKind::FluidConductivity)?;
    let mu = condition.require(ComponentKind::FluidViscosity)?;
    let rho = condition.require(ComponentKind::FluidDensity)?;
    let c = condition.require(ComponentKind::FluidHeatCapacity)?;
    // Ideal-gas default when the expansion coefficient is not supplied:
    // beta = 1/T_film.
    let film = 0.5 * (element_temperature + ambient);
    let beta = condition.get_or(ComponentKind::FluidThermalExpansion, 1.0 / film.max(1.0));

    let nu_kinematic = mu / rho;
    let gr = grashof(beta, element_temperature - ambient, length, nu_kinematic);
    let pr = prandtl(mu, c, k);
    let ra = rayleigh(gr, pr);
    let nu = nusselt(regime, ra, 0.0, pr);
    Ok(ConvectionCoefficient {
        coefficient: nu * k / length,
        ambient_temperature: ambient,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::ConditionType;
    use matrixcompare::assert_scalar_eq;

    fn air_condition(condition_type: ConditionType) -> Condition {
        Condition::new(condition_type)
            .with_component(ComponentKind::AmbientTemperature, 293.15)
            .with_component(ComponentKind::CharacteristicLength, 0.5)
            .with_component(ComponentKind::FluidConductivity, 0.026)
            .with_component(ComponentKind::FluidViscosity, 1.8e-5)
            .with_component(ComponentKind::FluidDensity, 1.2)
            .with_component(ComponentKind::FluidHeatCapacity, 1005.0)
    }

    #[test]
    fn dimensionless_numbers() {
        assert_scalar_eq!(prandtl(1.8e-5, 1005.0, 0.026), 0.6958, comp = abs, tol = 1e-3);
        assert_scalar_eq!(reynolds(1.2, 2.0, 0.5, 1.8e-5), 66666.7, comp = abs, tol = 1.0);
        let gr = grashof(1.0 / 300.0, 10.0, 0.5, 1.5e-5);
        assert!(gr > 1e8 && gr < 1e9);
    }

    #[test]
    fn dittus_boelter_matches_handbook() {
        // Re = 1e4, Pr = 0.7: Nu = 0.023 * 10^3.2 * 0.7^0.4 ~ 31.5
        let nu = nusselt(ConvectionRegime::ForcedInternalTurbulent, 0.0, 1e4, 0.7);
        assert_scalar_eq!(nu, 31.5, comp = abs, tol = 0.5);
    }

    #[test]
    fn natural_coefficient_grows_with_temperature_difference() {
        let bc = air_condition(ConditionType::NaturalConvection);
        let cold = natural_convection(&bc, ConvectionRegime::NaturalExternalVerticalPlane, 298.15)
            .unwrap();
        let hot = natural_convection(&bc, ConvectionRegime::NaturalExternalVerticalPlane, 343.15)
            .unwrap();
        assert!(hot.coefficient > cold.coefficient);
        assert!(cold.coefficient > 0.0);
    }

    #[test]
    fn missing_component_is_a_configuration_error() {
        let bc = Condition::new(ConditionType::ForcedConvection)
            .with_component(ComponentKind::Velocity, 1.0);
        let err = forced_convection(&bc, ConvectionRegime::ForcedExternal).unwrap_err();
        assert!(err.to_string().contains("ForcedConvection"));
    }
}
