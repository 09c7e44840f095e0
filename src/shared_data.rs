//! Cross-physics data exchange within a coupled multi-physics task.
//!
//! Solvers write named fields after their run and sibling solvers read them
//! back before the next. The store is cleared at the start of a task unless
//! an iteration is being continued.

use nalgebra::DVector;
use rustc_hash::FxHashMap;

/// Well-known field names used by the built-in solvers.
pub mod keys {
    pub const ELEMENT_TEMPERATURE: &str = "element-temperature";
    pub const ELEMENT_RADIATIVE_HEAT: &str = "element-radiative-heat";
    pub const ELEMENT_VELOCITY: &str = "element-velocity";
    pub const NODE_TEMPERATURE: &str = "node-temperature";
}

#[derive(Debug, Clone, Default)]
pub struct SharedData {
    fields: FxHashMap<String, DVector<f64>>,
}

impl SharedData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, values: DVector<f64>) {
        self.fields.insert(name.into(), values);
    }

    pub fn get(&self, name: &str) -> Option<&DVector<f64>> {
        self.fields.get(name)
    }

    pub fn take(&mut self, name: &str) -> Option<DVector<f64>> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Clear all fields; called at the start of a multi-physics task unless
    /// an iteration is being continued.
    pub fn clear(&mut self) {
        self.fields.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_round_trip() {
        let mut shared = SharedData::new();
        shared.set(keys::ELEMENT_TEMPERATURE, DVector::from_element(3, 300.0));
        assert!(shared.contains(keys::ELEMENT_TEMPERATURE));
        assert_eq!(shared.get(keys::ELEMENT_TEMPERATURE).unwrap().len(), 3);
        shared.clear();
        assert!(!shared.contains(keys::ELEMENT_TEMPERATURE));
    }
}
