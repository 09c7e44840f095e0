//! Per-node local coordinate rotations for skewed boundary conditions.

use nalgebra::{DVector, Matrix3, Rotation3, Unit, Vector3};

use crate::condition::{ComponentKind, ConditionType};
use crate::model::Model;

/// Optional per-node rotation into a locally rotated frame.
///
/// A rotation is active only at nodes where a `LocalDirection` condition was
/// requested; everywhere else the node is a no-op (identity). Both the
/// rotation and its inverse are stored so that results can be mapped in
/// either direction without recomputation.
#[derive(Debug, Clone)]
pub struct LocalRotation {
    rotations: Vec<Option<(Matrix3<f64>, Matrix3<f64>)>>,
}

impl LocalRotation {
    pub fn identity(n_nodes: usize) -> Self {
        Self {
            rotations: vec![None; n_nodes],
        }
    }

    /// Refresh from the model's `LocalDirection` conditions: the condition's
    /// (X, Y, Z) components give the rotated frame's first axis.
    pub fn from_model(model: &Model) -> Self {
        let mut out = Self::identity(model.mesh().nodes().len());
        for (node, condition) in model.node_conditions(ConditionType::LocalDirection) {
            let direction = Vector3::new(
                condition.get_or(ComponentKind::X, 1.0),
                condition.get_or(ComponentKind::Y, 0.0),
                condition.get_or(ComponentKind::Z, 0.0),
            );
            if direction.norm() > 0.0 {
                out.activate(node, &direction);
            }
        }
        out
    }

    /// Activate a rotation at `node` taking the global x axis onto
    /// `direction`.
    pub fn activate(&mut self, node: usize, direction: &Vector3<f64>) {
        let dir = Unit::new_normalize(*direction);
        let r = Rotation3::rotation_between(&Vector3::x(), &dir)
            .unwrap_or_else(|| Rotation3::from_axis_angle(&Vector3::z_axis(), std::f64::consts::PI));
        let m = *r.matrix();
        self.rotations[node] = Some((m, m.transpose()));
    }

    pub fn deactivate(&mut self, node: usize) {
        self.rotations[node] = None;
    }

    pub fn is_active(&self, node: usize) -> bool {
        self.rotations[node].is_some()
    }

    pub fn rotation(&self, node: usize) -> Option<&Matrix3<f64>> {
        self.rotations[node].as_ref().map(|(r, _)| r)
    }

    pub fn inverse(&self, node: usize) -> Option<&Matrix3<f64>> {
        self.rotations[node].as_ref().map(|(_, inv)| inv)
    }

    pub fn rotate_vector(&self, node: usize, v: &Vector3<f64>) -> Vector3<f64> {
        match &self.rotations[node] {
            Some((r, _)) => r * v,
            None => *v,
        }
    }

    pub fn rotate_vector_inverse(&self, node: usize, v: &Vector3<f64>) -> Vector3<f64> {
        match &self.rotations[node] {
            Some((_, inv)) => inv * v,
            None => *v,
        }
    }

    /// Rotate a 3-dof-per-node results vector in place.
    pub fn rotate_results_vector(&self, results: &mut DVector<f64>, inverse: bool) {
        assert_eq!(results.len(), 3 * self.rotations.len());
        for (node, rot) in self.rotations.iter().enumerate() {
            let Some((r, inv)) = rot else { continue };
            let m = if inverse { inv } else { r };
            let v = Vector3::new(results[3 * node], results[3 * node + 1], results[3 * node + 2]);
            let rotated = m * v;
            results[3 * node] = rotated.x;
            results[3 * node + 1] = rotated.y;
            results[3 * node + 2] = rotated.z;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_is_identity() {
        let mut rotation = LocalRotation::identity(2);
        rotation.activate(1, &Vector3::new(1.0, 2.0, -0.5));

        let original = DVector::from_vec(vec![0.3, -1.2, 2.5, 0.7, 0.1, -0.9]);
        let mut v = original.clone();
        rotation.rotate_results_vector(&mut v, false);
        rotation.rotate_results_vector(&mut v, true);
        assert!((&v - &original).norm() < 1e-13);
    }

    #[test]
    fn inactive_nodes_are_untouched() {
        let mut rotation = LocalRotation::identity(2);
        rotation.activate(1, &Vector3::new(0.0, 1.0, 0.0));

        let v = Vector3::new(1.0, 2.0, 3.0);
        assert_eq!(rotation.rotate_vector(0, &v), v);
        assert_ne!(rotation.rotate_vector(1, &v), v);
    }
}
