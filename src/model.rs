//! The in-memory model consumed by the solvers: mesh, element groups,
//! materials, conditions, result variables and run configuration.

use std::path::PathBuf;

use log::warn;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::condition::{Condition, ConditionType};
use crate::material::Material;
use crate::mesh::Mesh;
use crate::patch::PatchInput;
use crate::variable::{Variable, VariableKind, VariableValues};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    Point,
    Line,
    Surface,
    Volume,
}

/// A named collection of elements sharing material and conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementGroup {
    pub id: u32,
    pub name: String,
    pub kind: GroupKind,
    pub element_ids: Vec<usize>,
    /// Index into the model's material table.
    pub material: Option<usize>,
    pub conditions: Vec<Condition>,
    /// Artificial thickness for surface groups standing in for thin volumes.
    pub artificial_thickness: f64,
    /// Artificial cross-section area for line groups.
    pub artificial_cross_area: f64,
    /// Artificial volume for point groups.
    pub artificial_volume: f64,
}

impl ElementGroup {
    pub fn new(id: u32, name: impl Into<String>, kind: GroupKind, element_ids: Vec<usize>) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            element_ids,
            material: None,
            conditions: Vec::new(),
            artificial_thickness: 1.0,
            artificial_cross_area: 1.0,
            artificial_volume: 1.0,
        }
    }

    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type() == condition_type)
    }
}

/// Time-stepping configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSolver {
    pub enabled: bool,
    pub current_step: usize,
    pub n_steps: usize,
    pub dt: f64,
    /// Store results every this many steps (0 stores every step).
    pub output_frequency: usize,
}

impl Default for TimeSolver {
    fn default() -> Self {
        Self {
            enabled: false,
            current_step: 0,
            n_steps: 1,
            dt: 1.0,
            output_frequency: 0,
        }
    }
}

impl TimeSolver {
    /// Whether results of the current step should be persisted.
    pub fn should_output(&self) -> bool {
        self.output_frequency == 0
            || self.current_step % self.output_frequency == 0
            || self.current_step + 1 == self.n_steps
    }
}

/// Matrix-solver configuration sourced from the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixSolverSettings {
    pub method: String,
    pub max_outer: usize,
    pub max_inner: usize,
    pub tolerance: f64,
    pub output_frequency: usize,
}

impl Default for MatrixSolverSettings {
    fn default() -> Self {
        Self {
            method: "CG".to_string(),
            max_outer: 10_000,
            max_inner: 30,
            tolerance: 1e-10,
            output_frequency: 0,
        }
    }
}

impl MatrixSolverSettings {
    pub fn to_config(&self) -> radfem_sparse::SolverConfig {
        let method = radfem_sparse::SolverMethod::from_name(&self.method).unwrap_or_else(|| {
            warn!("unknown matrix solver '{}', falling back to CG", self.method);
            radfem_sparse::SolverMethod::ConjugateGradient
        });
        radfem_sparse::SolverConfig {
            method,
            max_outer: self.max_outer,
            max_inner: self.max_inner,
            tol: self.tolerance,
            output_frequency: self.output_frequency,
        }
    }
}

/// Radiation problem setup: hemicube resolution and per-surface patch inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RadiationSetup {
    pub resolution: u32,
    pub patch_inputs: Vec<PatchInput>,
    /// Where the computed view-factor matrix is persisted for reuse across
    /// time steps with unchanged geometry.
    pub view_factor_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    mesh: Mesh,
    groups: Vec<ElementGroup>,
    materials: Vec<Material>,
    variables: FxHashMap<VariableKind, Variable>,
    /// Global environment conditions (ambient temperature, gravity, ...).
    pub environment: Vec<Condition>,
    pub time: TimeSolver,
    pub matrix_solver: MatrixSolverSettings,
    pub radiation: RadiationSetup,
}

impl Model {
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            ..Self::default()
        }
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut Mesh {
        &mut self.mesh
    }

    pub fn groups(&self) -> &[ElementGroup] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut Vec<ElementGroup> {
        &mut self.groups
    }

    pub fn add_group(&mut self, group: ElementGroup) {
        self.groups.push(group);
    }

    pub fn add_material(&mut self, material: Material) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn material(&self, id: usize) -> Option<&Material> {
        self.materials.get(id)
    }

    pub fn variable(&self, kind: VariableKind) -> Option<&Variable> {
        self.variables.get(&kind)
    }

    pub fn variables_mut(&mut self) -> impl Iterator<Item = &mut Variable> {
        self.variables.values_mut()
    }

    /// Create or update a named result variable. The display range is
    /// computed only when the variable is first created.
    pub fn set_variable(&mut self, kind: VariableKind, values: VariableValues) {
        match self.variables.get_mut(&kind) {
            Some(existing) => existing.update(values),
            None => {
                self.variables.insert(kind, Variable::new(kind, values));
            }
        }
    }

    pub fn environment_condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.environment
            .iter()
            .find(|c| c.condition_type() == condition_type)
    }

    /// Map from node id to the governing condition of the given type.
    /// When several groups impose a condition on the same node, the last
    /// group in declaration order wins.
    pub fn node_conditions(&self, condition_type: ConditionType) -> FxHashMap<usize, &Condition> {
        let mut out = FxHashMap::default();
        for group in &self.groups {
            let Some(condition) = group.condition(condition_type) else {
                continue;
            };
            for &element_id in &group.element_ids {
                for &node_id in self.mesh.elements()[element_id].node_ids() {
                    out.insert(node_id, condition);
                }
            }
        }
        out
    }
}
