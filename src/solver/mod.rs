//! Generic orchestration of a physics-solver run.
//!
//! Every physics implements [`PhysicsSolver`]; the [`SolverDriver`] owns
//! the run cycle, the cross-physics [`SharedData`] store, the convergence
//! log and the stage timings, and drives one or more solvers through
//! coupled task iterations.

pub mod fluid_particle;
pub mod heat;
pub mod radiative_heat;
pub mod stress;

pub(crate) mod tetra;

pub use fluid_particle::FluidParticleSolver;
pub use heat::HeatSolver;
pub use radiative_heat::RadiativeHeatSolver;
pub use stress::StressSolver;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::convergence::{percentile, ConvergenceLog, RunStatistics};
use crate::error::SolverError;
use crate::model::Model;
use crate::scales::Scales;
use crate::shared_data::SharedData;
use crate::variable::VariableKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsKind {
    Heat,
    RadiativeHeat,
    Stress,
    FluidParticle,
}

impl PhysicsKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::RadiativeHeat => "radiative-heat",
            Self::Stress => "stress",
            Self::FluidParticle => "fluid-particle",
        }
    }
}

/// One physics problem, driven through the cycle by [`SolverDriver::run`].
///
/// The default implementations make every stage optional; a solver only
/// overrides the stages its physics needs.
pub trait PhysicsSolver {
    fn kind(&self) -> PhysicsKind;

    /// Scale factors for non-dimensionalization, identity to skip.
    fn scales(&self, _model: &Model) -> Scales {
        Scales::identity()
    }

    /// First-task-iteration bookkeeping: computable elements, node book and
    /// local rotations.
    fn update_books(&mut self, model: &Model) -> Result<(), SolverError>;

    /// Pull fields shared by sibling solvers in the same task.
    fn recover_shared(&mut self, _model: &Model, _shared: &SharedData) {}

    /// Pull last-known field values from model variables into working
    /// vectors.
    fn recover(&mut self, model: &Model);

    /// Build element systems and assemble the global system.
    fn prepare(&mut self, model: &Model, abort: &AtomicBool) -> Result<(), SolverError>;

    /// Solve for the primary field.
    fn solve(&mut self, model: &Model) -> Result<(), SolverError>;

    /// Derive secondary fields from the solved primary field.
    fn process(&mut self, model: &Model) -> Result<(), SolverError>;

    /// Write result variables back onto the model.
    fn store(&mut self, model: &mut Model);

    /// Publish fields for sibling solvers.
    fn share(&self, _model: &Model, _shared: &mut SharedData) {}

    /// Undo any temporary geometry changes applied during the run.
    fn restore_geometry(&mut self, _model: &mut Model) {}

    /// Keyed convergence values recorded in the convergence log.
    fn statistics(&self) -> Vec<(&'static str, f64)> {
        Vec::new()
    }

    /// Result variables summarized with percentile statistics.
    fn result_variables(&self) -> Vec<VariableKind> {
        Vec::new()
    }

    /// Whether the solver's nonlinear/coupling iteration has converged.
    /// Linear one-shot physics return `true` unconditionally.
    fn has_converged(&self) -> bool {
        true
    }
}

/// Owns the run cycle and everything shared between physics solvers of a
/// task: the data store, the abort flag, the convergence log and stage
/// timings.
pub struct SolverDriver {
    shared: SharedData,
    abort: Arc<AtomicBool>,
    convergence_log: ConvergenceLog,
    statistics: RunStatistics,
}

impl Default for SolverDriver {
    fn default() -> Self {
        Self::new(ConvergenceLog::disabled())
    }
}

impl SolverDriver {
    pub fn new(convergence_log: ConvergenceLog) -> Self {
        Self {
            shared: SharedData::new(),
            abort: Arc::new(AtomicBool::new(false)),
            convergence_log,
            statistics: RunStatistics::new(),
        }
    }

    /// Clone of the abort flag, to be handed to whatever can cancel a run.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn shared(&mut self) -> &mut SharedData {
        &mut self.shared
    }

    /// Run one physics through the full cycle for the current time step.
    ///
    /// `task_iteration` counts coupled iterations within a multi-physics
    /// task; bookkeeping is refreshed only on iteration zero.
    pub fn run(
        &mut self,
        solver: &mut dyn PhysicsSolver,
        model: &mut Model,
        task_iteration: usize,
    ) -> Result<(), SolverError> {
        if self.abort.load(Ordering::Relaxed) {
            return Err(SolverError::Aborted);
        }
        let name = solver.kind().name();
        info!(
            "{name}: step {} iteration {task_iteration}",
            model.time.current_step
        );

        if task_iteration == 0 {
            self.statistics.measure("update-books", || solver.update_books(model))?;
        }

        let scales = solver.scales(model);
        scales.downscale(model);

        // Everything between downscale and upscale must run, even on error,
        // so the model is never left in scaled units.
        let result = self.run_scaled(solver, model, task_iteration);
        scales.upscale(model);
        result?;

        solver.restore_geometry(model);

        if model.time.should_output() {
            self.persist(model);
        }

        self.record_statistics(solver, model, task_iteration);
        Ok(())
    }

    fn run_scaled(
        &mut self,
        solver: &mut dyn PhysicsSolver,
        model: &mut Model,
        _task_iteration: usize,
    ) -> Result<(), SolverError> {
        let shared = &self.shared;
        solver.recover_shared(model, shared);
        solver.recover(model);
        let abort = &self.abort;
        self.statistics.measure("prepare", || solver.prepare(model, abort))?;
        self.statistics.measure("solve", || solver.solve(model))?;
        self.statistics.measure("process", || solver.process(model))?;
        solver.store(model);
        solver.share(model, &mut self.shared);
        Ok(())
    }

    fn persist(&mut self, _model: &Model) {
        // Session persistence belongs to the embedding application; the
        // driver only honors the output-frequency throttle by flushing the
        // convergence log at output steps.
        self.convergence_log.flush();
    }

    fn record_statistics(
        &mut self,
        solver: &dyn PhysicsSolver,
        model: &Model,
        task_iteration: usize,
    ) {
        for (key, value) in solver.statistics() {
            self.convergence_log
                .record(model.time.current_step, task_iteration, key, value);
        }
        for kind in solver.result_variables() {
            let Some(variable) = model.variable(kind) else {
                continue;
            };
            let magnitudes = variable.values().magnitudes();
            info!(
                "{:?}: median {:.4e}, p90 {:.4e}, max {:.4e}",
                kind,
                percentile(&magnitudes, 0.5),
                percentile(&magnitudes, 0.9),
                percentile(&magnitudes, 1.0),
            );
        }
    }

    /// Run a coupled multi-physics task: iterate all solvers in order until
    /// each reports convergence, up to `max_iterations`. The shared store
    /// is cleared at task start. Returns the number of iterations used.
    pub fn run_task(
        &mut self,
        solvers: &mut [&mut dyn PhysicsSolver],
        model: &mut Model,
        max_iterations: usize,
    ) -> Result<usize, SolverError> {
        self.shared.clear();
        for iteration in 0..max_iterations {
            let mut converged = true;
            for solver in solvers.iter_mut() {
                self.run(*solver, model, iteration)?;
                converged &= solver.has_converged();
            }
            if converged {
                return Ok(iteration + 1);
            }
        }
        warn!("task did not converge within {max_iterations} iterations");
        Ok(max_iterations)
    }

    /// Log the accumulated stage timings.
    pub fn log_statistics(&self) {
        self.statistics.log_summary();
    }
}
