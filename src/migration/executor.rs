use crate::migration::catalog::StepDefinition;
use crate::shared::ids::RunId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step did one more quantum of work.
    Advanced,
    Failed { reason: String },
}

/// Performs the work behind one progress quantum of a step.
///
/// The controller calls `execute` once per tick with the progress reached so
/// far; it never calls two steps of the same run concurrently. Implementations
/// run under the run's lock, so they must not call back into the run handle.
pub trait StepExecutor: Send + Sync {
    fn execute(&self, run_id: &RunId, step: &StepDefinition, progress: u8) -> StepOutcome;
}

/// Does no work; every quantum succeeds. Pacing comes from the driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedExecutor;

impl StepExecutor for SimulatedExecutor {
    fn execute(&self, _run_id: &RunId, _step: &StepDefinition, _progress: u8) -> StepOutcome {
        StepOutcome::Advanced
    }
}
