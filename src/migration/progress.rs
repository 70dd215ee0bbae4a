use crate::migration::run::{Run, RunStatus, StepRecord, StepStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunProgress {
    pub run_id: String,
    pub profile: String,
    pub status: RunStatus,
    pub overall_percent: u8,
    pub completed_steps: usize,
    pub total_steps: usize,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub current_step_progress: Option<u8>,
    #[serde(default)]
    pub failed_step: Option<String>,
    pub summary: String,
}

impl RunProgress {
    pub fn from_records(run: &Run, steps: &[StepRecord]) -> Self {
        let total_steps = steps.len();
        let completed_steps = steps
            .iter()
            .filter(|step| step.status == StepStatus::Completed)
            .count();
        let overall_percent = if total_steps == 0 {
            if run.status == RunStatus::Completed {
                100
            } else {
                0
            }
        } else {
            let sum = steps
                .iter()
                .map(|step| u64::from(step.progress.min(100)))
                .sum::<u64>();
            (sum / total_steps as u64) as u8
        };
        let active = steps.iter().find(|step| step.is_active());
        let failed_step = steps
            .iter()
            .find(|step| step.status == StepStatus::Failed)
            .map(|step| step.step_name.clone());

        let summary = match run.status {
            RunStatus::Created => "created; waiting for start".to_string(),
            RunStatus::Completed => format!("completed ({completed_steps}/{total_steps} steps)"),
            // Only the step name is surfaced; failure details stay on the record.
            RunStatus::Failed => match &failed_step {
                Some(name) => format!("failed at step `{name}`"),
                None => "failed".to_string(),
            },
            RunStatus::Cancelled => {
                format!("cancelled after {completed_steps}/{total_steps} steps")
            }
            RunStatus::Running | RunStatus::Paused => match active {
                Some(step) => format!(
                    "{}: {} {}% ({completed_steps}/{total_steps} steps complete, {overall_percent}% overall)",
                    run.status, step.step_name, step.progress
                ),
                None => run.status.to_string(),
            },
        };

        Self {
            run_id: run.id.to_string(),
            profile: run.profile.to_string(),
            status: run.status,
            overall_percent,
            completed_steps,
            total_steps,
            current_step: active.map(|step| step.step_name.clone()),
            current_step_progress: active.map(|step| step.progress),
            failed_step,
            summary,
        }
    }
}
