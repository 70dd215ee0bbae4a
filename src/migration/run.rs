use crate::migration::catalog::StepDefinition;
use crate::shared::ids::{ActorId, ProfileId, RunId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (RunStatus::Created, RunStatus::Running)
                | (RunStatus::Running, RunStatus::Paused)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Cancelled)
                | (RunStatus::Paused, RunStatus::Running)
                | (RunStatus::Paused, RunStatus::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Created => "created",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "created" => Ok(RunStatus::Created),
            "running" => Ok(RunStatus::Running),
            "paused" => Ok(RunStatus::Paused),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(format!("unknown run status `{other}`")),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Running, StepStatus::Paused)
                | (StepStatus::Running, StepStatus::Completed)
                | (StepStatus::Running, StepStatus::Failed)
                | (StepStatus::Running, StepStatus::Cancelled)
                | (StepStatus::Paused, StepStatus::Running)
                | (StepStatus::Paused, StepStatus::Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Paused => "paused",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "paused" => Ok(StepStatus::Paused),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "cancelled" => Ok(StepStatus::Cancelled),
            other => Err(format!("unknown step status `{other}`")),
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub profile: ProfileId,
    pub status: RunStatus,
    pub owner_id: ActorId,
    #[serde(default)]
    pub site_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLogEntry {
    pub at: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: String,
    pub run_id: RunId,
    pub step_name: String,
    #[serde(rename = "step_order")]
    pub order: u32,
    pub status: StepStatus,
    pub progress: u8,
    #[serde(default, rename = "start_time")]
    pub started_at: Option<i64>,
    #[serde(default, rename = "end_time")]
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub logs: Vec<StepLogEntry>,
}

impl StepRecord {
    pub fn pending(run_id: &RunId, definition: &StepDefinition) -> Self {
        Self {
            id: run_id.step_record_id(definition.order),
            run_id: run_id.clone(),
            step_name: definition.name.clone(),
            order: definition.order,
            status: StepStatus::Pending,
            progress: 0,
            started_at: None,
            ended_at: None,
            failure_reason: None,
            logs: Vec::new(),
        }
    }

    pub fn push_log(&mut self, at: i64, message: impl Into<String>) {
        self.logs.push(StepLogEntry {
            at,
            message: message.into(),
        });
    }

    /// Running or paused: the record the controller is positioned on.
    pub fn is_active(&self) -> bool {
        matches!(self.status, StepStatus::Running | StepStatus::Paused)
    }
}

/// Checks the structural invariants tying a run's status to its step records.
/// Used when loading state that did not come from this process.
pub fn check_run_invariants(run: &Run, steps: &[StepRecord]) -> Result<(), String> {
    if run.completed_at.is_some() != (run.status == RunStatus::Completed) {
        return Err(format!(
            "completed_at must be set iff status is completed (status `{}`)",
            run.status
        ));
    }

    let mut previous = 0u32;
    for step in steps {
        if step.run_id != run.id {
            return Err(format!(
                "step `{}` belongs to run `{}`",
                step.id, step.run_id
            ));
        }
        if step.order <= previous {
            return Err(format!(
                "step `{}` order {} is not strictly increasing",
                step.id, step.order
            ));
        }
        previous = step.order;
        if step.progress > 100 {
            return Err(format!("step `{}` progress {} exceeds 100", step.id, step.progress));
        }
        if (step.status == StepStatus::Completed) != (step.progress == 100) {
            return Err(format!(
                "step `{}` progress is {} while `{}`",
                step.id, step.progress, step.status
            ));
        }
    }

    if run.status == RunStatus::Created {
        if !steps.is_empty() {
            return Err("created run must not have step records".to_string());
        }
        return Ok(());
    }
    if steps.is_empty() {
        return Err(format!("{} run has no step records", run.status));
    }

    let active = steps
        .iter()
        .position(|step| step.status != StepStatus::Completed);
    let Some(active) = active else {
        if run.status == RunStatus::Completed {
            return Ok(());
        }
        return Err(format!("all steps completed but run is `{}`", run.status));
    };

    let expected = match run.status {
        RunStatus::Running => StepStatus::Running,
        RunStatus::Paused => StepStatus::Paused,
        RunStatus::Failed => StepStatus::Failed,
        RunStatus::Cancelled => StepStatus::Cancelled,
        RunStatus::Completed => {
            return Err(format!(
                "run is completed but step `{}` is `{}`",
                steps[active].id, steps[active].status
            ))
        }
        RunStatus::Created => return Err("created run must not have step records".to_string()),
    };
    if steps[active].status != expected {
        return Err(format!(
            "run is `{}` but active step `{}` is `{}`",
            run.status, steps[active].id, steps[active].status
        ));
    }
    if let Some(later) = steps[active + 1..]
        .iter()
        .find(|step| step.status != StepStatus::Pending)
    {
        return Err(format!(
            "step `{}` after the active step is `{}`",
            later.id, later.status
        ));
    }
    Ok(())
}
