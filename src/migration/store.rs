use crate::migration::run::{Run, StepRecord};
use crate::shared::ids::RunId;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("sqlite open failed at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("sqlite statement failed: {source}")]
    Sql {
        #[source]
        source: rusqlite::Error,
    },
    #[error("stored row is invalid: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable home of runs and their step records.
///
/// `save` upserts the run row and the given step rows by key; implementations
/// apply it as a unit where the backend allows. Reads of step records are
/// always sorted by order.
pub trait RunStore: Send + Sync {
    fn save(&self, run: &Run, steps: &[StepRecord]) -> Result<(), StoreError>;
    fn load_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError>;
    fn load_steps(&self, run_id: &RunId) -> Result<Vec<StepRecord>, StoreError>;
    /// Newest first.
    fn list_runs(&self) -> Result<Vec<Run>, StoreError>;
    /// Removes the run and all of its step records. `false` if it did not exist.
    fn delete_run(&self, run_id: &RunId) -> Result<bool, StoreError>;
}

pub(crate) fn ensure_steps_belong_to(run: &Run, steps: &[StepRecord]) -> Result<(), StoreError> {
    match steps.iter().find(|step| step.run_id != run.id) {
        Some(step) => Err(StoreError::Corrupt(format!(
            "step `{}` belongs to run `{}`, not `{}`",
            step.id, step.run_id, run.id
        ))),
        None => Ok(()),
    }
}

pub(crate) fn sort_newest_first(runs: &mut [Run]) {
    runs.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[derive(Debug, Default)]
struct MemoryState {
    runs: BTreeMap<RunId, Run>,
    steps: BTreeMap<RunId, BTreeMap<u32, StepRecord>>,
    failing_saves: u32,
    saves: u64,
}

#[derive(Debug, Default)]
pub struct MemoryRunStore {
    state: Mutex<MemoryState>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to `save` fail with `Unavailable`.
    pub fn fail_next_saves(&self, count: u32) {
        self.state().failing_saves = count;
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        self.state().saves
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RunStore for MemoryRunStore {
    fn save(&self, run: &Run, steps: &[StepRecord]) -> Result<(), StoreError> {
        ensure_steps_belong_to(run, steps)?;
        let mut state = self.state();
        if state.failing_saves > 0 {
            state.failing_saves -= 1;
            return Err(StoreError::Unavailable(
                "injected save failure".to_string(),
            ));
        }
        state.runs.insert(run.id.clone(), run.clone());
        let rows = state.steps.entry(run.id.clone()).or_default();
        for step in steps {
            rows.insert(step.order, step.clone());
        }
        state.saves += 1;
        Ok(())
    }

    fn load_run(&self, run_id: &RunId) -> Result<Option<Run>, StoreError> {
        Ok(self.state().runs.get(run_id).cloned())
    }

    fn load_steps(&self, run_id: &RunId) -> Result<Vec<StepRecord>, StoreError> {
        Ok(self
            .state()
            .steps
            .get(run_id)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    fn list_runs(&self) -> Result<Vec<Run>, StoreError> {
        let mut runs = self.state().runs.values().cloned().collect::<Vec<_>>();
        sort_newest_first(&mut runs);
        Ok(runs)
    }

    fn delete_run(&self, run_id: &RunId) -> Result<bool, StoreError> {
        let mut state = self.state();
        state.steps.remove(run_id);
        Ok(state.runs.remove(run_id).is_some())
    }
}
