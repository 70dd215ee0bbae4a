use crate::config::ConfigError;
use crate::migration::run::RunStatus;
use crate::migration::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOperation {
    Start,
    Pause,
    Resume,
    Cancel,
}

impl std::fmt::Display for RunOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOperation::Start => write!(f, "start"),
            RunOperation::Pause => write!(f, "pause"),
            RunOperation::Resume => write!(f, "resume"),
            RunOperation::Cancel => write!(f, "cancel"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("unknown migration profile `{profile}`")]
    UnknownProfile { profile: String },
    #[error("cannot {operation} run `{run_id}` while it is `{status}`")]
    InvalidState {
        run_id: String,
        operation: RunOperation,
        status: RunStatus,
    },
    #[error("no authenticated actor; set `actor` in config or SITELIFT_ACTOR")]
    Unauthenticated,
    #[error("migration run `{run_id}` not found")]
    UnknownRun { run_id: String },
    #[error("failed to persist run `{run_id}` after {attempts} attempt(s): {source}")]
    Persistence {
        run_id: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },
    #[error("run `{run_id}` is inconsistent: {reason}")]
    CorruptRun { run_id: String, reason: String },
    #[error("step catalog validation failed: {0}")]
    InvalidCatalog(String),
    #[error("run driver failed: {0}")]
    Driver(String),
    #[error("config error: {0}")]
    Config(String),
}

impl MigrationError {
    /// Only store failures are transient; everything else is a caller error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MigrationError::Persistence { .. })
    }
}

impl From<ConfigError> for MigrationError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
