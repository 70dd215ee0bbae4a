pub mod catalog;
pub mod controller;
pub mod driver;
pub mod error;
pub mod executor;
pub mod file_store;
pub mod identity;
pub mod notifier;
pub mod progress;
pub mod retry;
pub mod run;
pub mod sqlite_store;
pub mod store;

pub use catalog::{StepCatalog, StepDefinition, DYNAMIC_PROFILE, PROGRESS_QUANTA, STATIC_PROFILE};
pub use controller::{NewRun, RunContext, RunController, TickOutcome};
pub use driver::{DriverOptions, RunDriver, RunHandle};
pub use error::{MigrationError, RunOperation};
pub use executor::{SimulatedExecutor, StepExecutor, StepOutcome};
pub use file_store::FileRunStore;
pub use identity::{Actor, EnvIdentity, IdentityProvider, StaticIdentity, ACTOR_ENV_VAR};
pub use notifier::{Notifier, RunEvent, RunEventKind, Subscription};
pub use progress::RunProgress;
pub use retry::RetryPolicy;
pub use run::{check_run_invariants, Run, RunStatus, StepLogEntry, StepRecord, StepStatus};
pub use sqlite_store::SqliteRunStore;
pub use store::{MemoryRunStore, RunStore, StoreError};
