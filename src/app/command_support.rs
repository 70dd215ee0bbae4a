use crate::config::{load_global_settings, ConfigError, Settings, StoreBackend};
use crate::migration::sqlite_store::DEFAULT_DB_FILE_NAME;
use crate::migration::{
    EnvIdentity, FileRunStore, MigrationError, RunContext, RunStore, SimulatedExecutor,
    SqliteRunStore, StepCatalog,
};
use crate::shared::ids::RunId;
use crate::shared::logging::RunLogger;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

pub fn map_migration_err(err: MigrationError) -> String {
    err.to_string()
}

pub fn load_settings() -> Result<Settings, String> {
    load_global_settings().map_err(map_config_err)
}

pub fn open_store(settings: &Settings, state_root: &Path) -> Result<Arc<dyn RunStore>, String> {
    fs::create_dir_all(state_root)
        .map_err(|e| format!("failed to create {}: {e}", state_root.display()))?;
    match settings.store {
        StoreBackend::File => Ok(Arc::new(FileRunStore::new(state_root))),
        StoreBackend::Sqlite => {
            let store = SqliteRunStore::open(&state_root.join(DEFAULT_DB_FILE_NAME))
                .map_err(|e| e.to_string())?;
            Ok(Arc::new(store))
        }
    }
}

/// Everything a command needs to drive runs: store, catalog, logger and the
/// retry policy, all derived from `settings`.
pub struct CommandEnv {
    pub settings: Settings,
    pub context: RunContext,
}

impl CommandEnv {
    pub fn load() -> Result<Self, String> {
        let settings = load_settings()?;
        Self::from_settings(settings)
    }

    pub fn from_settings(settings: Settings) -> Result<Self, String> {
        let context = build_context(&settings)?;
        Ok(Self { settings, context })
    }

    pub fn identity(&self) -> EnvIdentity {
        EnvIdentity::new(self.settings.actor.clone())
    }

    pub fn store(&self) -> &dyn RunStore {
        self.context.store.as_ref()
    }
}

pub fn build_context(settings: &Settings) -> Result<RunContext, String> {
    let state_root = settings.resolve_state_root().map_err(map_config_err)?;
    let store = open_store(settings, &state_root)?;
    let catalog = StepCatalog::from_settings(settings).map_err(map_migration_err)?;
    Ok(
        RunContext::new(store, Arc::new(catalog), Arc::new(SimulatedExecutor))
            .with_retry(settings.retry_policy())
            .with_logger(RunLogger::new(&state_root)),
    )
}

pub fn parse_run_id(raw: &str) -> Result<RunId, String> {
    RunId::parse(raw).map_err(|e| format!("invalid run id `{raw}`: {e}"))
}
