use super::{resolve_config_path, ConfigError, Settings};
use std::path::Path;

/// Loads and validates the global settings. A missing file yields defaults.
pub fn load_global_settings() -> Result<Settings, ConfigError> {
    let path = resolve_config_path()?;
    load_settings_from(&path)
}

pub fn load_settings_from(path: &Path) -> Result<Settings, ConfigError> {
    let settings = if path.exists() {
        Settings::from_path(path)?
    } else {
        Settings::default()
    };
    settings.validate()?;
    Ok(settings)
}
