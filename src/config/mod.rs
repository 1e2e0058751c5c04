pub mod settings;

pub use settings::{BitbucketConfig, GitConfig, Settings, WorktreeConfig};

use crate::errors::{CascadeError, Result};
use std::path::PathBuf;

/// Environment variable that relocates the configuration directory
pub const CONFIG_DIR_ENV: &str = "CASCADE_CONFIG_DIR";

/// Get the Cascade configuration directory (~/.cascade/)
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    let home_dir =
        dirs::home_dir().ok_or_else(|| CascadeError::config("Could not find home directory"))?;
    Ok(home_dir.join(".cascade"))
}

/// Path of the settings file
pub fn settings_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.json"))
}

/// Path of the unified stack store shared by every repository
pub fn store_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("stacks.json"))
}

/// Path of the pre-v2 standalone branch cache, read once during migration
pub fn legacy_cache_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("branch_cache.json"))
}

/// Load the user's settings, falling back to defaults when none are saved
pub fn load_settings() -> Result<Settings> {
    let settings = Settings::load_from_file(&settings_path()?)?;
    settings.validate()?;
    Ok(settings)
}
