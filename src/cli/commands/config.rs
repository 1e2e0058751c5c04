use crate::cli::output::Output;
use crate::cli::ConfigAction;
use crate::config::{settings_path, Settings};
use crate::errors::Result;
use std::path::Path;

/// Handle configuration commands
pub fn run(action: ConfigAction) -> Result<()> {
    let config_file = settings_path()?;

    match action {
        ConfigAction::Set { key, value } => set_config_value(&config_file, &key, &value),
        ConfigAction::Get { key } => get_config_value(&config_file, &key),
    }
}

fn set_config_value(config_file: &Path, key: &str, value: &str) -> Result<()> {
    let mut settings = Settings::load_from_file(config_file)?;
    settings.set_value(key, value)?;
    settings.validate()?;
    settings.save_to_file(config_file)?;

    Output::success(format!("Configuration updated: {key} = {}", masked(key, value)));
    if key == "bitbucket.url" {
        Output::tip("Set bitbucket.project and bitbucket.repo next");
    }
    Ok(())
}

fn get_config_value(config_file: &Path, key: &str) -> Result<()> {
    let settings = Settings::load_from_file(config_file)?;
    let value = settings.get_value(key)?;
    if value.is_empty() {
        println!("{key} = (not set)");
    } else {
        println!("{key} = {value}");
    }
    Ok(())
}

/// Tokens are shown by their first four characters only
fn masked(key: &str, value: &str) -> String {
    if value.is_empty() {
        "(not set)".to_string()
    } else if key.contains("token") {
        format!("{}***", value.chars().take(4).collect::<String>())
    } else {
        value.to_string()
    }
}
