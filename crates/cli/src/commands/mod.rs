pub mod agent;
pub mod doctor;
pub mod onboard;
pub mod status;

use std::path::Path;

use handoff_config::AppConfig;

/// Load the config file with environment overrides applied.
pub fn load_config(path: &Path) -> Result<AppConfig, Box<dyn std::error::Error>> {
    AppConfig::load_with_env(path).map_err(|e| format!("Failed to load config: {e}").into())
}
