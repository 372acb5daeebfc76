use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Optional CLI defaults, overridden by flags and environment variables.
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct CliConfig {
    pub server: Option<String>,
    pub format: Option<String>,
}

fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("promptbench")
        .join("cli.toml")
}

pub fn load_config() -> CliConfig {
    let path = config_path();
    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", path.display(), e);
                CliConfig::default()
            }
        },
        Err(_) => CliConfig::default(),
    }
}
