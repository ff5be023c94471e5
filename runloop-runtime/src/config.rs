use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::path::Path;

use crate::error::Result;

/// Scheduler settings that can come from a file or the environment.
///
/// ```toml
/// queues = ["sync", "actions", "render", "destroy"]
/// default_queue = "actions"
/// debug = false
/// ```
///
/// Environment variables with the `RUNLOOP_` prefix override file values,
/// e.g. `RUNLOOP_DEFAULT_QUEUE=render` or `RUNLOOP_QUEUES=sync,actions`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub queues: Vec<String>,
    #[serde(default)]
    pub default_queue: Option<String>,
    #[serde(default)]
    pub debug: bool,
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("RUNLOOP")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("queues")
}

fn load_file(path: &Path, format: FileFormat) -> Result<Settings> {
    let config = Config::builder()
        .add_source(File::from(path).format(format))
        .add_source(environment())
        .build()?;
    load_settings(&config)
}

/// Load settings from a specific TOML file
pub fn load_toml_config<P: AsRef<Path>>(path: P) -> Result<Settings> {
    load_file(path.as_ref(), FileFormat::Toml)
}

/// Load settings from a specific YAML file
pub fn load_yaml_config<P: AsRef<Path>>(path: P) -> Result<Settings> {
    load_file(path.as_ref(), FileFormat::Yaml)
}

/// Read settings out of an already built [`Config`].
pub fn load_settings(config: &Config) -> Result<Settings> {
    Ok(config.clone().try_deserialize()?)
}

/// Parse settings from an in-memory document, without environment overrides.
pub fn settings_from_str(contents: &str, format: FileFormat) -> Result<Settings> {
    let config = Config::builder()
        .add_source(File::from_str(contents, format))
        .build()?;
    load_settings(&config)
}
