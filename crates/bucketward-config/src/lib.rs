//! Bucketward configuration
//!
//! Locates `bucketward.yaml` and parses it into [`Settings`]. Every value is
//! optional in the file; the CLI fills or overrides them from flags.

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding a direct path to the configuration file
pub const CONFIG_ENV: &str = "BUCKETWARD_CONFIG";

const CANDIDATES: [&str; 4] = [
    "bucketward.local.yaml",
    ".bucketward.local.yaml",
    "bucketward.yaml",
    ".bucketward.yaml",
];

/// Bucketward's cache directory for CLI sessions
///
/// Not created here; whoever writes into it first does that.
pub fn get_cache_dir() -> Result<PathBuf> {
    Ok(dirs::cache_dir()
        .ok_or(ConfigError::CacheDirNotFound)?
        .join("bucketward"))
}

/// Find the project's configuration file
///
/// Search order:
/// 1. `BUCKETWARD_CONFIG` environment variable (direct path)
/// 2. current directory: bucketward.local.yaml, .bucketward.local.yaml,
///    bucketward.yaml, .bucketward.yaml
/// 3. the same names inside `./.bucketward/`
/// 4. `~/.config/bucketward/bucketward.yaml` (global)
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_dir = current_dir.join(".bucketward");
    if project_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("bucketward").join("bucketward.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Settings read from `bucketward.yaml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub organization_id: Option<u64>,

    /// Azure region, e.g. `westeurope`
    pub location: Option<String>,

    pub resource_group: Option<String>,

    pub storage_account: Option<String>,

    /// Reference of the secret holding the service principal
    pub secret_ref: Option<String>,

    /// Directory of `buckets.json`; relative paths resolve against the
    /// working directory
    pub state_dir: PathBuf,

    /// Defaults to `<state_dir>/secrets.json`
    pub secrets_file: Option<PathBuf>,

    pub account_create_timeout_secs: u64,

    pub list_concurrency: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            organization_id: None,
            location: None,
            resource_group: None,
            storage_account: None,
            secret_ref: None,
            state_dir: PathBuf::from(".bucketward"),
            secrets_file: None,
            account_create_timeout_secs: 600,
            list_concurrency: 4,
        }
    }
}

impl Settings {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.list_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "list_concurrency must be at least 1".into(),
            ));
        }
        if self.account_create_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "account_create_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn secrets_file(&self) -> PathBuf {
        self.secrets_file
            .clone()
            .unwrap_or_else(|| self.state_dir.join("secrets.json"))
    }
}

/// Parse the settings file at `path`
pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    Settings::from_yaml(&content).map_err(|e| match e {
        ConfigError::Yaml(source) => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Load the discovered configuration file, or defaults when there is none
pub fn load_or_default() -> Result<Settings> {
    match find_config_file() {
        Ok(path) => load_settings(&path),
        Err(ConfigError::ConfigFileNotFound) => Ok(Settings::default()),
        Err(e) => Err(e),
    }
}
