use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cache directory not found")]
    CacheDirNotFound,

    #[error(
        "Configuration file not found. Looked in:\n\
        - current directory: bucketward.local.yaml, .bucketward.local.yaml,\n  \
        bucketward.yaml, .bucketward.yaml\n\
        - ./.bucketward/ directory\n\
        - ~/.config/bucketward/bucketward.yaml\n\
        A path can also be given with the BUCKETWARD_CONFIG environment variable"
    )]
    ConfigFileNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid setting: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
