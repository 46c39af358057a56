//! Bucket lifecycle error types

use thiserror::Error;

/// Errors produced by the lifecycle coordinator and its collaborators
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Bucket already exists: {0}")]
    AlreadyExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Storage account name {account} is taken by another owner: {message}")]
    NameConflict { account: String, message: String },

    /// A provider failure wrapped with the lifecycle step it happened in
    #[error("{step}: {source}")]
    ProviderFailed {
        step: String,
        #[source]
        source: Box<CloudError>,
    },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Secret store error: {0}")]
    SecretStore(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Wrap an error with the name of the step that produced it
    pub fn step(step: impl Into<String>, source: CloudError) -> Self {
        Self::ProviderFailed {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error (or the error it wraps) means "absent"
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::ProviderFailed { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Whether the storage account name belongs to someone else
    pub fn is_name_conflict(&self) -> bool {
        match self {
            Self::NameConflict { .. } => true,
            Self::ProviderFailed { source, .. } => source.is_name_conflict(),
            _ => false,
        }
    }

    /// Innermost error, skipping step wrappers
    pub fn root(&self) -> &CloudError {
        match self {
            Self::ProviderFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
