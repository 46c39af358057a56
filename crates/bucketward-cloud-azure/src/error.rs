//! Azure provider error types

use bucketward_cloud::CloudError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("az not found. Please install the Azure CLI: https://aka.ms/installazurecli")]
    AzNotFound,

    #[error("az login failed: {0}")]
    LoginFailed(String),

    #[error("az command failed: {0}")]
    CommandFailed(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("az command did not finish within {0:?}")]
    Timeout(Duration),

    #[error("Unexpected az output: {0}")]
    UnexpectedOutput(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<AzureError> for CloudError {
    fn from(err: AzureError) -> Self {
        match err {
            AzureError::ResourceNotFound(msg) => CloudError::NotFound(msg),
            AzureError::LoginFailed(msg) => CloudError::AuthenticationFailed(msg),
            AzureError::Timeout(after) => {
                CloudError::Timeout(format!("az command did not finish within {:?}", after))
            }
            AzureError::AzNotFound => {
                CloudError::InvalidConfig(AzureError::AzNotFound.to_string())
            }
            other => CloudError::ApiError(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AzureError>;
