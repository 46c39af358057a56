//! Azure provider for Bucketward
//!
//! This crate implements the `ProviderGateway` trait for Azure Blob Storage,
//! enabling Bucketward to manage resource groups, storage accounts and blob
//! containers.
//!
//! # Requirements
//!
//! - The `az` CLI must be installed
//! - A service principal with rights on the target subscription; its
//!   credentials are resolved from the secret store per organization
//!
//! # Example
//!
//! ```ignore
//! use bucketward_cloud_azure::AzureGateway;
//! use bucketward_cloud::ProviderGateway;
//!
//! let gateway = AzureGateway::new(cache_dir.join("az"));
//! let groups = gateway.list_resource_groups(&creds).await?;
//! ```

pub mod az;
pub mod error;
pub mod provider;

pub use az::{AzCli, ContainerInfo, NameAvailability, StorageAccountInfo};
pub use error::{AzureError, Result};
pub use provider::AzureGateway;
