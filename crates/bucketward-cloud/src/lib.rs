//! Bucketward Cloud
//!
//! Lifecycle coordination for managed object-storage buckets. The crate
//! keeps three sources of truth in step: the local bucket records, the cloud
//! control plane (resource groups, storage accounts) and the cloud data plane
//! (the containers themselves).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 bucketward CLI                   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │              BucketCoordinator                   │
//! │   create / delete / check / list + reconcile     │
//! └───────┬─────────────────┬───────────────┬───────┘
//!         │                 │               │
//! ┌───────▼───────┐ ┌───────▼───────┐ ┌─────▼───────┐
//! │ RecordStore   │ │ProviderGateway│ │ SecretStore │
//! │ (buckets.json)│ │  (azure, ...) │ │ credentials │
//! └───────────────┘ └───────────────┘ └─────────────┘
//! ```

pub mod bucket;
pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod naming;
pub mod provider;
pub mod reconcile;
pub mod secret;
pub mod state;

// Re-exports
pub use bucket::{
    BlobStorageProps, BucketInfo, BucketKey, BucketRecord, BucketStatus, CloudContainerView,
    RecordPatch,
};
pub use coordinator::{BucketCoordinator, BucketScope, CoordinatorOptions};
pub use credentials::{Credentials, resolve_credentials};
pub use error::{CloudError, Result};
pub use provider::{ContainerProperties, ProviderGateway};
pub use secret::{CreateSecretRequest, FileSecretStore, SecretItem, SecretStore};
pub use state::{BucketRecordStore, BucketState, JsonRecordStore, StateLock, StateManager};
