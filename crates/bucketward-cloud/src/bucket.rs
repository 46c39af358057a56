//! Bucket data model
//!
//! [`BucketRecord`] is the persisted bookkeeping entry for a managed bucket.
//! [`CloudContainerView`] is what the provider reports, and [`BucketInfo`] is
//! the merged view handed back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Cloud name reported in [`BucketInfo::cloud`]
pub const CLOUD_AZURE: &str = "azure";

/// Lifecycle status of a managed bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketStatus {
    /// Record persisted, provider work in progress
    Creating,
    /// Container exists and the account key secret is stored
    Created,
    /// Creation failed; see the status message
    CreateError,
    /// Provider-side deletion in progress
    Deleting,
    /// Deletion failed; the record is kept for a retry
    DeleteError,
}

impl BucketStatus {
    pub fn is_error(self) -> bool {
        matches!(self, BucketStatus::CreateError | BucketStatus::DeleteError)
    }
}

impl std::fmt::Display for BucketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BucketStatus::Creating => write!(f, "creating"),
            BucketStatus::Created => write!(f, "created"),
            BucketStatus::CreateError => write!(f, "create_error"),
            BucketStatus::Deleting => write!(f, "deleting"),
            BucketStatus::DeleteError => write!(f, "delete_error"),
        }
    }
}

/// Composite identity of a bucket within an organization
///
/// Ordering is lexicographic over `(resource_group, storage_account, name)`.
/// The record store sorts by it and the reconciler searches by it, so both
/// sides always agree on a single three-way comparison.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub resource_group: String,
    pub storage_account: String,
    pub name: String,
}

impl BucketKey {
    pub fn new(
        resource_group: impl Into<String>,
        storage_account: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            resource_group: resource_group.into(),
            storage_account: storage_account.into(),
            name: name.into(),
        }
    }

    pub fn as_tuple(&self) -> (&str, &str, &str) {
        (&self.resource_group, &self.storage_account, &self.name)
    }
}

impl std::fmt::Display for BucketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.resource_group, self.storage_account, self.name
        )
    }
}

/// Compare two borrowed composite keys
pub fn compare_keys(a: (&str, &str, &str), b: (&str, &str, &str)) -> Ordering {
    a.0.cmp(b.0)
        .then_with(|| a.1.cmp(b.1))
        .then_with(|| a.2.cmp(b.2))
}

/// Persisted bookkeeping for a managed bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketRecord {
    pub organization_id: u64,
    pub resource_group: String,
    pub storage_account: String,
    pub name: String,

    /// Cloud region
    pub location: String,

    /// Reference to the credential secret the bucket was created with
    pub secret_ref: String,

    pub status: BucketStatus,

    /// Last error text; empty once the bucket is created
    #[serde(default)]
    pub status_msg: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BucketRecord {
    /// A fresh record in [`BucketStatus::Creating`]
    pub fn new(
        organization_id: u64,
        key: BucketKey,
        location: impl Into<String>,
        secret_ref: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            organization_id,
            resource_group: key.resource_group,
            storage_account: key.storage_account,
            name: key.name,
            location: location.into(),
            secret_ref: secret_ref.into(),
            status: BucketStatus::Creating,
            status_msg: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> BucketKey {
        BucketKey::new(&self.resource_group, &self.storage_account, &self.name)
    }

    pub fn key_tuple(&self) -> (&str, &str, &str) {
        (&self.resource_group, &self.storage_account, &self.name)
    }

    pub fn matches(&self, organization_id: u64, key: &BucketKey) -> bool {
        self.organization_id == organization_id
            && compare_keys(self.key_tuple(), key.as_tuple()) == Ordering::Equal
    }

    /// Apply a partial update, leaving unset fields untouched
    pub fn apply(&mut self, patch: &RecordPatch) {
        if let Some(storage_account) = &patch.storage_account {
            self.storage_account = storage_account.clone();
        }
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(location) = &patch.location {
            self.location = location.clone();
        }
        if let Some(secret_ref) = &patch.secret_ref {
            self.secret_ref = secret_ref.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(status_msg) = &patch.status_msg {
            self.status_msg = status_msg.clone();
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update for a [`BucketRecord`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub storage_account: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub secret_ref: Option<String>,
    pub status: Option<BucketStatus>,
    pub status_msg: Option<String>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn storage_account(mut self, storage_account: impl Into<String>) -> Self {
        self.storage_account = Some(storage_account.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn secret_ref(mut self, secret_ref: impl Into<String>) -> Self {
        self.secret_ref = Some(secret_ref.into());
        self
    }

    pub fn status(mut self, status: BucketStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn status_msg(mut self, status_msg: impl Into<String>) -> Self {
        self.status_msg = Some(status_msg.into());
        self
    }

    /// Status transition with its message in one patch
    pub fn transition(status: BucketStatus, status_msg: impl Into<String>) -> Self {
        Self::new().status(status).status_msg(status_msg)
    }
}

/// A container discovered by listing the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudContainerView {
    pub name: String,
    pub storage_account: String,
    pub resource_group: String,
}

impl CloudContainerView {
    pub fn new(
        resource_group: impl Into<String>,
        storage_account: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            storage_account: storage_account.into(),
            resource_group: resource_group.into(),
        }
    }

    pub fn key_tuple(&self) -> (&str, &str, &str) {
        (&self.resource_group, &self.storage_account, &self.name)
    }
}

/// Provider-specific placement of a bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobStorageProps {
    pub resource_group: String,
    pub storage_account: String,
}

/// Bucket as reported to the CLI/API layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketInfo {
    pub name: String,
    pub managed: bool,
    pub cloud: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BucketStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_msg: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,

    #[serde(rename = "azure")]
    pub props: BlobStorageProps,
}

impl BucketInfo {
    /// Unmanaged entry for a discovered container
    pub fn unmanaged(view: CloudContainerView) -> Self {
        Self {
            name: view.name,
            managed: false,
            cloud: CLOUD_AZURE.to_string(),
            status: None,
            status_msg: None,
            location: None,
            secret_ref: None,
            props: BlobStorageProps {
                resource_group: view.resource_group,
                storage_account: view.storage_account,
            },
        }
    }

    /// Mark as managed and copy the bookkeeping fields over
    pub fn with_record(mut self, record: &BucketRecord) -> Self {
        self.managed = true;
        self.status = Some(record.status);
        self.status_msg = Some(record.status_msg.clone());
        self.location = Some(record.location.clone());
        self.secret_ref = Some(record.secret_ref.clone());
        self
    }
}

impl From<&BucketRecord> for BucketInfo {
    fn from(record: &BucketRecord) -> Self {
        BucketInfo::unmanaged(CloudContainerView::new(
            &record.resource_group,
            &record.storage_account,
            &record.name,
        ))
        .with_record(record)
    }
}
