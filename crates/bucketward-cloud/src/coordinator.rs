//! Managed bucket lifecycle coordination
//!
//! [`BucketCoordinator`] drives the record store and the provider gateway
//! through the bucket state machine:
//!
//! ```text
//! Creating ──► Created ──► Deleting ──► (record removed)
//!    │                        │
//!    ▼                        ▼
//! CreateError            DeleteError
//! ```
//!
//! Every transition is written to the record store before the next
//! provider call, and provider failures leave the record in the matching
//! error state instead of removing it.
//!
//! Not safe against concurrent calls for the same bucket; callers serialize
//! per `(organization, resource group, storage account, name)`.

use crate::bucket::{BucketInfo, BucketKey, BucketRecord, BucketStatus, RecordPatch};
use crate::credentials::{Credentials, resolve_credentials};
use crate::error::{CloudError, Result};
use crate::naming;
use crate::provider::ProviderGateway;
use crate::reconcile;
use crate::secret::{CreateSecretRequest, SecretStore};
use crate::state::BucketRecordStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

/// Where buckets of this coordinator live and which credentials they use
#[derive(Debug, Clone)]
pub struct BucketScope {
    pub organization_id: u64,
    pub location: String,
    /// Generated from the location when `None`
    pub resource_group: Option<String>,
    /// [`naming::DEFAULT_STORAGE_ACCOUNT`] when `None`
    pub storage_account: Option<String>,
    pub secret_ref: String,
}

impl BucketScope {
    pub fn resource_group(&self) -> String {
        self.resource_group
            .clone()
            .filter(|rg| !rg.is_empty())
            .unwrap_or_else(|| naming::default_resource_group(&self.location))
    }

    pub fn storage_account(&self) -> String {
        self.storage_account
            .clone()
            .filter(|account| !account.is_empty())
            .unwrap_or_else(|| naming::DEFAULT_STORAGE_ACCOUNT.to_string())
    }

    pub fn key(&self, name: &str) -> BucketKey {
        BucketKey::new(self.resource_group(), self.storage_account(), name)
    }
}

/// Tunables for provider interaction
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Deadline for storage account provisioning
    pub account_create_timeout: Duration,

    /// Provider calls in flight while listing the cloud inventory
    pub list_concurrency: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            account_create_timeout: Duration::from_secs(600),
            list_concurrency: 4,
        }
    }
}

/// Lifecycle coordinator for managed buckets
pub struct BucketCoordinator {
    scope: BucketScope,
    gateway: Arc<dyn ProviderGateway>,
    store: Arc<dyn BucketRecordStore>,
    secrets: Arc<dyn SecretStore>,
    options: CoordinatorOptions,
}

impl BucketCoordinator {
    pub fn new(
        scope: BucketScope,
        gateway: Arc<dyn ProviderGateway>,
        store: Arc<dyn BucketRecordStore>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            scope,
            gateway,
            store,
            secrets,
            options: CoordinatorOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CoordinatorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn scope(&self) -> &BucketScope {
        &self.scope
    }

    fn bucket_span(&self, name: &str) -> Span {
        info_span!(
            "bucket",
            organization = self.scope.organization_id,
            bucket = %name,
            resource_group = %self.scope.resource_group(),
            storage_account = %self.scope.storage_account(),
        )
    }

    async fn credentials(&self, secret_ref: &str) -> Result<Credentials> {
        resolve_credentials(
            self.secrets.as_ref(),
            self.scope.organization_id,
            secret_ref,
        )
        .await
    }

    /// Create a container under the scope's resource group and storage account
    pub async fn create_bucket(&self, name: &str) -> Result<()> {
        self.create(name).instrument(self.bucket_span(name)).await
    }

    async fn create(&self, name: &str) -> Result<()> {
        naming::validate_container_name(name)?;
        let resource_group = self.scope.resource_group();
        let storage_account = self.scope.storage_account();
        naming::validate_storage_account_name(&storage_account)?;
        let location = self.scope.location.as_str();
        let key = self.scope.key(name);
        let organization_id = self.scope.organization_id;

        let existing = match self.store.find(organization_id, &key).await {
            Ok(existing) if !existing.status.is_error() => {
                return Err(CloudError::AlreadyExists(format!(
                    "bucket {} ({})",
                    name, existing.status
                )));
            }
            Ok(existing) => Some(existing),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        let creds = self.credentials(&self.scope.secret_ref).await?;

        let record = match existing {
            Some(existing) => {
                info!(previous = %existing.status, "Retrying bucket creation");
                self.store
                    .update_fields(
                        &existing,
                        RecordPatch::transition(BucketStatus::Creating, "")
                            .secret_ref(&self.scope.secret_ref),
                    )
                    .await?
            }
            None => {
                info!("Saving bucket record");
                let record = BucketRecord::new(
                    organization_id,
                    key.clone(),
                    location,
                    &self.scope.secret_ref,
                );
                self.store.save(&record).await?;
                record
            }
        };

        if let Err(e) = self
            .gateway
            .ensure_resource_group(&creds, &resource_group, location)
            .await
        {
            return Err(self.rollback(&record, "resource group creation failed", e).await);
        }

        let record = match self
            .store
            .update_fields(&record, RecordPatch::new().storage_account(&storage_account))
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                return Err(self
                    .rollback(&record, "error updating storage account on bucket record", e)
                    .await);
            }
        };

        let exists = match self
            .gateway
            .account_exists(&creds, &resource_group, &storage_account)
            .await
        {
            Ok(exists) => exists,
            Err(e) => {
                return Err(self
                    .rollback(&record, "error checking storage account", e)
                    .await);
            }
        };

        if !exists {
            info!("Creating storage account");
            if let Err(e) = self
                .gateway
                .create_account(
                    &creds,
                    &resource_group,
                    &storage_account,
                    location,
                    self.options.account_create_timeout,
                )
                .await
            {
                return Err(self
                    .rollback(&record, "storage account creation failed", e)
                    .await);
            }
        }

        let account_key = match self
            .gateway
            .account_key(&creds, &resource_group, &storage_account)
            .await
        {
            Ok(account_key) => account_key,
            Err(e) => {
                return Err(self
                    .rollback(&record, "could not get storage account key", e)
                    .await);
            }
        };

        let record = match self
            .store
            .update_fields(&record, RecordPatch::new().name(name).location(location))
            .await
        {
            Ok(updated) => updated,
            Err(e) => {
                return Err(self
                    .rollback(&record, "error updating bucket name", e)
                    .await);
            }
        };

        match self
            .gateway
            .get_container(&storage_account, &account_key, name)
            .await
        {
            Ok(_) => debug!("Container already exists"),
            Err(e) if e.is_not_found() => {
                if let Err(e) = self
                    .gateway
                    .create_container(&storage_account, &account_key, name)
                    .await
                {
                    return Err(self.rollback(&record, "cannot create container", e).await);
                }
            }
            Err(e) => return Err(self.rollback(&record, "cannot access container", e).await),
        }

        let secret_name = self
            .store_account_key_secret(&storage_account, &account_key)
            .await?;
        info!(secret = %secret_name, "Storage account secret created/updated");

        if let Err(e) = self
            .store
            .update_fields(&record, RecordPatch::transition(BucketStatus::Created, ""))
            .await
        {
            return Err(self.rollback(&record, "could not save bucket", e).await);
        }

        info!("Bucket created");
        Ok(())
    }

    async fn store_account_key_secret(
        &self,
        storage_account: &str,
        account_key: &str,
    ) -> Result<String> {
        let request = CreateSecretRequest {
            name: naming::account_key_secret_name(storage_account),
            secret_type: naming::STORAGE_ACCOUNT_SECRET_TYPE.to_string(),
            values: [
                ("storageAccount".to_string(), storage_account.to_string()),
                ("accessKey".to_string(), account_key.to_string()),
            ]
            .into_iter()
            .collect(),
            tags: vec![format!(
                "{}:{}",
                naming::STORAGE_ACCOUNT_SECRET_TYPE,
                storage_account
            )],
        };

        self.secrets
            .create_or_update(self.scope.organization_id, &request)
            .await
            .map_err(|e| {
                CloudError::SecretStore(format!(
                    "failed to create/update secret {}: {}",
                    request.name, e
                ))
            })?;

        Ok(request.name)
    }

    /// Record a failed creation step and return the wrapped error
    async fn rollback(&self, record: &BucketRecord, step: &str, err: CloudError) -> CloudError {
        error!(step, error = %err, "Bucket creation failed");
        let patch = RecordPatch::transition(BucketStatus::CreateError, err.to_string());
        if let Err(e) = self.store.update_fields(record, patch).await {
            error!(error = %e, "Could not persist create error status");
        }
        CloudError::step(step, err)
    }

    /// Record a failed deletion step and return the wrapped error
    async fn delete_failed(
        &self,
        record: &mut BucketRecord,
        step: &str,
        err: CloudError,
    ) -> CloudError {
        error!(step, error = %err, "Bucket deletion failed");
        let patch = RecordPatch::transition(BucketStatus::DeleteError, err.to_string());
        match self.store.update_fields(record, patch).await {
            Ok(updated) => *record = updated,
            Err(e) => error!(error = %e, "Could not persist delete error status"),
        }
        CloudError::step(step, err)
    }

    /// Delete a managed bucket
    ///
    /// With `force`, provider failures are logged and the record is removed
    /// anyway.
    pub async fn delete_bucket(&self, name: &str, force: bool) -> Result<()> {
        self.delete(name, force)
            .instrument(self.bucket_span(name))
            .await
    }

    async fn delete(&self, name: &str, force: bool) -> Result<()> {
        let key = self.scope.key(name);
        info!("Looking up bucket {}", name);
        let mut record = match self.store.find(self.scope.organization_id, &key).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                return Err(CloudError::NotFound(format!("bucket {}", name)));
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = self.delete_from_provider(&mut record).await {
            if !force {
                return Err(e);
            }
            warn!(error = %e, "Provider deletion failed; removing record because delete is forced");
        }

        if let Err(e) = self.store.delete(&record).await {
            return Err(self
                .delete_failed(&mut record, "could not delete bucket record", e)
                .await);
        }

        info!("Bucket deleted");
        Ok(())
    }

    async fn delete_from_provider(&self, record: &mut BucketRecord) -> Result<()> {
        info!("Deleting bucket on provider");

        // A bucket whose creation failed is assumed never to have reached
        // the data plane
        if record.status == BucketStatus::CreateError {
            debug!("Bucket doesn't exist on provider");
            return Ok(());
        }

        *record = self
            .store
            .update_fields(record, RecordPatch::new().status(BucketStatus::Deleting))
            .await?;

        let creds = match self.credentials(&record.secret_ref).await {
            Ok(creds) => creds,
            Err(e) => return Err(self.delete_failed(record, "could not authenticate", e).await),
        };

        let resource_group = record.resource_group.clone();
        let storage_account = record.storage_account.clone();
        let name = record.name.clone();

        let account_key = match self
            .gateway
            .account_key(&creds, &resource_group, &storage_account)
            .await
        {
            Ok(account_key) => account_key,
            Err(e) => return Err(self.delete_failed(record, "could not get account key", e).await),
        };

        match self
            .gateway
            .delete_container(&storage_account, &account_key, &name)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("Container already gone");
                Ok(())
            }
            Err(e) => Err(self.delete_failed(record, "could not delete container", e).await),
        }
    }

    /// Probe that the bucket's account and container are reachable
    ///
    /// Read-only: the persisted record is never touched.
    pub async fn check_bucket(&self, name: &str) -> Result<()> {
        self.check(name).instrument(self.bucket_span(name)).await
    }

    async fn check(&self, name: &str) -> Result<()> {
        info!("Looking for bucket");

        let resource_group = self.scope.resource_group();
        let storage_account = self.scope.storage_account();
        let creds = self.credentials(&self.scope.secret_ref).await?;

        let exists = self
            .gateway
            .account_exists(&creds, &resource_group, &storage_account)
            .await
            .map_err(|e| {
                error!(error = %e, "Storage account check failed");
                CloudError::step("error checking storage account", e)
            })?;
        if !exists {
            return Err(CloudError::NotFound(format!(
                "storage account {}",
                storage_account
            )));
        }

        let account_key = self
            .gateway
            .account_key(&creds, &resource_group, &storage_account)
            .await
            .map_err(|e| {
                error!(error = %e, "Could not get storage account key");
                CloudError::step("could not get storage account key", e)
            })?;

        self.gateway
            .get_container(&storage_account, &account_key, name)
            .await
            .map_err(|e| CloudError::step("cannot access container", e))?;

        Ok(())
    }

    /// Every container reachable with the scope's credentials, with the
    /// ones tracked by this organization marked as managed
    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        info!(
            organization = self.scope.organization_id,
            provider = self.gateway.name(),
            "Getting all containers for subscription"
        );
        let creds = self.credentials(&self.scope.secret_ref).await?;

        let inventory = self
            .gateway
            .list_all_containers(&creds, self.options.list_concurrency)
            .await?;

        let records = self
            .store
            .list_by_org(self.scope.organization_id)
            .await
            .map_err(|e| CloudError::step("retrieving managed buckets failed", e))?;

        Ok(reconcile::reconcile(inventory, &records))
    }

    /// Buckets known to the record store, without asking the provider
    pub async fn list_managed_buckets(&self) -> Result<Vec<BucketInfo>> {
        let records = self
            .store
            .list_by_org(self.scope.organization_id)
            .await
            .map_err(|e| CloudError::step("retrieving managed buckets failed", e))?;

        Ok(records.iter().map(BucketInfo::from).collect())
    }
}
