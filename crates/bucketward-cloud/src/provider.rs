//! Provider gateway trait definition

use crate::bucket::CloudContainerView;
use crate::credentials::Credentials;
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Control-plane and data-plane operations the coordinator needs
///
/// Every call is independent; implementations keep no per-bucket state.
/// "Not found" conditions are reported as [`CloudError::NotFound`].
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Returns the provider name (e.g., "azure")
    fn name(&self) -> &str;

    /// Create the resource group unless it already exists
    async fn ensure_resource_group(
        &self,
        creds: &Credentials,
        resource_group: &str,
        location: &str,
    ) -> Result<()>;

    /// Whether the storage account exists and is owned by these credentials
    ///
    /// Returns [`CloudError::NameConflict`] when the name is taken by
    /// someone else.
    async fn account_exists(
        &self,
        creds: &Credentials,
        resource_group: &str,
        account: &str,
    ) -> Result<bool>;

    /// Create a storage account and wait for provisioning to finish
    ///
    /// Gives up with [`CloudError::Timeout`] once `timeout` elapses.
    async fn create_account(
        &self,
        creds: &Credentials,
        resource_group: &str,
        account: &str,
        location: &str,
        timeout: Duration,
    ) -> Result<()>;

    /// Primary access key for data-plane calls; never cached
    async fn account_key(
        &self,
        creds: &Credentials,
        resource_group: &str,
        account: &str,
    ) -> Result<String>;

    /// Container metadata, or [`CloudError::NotFound`]
    async fn get_container(
        &self,
        account: &str,
        key: &str,
        name: &str,
    ) -> Result<ContainerProperties>;

    async fn create_container(&self, account: &str, key: &str, name: &str) -> Result<()>;

    /// Delete a container; a missing container is not an error
    async fn delete_container(&self, account: &str, key: &str, name: &str) -> Result<()>;

    async fn list_resource_groups(&self, creds: &Credentials) -> Result<Vec<String>>;

    async fn list_accounts(&self, creds: &Credentials, resource_group: &str)
    -> Result<Vec<String>>;

    async fn list_containers(&self, account: &str, key: &str) -> Result<Vec<String>>;

    /// Enumerate every container of every account of every resource group
    ///
    /// Accounts and containers are fetched with up to `concurrency` calls in
    /// flight. The result keeps the provider's listing order.
    async fn list_all_containers(
        &self,
        creds: &Credentials,
        concurrency: usize,
    ) -> Result<Vec<CloudContainerView>> {
        let concurrency = concurrency.max(1);

        let resource_groups = self
            .list_resource_groups(creds)
            .await
            .map_err(|e| CloudError::step("getting all resource groups failed", e))?;

        let accounts: Vec<(String, Vec<String>)> = stream::iter(resource_groups)
            .map(|resource_group| async move {
                tracing::debug!(resource_group = %resource_group, "Listing storage accounts");
                match self.list_accounts(creds, &resource_group).await {
                    Ok(accounts) => Ok((resource_group, accounts)),
                    Err(e) => Err(CloudError::step(
                        format!(
                            "getting storage accounts under resource group={} failed",
                            resource_group
                        ),
                        e,
                    )),
                }
            })
            .buffered(concurrency)
            .try_collect()
            .await?;

        let mut pairs: Vec<(String, String)> = Vec::new();
        for (resource_group, names) in accounts {
            for account in names {
                pairs.push((resource_group.clone(), account));
            }
        }

        let containers: Vec<Vec<CloudContainerView>> = stream::iter(pairs)
            .map(|(resource_group, account)| async move {
                tracing::debug!(
                    resource_group = %resource_group,
                    storage_account = %account,
                    "Listing blob containers"
                );
                let step = format!(
                    "getting containers under resource group={}, storage account={} failed",
                    resource_group, account
                );
                let key = self
                    .account_key(creds, &resource_group, &account)
                    .await
                    .map_err(|e| CloudError::step(step.clone(), e))?;
                let names = self
                    .list_containers(&account, &key)
                    .await
                    .map_err(|e| CloudError::step(step, e))?;
                let views: Vec<CloudContainerView> = names
                    .into_iter()
                    .map(|name| CloudContainerView::new(&resource_group, &account, name))
                    .collect();
                Ok::<_, CloudError>(views)
            })
            .buffered(concurrency)
            .try_collect()
            .await?;

        Ok(containers.into_iter().flatten().collect())
    }
}

/// Container metadata returned by [`ProviderGateway::get_container`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerProperties {
    pub name: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}
