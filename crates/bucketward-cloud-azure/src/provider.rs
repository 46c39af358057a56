//! Azure provider implementation

use crate::az::AzCli;
use crate::error::AzureError;
use async_trait::async_trait;
use bucketward_cloud::{CloudError, ContainerProperties, Credentials, ProviderGateway, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Azure Blob Storage provider backed by the `az` CLI
///
/// Control-plane calls run under a service principal session that is
/// created on first use and cached per subscription, tenant and client.
/// Data-plane calls authenticate with the storage account key only.
pub struct AzureGateway {
    session_root: PathBuf,
    sessions: Mutex<HashMap<String, Arc<AzCli>>>,
    storage: AzCli,
}

impl AzureGateway {
    /// `session_root` holds one `az` config directory per service principal
    pub fn new(session_root: impl Into<PathBuf>) -> Self {
        let session_root = session_root.into();
        Self {
            storage: AzCli::new(session_root.join("storage")),
            session_root,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Logged-in control-plane session for these credentials
    async fn session(&self, creds: &Credentials) -> Result<Arc<AzCli>> {
        let key = session_key(creds);
        let mut sessions = self.sessions.lock().await;
        if let Some(az) = sessions.get(&key) {
            return Ok(az.clone());
        }

        tracing::info!(
            tenant = %creds.tenant_id,
            client = %creds.client_id,
            "Logging in to Azure"
        );
        let az =
            AzCli::new(self.session_root.join(&key)).with_subscription(&creds.subscription_id);
        az.login_service_principal(&creds.tenant_id, &creds.client_id, &creds.client_secret)
            .await?;

        let az = Arc::new(az);
        sessions.insert(key, az.clone());
        Ok(az)
    }
}

/// Directory-safe identifier of a service principal session
fn session_key(creds: &Credentials) -> String {
    format!(
        "{}_{}_{}",
        creds.subscription_id, creds.tenant_id, creds.client_id
    )
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
    .collect()
}

#[async_trait]
impl ProviderGateway for AzureGateway {
    fn name(&self) -> &str {
        "azure"
    }

    async fn ensure_resource_group(
        &self,
        creds: &Credentials,
        resource_group: &str,
        location: &str,
    ) -> Result<()> {
        let az = self.session(creds).await?;
        if az.group_exists(resource_group).await? {
            tracing::debug!(resource_group = %resource_group, "Resource group exists");
            return Ok(());
        }

        tracing::info!(
            resource_group = %resource_group,
            location = %location,
            "Creating resource group"
        );
        az.group_create(resource_group, location).await?;
        Ok(())
    }

    async fn account_exists(
        &self,
        creds: &Credentials,
        resource_group: &str,
        account: &str,
    ) -> Result<bool> {
        let az = self.session(creds).await?;
        let availability = az.storage_account_check_name(account).await?;
        if availability.name_available {
            return Ok(false);
        }
        if availability.is_invalid() {
            return Err(CloudError::InvalidConfig(
                availability
                    .message
                    .unwrap_or_else(|| format!("invalid storage account name {}", account)),
            ));
        }

        // Taken: ours if it shows up in the resource group
        match az.storage_account_show(resource_group, account).await {
            Ok(_) => Ok(true),
            Err(AzureError::ResourceNotFound(_)) => Err(CloudError::NameConflict {
                account: account.to_string(),
                message: availability
                    .message
                    .unwrap_or_else(|| "name is already taken".to_string()),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_account(
        &self,
        creds: &Credentials,
        resource_group: &str,
        account: &str,
        location: &str,
        timeout: Duration,
    ) -> Result<()> {
        let az = self.session(creds).await?;
        let info = az
            .storage_account_create(resource_group, account, location, timeout)
            .await?;
        tracing::info!(
            storage_account = %info.name,
            state = info.provisioning_state.as_deref().unwrap_or("unknown"),
            "Storage account provisioned"
        );
        Ok(())
    }

    async fn account_key(
        &self,
        creds: &Credentials,
        resource_group: &str,
        account: &str,
    ) -> Result<String> {
        let az = self.session(creds).await?;
        Ok(az.storage_account_key(resource_group, account).await?)
    }

    async fn get_container(
        &self,
        account: &str,
        key: &str,
        name: &str,
    ) -> Result<ContainerProperties> {
        let info = self.storage.container_show(account, key, name).await?;
        Ok(ContainerProperties {
            name: info.name,
            etag: info.properties.etag,
            last_modified: info.properties.last_modified,
        })
    }

    async fn create_container(&self, account: &str, key: &str, name: &str) -> Result<()> {
        self.storage.container_create(account, key, name).await?;
        Ok(())
    }

    async fn delete_container(&self, account: &str, key: &str, name: &str) -> Result<()> {
        match self.storage.container_delete(account, key, name).await {
            Ok(true) => Ok(()),
            Ok(false) | Err(AzureError::ResourceNotFound(_)) => {
                tracing::debug!(container = %name, "Container did not exist");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_resource_groups(&self, creds: &Credentials) -> Result<Vec<String>> {
        let az = self.session(creds).await?;
        Ok(az.group_list().await?)
    }

    async fn list_accounts(
        &self,
        creds: &Credentials,
        resource_group: &str,
    ) -> Result<Vec<String>> {
        let az = self.session(creds).await?;
        Ok(az.storage_account_list(resource_group).await?)
    }

    async fn list_containers(&self, account: &str, key: &str) -> Result<Vec<String>> {
        Ok(self.storage.container_list(account, key).await?)
    }
}
