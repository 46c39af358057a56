//! Credential resolution
//!
//! Turns an opaque secret reference into the service principal credentials
//! the provider gateway authenticates with.

use crate::error::{CloudError, Result};
use crate::secret::{CreateSecretRequest, SecretItem, SecretStore};

pub const AZURE_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";

/// Secret type of stored service principal credentials
pub const SERVICE_PRINCIPAL_SECRET_TYPE: &str = "azureServicePrincipal";

/// Service principal credentials for one subscription
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub subscription_id: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Build credentials from a secret, failing if any required field is
    /// missing or empty
    pub fn from_secret(secret: &SecretItem) -> Result<Self> {
        let field = |key: &str| {
            secret
                .value(key)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let fields = [
            AZURE_SUBSCRIPTION_ID,
            AZURE_TENANT_ID,
            AZURE_CLIENT_ID,
            AZURE_CLIENT_SECRET,
        ];
        let missing: Vec<&str> = fields
            .iter()
            .copied()
            .filter(|key| field(*key).is_none())
            .collect();

        if !missing.is_empty() {
            return Err(CloudError::AuthenticationFailed(format!(
                "secret {} is missing required fields: {}",
                secret.name,
                missing.join(", ")
            )));
        }

        Ok(Self {
            subscription_id: field(AZURE_SUBSCRIPTION_ID).unwrap_or_default(),
            tenant_id: field(AZURE_TENANT_ID).unwrap_or_default(),
            client_id: field(AZURE_CLIENT_ID).unwrap_or_default(),
            client_secret: field(AZURE_CLIENT_SECRET).unwrap_or_default(),
        })
    }

    /// Request that stores these credentials as the secret `name`
    pub fn to_secret_request(&self, name: impl Into<String>) -> CreateSecretRequest {
        CreateSecretRequest {
            name: name.into(),
            secret_type: SERVICE_PRINCIPAL_SECRET_TYPE.to_string(),
            values: [
                (AZURE_SUBSCRIPTION_ID, &self.subscription_id),
                (AZURE_TENANT_ID, &self.tenant_id),
                (AZURE_CLIENT_ID, &self.client_id),
                (AZURE_CLIENT_SECRET, &self.client_secret),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
            tags: vec![format!("tenant:{}", self.tenant_id)],
        }
    }
}

/// Resolve a secret reference into credentials
pub async fn resolve_credentials(
    secrets: &dyn SecretStore,
    organization_id: u64,
    secret_ref: &str,
) -> Result<Credentials> {
    let secret = secrets
        .get(organization_id, secret_ref)
        .await
        .map_err(|e| match e {
            CloudError::NotFound(what) => {
                CloudError::AuthenticationFailed(format!("{} does not exist", what))
            }
            other => other,
        })?;

    Credentials::from_secret(&secret)
}
