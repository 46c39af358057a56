//! Secret store abstraction
//!
//! The coordinator reads provider credentials from, and writes storage
//! account keys to, a [`SecretStore`] handed to it at construction time.
//! [`FileSecretStore`] keeps secrets in a JSON file next to the bucket state.

use crate::error::{CloudError, Result};
use crate::state::write_atomic;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const SECRETS_VERSION: u32 = 1;

/// A stored secret
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub secret_type: String,
    pub values: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl SecretItem {
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl std::fmt::Debug for SecretItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretItem")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("secret_type", &self.secret_type)
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .field("tags", &self.tags)
            .finish()
    }
}

/// Request to create or replace a secret
#[derive(Clone)]
pub struct CreateSecretRequest {
    pub name: String,
    pub secret_type: String,
    pub values: BTreeMap<String, String>,
    pub tags: Vec<String>,
}

/// Narrow interface to the secret-storage subsystem
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Look up a secret by reference
    async fn get(&self, organization_id: u64, secret_ref: &str) -> Result<SecretItem>;

    /// Create a secret or replace the one with the same name, returning its ID
    async fn create_or_update(
        &self,
        organization_id: u64,
        request: &CreateSecretRequest,
    ) -> Result<String>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SecretsFile {
    version: u32,
    #[serde(default)]
    organizations: BTreeMap<u64, Vec<SecretItem>>,
}

/// Secret store backed by a single JSON file
///
/// References resolve by ID first, then by name. Values are stored as plain
/// JSON; the file is written atomically and, on Unix, readable by its owner
/// only.
pub struct FileSecretStore {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl FileSecretStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<SecretsFile> {
        if !self.path.exists() {
            return Ok(SecretsFile {
                version: SECRETS_VERSION,
                ..Default::default()
            });
        }

        let content = fs::read_to_string(&self.path).await?;
        let file: SecretsFile = serde_json::from_str(&content)?;

        if file.version > SECRETS_VERSION {
            return Err(CloudError::SecretStore(format!(
                "Secrets file version {} is newer than supported version {}",
                file.version, SECRETS_VERSION
            )));
        }

        Ok(file)
    }

    async fn save(&self, file: &SecretsFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(file)?;
        write_atomic(&self.path, content.as_bytes(), true).await
    }
}

fn secret_store_error(err: CloudError) -> CloudError {
    match err {
        CloudError::SecretStore(_) | CloudError::NotFound(_) => err,
        other => CloudError::SecretStore(other.to_string()),
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get(&self, organization_id: u64, secret_ref: &str) -> Result<SecretItem> {
        let file = self.load().await.map_err(secret_store_error)?;
        let secrets = file
            .organizations
            .get(&organization_id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        secrets
            .iter()
            .find(|s| s.id == secret_ref)
            .or_else(|| secrets.iter().find(|s| s.name == secret_ref))
            .cloned()
            .ok_or_else(|| CloudError::NotFound(format!("secret {}", secret_ref)))
    }

    async fn create_or_update(
        &self,
        organization_id: u64,
        request: &CreateSecretRequest,
    ) -> Result<String> {
        let _guard = self.write_guard.lock().await;
        let mut file = self.load().await.map_err(secret_store_error)?;
        file.version = SECRETS_VERSION;

        let secrets = file.organizations.entry(organization_id).or_default();
        let id = match secrets.iter_mut().find(|s| s.name == request.name) {
            Some(existing) => {
                existing.secret_type = request.secret_type.clone();
                existing.values = request.values.clone();
                existing.tags = request.tags.clone();
                existing.updated_at = Utc::now();
                existing.id.clone()
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                secrets.push(SecretItem {
                    id: id.clone(),
                    name: request.name.clone(),
                    secret_type: request.secret_type.clone(),
                    values: request.values.clone(),
                    tags: request.tags.clone(),
                    updated_at: Utc::now(),
                });
                id
            }
        };

        self.save(&file).await.map_err(secret_store_error)?;
        tracing::debug!(secret = %request.name, "Stored secret");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn request(name: &str, value: &str) -> CreateSecretRequest {
        CreateSecretRequest {
            name: name.to_string(),
            secret_type: "azureStorageAccount".to_string(),
            values: [("accessKey".to_string(), value.to_string())]
                .into_iter()
                .collect(),
            tags: vec!["azureStorageAccount:acct".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_then_get_by_id_and_name() {
        let temp_dir = tempdir().unwrap();
        let store = FileSecretStore::new(temp_dir.path().join("secrets.json"));

        let id = store.create_or_update(1, &request("acct-key", "k1")).await.unwrap();

        let by_id = store.get(1, &id).await.unwrap();
        assert_eq!(by_id.value("accessKey"), Some("k1"));

        let by_name = store.get(1, "acct-key").await.unwrap();
        assert_eq!(by_name.id, id);
    }

    #[tokio::test]
    async fn test_update_keeps_id() {
        let temp_dir = tempdir().unwrap();
        let store = FileSecretStore::new(temp_dir.path().join("secrets.json"));

        let first = store.create_or_update(1, &request("acct-key", "k1")).await.unwrap();
        let second = store.create_or_update(1, &request("acct-key", "k2")).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            store.get(1, "acct-key").await.unwrap().value("accessKey"),
            Some("k2")
        );
    }

    #[tokio::test]
    async fn test_secrets_are_scoped_per_organization() {
        let temp_dir = tempdir().unwrap();
        let store = FileSecretStore::new(temp_dir.path().join("secrets.json"));
        store.create_or_update(1, &request("acct-key", "k1")).await.unwrap();

        let err = store.get(2, "acct-key").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_secrets_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("secrets.json");
        let store = FileSecretStore::new(&path);
        store.create_or_update(1, &request("acct-key", "k1")).await.unwrap();
        store.create_or_update(1, &request("acct-key", "k2")).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!temp_dir.path().join("secrets.json.tmp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_existing_world_readable_file_is_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("secrets.json");
        std::fs::write(&path, r#"{"version": 1, "organizations": {}}"#).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        FileSecretStore::new(&path)
            .create_or_update(1, &request("acct-key", "k1"))
            .await
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_debug_hides_values() {
        let item = SecretItem {
            id: "id".into(),
            name: "n".into(),
            secret_type: "t".into(),
            values: [("accessKey".to_string(), "super-secret".to_string())]
                .into_iter()
                .collect(),
            tags: Vec::new(),
            updated_at: Utc::now(),
        };
        let debug = format!("{:?}", item);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("accessKey"));
    }
}
