//! az CLI wrapper
//!
//! Wraps the Azure CLI commands for resource group, storage account and
//! blob container operations. Each `AzCli` instance keeps its login session in
//! its own `AZURE_CONFIG_DIR`, so several service principals can be used side
//! by side without touching the user's own `az` profile.

use crate::error::{AzureError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const AZ: &str = "az";

/// Markers `az` prints on stderr when the target resource is absent
const NOT_FOUND_MARKERS: &[&str] = &[
    "ResourceNotFound",
    "ResourceGroupNotFound",
    "ContainerNotFound",
    "StorageAccountNotFound",
    "was not found",
    "does not exist",
    "could not be found",
];

/// az CLI wrapper
#[derive(Debug, Clone)]
pub struct AzCli {
    config_dir: PathBuf,
    subscription: Option<String>,
}

/// Extra environment and limits for one invocation
#[derive(Default)]
struct Invocation<'a> {
    env: Vec<(&'a str, &'a str)>,
    timeout: Option<Duration>,
    /// Arguments to hide from logs
    redact: bool,
}

impl AzCli {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            subscription: None,
        }
    }

    /// Scope control-plane commands to a subscription
    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = Some(subscription.into());
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Log in with a service principal
    ///
    /// `az login` only takes a client secret as `--password`, so the secret
    /// is visible in the process table (`ps`, `/proc/<pid>/cmdline`) for as
    /// long as the login runs. It is kept out of logs. Hosts shared with
    /// untrusted users should use a dedicated principal with the narrowest
    /// role that still covers storage accounts.
    pub async fn login_service_principal(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<()> {
        let result = self
            .exec(
                &[
                    "login",
                    "--service-principal",
                    "--tenant",
                    tenant_id,
                    "--username",
                    client_id,
                    "--password",
                    client_secret,
                    "--output",
                    "none",
                ],
                Invocation {
                    redact: true,
                    ..Default::default()
                },
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(AzureError::CommandFailed(msg)) | Err(AzureError::ResourceNotFound(msg)) => {
                Err(AzureError::LoginFailed(msg))
            }
            Err(e) => Err(e),
        }
    }

    /// Run a control-plane command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        self.run_command_with(args, Invocation::default()).await
    }

    async fn run_command_with(
        &self,
        args: &[&str],
        invocation: Invocation<'_>,
    ) -> Result<String> {
        let mut full: Vec<&str> = args.to_vec();
        if let Some(ref subscription) = self.subscription {
            full.push("--subscription");
            full.push(subscription.as_str());
        }
        full.push("--output");
        full.push("json");
        self.exec(&full, invocation).await
    }

    /// Run a data-plane command authorized with the account key
    async fn run_storage_command(
        &self,
        account: &str,
        key: &str,
        args: &[&str],
    ) -> Result<String> {
        let mut full: Vec<&str> = args.to_vec();
        full.push("--output");
        full.push("json");
        self.exec(
            &full,
            Invocation {
                env: vec![
                    ("AZURE_STORAGE_ACCOUNT", account),
                    ("AZURE_STORAGE_KEY", key),
                ],
                ..Default::default()
            },
        )
        .await
    }

    async fn exec(&self, args: &[&str], invocation: Invocation<'_>) -> Result<String> {
        tokio::fs::create_dir_all(&self.config_dir).await?;

        let mut cmd = Command::new(AZ);
        cmd.args(args);
        cmd.env("AZURE_CONFIG_DIR", &self.config_dir);
        cmd.env("AZURE_CORE_ONLY_SHOW_ERRORS", "true");
        cmd.env("AZURE_CORE_NO_COLOR", "true");
        cmd.envs(invocation.env.iter().copied());
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!("Running: {}", describe(args, invocation.redact));

        let output = match invocation.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| AzureError::Timeout(limit))?,
            None => cmd.output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AzureError::AzNotFound);
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Whether the resource group exists
    pub async fn group_exists(&self, name: &str) -> Result<bool> {
        let output = self.run_command(&["group", "exists", "--name", name]).await?;
        parse_json(&output)
    }

    pub async fn group_create(&self, name: &str, location: &str) -> Result<()> {
        self.run_command(&["group", "create", "--name", name, "--location", location])
            .await?;
        Ok(())
    }

    /// Names of all resource groups in the subscription
    pub async fn group_list(&self) -> Result<Vec<String>> {
        let output = self
            .run_command(&["group", "list", "--query", "[].name"])
            .await?;
        parse_names(&output)
    }

    /// Global availability of a storage account name
    pub async fn storage_account_check_name(&self, name: &str) -> Result<NameAvailability> {
        let output = self
            .run_command(&["storage", "account", "check-name", "--name", name])
            .await?;
        parse_json(&output)
    }

    pub async fn storage_account_show(
        &self,
        resource_group: &str,
        name: &str,
    ) -> Result<StorageAccountInfo> {
        let output = self
            .run_command(&[
                "storage",
                "account",
                "show",
                "--resource-group",
                resource_group,
                "--name",
                name,
            ])
            .await?;
        parse_json(&output)
    }

    /// Create a Hot-tier blob storage account and wait for provisioning
    pub async fn storage_account_create(
        &self,
        resource_group: &str,
        name: &str,
        location: &str,
        timeout: Duration,
    ) -> Result<StorageAccountInfo> {
        let output = self
            .run_command_with(
                &[
                    "storage",
                    "account",
                    "create",
                    "--resource-group",
                    resource_group,
                    "--name",
                    name,
                    "--location",
                    location,
                    "--sku",
                    "Standard_LRS",
                    "--kind",
                    "BlobStorage",
                    "--access-tier",
                    "Hot",
                ],
                Invocation {
                    timeout: Some(timeout),
                    ..Default::default()
                },
            )
            .await?;
        parse_json(&output)
    }

    /// First access key of the storage account
    pub async fn storage_account_key(&self, resource_group: &str, name: &str) -> Result<String> {
        let output = self
            .run_command(&[
                "storage",
                "account",
                "keys",
                "list",
                "--resource-group",
                resource_group,
                "--account-name",
                name,
            ])
            .await?;
        first_key(&output)
    }

    /// Names of the storage accounts in a resource group
    pub async fn storage_account_list(&self, resource_group: &str) -> Result<Vec<String>> {
        let output = self
            .run_command(&[
                "storage",
                "account",
                "list",
                "--resource-group",
                resource_group,
                "--query",
                "[].name",
            ])
            .await?;
        parse_names(&output)
    }

    pub async fn container_show(
        &self,
        account: &str,
        key: &str,
        name: &str,
    ) -> Result<ContainerInfo> {
        let output = self
            .run_storage_command(account, key, &["storage", "container", "show", "--name", name])
            .await?;
        parse_json(&output)
    }

    pub async fn container_create(&self, account: &str, key: &str, name: &str) -> Result<()> {
        let output = self
            .run_storage_command(
                account,
                key,
                &["storage", "container", "create", "--name", name],
            )
            .await?;
        let result: CreatedResult = parse_json(&output)?;
        if !result.created {
            tracing::debug!(container = %name, "Container was already present");
        }
        Ok(())
    }

    /// Delete a container, returning whether it existed
    pub async fn container_delete(&self, account: &str, key: &str, name: &str) -> Result<bool> {
        let output = self
            .run_storage_command(
                account,
                key,
                &["storage", "container", "delete", "--name", name],
            )
            .await?;
        let result: DeletedResult = parse_json(&output)?;
        Ok(result.deleted)
    }

    pub async fn container_list(&self, account: &str, key: &str) -> Result<Vec<String>> {
        let output = self
            .run_storage_command(
                account,
                key,
                &[
                    "storage",
                    "container",
                    "list",
                    "--num-results",
                    "*",
                    "--query",
                    "[].name",
                ],
            )
            .await?;
        parse_names(&output)
    }
}

/// Command line as it may appear in logs
fn describe(args: &[&str], redact: bool) -> String {
    if redact {
        format!("az {} (arguments hidden)", args.first().unwrap_or(&""))
    } else {
        format!("az {}", args.join(" "))
    }
}

/// Turn a failed invocation's stderr into an error
pub(crate) fn classify_failure(stderr: &str) -> AzureError {
    let message = stderr.trim().to_string();
    if NOT_FOUND_MARKERS.iter().any(|marker| message.contains(marker)) {
        AzureError::ResourceNotFound(message)
    } else {
        AzureError::CommandFailed(message)
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(output: &str) -> Result<T> {
    Ok(serde_json::from_str(output.trim())?)
}

/// Parse a `--query "[].name"` listing; empty output means no entries
fn parse_names(output: &str) -> Result<Vec<String>> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "[]" {
        return Ok(Vec::new());
    }
    parse_json(trimmed)
}

fn first_key(output: &str) -> Result<String> {
    let keys: Vec<AccountKey> = parse_json(output)?;
    keys.into_iter()
        .map(|k| k.value)
        .find(|v| !v.is_empty())
        .ok_or_else(|| AzureError::UnexpectedOutput("storage account has no access keys".into()))
}

/// Result of `az storage account check-name`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameAvailability {
    #[serde(rename = "nameAvailable")]
    pub name_available: bool,

    pub reason: Option<String>,

    pub message: Option<String>,
}

impl NameAvailability {
    /// The name is syntactically invalid rather than taken
    pub fn is_invalid(&self) -> bool {
        self.reason.as_deref() == Some("AccountNameInvalid")
    }
}

/// Storage account information from `az storage account show/create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageAccountInfo {
    pub name: String,

    #[serde(rename = "resourceGroup")]
    pub resource_group: Option<String>,

    pub location: Option<String>,

    #[serde(rename = "provisioningState")]
    pub provisioning_state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccountKey {
    value: String,
}

/// Container information from `az storage container show`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,

    #[serde(default)]
    pub properties: ContainerInfoProperties,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerInfoProperties {
    pub etag: Option<String>,

    #[serde(rename = "lastModified")]
    pub last_modified: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedResult {
    created: bool,
}

#[derive(Debug, Deserialize)]
struct DeletedResult {
    deleted: bool,
}
