use async_trait::async_trait;
use bucketward_cloud::credentials::{
    AZURE_CLIENT_ID, AZURE_CLIENT_SECRET, AZURE_SUBSCRIPTION_ID, AZURE_TENANT_ID,
};
use bucketward_cloud::{
    BucketCoordinator, BucketKey, BucketRecord, BucketRecordStore, BucketScope, BucketStatus,
    CloudError, ContainerProperties, CreateSecretRequest, Credentials, JsonRecordStore,
    ProviderGateway, Result, SecretItem, SecretStore,
};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const ORG: u64 = 1;
pub const RESOURCE_GROUP: &str = "rg-test";
pub const ACCOUNT: &str = "acct01";
pub const SECRET_REF: &str = "azure-prod";

/// Provider call that can be scripted to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(dead_code)]
pub enum Step {
    EnsureResourceGroup,
    AccountExists,
    CreateAccount,
    AccountKey,
    GetContainer,
    CreateContainer,
    DeleteContainer,
    ListAccounts,
}

#[derive(Default)]
struct FakeCloud {
    resource_groups: BTreeSet<String>,
    /// (resource group, account)
    accounts: BTreeSet<(String, String)>,
    /// Account names owned by somebody else
    foreign_accounts: BTreeSet<String>,
    /// account -> containers
    containers: BTreeMap<String, BTreeSet<String>>,
}

/// In-memory provider with scripted failures
#[derive(Default)]
pub struct FakeGateway {
    cloud: Mutex<FakeCloud>,
    failures: Mutex<HashSet<Step>>,
    timeouts: Mutex<HashSet<Step>>,
    calls: Mutex<Vec<String>>,
    /// Record store read back when a container is deleted
    records: Mutex<Option<Arc<JsonRecordStore>>>,
    statuses_at_delete: Mutex<Vec<BucketStatus>>,
}

#[allow(dead_code)]
impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, step: Step) {
        self.failures.lock().unwrap().insert(step);
    }

    pub fn time_out(&self, step: Step) {
        self.timeouts.lock().unwrap().insert(step);
    }

    pub fn heal(&self) {
        self.failures.lock().unwrap().clear();
        self.timeouts.lock().unwrap().clear();
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, call: &str) -> bool {
        self.calls().iter().any(|c| c == call)
    }

    pub fn add_account(&self, resource_group: &str, account: &str) {
        let mut cloud = self.cloud.lock().unwrap();
        cloud.resource_groups.insert(resource_group.to_string());
        cloud
            .accounts
            .insert((resource_group.to_string(), account.to_string()));
    }

    pub fn add_foreign_account(&self, account: &str) {
        self.cloud
            .lock()
            .unwrap()
            .foreign_accounts
            .insert(account.to_string());
    }

    pub fn add_container(&self, resource_group: &str, account: &str, name: &str) {
        self.add_account(resource_group, account);
        self.cloud
            .lock()
            .unwrap()
            .containers
            .entry(account.to_string())
            .or_default()
            .insert(name.to_string());
    }

    /// Capture the stored status of each bucket whose container is deleted
    pub fn watch_records(&self, store: Arc<JsonRecordStore>) {
        *self.records.lock().unwrap() = Some(store);
    }

    pub fn statuses_at_delete(&self) -> Vec<BucketStatus> {
        self.statuses_at_delete.lock().unwrap().clone()
    }

    async fn capture_status(&self, account: &str, name: &str) {
        let store = self.records.lock().unwrap().clone();
        let Some(store) = store else {
            return;
        };
        let records = store.list_by_org(ORG).await.unwrap();
        if let Some(record) = records
            .iter()
            .find(|r| r.storage_account == account && r.name == name)
        {
            self.statuses_at_delete.lock().unwrap().push(record.status);
        }
    }

    pub fn has_container(&self, account: &str, name: &str) -> bool {
        self.cloud
            .lock()
            .unwrap()
            .containers
            .get(account)
            .is_some_and(|c| c.contains(name))
    }

    fn enter(&self, step: Step, call: &str) -> Result<()> {
        self.calls.lock().unwrap().push(call.to_string());
        if self.timeouts.lock().unwrap().contains(&step) {
            return Err(CloudError::Timeout(format!("{} did not finish", call)));
        }
        if self.failures.lock().unwrap().contains(&step) {
            return Err(CloudError::ApiError(format!("{} failed", call)));
        }
        Ok(())
    }

    fn check_key(account: &str, key: &str) -> Result<()> {
        if key != format!("key-{}", account) {
            return Err(CloudError::AuthenticationFailed("bad account key".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProviderGateway for FakeGateway {
    fn name(&self) -> &str {
        "fake"
    }

    async fn ensure_resource_group(
        &self,
        _creds: &Credentials,
        resource_group: &str,
        _location: &str,
    ) -> Result<()> {
        self.enter(Step::EnsureResourceGroup, "ensure_resource_group")?;
        self.cloud
            .lock()
            .unwrap()
            .resource_groups
            .insert(resource_group.to_string());
        Ok(())
    }

    async fn account_exists(
        &self,
        _creds: &Credentials,
        resource_group: &str,
        account: &str,
    ) -> Result<bool> {
        self.enter(Step::AccountExists, "account_exists")?;
        let cloud = self.cloud.lock().unwrap();
        if cloud.foreign_accounts.contains(account) {
            return Err(CloudError::NameConflict {
                account: account.to_string(),
                message: "The storage account named is already taken.".into(),
            });
        }
        Ok(cloud
            .accounts
            .contains(&(resource_group.to_string(), account.to_string())))
    }

    async fn create_account(
        &self,
        _creds: &Credentials,
        resource_group: &str,
        account: &str,
        _location: &str,
        _timeout: Duration,
    ) -> Result<()> {
        self.enter(Step::CreateAccount, "create_account")?;
        self.add_account(resource_group, account);
        Ok(())
    }

    async fn account_key(
        &self,
        _creds: &Credentials,
        resource_group: &str,
        account: &str,
    ) -> Result<String> {
        self.enter(Step::AccountKey, "account_key")?;
        let cloud = self.cloud.lock().unwrap();
        if !cloud
            .accounts
            .contains(&(resource_group.to_string(), account.to_string()))
        {
            return Err(CloudError::NotFound(format!("storage account {}", account)));
        }
        Ok(format!("key-{}", account))
    }

    async fn get_container(
        &self,
        account: &str,
        key: &str,
        name: &str,
    ) -> Result<ContainerProperties> {
        self.enter(Step::GetContainer, "get_container")?;
        Self::check_key(account, key)?;
        if self.has_container(account, name) {
            Ok(ContainerProperties {
                name: name.to_string(),
                ..Default::default()
            })
        } else {
            Err(CloudError::NotFound(format!("container {}", name)))
        }
    }

    async fn create_container(&self, account: &str, key: &str, name: &str) -> Result<()> {
        self.enter(Step::CreateContainer, "create_container")?;
        Self::check_key(account, key)?;
        self.cloud
            .lock()
            .unwrap()
            .containers
            .entry(account.to_string())
            .or_default()
            .insert(name.to_string());
        Ok(())
    }

    async fn delete_container(&self, account: &str, key: &str, name: &str) -> Result<()> {
        self.capture_status(account, name).await;
        self.enter(Step::DeleteContainer, "delete_container")?;
        Self::check_key(account, key)?;
        if let Some(containers) = self.cloud.lock().unwrap().containers.get_mut(account) {
            containers.remove(name);
        }
        Ok(())
    }

    async fn list_resource_groups(&self, _creds: &Credentials) -> Result<Vec<String>> {
        self.calls.lock().unwrap().push("list_resource_groups".into());
        Ok(self
            .cloud
            .lock()
            .unwrap()
            .resource_groups
            .iter()
            .cloned()
            .collect())
    }

    async fn list_accounts(
        &self,
        _creds: &Credentials,
        resource_group: &str,
    ) -> Result<Vec<String>> {
        self.enter(Step::ListAccounts, "list_accounts")?;
        Ok(self
            .cloud
            .lock()
            .unwrap()
            .accounts
            .iter()
            .filter(|(rg, _)| rg == resource_group)
            .map(|(_, account)| account.clone())
            .collect())
    }

    async fn list_containers(&self, account: &str, key: &str) -> Result<Vec<String>> {
        self.calls.lock().unwrap().push("list_containers".into());
        Self::check_key(account, key)?;
        Ok(self
            .cloud
            .lock()
            .unwrap()
            .containers
            .get(account)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default())
    }
}

/// Secret store kept in memory
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<BTreeMap<(u64, String), SecretItem>>,
    fail_writes: Mutex<bool>,
}

#[allow(dead_code)]
impl MemorySecretStore {
    pub fn with_credentials() -> Self {
        let store = Self::default();
        store.insert(
            ORG,
            SECRET_REF,
            &[
                (AZURE_SUBSCRIPTION_ID, "sub-1"),
                (AZURE_TENANT_ID, "tenant-1"),
                (AZURE_CLIENT_ID, "client-1"),
                (AZURE_CLIENT_SECRET, "s3cr3t"),
            ],
        );
        store
    }

    pub fn insert(&self, org: u64, name: &str, values: &[(&str, &str)]) {
        self.secrets.lock().unwrap().insert(
            (org, name.to_string()),
            SecretItem {
                id: name.to_string(),
                name: name.to_string(),
                secret_type: "azure".to_string(),
                values: values
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                tags: Vec::new(),
                updated_at: Utc::now(),
            },
        );
    }

    pub fn fail_writes(&self) {
        *self.fail_writes.lock().unwrap() = true;
    }

    pub fn get_sync(&self, org: u64, name: &str) -> Option<SecretItem> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(org, name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, organization_id: u64, secret_ref: &str) -> Result<SecretItem> {
        self.get_sync(organization_id, secret_ref)
            .ok_or_else(|| CloudError::NotFound(format!("secret {}", secret_ref)))
    }

    async fn create_or_update(
        &self,
        organization_id: u64,
        request: &CreateSecretRequest,
    ) -> Result<String> {
        if *self.fail_writes.lock().unwrap() {
            return Err(CloudError::SecretStore("vault is sealed".into()));
        }
        self.secrets.lock().unwrap().insert(
            (organization_id, request.name.clone()),
            SecretItem {
                id: request.name.clone(),
                name: request.name.clone(),
                secret_type: request.secret_type.clone(),
                values: request.values.clone(),
                tags: request.tags.clone(),
                updated_at: Utc::now(),
            },
        );
        Ok(request.name.clone())
    }
}

/// Coordinator wired to a fake gateway and a temp-dir record store
pub struct TestHarness {
    #[allow(dead_code)]
    pub dir: TempDir,
    pub gateway: Arc<FakeGateway>,
    pub store: Arc<JsonRecordStore>,
    pub secrets: Arc<MemorySecretStore>,
    pub coordinator: BucketCoordinator,
}

#[allow(dead_code)]
impl TestHarness {
    pub fn new() -> Self {
        Self::with_scope(scope())
    }

    pub fn with_scope(scope: BucketScope) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(FakeGateway::new());
        let store = Arc::new(JsonRecordStore::new(dir.path()));
        gateway.watch_records(store.clone());
        let secrets = Arc::new(MemorySecretStore::with_credentials());
        let coordinator =
            BucketCoordinator::new(scope, gateway.clone(), store.clone(), secrets.clone());

        Self {
            dir,
            gateway,
            store,
            secrets,
            coordinator,
        }
    }

    pub async fn record(&self, name: &str) -> Option<BucketRecord> {
        self.store
            .find(ORG, &BucketKey::new(RESOURCE_GROUP, ACCOUNT, name))
            .await
            .ok()
    }

    pub async fn records(&self) -> Vec<BucketRecord> {
        self.store.list_by_org(ORG).await.unwrap()
    }
}

pub fn scope() -> BucketScope {
    BucketScope {
        organization_id: ORG,
        location: "westeurope".to_string(),
        resource_group: Some(RESOURCE_GROUP.to_string()),
        storage_account: Some(ACCOUNT.to_string()),
        secret_ref: SECRET_REF.to_string(),
    }
}
