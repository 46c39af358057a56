//! Bucket record persistence
//!
//! Manages the `buckets.json` file which tracks every managed bucket, and
//! exposes it through the [`BucketRecordStore`] trait.

use crate::bucket::{BucketKey, BucketRecord, RecordPatch, compare_keys};
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

const STATE_VERSION: u32 = 1;
const STATE_FILE: &str = "buckets.json";
const STATE_BACKUP: &str = "buckets.json.backup";
const LOCK_FILE: &str = "lock.json";

/// CRUD over persisted bucket records
///
/// Lookups that find nothing return [`CloudError::NotFound`]; every other
/// failure is a [`CloudError::Persistence`].
#[async_trait]
pub trait BucketRecordStore: Send + Sync {
    async fn find(&self, organization_id: u64, key: &BucketKey) -> Result<BucketRecord>;

    /// Insert or replace the record with the same identity
    async fn save(&self, record: &BucketRecord) -> Result<()>;

    /// Apply `patch` to the stored copy of `record` and return the result
    async fn update_fields(&self, record: &BucketRecord, patch: RecordPatch)
    -> Result<BucketRecord>;

    async fn delete(&self, record: &BucketRecord) -> Result<()>;

    /// All records of an organization, ascending by
    /// `(resource_group, storage_account, name)`
    async fn list_by_org(&self, organization_id: u64) -> Result<Vec<BucketRecord>>;
}

/// Contents of the state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketState {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    pub records: Vec<BucketRecord>,
}

impl Default for BucketState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            records: Vec::new(),
        }
    }
}

impl BucketState {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, organization_id: u64, key: &BucketKey) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.matches(organization_id, key))
    }

    /// Add or replace a record
    pub fn upsert(&mut self, record: BucketRecord) {
        match self.position(record.organization_id, &record.key()) {
            Some(idx) => self.records[idx] = record,
            None => self.records.push(record),
        }
        self.updated_at = Utc::now();
    }

    /// Remove a record
    pub fn remove(&mut self, organization_id: u64, key: &BucketKey) -> Option<BucketRecord> {
        let idx = self.position(organization_id, key)?;
        self.updated_at = Utc::now();
        Some(self.records.remove(idx))
    }

    pub fn get(&self, organization_id: u64, key: &BucketKey) -> Option<&BucketRecord> {
        self.records.iter().find(|r| r.matches(organization_id, key))
    }
}

/// State manager for reading/writing the state file
pub struct StateManager {
    state_dir: PathBuf,
}

impl StateManager {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: state_dir.as_ref().to_path_buf(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn state_path(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir.join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        if !self.state_dir.exists() {
            fs::create_dir_all(&self.state_dir).await?;
            tracing::debug!("Created state directory: {}", self.state_dir.display());
        }
        Ok(())
    }

    /// Load the current state
    ///
    /// Falls back to the backup when the state file itself is missing.
    pub async fn load(&self) -> Result<BucketState> {
        let path = self.state_path();
        if path.exists() {
            return Self::read_state(&path).await;
        }

        let backup = self.backup_path();
        if backup.exists() {
            tracing::warn!(
                "State file missing, restoring from backup {}",
                backup.display()
            );
            return Self::read_state(&backup).await;
        }

        tracing::debug!("State file not found, returning empty state");
        Ok(BucketState::new())
    }

    async fn read_state(path: &Path) -> Result<BucketState> {
        let content = fs::read_to_string(path).await?;
        let state: BucketState = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(CloudError::StateError(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!("Loaded state with {} records", state.records.len());
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    ///
    /// The state file is replaced atomically; readers see either the old or
    /// the new contents, never a missing or partial file.
    pub async fn save(&self, state: &BucketState) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }

        let content = serde_json::to_string_pretty(state)?;
        write_atomic(&path, content.as_bytes(), false).await?;

        tracing::debug!("Saved state with {} records", state.records.len());
        Ok(())
    }

    /// Acquire a lock for exclusive access
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();

        if lock_path.exists() {
            let content = fs::read_to_string(&lock_path).await?;
            let lock_info: LockInfo = serde_json::from_str(&content)?;

            // Locks older than an hour are considered abandoned
            let age = Utc::now().signed_duration_since(lock_info.acquired_at);
            if age.num_hours() < 1 {
                return Err(CloudError::LockError(format!(
                    "State is locked by {} (pid {}) since {}",
                    lock_info.holder, lock_info.pid, lock_info.acquired_at
                )));
            }

            tracing::warn!("Removing stale lock from {}", lock_info.holder);
        }

        let lock_info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };

        let content = serde_json::to_string_pretty(&lock_info)?;
        fs::write(&lock_path, content).await?;

        Ok(StateLock {
            lock_path,
            released: false,
        })
    }
}

/// Write `contents` to a temporary sibling of `path`, then rename it over
/// `path`
///
/// With `private` the file is readable by its owner only (Unix).
#[cfg_attr(not(unix), allow(unused_variables))]
pub(crate) async fn write_atomic(path: &Path, contents: &[u8], private: bool) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if private {
        options.mode(0o600);
    }

    let mut file = options.open(&tmp).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    // `mode` only applies to newly created files; a leftover temp file keeps
    // its old permissions
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600)).await?;
    }

    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Lock information
#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// RAII guard for the state lock
pub struct StateLock {
    lock_path: PathBuf,
    released: bool,
}

impl StateLock {
    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        if !self.released {
            if self.lock_path.exists() {
                fs::remove_file(&self.lock_path).await?;
            }
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if !self.released && self.lock_path.exists() {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

/// [`BucketRecordStore`] backed by the JSON state file
///
/// Writes are serialized in-process and guarded across processes by the
/// state lock. Reads in this process wait for in-flight writes.
pub struct JsonRecordStore {
    manager: StateManager,
    guard: RwLock<()>,
}

impl JsonRecordStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            manager: StateManager::new(state_dir),
            guard: RwLock::new(()),
        }
    }

    pub fn manager(&self) -> &StateManager {
        &self.manager
    }

    /// Load, mutate and save the state under both locks
    async fn modify<T>(
        &self,
        f: impl FnOnce(&mut BucketState) -> Result<T> + Send,
    ) -> Result<T> {
        let _guard = self.guard.write().await;
        let lock = self.manager.acquire_lock().await?;

        let mut state = self.manager.load().await?;
        let value = f(&mut state)?;
        self.manager.save(&state).await?;

        lock.release().await?;
        Ok(value)
    }
}

fn persistence(err: CloudError) -> CloudError {
    match err {
        CloudError::NotFound(_) | CloudError::Persistence(_) => err,
        other => CloudError::Persistence(other.to_string()),
    }
}

fn record_not_found(organization_id: u64, key: &BucketKey) -> CloudError {
    CloudError::NotFound(format!(
        "bucket {} in organization {}",
        key, organization_id
    ))
}

#[async_trait]
impl BucketRecordStore for JsonRecordStore {
    async fn find(&self, organization_id: u64, key: &BucketKey) -> Result<BucketRecord> {
        let state = {
            let _guard = self.guard.read().await;
            self.manager.load().await.map_err(persistence)?
        };
        state
            .get(organization_id, key)
            .cloned()
            .ok_or_else(|| record_not_found(organization_id, key))
    }

    async fn save(&self, record: &BucketRecord) -> Result<()> {
        let record = record.clone();
        self.modify(move |state| {
            state.upsert(record);
            Ok(())
        })
        .await
        .map_err(persistence)
    }

    async fn update_fields(
        &self,
        record: &BucketRecord,
        patch: RecordPatch,
    ) -> Result<BucketRecord> {
        let organization_id = record.organization_id;
        let key = record.key();
        self.modify(move |state| {
            let mut stored = state
                .remove(organization_id, &key)
                .ok_or_else(|| record_not_found(organization_id, &key))?;
            stored.apply(&patch);
            // The patch may move the record onto an identity that is taken
            if state.get(organization_id, &stored.key()).is_some() {
                return Err(CloudError::Persistence(format!(
                    "cannot move bucket {} to {}: record exists",
                    key,
                    stored.key()
                )));
            }
            state.upsert(stored.clone());
            Ok(stored)
        })
        .await
        .map_err(persistence)
    }

    async fn delete(&self, record: &BucketRecord) -> Result<()> {
        let organization_id = record.organization_id;
        let key = record.key();
        self.modify(move |state| {
            state
                .remove(organization_id, &key)
                .map(|_| ())
                .ok_or_else(|| record_not_found(organization_id, &key))
        })
        .await
        .map_err(persistence)
    }

    async fn list_by_org(&self, organization_id: u64) -> Result<Vec<BucketRecord>> {
        let state = {
            let _guard = self.guard.read().await;
            self.manager.load().await.map_err(persistence)?
        };
        let mut records: Vec<BucketRecord> = state
            .records
            .into_iter()
            .filter(|r| r.organization_id == organization_id)
            .collect();
        records.sort_by(|a, b| compare_keys(a.key_tuple(), b.key_tuple()));
        Ok(records)
    }
}
