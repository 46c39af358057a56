use assert_cmd::Command;
use bucketward_cloud::{BucketKey, BucketRecord, BucketState, BucketStatus};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Environment variables that would leak the host's setup into a test run
const HOST_ENV: &[&str] = &[
    "BUCKETWARD_CONFIG",
    "BUCKETWARD_ORG",
    "BUCKETWARD_LOCATION",
    "BUCKETWARD_RESOURCE_GROUP",
    "BUCKETWARD_STORAGE_ACCOUNT",
    "BUCKETWARD_SECRET",
    "BUCKETWARD_STATE_DIR",
    "RUST_LOG",
];

pub struct TestProject {
    pub root: TempDir,
}

#[allow(dead_code)]
impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_config(&self, content: &str) {
        fs::write(self.root.path().join("bucketward.yaml"), content).unwrap();
    }

    /// Write `buckets.json` into the default state directory
    pub fn write_records(&self, records: Vec<BucketRecord>) {
        let mut state = BucketState::new();
        for record in records {
            state.upsert(record);
        }
        let dir = self.state_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("buckets.json"),
            serde_json::to_string_pretty(&state).unwrap(),
        )
        .unwrap();
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.path().join(".bucketward")
    }

    /// `bucketward` running inside the project directory
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("bucketward").unwrap();
        cmd.current_dir(self.root.path());
        for var in HOST_ENV {
            cmd.env_remove(var);
        }
        cmd
    }
}

pub fn record(org: u64, name: &str, status: BucketStatus, msg: &str) -> BucketRecord {
    let mut record = BucketRecord::new(
        org,
        BucketKey::new("rg-media", "mediastore", name),
        "westeurope",
        "azure-prod",
    );
    record.status = status;
    record.status_msg = msg.to_string();
    record
}
