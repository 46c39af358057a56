//! Naming rules and defaults for resource groups, accounts and containers

use crate::error::{CloudError, Result};
use regex::Regex;
use std::sync::LazyLock;

/// Storage account used when none is configured.
/// Must be 3-24 characters of lowercase letters and digits.
pub const DEFAULT_STORAGE_ACCOUNT: &str = "bucketwardstorage";

/// Secret type under which storage account keys are stored
pub const STORAGE_ACCOUNT_SECRET_TYPE: &str = "azureStorageAccount";

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]").expect("valid regex"));

/// Resource group generated for a location when none is configured
pub fn default_resource_group(location: &str) -> String {
    format!("bucketward-auto-{}", location)
}

/// Deterministic secret name for a storage account key
pub fn account_key_secret_name(storage_account: &str) -> String {
    format!("{}-key", NON_ALPHANUMERIC.replace_all(storage_account, "-"))
}

/// Check a blob container name
///
/// 3-63 characters; lowercase letters, digits and hyphens; starts with a
/// letter or digit; no two hyphens in a row.
pub fn validate_container_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(CloudError::InvalidConfig(format!(
            "invalid bucket name {:?}: {}",
            name, reason
        )))
    };

    if !(3..=63).contains(&name.len()) {
        return invalid("must be 3-63 characters long");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return invalid("only lowercase letters, digits and hyphens are allowed");
    }
    if name.starts_with('-') || name.ends_with('-') {
        return invalid("must start and end with a letter or digit");
    }
    if name.contains("--") {
        return invalid("consecutive hyphens are not allowed");
    }
    Ok(())
}

/// Check a storage account name: 3-24 lowercase letters and digits
pub fn validate_storage_account_name(name: &str) -> Result<()> {
    if !(3..=24).contains(&name.len())
        || !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(CloudError::InvalidConfig(format!(
            "invalid storage account name {:?}: must be 3-24 lowercase letters and digits",
            name
        )));
    }
    Ok(())
}
