//! Settings resolution and coordinator wiring

use crate::ScopeArgs;
use anyhow::Context;
use bucketward_cloud::{
    BucketCoordinator, BucketScope, CoordinatorOptions, FileSecretStore, JsonRecordStore,
};
use bucketward_cloud_azure::AzureGateway;
use bucketward_config::Settings;
use std::sync::Arc;
use std::time::Duration;

/// Load bucketward.yaml and apply command-line overrides
pub fn load_settings(args: &ScopeArgs) -> anyhow::Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => bucketward_config::load_settings(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => bucketward_config::load_or_default()?,
    };

    if let Some(organization_id) = args.organization_id {
        settings.organization_id = Some(organization_id);
    }
    if let Some(ref location) = args.location {
        settings.location = Some(location.clone());
    }
    if let Some(ref resource_group) = args.resource_group {
        settings.resource_group = Some(resource_group.clone());
    }
    if let Some(ref storage_account) = args.storage_account {
        settings.storage_account = Some(storage_account.clone());
    }
    if let Some(ref secret_ref) = args.secret_ref {
        settings.secret_ref = Some(secret_ref.clone());
    }
    if let Some(ref state_dir) = args.state_dir {
        settings.state_dir = state_dir.clone();
    }

    tracing::debug!(
        organization = ?settings.organization_id,
        location = ?settings.location,
        state_dir = %settings.state_dir.display(),
        "Resolved settings"
    );
    Ok(settings)
}

/// What a command needs from the settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Needs {
    /// Local records only
    Records,
    /// A resolvable bucket key (resource group or location)
    Key,
    /// Provider access: location and credentials
    Cloud,
}

pub fn scope(settings: &Settings, needs: Needs) -> anyhow::Result<BucketScope> {
    let organization_id = settings.organization_id.context(
        "organization id is required: pass --org or set organization_id in bucketward.yaml",
    )?;

    let location_required = match needs {
        Needs::Records => false,
        Needs::Key => settings.resource_group.is_none(),
        Needs::Cloud => true,
    };
    let location = match settings.location.clone() {
        Some(location) => location,
        None if location_required => anyhow::bail!(
            "location is required: pass --location or set location in bucketward.yaml"
        ),
        None => String::new(),
    };

    let secret_ref = match settings.secret_ref.clone() {
        Some(secret_ref) => secret_ref,
        None if needs == Needs::Cloud => anyhow::bail!(
            "secret is required: pass --secret or set secret_ref in bucketward.yaml"
        ),
        None => String::new(),
    };

    Ok(BucketScope {
        organization_id,
        location,
        resource_group: settings.resource_group.clone(),
        storage_account: settings.storage_account.clone(),
        secret_ref,
    })
}

/// Coordinator over the JSON record store, file secrets and Azure
pub fn coordinator(settings: &Settings, needs: Needs) -> anyhow::Result<BucketCoordinator> {
    let scope = scope(settings, needs)?;
    let session_root = bucketward_config::get_cache_dir()?.join("az");
    tracing::debug!(session_root = %session_root.display(), "Using az session cache");

    let store = Arc::new(JsonRecordStore::new(&settings.state_dir));
    let secrets = Arc::new(FileSecretStore::new(settings.secrets_file()));
    let gateway = Arc::new(AzureGateway::new(session_root));

    Ok(
        BucketCoordinator::new(scope, gateway, store, secrets).with_options(CoordinatorOptions {
            account_create_timeout: Duration::from_secs(settings.account_create_timeout_secs),
            list_concurrency: settings.list_concurrency,
        }),
    )
}
