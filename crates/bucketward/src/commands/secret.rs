use bucketward_cloud::{Credentials, FileSecretStore, SecretStore};
use bucketward_config::Settings;
use colored::Colorize;

/// Store service principal credentials for the configured organization
pub async fn set(settings: &Settings, name: &str, creds: &Credentials) -> anyhow::Result<()> {
    let organization_id = settings.organization_id.ok_or_else(|| {
        anyhow::anyhow!(
            "organization id is required: pass --org or set organization_id in bucketward.yaml"
        )
    })?;

    let store = FileSecretStore::new(settings.secrets_file());
    let id = store
        .create_or_update(organization_id, &creds.to_secret_request(name))
        .await?;

    println!(
        "{} Secret {} stored {}",
        "✓".green(),
        name.cyan(),
        format!("(id {}, {})", id, store.path().display()).dimmed()
    );
    Ok(())
}
