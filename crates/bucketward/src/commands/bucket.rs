use crate::context::{self, Needs};
use bucketward_cloud::CloudError;
use bucketward_config::Settings;
use colored::Colorize;

/// Follow-up suggestion for a failed lifecycle call
fn hint(err: &CloudError) -> Option<&'static str> {
    if err.is_name_conflict() {
        return Some("storage account names are global; pick another with --storage-account");
    }
    match err.root() {
        CloudError::Timeout(_) => Some("provisioning may still finish; run create again to resume"),
        CloudError::AuthenticationFailed(_) => {
            Some("store the service principal with `bucketward secret set`")
        }
        CloudError::AlreadyExists(_) => Some("inspect it with `bucketward list-managed`"),
        _ => None,
    }
}

fn failed(err: CloudError, context: String) -> anyhow::Error {
    if let Some(hint) = hint(&err) {
        eprintln!("{} {}", "hint:".yellow(), hint);
    }
    anyhow::Error::new(err).context(context)
}

pub async fn create(settings: &Settings, name: &str) -> anyhow::Result<()> {
    let coordinator = context::coordinator(settings, Needs::Cloud)?;
    let scope = coordinator.scope();

    println!(
        "{} {} {}",
        "Creating bucket".blue(),
        name.cyan(),
        format!("({}/{})", scope.resource_group(), scope.storage_account()).dimmed()
    );

    coordinator
        .create_bucket(name)
        .await
        .map_err(|e| failed(e, format!("failed to create bucket {}", name)))?;

    println!("{} Bucket {} created", "✓".green(), name.cyan());
    Ok(())
}

pub async fn delete(settings: &Settings, name: &str, force: bool) -> anyhow::Result<()> {
    let coordinator = context::coordinator(settings, Needs::Key)?;

    if force {
        println!(
            "{} {} {}",
            "Deleting bucket".blue(),
            name.cyan(),
            "(forced)".yellow()
        );
    } else {
        println!("{} {}", "Deleting bucket".blue(), name.cyan());
    }

    coordinator
        .delete_bucket(name, force)
        .await
        .map_err(|e| failed(e, format!("failed to delete bucket {}", name)))?;

    println!("{} Bucket {} deleted", "✓".green(), name.cyan());
    Ok(())
}

pub async fn check(settings: &Settings, name: &str) -> anyhow::Result<()> {
    let coordinator = context::coordinator(settings, Needs::Cloud)?;

    println!("{} {}", "Checking bucket".blue(), name.cyan());

    coordinator
        .check_bucket(name)
        .await
        .map_err(|e| failed(e, format!("bucket {} is not reachable", name)))?;

    println!("{} Bucket {} is reachable", "✓".green(), name.cyan());
    Ok(())
}
