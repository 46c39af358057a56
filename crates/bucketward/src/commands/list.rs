use crate::context::{self, Needs};
use bucketward_cloud::{BucketInfo, BucketStatus};
use bucketward_config::Settings;
use colored::{ColoredString, Colorize};

pub async fn list(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let coordinator = context::coordinator(settings, Needs::Cloud)?;
    if !json {
        println!("{}", "Listing containers in the subscription...".blue());
    }

    let buckets = coordinator.list_buckets().await?;
    print_buckets(&buckets, json)
}

pub async fn list_managed(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let coordinator = context::coordinator(settings, Needs::Records)?;
    let buckets = coordinator.list_managed_buckets().await?;
    print_buckets(&buckets, json)
}

fn print_buckets(buckets: &[BucketInfo], json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(buckets)?);
        return Ok(());
    }

    println!();
    if buckets.is_empty() {
        println!("{}", "No buckets found".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<28} {:<24} {:<32} {:<8} {:<12}",
            "RESOURCE GROUP", "STORAGE ACCOUNT", "NAME", "MANAGED", "STATUS"
        )
        .bold()
    );
    println!("{}", "─".repeat(108).dimmed());

    for bucket in buckets {
        let managed = if bucket.managed {
            format!("{:<8}", "yes").green()
        } else {
            format!("{:<8}", "no").dimmed()
        };

        println!(
            "{:<28} {:<24} {} {} {}",
            bucket.props.resource_group,
            bucket.props.storage_account,
            format!("{:<32}", bucket.name).cyan(),
            managed,
            status_label(bucket.status)
        );

        if let Some(msg) = bucket.status_msg.as_deref().filter(|m| !m.is_empty()) {
            println!("  {} {}", "↳".dimmed(), msg.red());
        }
    }

    let managed = buckets.iter().filter(|b| b.managed).count();
    println!();
    println!(
        "{}",
        format!("{} bucket(s), {} managed", buckets.len(), managed).dimmed()
    );
    Ok(())
}

fn status_label(status: Option<BucketStatus>) -> ColoredString {
    match status {
        Some(BucketStatus::Created) => "created".green(),
        Some(BucketStatus::Creating) => "creating".yellow(),
        Some(BucketStatus::Deleting) => "deleting".yellow(),
        Some(BucketStatus::CreateError) => "create_error".red(),
        Some(BucketStatus::DeleteError) => "delete_error".red(),
        None => "-".dimmed(),
    }
}
