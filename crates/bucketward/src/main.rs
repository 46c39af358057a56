mod commands;
mod context;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bucketward")]
#[command(about = "Managed Azure blob containers with tracked lifecycle", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    scope: ScopeArgs,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print listings as JSON
    #[arg(long, global = true)]
    json: bool,
}

/// Flags that override values from bucketward.yaml
#[derive(Args, Debug)]
pub struct ScopeArgs {
    /// Configuration file (skips discovery)
    #[arg(short, long, global = true, env = "BUCKETWARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Organization owning the buckets
    #[arg(long = "org", global = true, env = "BUCKETWARD_ORG")]
    pub organization_id: Option<u64>,

    /// Azure region (e.g. westeurope)
    #[arg(short, long, global = true, env = "BUCKETWARD_LOCATION")]
    pub location: Option<String>,

    /// Resource group (default: bucketward-auto-<location>)
    #[arg(short = 'g', long, global = true, env = "BUCKETWARD_RESOURCE_GROUP")]
    pub resource_group: Option<String>,

    /// Storage account (default: bucketwardstorage)
    #[arg(short = 'a', long, global = true, env = "BUCKETWARD_STORAGE_ACCOUNT")]
    pub storage_account: Option<String>,

    /// Secret holding the service principal credentials
    #[arg(short, long = "secret", global = true, env = "BUCKETWARD_SECRET")]
    pub secret_ref: Option<String>,

    /// Directory of the bucket records
    #[arg(long, global = true, env = "BUCKETWARD_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a managed bucket
    Create {
        /// Container name
        name: String,
    },
    /// Delete a managed bucket
    Delete {
        /// Container name
        name: String,
        /// Remove the record even if the provider call fails
        #[arg(short, long)]
        force: bool,
    },
    /// Check that a bucket is reachable
    Check {
        /// Container name
        name: String,
    },
    /// List every container in the subscription
    List,
    /// List managed buckets from local records only
    #[command(name = "list-managed")]
    ListManaged,
    /// Manage stored credentials
    #[command(subcommand)]
    Secret(SecretCommands),
    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum SecretCommands {
    /// Store service principal credentials
    Set {
        /// Secret name, referenced with --secret
        name: String,
        #[arg(long, env = "AZURE_SUBSCRIPTION_ID")]
        subscription_id: String,
        #[arg(long, env = "AZURE_TENANT_ID")]
        tenant_id: String,
        #[arg(long, env = "AZURE_CLIENT_ID")]
        client_id: String,
        #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
        client_secret: String,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let settings = || context::load_settings(&cli.scope);

    match cli.command {
        // No configuration needed
        Commands::Version => {
            println!("bucketward {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Create { name } => commands::bucket::create(&settings()?, &name).await,
        Commands::Delete { name, force } => {
            commands::bucket::delete(&settings()?, &name, force).await
        }
        Commands::Check { name } => commands::bucket::check(&settings()?, &name).await,
        Commands::List => commands::list::list(&settings()?, cli.json).await,
        Commands::ListManaged => commands::list::list_managed(&settings()?, cli.json).await,
        Commands::Secret(SecretCommands::Set {
            name,
            subscription_id,
            tenant_id,
            client_id,
            client_secret,
        }) => {
            let creds = bucketward_cloud::Credentials {
                subscription_id,
                tenant_id,
                client_id,
                client_secret,
            };
            commands::secret::set(&settings()?, &name, &creds).await
        }
    }
}
