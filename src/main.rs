use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use zonesyncd::{
    config::Settings,
    daemon::{self, build_reconciler, resolve_credential},
    reconcile::PlannedAction,
    secrets::{self, CredentialStore},
};

#[derive(Parser)]
#[command(name = "zonesyncd")]
#[command(about = "Dynamic DNS reconciler - keeps DNS records pointed at this host's public IP")]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile records periodically until stopped
    Daemon,

    /// Run a single reconciliation cycle and exit
    Once,

    /// Show the current public IP and what a cycle would change, without writing
    Check,

    /// Store the API token for a DNS provider
    SetKey {
        /// DNS provider name (e.g., cloudflare)
        provider: String,
    },

    /// Delete the stored API token for a DNS provider
    DeleteKey {
        /// DNS provider name (e.g., cloudflare)
        provider: String,
    },

    /// Show configuration file location and contents
    Config,
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_settings(path: &Path) -> Result<Settings> {
    Settings::load(path).map_err(|e| {
        anyhow!(
            "{}. Run 'zonesyncd config' to see the expected location and format.",
            e
        )
    })
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Settings::config_path);

    // Load config for commands that need it
    let settings = load_settings(&config_path);

    let log_level = settings
        .as_ref()
        .map(|s| s.log_level.as_str())
        .unwrap_or("info");
    init_logging(log_level);

    match cli.command {
        Commands::Daemon => {
            let settings = settings?;
            info!("Starting zonesyncd daemon");
            daemon::run(settings).await?;
        }

        Commands::Once => {
            let settings = settings?;
            if !daemon::run_once(settings).await? {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Check => {
            check_status(settings?).await?;
        }

        Commands::SetKey { provider } => {
            let token = rpassword::prompt_password("API Token: ")?;
            secrets::store_token(&provider, &token)?;
            println!("Credentials stored for provider: {}", provider);
        }

        Commands::DeleteKey { provider } => {
            secrets::delete_token(&provider)?;
            println!("Credentials deleted for provider: {}", provider);
        }

        Commands::Config => {
            show_config(&config_path, settings.as_ref().ok())?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn check_status(settings: Settings) -> Result<()> {
    let token = resolve_credential(&settings, &CredentialStore::default())?;
    let reconciler = build_reconciler(&settings, &token)?;

    let plan = reconciler.plan().await?;

    println!("Public IP: {}", plan.ip);
    println!("Zone: {} ({})\n", plan.zone.name, plan.zone.id);

    for (hostname, action) in &plan.actions {
        match action {
            PlannedAction::Create => println!("{}: missing -> would create {}", hostname, plan.ip),
            PlannedAction::Keep { current } => println!("{}: {} (up to date)", hostname, current.content),
            PlannedAction::Update { current } => {
                println!("{}: {} -> would update to {}", hostname, current.content, plan.ip)
            }
            PlannedAction::Unknown(e) => println!("{}: Error - {}", hostname, e),
        }
    }

    Ok(())
}

fn show_config(config_path: &Path, settings: Option<&Settings>) -> Result<()> {
    println!("Configuration file location: {}\n", config_path.display());

    match settings {
        Some(s) => {
            println!("Current configuration:\n");
            println!("{}", toml::to_string_pretty(s)?);
        }
        None => {
            println!("Configuration file not found or invalid.");
            println!("\nCreate a configuration file at the location above.");
            println!("Example configuration:\n");
            println!(
                r#"zone = "example.com"
hostnames = ["wg", "vpn"]
ttl = 120
proxied = false
interval = "5m"

[provider]
name = "cloudflare"
# credential = "..."   # or run 'zonesyncd set-key cloudflare'

[[ip_sources]]
kind = "http"
url = "https://api.ipify.org"

[[ip_sources]]
kind = "http"
url = "https://icanhazip.com"
"#
            );
        }
    }

    Ok(())
}
