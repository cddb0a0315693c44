use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use postsync_core::config::Config;
use postsync_core::core_store::model::{Identity, Record};
use postsync_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use postsync_core::shutdown::{install_signal_handlers, ShutdownCoordinator};
use postsync_core::{metrics, SyncOutcome, SyncScheduler, SyncService};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_CONFIG_PATH: &str = "~/.config/postsync/config.toml";

#[derive(Parser, Debug)]
#[command(name = "postsync")]
#[command(author, version, about = "Sync history, schedule and notifications through a shared folder", long_about = None)]
struct Args {
    /// Configuration file (created on first `enable`, `disable` or `set-shared`)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Override the configured log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync pass against the shared folder
    Sync,

    /// Add a record to a collection
    Add {
        /// history, schedule or notifications
        collection: String,
        /// Record as a JSON object
        record: String,
    },

    /// Delete a record by identity
    Delete { collection: String, id: String },

    /// Print the local copy of a collection
    List { collection: String },

    /// Show configuration and the state of the shared folder
    Status,

    /// Enable sync
    Enable,

    /// Disable sync
    Disable,

    /// Set the shared folder
    SetShared { path: String },

    /// Sync periodically until Ctrl-C
    Watch {
        /// Override the configured interval (e.g. "30s", "5m")
        #[arg(long)]
        interval: Option<humantime::Duration>,

        /// Serve Prometheus metrics on this address
        #[arg(long)]
        metrics_addr: Option<SocketAddr>,
    },
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Config file content, or defaults when there is no file yet
fn load_file_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

/// File config with POSTSYNC_* overrides on top
fn effective_config(file_config: &Config) -> Result<Config> {
    let mut config = file_config.clone();
    config.apply_env()?;
    config.validate()?;
    Ok(config)
}

/// Change one setting in the config file. Environment overrides only apply
/// to the current run and are never written back.
fn persist(path: &Path, file_config: &mut Config, update: impl FnOnce(&mut Config)) -> Result<()> {
    update(file_config);
    file_config.validate()?;
    file_config.save_to_file(path)?;
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Toggle sync for this run and persist the choice
fn set_enabled(service: &SyncService, file_config: &mut Config, path: &Path, enabled: bool) -> Result<()> {
    service.set_sync_enabled(enabled);
    persist(path, file_config, |c| c.sync.enabled = enabled)?;
    print_json(&json!({ "enabled": enabled }))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = expand(&args.config);
    let mut file_config = load_file_config(&config_path)?;
    let mut config = effective_config(&file_config)?;

    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    init_logging_with_config(LogConfig::from(&config.logging))?;
    metrics::init_metrics();

    info!(replica = %config.sync.replica_id, config = %config_path.display(), "postsync started");

    let service = Arc::new(SyncService::from_config(&config.sync));

    match args.command {
        Command::Sync => {
            let outcome = service.sync_now();
            print_json(&outcome)?;
            if let SyncOutcome::Failed { error } = outcome {
                bail!("sync failed: {}", error);
            }
        }
        Command::Add { collection, record } => {
            let value: Value = serde_json::from_str(&record).context("record is not valid JSON")?;
            let record = Record::from_value(value)?;
            let id = service.create_record(&collection, record)?;
            print_json(&json!({ "collection": collection, "id": id }))?;
        }
        Command::Delete { collection, id } => {
            let removed = service.delete_record(&collection, &Identity::new(id.as_str()))?;
            if !removed {
                warn!(collection = %collection, id = %id, "No local record with that id; tombstone recorded");
            }
            print_json(&json!({ "collection": collection, "id": id, "removed": removed }))?;
        }
        Command::List { collection } => {
            print_json(&service.list_records(&collection)?)?;
        }
        Command::Status => {
            let shared_available = config.sync.shared_dir.as_ref().map(|dir| dir.is_dir());
            print_json(&json!({
                "replica_id": config.sync.replica_id,
                "enabled": service.is_sync_enabled(),
                "local_dir": service.local_location(),
                "shared_dir": service.shared_location(),
                "shared_available": shared_available,
                "interval": humantime::format_duration(config.sync.interval).to_string(),
                "sync_on_change": config.sync.sync_on_change,
            }))?;
        }
        Command::Enable => set_enabled(&service, &mut file_config, &config_path, true)?,
        Command::Disable => set_enabled(&service, &mut file_config, &config_path, false)?,
        Command::SetShared { path } => {
            let shared = expand(&path);
            if !shared.is_dir() {
                warn!(path = %shared.display(), "Shared folder does not exist yet; passes will be skipped until it does");
            }
            persist(&config_path, &mut file_config, |c| c.sync.shared_dir = Some(shared.clone()))?;
            service.set_shared_location(shared);
            print_json(&json!({ "shared_dir": service.shared_location() }))?;
        }
        Command::Watch { interval, metrics_addr } => {
            if let Some(addr) = metrics_addr {
                metrics_exporter_prometheus::PrometheusBuilder::new()
                    .with_http_listener(addr)
                    .install()
                    .context("installing Prometheus exporter")?;
                info!(%addr, "Serving metrics");
            }

            let interval: Duration = interval.map(Into::into).unwrap_or(config.sync.interval);
            if interval.is_zero() {
                bail!("interval must be greater than 0");
            }

            let coordinator = Arc::new(ShutdownCoordinator::new(Duration::from_secs(5)));
            install_signal_handlers(coordinator.clone());

            let passes = SyncScheduler::new(service.clone(), interval)
                .spawn(coordinator.subscribe())
                .await?;
            info!(passes, "Watch stopped");
        }
    }

    Ok(())
}
