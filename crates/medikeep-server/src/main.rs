use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use medikeep_backup::{BackupPipeline, ExportClient, GithubUploader};
use medikeep_core::config::{ensure_parent_dir, MedikeepConfig};
use medikeep_notify::{NotificationCenter, NotificationStore, WebhookNotifier};
use medikeep_scheduler::{AutoScheduler, FileStateStore, Notifier};
use tracing::{info, warn};

mod app;
mod cli;
mod http;

const DEFAULT_URL: &str = "http://127.0.0.1:18620";

#[derive(Parser)]
#[command(name = "medikeep", about = "Clinic backup scheduler and API", version)]
struct Cli {
    /// Path to medikeep.toml (defaults to ~/.medikeep/medikeep.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the backup service (default)
    Serve,
    /// Query a running instance's schedule status
    Status {
        /// Base URL of the running instance
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,

        /// Bearer token when the instance requires auth
        #[arg(long)]
        token: Option<String>,
    },
    /// Trigger a backup on a running instance and wait for the outcome
    RunNow {
        /// Base URL of the running instance
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,

        /// Bearer token when the instance requires auth
        #[arg(long)]
        token: Option<String>,
    },
    /// Print version and build information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.config.as_deref()).await,
        Commands::Status { url, token } => cli::status(&url, token.as_deref()).await,
        Commands::RunNow { url, token } => cli::run_now(&url, token.as_deref()).await,
        Commands::Version => {
            println!(
                "medikeep {} ({})",
                env!("CARGO_PKG_VERSION"),
                env!("MEDIKEEP_GIT_SHA")
            );
            Ok(())
        }
    }
}

async fn serve(config_path: Option<&str>) -> anyhow::Result<()> {
    // config resolution: --config flag > MEDIKEEP_CONFIG env > default path
    let env_path = std::env::var("MEDIKEEP_CONFIG").ok();
    let path = config_path.map(String::from).or(env_path);
    let config = MedikeepConfig::load(path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({e}), using defaults");
        MedikeepConfig::default()
    });

    let bind = config.server.bind.clone();
    let port = config.server.port;

    // notification log lives in SQLite
    let db_path = &config.database.path;
    ensure_parent_dir(db_path)?;
    info!(path = %db_path, "opening SQLite database");
    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    let notifications = Arc::new(NotificationStore::new(db)?);

    // outbound webhook is optional; a broken one must not stop the service
    let webhook = match &config.notify.webhook_url {
        Some(url) => {
            match WebhookNotifier::new(url.clone(), config.notify.webhook_secret.clone()) {
                Ok(notifier) => {
                    info!(%url, "webhook notifier configured");
                    Some(notifier)
                }
                Err(e) => {
                    warn!("webhook notifier disabled: {e}");
                    None
                }
            }
        }
        None => None,
    };
    let center: Arc<dyn Notifier> = Arc::new(NotificationCenter::new(
        Arc::clone(&notifications),
        webhook,
    ));

    // schedule state is a small JSON file next to the database
    ensure_parent_dir(&config.scheduler.state_path)?;
    let store = Arc::new(FileStateStore::new(&config.scheduler.state_path));
    let scheduler = Arc::new(AutoScheduler::new(
        store,
        Some(center),
        Duration::from_secs(config.scheduler.check_interval_secs),
    ));

    // the export-to-GitHub job needs both halves configured; without them the
    // scheduler stays up and manual runs report "not configured"
    match (&config.clinic, &config.github) {
        (Some(clinic), Some(github)) => {
            let pipeline =
                BackupPipeline::new(ExportClient::new(clinic)?, GithubUploader::new(github)?);
            scheduler.set_job(Arc::new(pipeline));
            info!(owner = %github.owner, repo = %github.repo, "backup job registered");
        }
        _ => warn!("clinic/github sections missing from config; no backup job registered"),
    }

    if scheduler.schedule().enabled {
        scheduler.start();
    }

    let state = Arc::new(app::AppState {
        config,
        scheduler: Arc::clone(&scheduler),
        notifications,
    });
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!(version = env!("CARGO_PKG_VERSION"), %addr, "medikeep listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop();
    info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
