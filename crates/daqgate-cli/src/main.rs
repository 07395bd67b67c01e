//! `daqgate` – DAQ detector command admission service.
//!
//! The binary owns the process lifecycle:
//!
//! 1. Resolves the configuration (file, then `DAQGATE_*` overrides).
//! 2. Installs the tracing pipeline.
//! 3. Opens the one store handle every component shares.
//! 4. Runs the requested subcommand: `serve` (the default) starts the HTTP
//!    API until **Ctrl-C**; the others provision the store.

mod config;
mod telemetry;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use daqgate_kernel::hash_api_key;
use daqgate_server::{ApiServer, AppState};
use daqgate_store::DaqStore;
use daqgate_types::{ControlDocument, Flag};
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "daqgate", version, about = "DAQ detector command admission service")]
struct Cli {
    /// Configuration file (default: ~/.daqgate/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP command API (default).
    Serve,

    /// Register an API user, or replace its key.  The key is read from
    /// stdin when `--api-key` is not given.
    AddUser {
        api_user: String,
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Create the control document for a detector.  Existing documents are
    /// left untouched.
    InitDetector {
        detector: String,
        /// Mark the detector as accepting remote commands.
        #[arg(long)]
        remote: bool,
    },

    /// Add an operating mode to the options catalog.
    AddMode { name: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = config::load(cli.config.as_deref()).context("configuration error")?;
    let _guard = telemetry::init_tracing("daqgate", cfg.log_format);
    info!(?cfg, "configuration loaded");

    let store = Arc::new(
        DaqStore::open(&cfg.database_path, cfg.store_timeout())
            .with_context(|| format!("cannot open store at {}", cfg.database_path.display()))?,
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cfg, store),
        Command::AddUser { api_user, api_key } => {
            add_user(&store, &api_user, api_key, cfg.api_key_cost)
        }
        Command::InitDetector { detector, remote } => init_detector(&store, &detector, remote),
        Command::AddMode { name } => {
            store.add_option(&name)?;
            info!(mode = %name, "mode registered");
            Ok(())
        }
    }
}

fn serve(cfg: &Config, store: Arc<DaqStore>) -> Result<()> {
    let settings = cfg.server_settings()?;
    if settings.policy.deactivation_requires_unlinked {
        info!("deactivation is refused while a detector is linked to a veto");
    } else {
        info!("deactivation is permitted while a detector is linked to a veto");
    }

    let server = ApiServer::new(AppState::from_store(store, settings)).with_addr(cfg.listen_addr);
    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(server.run(shutdown_signal()))?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received, shutting down"),
        Err(e) => {
            warn!(error = %e, "cannot listen for Ctrl-C; running until killed");
            std::future::pending::<()>().await;
        }
    }
}

fn add_user(store: &DaqStore, api_user: &str, api_key: Option<String>, cost: u32) -> Result<()> {
    let api_key = match api_key {
        Some(key) => Zeroizing::new(key),
        None => read_key_from_stdin()?,
    };
    let api_key = Zeroizing::new(api_key.trim().to_string());
    if api_user.trim().is_empty() || api_key.is_empty() {
        bail!("api user and api key must not be empty");
    }
    let hash = hash_api_key(&api_key, cost).context("failed to hash api key")?;
    store.upsert_user(api_user, &hash)?;
    info!(api_user, "api user registered");
    Ok(())
}

fn read_key_from_stdin() -> Result<Zeroizing<String>> {
    let mut line = Zeroizing::new(String::new());
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read api key from stdin")?;
    Ok(line)
}

fn init_detector(store: &DaqStore, detector: &str, remote: bool) -> Result<()> {
    let mut doc = ControlDocument::new(detector);
    doc.remote_control_enabled = Flag::from(remote);
    if store.create_control_document(&doc)? {
        info!(detector, remote, "control document created");
    } else {
        warn!(detector, "control document already exists; left unchanged");
    }
    Ok(())
}
