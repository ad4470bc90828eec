//! Halo backend binary: settings, store, server wiring, shutdown.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::routing::get;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use halo_core::ids::OperatorId;
use halo_server::http::auth::TokenIssuer;
use halo_server::push::{ApnsDelivery, NotificationDelivery};
use halo_settings::HaloSettings;

mod services;

use services::{DeviceTokenPresence, LogOnlyDelivery, StaticOwnership};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "halo", about = "Voice-agent call backend", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP + signaling server (the default).
    Serve {
        /// Domain ownership entries, `domain=operator`. Repeatable.
        #[arg(long = "owner", value_name = "DOMAIN=OPERATOR")]
        owners: Vec<String>,
    },
    /// Delete ended sessions and audit events past the retention window.
    Prune {
        /// Override the configured retention window.
        #[arg(long)]
        days: Option<u32>,
    },
    /// Mint an operator bearer token for the configured secret.
    MintOperatorToken {
        /// Operator identity to mint for.
        #[arg(long)]
        operator: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings();
    halo_core::logging::init(&settings.logging.level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    match cli.command.unwrap_or(Command::Serve { owners: Vec::new() }) {
        Command::Serve { owners } => runtime.block_on(serve(settings, &owners)),
        Command::Prune { days } => prune(&settings, days),
        Command::MintOperatorToken { operator } => {
            let issuer = TokenIssuer::from_settings(&settings.auth);
            let token = issuer
                .issue_operator_token(&OperatorId::new(operator))
                .context("minting operator token")?;
            println!("{token}");
            Ok(())
        }
    }
}

fn load_settings() -> HaloSettings {
    match halo_settings::load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("failed to load settings ({e}), using defaults");
            HaloSettings::default()
        }
    }
}

fn db_path(settings: &HaloSettings) -> anyhow::Result<PathBuf> {
    if let Some(path) = &settings.store.db_path {
        return Ok(PathBuf::from(path));
    }
    let home = std::env::var_os("HOME").context("HOME is not set and store.dbPath is unconfigured")?;
    Ok(PathBuf::from(home).join(".halo").join("halo.db"))
}

async fn serve(settings: HaloSettings, owner_args: &[String]) -> anyhow::Result<()> {
    let mut owners = HashMap::new();
    for entry in owner_args {
        let (domain, operator) = StaticOwnership::parse_entry(entry)?;
        if owners.insert(domain.clone(), operator).is_some() {
            anyhow::bail!("duplicate --owner entry for {domain}");
        }
    }
    if owners.is_empty() {
        warn!("no --owner entries; every escalation will be refused");
    }

    let metrics_handle =
        halo_server::metrics::install_recorder().context("installing metrics recorder")?;

    let path = db_path(&settings)?;
    let store = halo_store::open(&path)
        .with_context(|| format!("opening store at {}", path.display()))?;
    let (queue, mut write_failures) = halo_store::spawn_writer(
        Arc::clone(&store),
        settings.store.write_queue_depth,
        settings.store.write_retries,
    );
    let _failure_log = tokio::spawn(async move {
        while write_failures.changed().await.is_ok() {
            if let Some(failure) = write_failures.borrow_and_update().clone() {
                warn!(op = failure.op, reason = %failure.reason, "durable write lost");
            }
        }
    });

    let delivery: Arc<dyn NotificationDelivery> = if settings.push.enabled {
        Arc::new(ApnsDelivery::new(settings.push.clone()).context("configuring push delivery")?)
    } else {
        Arc::new(LogOnlyDelivery)
    };

    let presence = Arc::new(DeviceTokenPresence::new(Arc::clone(&store)));
    let ownership = Arc::new(StaticOwnership::new(owners));
    let settings = Arc::new(settings);

    let state = halo_server::build_state(
        Arc::clone(&settings),
        store,
        queue,
        ownership,
        presence,
        delivery,
    );

    let app = halo_server::router(state).route(
        "/metrics",
        get(move || {
            let handle = metrics_handle.clone();
            async move { halo_server::metrics::render(&handle) }
        }),
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(addr = %addr, "halo server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("halo server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                let _ = signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("ctrl-c received, shutting down"),
        () = terminate => info!("SIGTERM received, shutting down"),
    }
}

fn prune(settings: &HaloSettings, days: Option<u32>) -> anyhow::Result<()> {
    let path = db_path(settings)?;
    let store = halo_store::open(&path)
        .with_context(|| format!("opening store at {}", path.display()))?;
    let days = days.unwrap_or(settings.store.retention_days);
    let (sessions, events) = store.prune(days).context("pruning store")?;
    println!("pruned {sessions} ended sessions and {events} audit events older than {days} days");
    Ok(())
}
