//! 1VPN headless client
//!
//! Runs the access gate and the account poll loop against a backend, the
//! same way the embedded client does, and logs what the UI would show.
//!
//! Usage:
//!   onevpn --api-url https://vpn.example --init-data "$TOKEN" --devices 3
//!
//! The token may also come from `ONEVPN_INIT_DATA` or from the saved session.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use onevpn_api::{ApiClient, Backend, HttpBackend};
use onevpn_session::{select_host, FileStore, Host, SessionBootstrapper, SessionStore, StaticHost};
use onevpn_sync::{
    create_orchestrator, ClientCommand, ClientConfig, ClientEvent, GateState, StateChange,
};
use onevpn_types::Credential;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "onevpn")]
#[command(about = "1VPN headless client")]
struct Args {
    /// Backend base URL (overrides the config file)
    #[arg(long)]
    api_url: Option<String>,

    /// Session token from the host container
    #[arg(long, env = "ONEVPN_INIT_DATA", hide_env_values = true)]
    init_data: Option<String>,

    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the saved session
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Reconcile to this many devices once the gate opens
    #[arg(short, long)]
    devices: Option<usize>,

    /// Accept the privacy policy without asking
    #[arg(long)]
    accept_policy: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .compact()
        .init();

    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(url) = &args.api_url {
        config.api.base_url = url.clone();
    }
    config.validate().context("Invalid configuration")?;
    info!("1VPN client starting against {}", config.api.base_url);

    let store = Arc::new(
        FileStore::open_default(args.data_dir.as_deref()).context("Failed to open session store")?,
    );
    debug!("Session file: {}", store.path().display());

    let host: Arc<dyn Host> = Arc::new(StaticHost::new(args.init_data.clone().map(Credential::new)));
    let initial = host
        .init_data()
        .or(store.credential().context("Failed to read saved session")?)
        .unwrap_or_else(|| Credential::new(""));
    let client = ApiClient::new(config.api.clone(), initial).context("Failed to create API client")?;
    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(client));

    let bootstrapper = SessionBootstrapper::new(select_host(Some(host)), store.clone(), backend);
    let (handle, mut events, commands, orchestrator) = create_orchestrator(config, bootstrapper);
    let runner = tokio::spawn(orchestrator.run(commands));

    let mut devices_requested = args.devices;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                match event {
                    ClientEvent::GateChanged { state, actions } => {
                        info!("Gate: {} {:?}", state, actions);
                        match &state {
                            GateState::AwaitingPolicy { .. } if args.accept_policy => {
                                handle.accept_policy().await?;
                            }
                            GateState::AwaitingPolicy { .. } => {
                                warn!("Privacy policy not accepted; rerun with --accept-policy");
                            }
                            GateState::AwaitingSubscription { .. } => {
                                handle.send(ClientCommand::OpenChannel).await?;
                            }
                            GateState::Active => {
                                if let Some(desired) = devices_requested.take() {
                                    handle.set_device_count(desired).await?;
                                }
                            }
                            GateState::Error { message } => {
                                warn!("Gate error: {}", message);
                            }
                            _ => {}
                        }
                    }
                    ClientEvent::StateChanged(changes) => {
                        for change in changes {
                            log_change(&change);
                        }
                    }
                    ClientEvent::Notice(message) => warn!("{}", message),
                    ClientEvent::Reconciled(report) => {
                        info!(
                            "Devices: {} change(s) applied, {} failed",
                            report.applied.len(),
                            report.failures.len()
                        );
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                if handle.shutdown().await.is_err() {
                    debug!("Orchestrator already stopped");
                }
                break;
            }
        }
    }

    drop(events);
    runner.await.context("Orchestrator task panicked")??;
    info!("1VPN client stopped");
    Ok(())
}

fn log_change(change: &StateChange) {
    match change {
        StateChange::Balance(balance) => info!("Balance: {}", balance),
        StateChange::EstimatedDays(days) => info!("Days remaining: {}", days),
        StateChange::AllowedDevices(n) => info!("Allowed devices: {}", n),
        StateChange::Devices(devices) => {
            info!("Devices: {}", devices.len());
            for device in devices {
                debug!("  {} {}", device.id, device.label);
            }
        }
        StateChange::Link(Some(link)) => info!("Link: {}", link),
        StateChange::Link(None) => info!("Link: none"),
        StateChange::LinkSuspended(true) => warn!("Link suspended"),
        StateChange::SubscriptionEnd(Some(end)) => info!("Subscription ends {}", end),
        other => debug!("{} changed", other.field()),
    }
}
