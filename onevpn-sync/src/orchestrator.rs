//! Client orchestrator: coordinates the gate, the poll loop and device
//! reconciliation.
//!
//! The orchestrator is the "brain" that ties together:
//! - Session bootstrap (credential resolution, `init`)
//! - The gate state machine (which screen is shown)
//! - The state synchronizer (periodic account fetches)
//! - The device reconciler (user-requested device count changes)
//!
//! It owns all I/O. The gate and the synchronizer are pure state machines.
//! Everything runs on one task: commands, poll ticks and the in-flight
//! fetch are multiplexed by a single `tokio::select!` loop.

use crate::config::ClientConfig;
use crate::diff::StateChange;
use crate::error::{SyncError, SyncResult};
use crate::failure::FailureKind;
use crate::gate::{GateAction, GateController, GateState};
use crate::reconciler::{DeviceReconciler, ReconcileReport};
use crate::synchronizer::{FetchTicket, StateSynchronizer, SyncOutcome};
use crate::timer::PollTimer;
use onevpn_api::{ApiResult, Backend, SubscriptionAck};
use onevpn_session::{BootstrapError, Host, SessionBootstrapper};
use onevpn_types::{ClientState, Credential, GateView, Payment, TariffId, TopupReceipt};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const SESSION_REJECTED_MESSAGE: &str = "The session was rejected by the server";

type StateFetch = (FetchTicket, ApiResult<ClientState>);

/// Commands that can be sent to the orchestrator.
#[derive(Debug)]
pub enum ClientCommand {
    /// Re-enter bootstrapping from `Error`.
    Retry,
    /// Re-evaluate gate status without redoing bootstrap.
    Recheck,
    /// Open the required channel.
    OpenChannel,
    /// Open the policy document.
    ViewPolicy,
    /// Accept the policy and continue.
    AcceptPolicy,
    /// Open the support contact.
    ContactSupport,
    /// Reconcile the registered devices to `desired`.
    SetDeviceCount { desired: usize },
    /// Fetch account state now instead of waiting for the next tick.
    Refresh,
    /// Payment history, in backend order.
    ListPayments {
        reply: oneshot::Sender<SyncResult<Vec<Payment>>>,
    },
    /// Start a top-up. `provider` defaults to the configured one.
    CreateTopup {
        amount: i64,
        provider: Option<String>,
        reply: oneshot::Sender<SyncResult<TopupReceipt>>,
    },
    /// Buy a tariff for `devices` slots from the balance.
    StartSubscription {
        tariff: TariffId,
        devices: u32,
        reply: oneshot::Sender<SyncResult<SubscriptionAck>>,
    },
    /// The host pushed a new credential.
    UpdateCredential { credential: Credential },
    /// Stop the orchestrator.
    Shutdown,
}

/// Events emitted by the orchestrator for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The gate moved; `actions` are the ones now offered.
    GateChanged {
        state: GateState,
        actions: Vec<GateAction>,
    },
    /// These snapshot fields changed.
    StateChanged(Vec<StateChange>),
    /// One-line, non-blocking message.
    Notice(String),
    /// A reconciliation round finished (after its final resync).
    Reconciled(ReconcileReport),
}

/// Handle to send commands to the orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    command_tx: mpsc::Sender<ClientCommand>,
}

impl OrchestratorHandle {
    /// Sends a command to the orchestrator.
    pub async fn send(&self, cmd: ClientCommand) -> SyncResult<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }

    /// Retries bootstrap after an error.
    pub async fn retry(&self) -> SyncResult<()> {
        self.send(ClientCommand::Retry).await
    }

    /// Re-checks the subscription gate.
    pub async fn recheck(&self) -> SyncResult<()> {
        self.send(ClientCommand::Recheck).await
    }

    /// Accepts the privacy policy.
    pub async fn accept_policy(&self) -> SyncResult<()> {
        self.send(ClientCommand::AcceptPolicy).await
    }

    /// Requests `desired` registered devices.
    pub async fn set_device_count(&self, desired: usize) -> SyncResult<()> {
        self.send(ClientCommand::SetDeviceCount { desired }).await
    }

    /// Requests an immediate state fetch.
    pub async fn refresh(&self) -> SyncResult<()> {
        self.send(ClientCommand::Refresh).await
    }

    /// Fetches payment history.
    pub async fn list_payments(&self) -> SyncResult<Vec<Payment>> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientCommand::ListPayments { reply }).await?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    /// Starts a top-up and returns the confirmation link.
    pub async fn create_topup(&self, amount: i64, provider: Option<String>) -> SyncResult<TopupReceipt> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientCommand::CreateTopup {
            amount,
            provider,
            reply,
        })
        .await?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    /// Buys a tariff from the balance.
    pub async fn start_subscription(&self, tariff: TariffId, devices: u32) -> SyncResult<SubscriptionAck> {
        let (reply, rx) = oneshot::channel();
        self.send(ClientCommand::StartSubscription {
            tariff,
            devices,
            reply,
        })
        .await?;
        rx.await.map_err(|_| SyncError::ChannelClosed)?
    }

    /// Hands a host-pushed credential to the orchestrator.
    pub async fn update_credential(&self, credential: Credential) -> SyncResult<()> {
        self.send(ClientCommand::UpdateCredential { credential }).await
    }

    /// Shuts down the orchestrator.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.send(ClientCommand::Shutdown).await
    }
}

/// The client orchestrator.
pub struct ClientOrchestrator {
    config: ClientConfig,
    /// Gate state machine (pure).
    gate: GateController,
    /// Snapshot owner (pure).
    synchronizer: StateSynchronizer,
    reconciler: DeviceReconciler,
    /// The one poll timer.
    timer: PollTimer,
    bootstrapper: SessionBootstrapper,
    backend: Arc<dyn Backend>,
    /// Holds at most one state fetch.
    inflight: JoinSet<StateFetch>,
    /// Whether a rejected session may be re-bootstrapped automatically.
    /// Cleared by a re-bootstrap, set again by a successful fetch.
    rebootstrap_armed: bool,
    /// Event sender (for UI notifications).
    event_tx: mpsc::Sender<ClientEvent>,
}

impl ClientOrchestrator {
    /// Current gate state.
    pub fn gate_state(&self) -> &GateState {
        self.gate.state()
    }

    /// Latest account snapshot.
    pub fn snapshot(&self) -> Option<&ClientState> {
        self.synchronizer.snapshot()
    }

    /// Runs the orchestrator until `Shutdown` or until every handle is dropped.
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<ClientCommand>) -> SyncResult<()> {
        info!("[GATE] Client orchestrator starting");
        self.host().ready();
        self.emit_gate().await;
        self.run_gate().await;

        loop {
            tokio::select! {
                cmd = command_rx.recv() => {
                    let Some(cmd) = cmd else {
                        info!("[SYNC] All handles dropped, stopping");
                        break;
                    };
                    debug!("[SYNC] Received command: {:?}", cmd);
                    if matches!(cmd, ClientCommand::Shutdown) {
                        info!("[SYNC] Orchestrator shutting down");
                        break;
                    }
                    self.handle_command(cmd).await;
                }

                _ = self.timer.tick() => {
                    debug!("[SYNC] Poll tick");
                    self.poll();
                }

                Some(joined) = self.inflight.join_next(), if !self.inflight.is_empty() => {
                    match joined {
                        Ok((ticket, result)) => self.on_fetch_complete(ticket, result).await,
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => warn!("[SYNC] State fetch task failed: {}", e),
                    }
                }
            }
        }

        self.stop_polling();
        Ok(())
    }

    async fn handle_command(&mut self, cmd: ClientCommand) {
        match cmd {
            ClientCommand::Retry => {
                if self.allow(GateAction::Retry) {
                    self.transition(GateState::Bootstrapping).await;
                    self.run_gate().await;
                }
            }
            ClientCommand::Recheck => {
                if self.allow(GateAction::Recheck) {
                    self.check_gate().await;
                }
            }
            ClientCommand::OpenChannel => {
                if self.allow(GateAction::OpenChannel) {
                    match self.gate.state() {
                        GateState::AwaitingSubscription {
                            required_channel: Some(channel),
                        } => {
                            let link = self.config.channel_link(channel);
                            self.host().open_link(&link);
                        }
                        _ => warn!("[GATE] Backend named no channel to open"),
                    }
                }
            }
            ClientCommand::ViewPolicy => {
                if self.allow(GateAction::ViewPolicy) {
                    if let GateState::AwaitingPolicy {
                        policy_url: Some(url),
                    } = self.gate.state()
                    {
                        self.host().open_link(url);
                    }
                }
            }
            ClientCommand::AcceptPolicy => {
                if self.allow(GateAction::Accept) {
                    self.accept_policy().await;
                }
            }
            ClientCommand::ContactSupport => {
                if self.allow(GateAction::ContactSupport) {
                    let url = self.support_url();
                    self.host().open_link(&url);
                }
            }
            ClientCommand::SetDeviceCount { desired } => self.reconcile(desired).await,
            ClientCommand::Refresh => {
                if self.gate.state().polls() {
                    self.poll();
                } else {
                    debug!("[SYNC] Refresh ignored while {}", self.gate.state());
                }
            }
            ClientCommand::ListPayments { reply } => {
                let result = self.list_payments().await;
                let _ = reply.send(result);
            }
            ClientCommand::CreateTopup {
                amount,
                provider,
                reply,
            } => {
                let result = self.create_topup(amount, provider).await;
                let _ = reply.send(result);
            }
            ClientCommand::StartSubscription {
                tariff,
                devices,
                reply,
            } => {
                let result = self.start_subscription(tariff, devices).await;
                let _ = reply.send(result);
            }
            ClientCommand::UpdateCredential { credential } => {
                self.update_credential(credential).await;
            }
            ClientCommand::Shutdown => {}
        }
    }

    // ── Gate ─────────────────────────────────────────────────────────

    /// Bootstraps (once per session) and evaluates the gate.
    async fn run_gate(&mut self) {
        if let Err(err) = self.bootstrapper.bootstrap().await {
            warn!("[GATE] Bootstrap failed: {}", err);
            let (kind, message) = match &err {
                BootstrapError::Backend(api) => (FailureKind::classify(api), api.detail()),
                other => (FailureKind::Transient, other.to_string()),
            };
            let next = self.gate.on_gate_failure(kind, message);
            self.transition(next).await;
            return;
        }
        self.check_gate().await;
    }

    async fn check_gate(&mut self) {
        let status = match self.backend.gate_status().await {
            Ok(status) => status,
            Err(err) => {
                warn!("[GATE] Gate check failed: {}", err);
                let kind = FailureKind::classify(&err);
                if kind == FailureKind::SessionInvalid {
                    self.bootstrapper.reset();
                }
                let next = self.gate.on_gate_failure(kind, err.detail());
                self.transition(next).await;
                return;
            }
        };

        let policy_accepted = self
            .bootstrapper
            .store()
            .policy_accepted()
            .unwrap_or_else(|e| {
                warn!("[GATE] Could not read policy flag: {}", e);
                false
            });
        let next = self.gate.evaluate(&GateView {
            status,
            policy_accepted,
        });
        if next == *self.gate.state() {
            info!("[GATE] Still {}", next);
        }
        self.transition(next).await;
    }

    async fn accept_policy(&mut self) {
        if let Err(e) = self.bootstrapper.store().accept_policy() {
            warn!("[GATE] Failed to persist policy acceptance: {}", e);
            self.notice(format!("Policy acceptance was not saved: {e}")).await;
        }
        self.transition(GateState::Active).await;
    }

    /// Applies a gate transition and starts or stops polling to match.
    async fn transition(&mut self, next: GateState) {
        let was_polling = self.gate.state().polls();
        match self.gate.transition(next) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!("[GATE] {}", e);
                return;
            }
        }

        let now_polling = self.gate.state().polls();
        if now_polling && !was_polling {
            self.start_polling();
        } else if was_polling && !now_polling {
            self.stop_polling();
        }
        self.emit_gate().await;
    }

    /// Forces `Bootstrapping` after a new credential and re-runs the gate.
    async fn restart_gate(&mut self) {
        self.stop_polling();
        self.rebootstrap_armed = true;
        self.bootstrapper.reset();
        self.gate.reset();
        self.emit_gate().await;
        self.run_gate().await;
    }

    async fn update_credential(&mut self, credential: Credential) {
        if credential.is_empty() {
            warn!("[GATE] Ignoring empty credential update");
            return;
        }
        if let Err(e) = self.bootstrapper.refresh_credential(credential).await {
            warn!("[GATE] Credential applied but not persisted: {}", e);
        }
        if matches!(self.gate.state(), GateState::Error { .. }) || self.gate.state().is_terminal() {
            info!("[GATE] New credential while {}, restarting", self.gate.state());
            self.restart_gate().await;
        }
    }

    // ── Sync ─────────────────────────────────────────────────────────

    fn start_polling(&mut self) {
        self.abandon_fetch();
        self.synchronizer.reset();
        self.timer.start();
    }

    fn stop_polling(&mut self) {
        self.timer.stop();
        self.abandon_fetch();
        self.synchronizer.reset();
    }

    /// Aborts the in-flight fetch task, if any.
    fn abandon_fetch(&mut self) {
        if !self.inflight.is_empty() {
            self.inflight = JoinSet::new();
        }
    }

    /// Issues a state fetch unless one is in flight.
    fn poll(&mut self) {
        let Some(ticket) = self.synchronizer.begin_fetch() else {
            return;
        };
        let backend = Arc::clone(&self.backend);
        self.inflight
            .spawn(async move { (ticket, backend.state().await) });
    }

    /// Fetches state inline, superseding any in-flight fetch.
    async fn resync(&mut self) {
        self.abandon_fetch();
        self.synchronizer.reset();
        let Some(ticket) = self.synchronizer.begin_fetch() else {
            return;
        };
        let result = self.backend.state().await;
        self.on_fetch_complete(ticket, result).await;
    }

    async fn on_fetch_complete(&mut self, ticket: FetchTicket, result: ApiResult<ClientState>) {
        match self.synchronizer.complete(ticket, result) {
            SyncOutcome::Stale => {}
            SyncOutcome::Unchanged => {
                debug!("[SYNC] State unchanged");
                self.after_sync_success().await;
            }
            SyncOutcome::Updated(changes) => {
                debug!("[SYNC] {} field(s) changed", changes.len());
                self.emit(ClientEvent::StateChanged(changes)).await;
                self.after_sync_success().await;
            }
            SyncOutcome::Failed { kind, surface } => self.after_sync_failure(kind, surface).await,
        }
    }

    async fn after_sync_success(&mut self) {
        self.rebootstrap_armed = true;
        let next = self
            .synchronizer
            .snapshot()
            .and_then(|state| self.gate.on_sync_success(state));
        if let Some(next) = next {
            self.transition(next).await;
        }
    }

    async fn after_sync_failure(&mut self, kind: FailureKind, surface: Option<String>) {
        match self.gate.on_sync_failure(kind) {
            None => match surface {
                Some(message) => {
                    warn!("[SYNC] State fetch failed: {}", message);
                    self.notice(message).await;
                }
                None => debug!("[SYNC] State fetch failed again, retrying next tick"),
            },
            Some(GateState::Bootstrapping) => {
                self.bootstrapper.reset();
                self.transition(GateState::Bootstrapping).await;
                if *self.gate.state() != GateState::Bootstrapping {
                    return;
                }
                if self.rebootstrap_armed {
                    warn!("[SYNC] Session rejected, bootstrapping again");
                    self.rebootstrap_armed = false;
                    self.run_gate().await;
                } else {
                    // Rejected again before any fetch succeeded.
                    warn!("[SYNC] Session rejected right after bootstrap, waiting for retry");
                    let next = self
                        .gate
                        .on_gate_failure(FailureKind::SessionInvalid, SESSION_REJECTED_MESSAGE);
                    self.transition(next).await;
                }
            }
            Some(next) => self.transition(next).await,
        }
    }

    // ── Devices ──────────────────────────────────────────────────────

    async fn reconcile(&mut self, desired: usize) {
        if !self.gate.state().shows_main_view() {
            warn!("[RECONCILE] Ignored while {}", self.gate.state());
            self.notice(format!("Devices cannot be changed while {}", self.gate.state()))
                .await;
            return;
        }
        if self.synchronizer.snapshot().is_none() {
            self.resync().await;
        }
        let devices = match self.synchronizer.snapshot() {
            Some(state) if self.gate.state().shows_main_view() => state.devices.clone(),
            _ => {
                self.notice("Account state is not available yet".to_string()).await;
                return;
            }
        };

        let plan = self.reconciler.plan(&devices, desired);
        debug!(
            "[RECONCILE] {} -> {} devices ({} protected)",
            devices.len(),
            desired,
            self.reconciler.protected()
        );
        let report = self
            .reconciler
            .execute(self.backend.as_ref(), desired, plan)
            .await;
        self.resync().await;

        let summary = report.summary();
        self.emit(ClientEvent::Reconciled(report)).await;
        if let Some(summary) = summary {
            self.notice(summary).await;
        }
    }

    // ── Account ──────────────────────────────────────────────────────

    fn require_session(&self) -> SyncResult<()> {
        if self.bootstrapper.is_bootstrapped() && !self.gate.state().is_terminal() {
            Ok(())
        } else {
            Err(SyncError::Unavailable(format!(
                "no session while {}",
                self.gate.state()
            )))
        }
    }

    async fn list_payments(&self) -> SyncResult<Vec<Payment>> {
        self.require_session()?;
        Ok(self.backend.list_payments().await?)
    }

    async fn create_topup(&self, amount: i64, provider: Option<String>) -> SyncResult<TopupReceipt> {
        self.require_session()?;
        let provider = provider.unwrap_or_else(|| self.config.payment_provider.clone());
        let receipt = self.backend.create_topup(amount, &provider).await?;
        info!("[SYNC] Top-up of {} via {} created", amount, provider);
        self.host().open_link(&receipt.confirmation_url);
        Ok(receipt)
    }

    async fn start_subscription(&mut self, tariff: TariffId, devices: u32) -> SyncResult<SubscriptionAck> {
        self.require_session()?;
        if let Some(state) = self.synchronizer.snapshot() {
            if let Some(plan) = state.tariff(tariff) {
                let required = plan.quote(devices);
                if required > state.balance {
                    return Err(SyncError::InsufficientBalance {
                        required,
                        available: state.balance,
                    });
                }
            }
        }

        let ack = self.backend.start_subscription(tariff, devices).await?;
        info!("[SYNC] Subscribed to tariff {} for {} device(s)", tariff, devices);
        if self.gate.state().polls() {
            self.resync().await;
        }
        Ok(ack)
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn host(&self) -> &Arc<dyn Host> {
        self.bootstrapper.host()
    }

    fn allow(&self, action: GateAction) -> bool {
        match self.gate.ensure_action(action) {
            Ok(()) => true,
            Err(e) => {
                warn!("[GATE] {}", e);
                false
            }
        }
    }

    fn support_url(&self) -> String {
        self.synchronizer
            .snapshot()
            .map(|state| state.support_url.as_str())
            .filter(|url| !url.is_empty())
            .unwrap_or(self.config.support_url.as_str())
            .to_string()
    }

    async fn emit_gate(&self) {
        let state = self.gate.state().clone();
        self.emit(ClientEvent::GateChanged {
            actions: state.actions(),
            state,
        })
        .await;
    }

    async fn notice(&self, message: String) {
        self.emit(ClientEvent::Notice(message)).await;
    }

    async fn emit(&self, event: ClientEvent) {
        if self.event_tx.send(event).await.is_err() {
            debug!("[SYNC] Event receiver dropped");
        }
    }
}

/// Creates an orchestrator and its channels.
///
/// Returns the command handle, the event receiver, the command receiver to
/// pass to [`ClientOrchestrator::run`], and the orchestrator itself.
pub fn create_orchestrator(
    config: ClientConfig,
    bootstrapper: SessionBootstrapper,
) -> (
    OrchestratorHandle,
    mpsc::Receiver<ClientEvent>,
    mpsc::Receiver<ClientCommand>,
    ClientOrchestrator,
) {
    let (command_tx, command_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::channel(64);

    let handle = OrchestratorHandle { command_tx };

    let orchestrator = ClientOrchestrator {
        gate: GateController::new(),
        synchronizer: StateSynchronizer::new(),
        reconciler: DeviceReconciler::new(config.protected_devices),
        timer: PollTimer::new(config.poll_interval()),
        backend: Arc::clone(bootstrapper.backend()),
        bootstrapper,
        inflight: JoinSet::new(),
        rebootstrap_armed: true,
        event_tx,
        config,
    };

    (handle, event_rx, command_rx, orchestrator)
}
