//! Client core for 1VPN: the access gate, state synchronization and device
//! reconciliation.
//!
//! # Architecture
//!
//! - [`GateController`]: pure state machine deciding whether the main view
//!   may be shown (subscription, policy, maintenance, ban)
//! - [`StateSynchronizer`]: pure bookkeeping for the periodic state fetch
//!   (single in-flight fetch, stale-response discard, diffing)
//! - [`DeviceReconciler`]: turns a desired device count into add/remove calls
//! - [`ClientOrchestrator`]: owns all I/O and drives the above from one
//!   `tokio::select!` loop
//!
//! Callers talk to the orchestrator through an [`OrchestratorHandle`] and
//! observe it through a stream of [`ClientEvent`]s.

mod config;
mod diff;
mod error;
mod failure;
mod gate;
mod orchestrator;
mod reconciler;
mod synchronizer;
mod timer;

pub use config::ClientConfig;
pub use diff::{diff, StateChange};
pub use error::{GateError, GateResult, SyncError, SyncResult};
pub use failure::FailureKind;
pub use gate::{GateAction, GateController, GateState, SuspendReason};
pub use orchestrator::{
    create_orchestrator, ClientCommand, ClientEvent, ClientOrchestrator, OrchestratorHandle,
};
pub use reconciler::{DeviceOp, DeviceReconciler, OpFailure, ReconcileReport};
pub use synchronizer::{FetchTicket, StateSynchronizer, SyncOutcome};
pub use timer::PollTimer;
