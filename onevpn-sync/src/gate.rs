//! The access gate state machine.
//!
//! The gate decides whether the main account view may be shown. It is
//! pure: callers feed it gate status and synchronization outcomes, it
//! answers with the next state, and [`GateController::transition`] applies
//! a state only if it is an edge of the graph below.
//!
//! ```text
//! Bootstrapping ──▶ AwaitingSubscription ──▶ AwaitingPolicy ──▶ Active
//!      │  ▲                 ▲                                  │  ▲
//!      ▼  │                 └──────────── revoked ─────────────┤  │
//!    Error                                                     ▼  │
//!                              Suspended(Banned) ◀── Suspended(Maintenance)
//! ```
//!
//! `Suspended(Banned)` has no outgoing edges; only [`GateController::reset`]
//! (a new credential) leaves it.

use crate::error::{GateError, GateResult};
use crate::failure::FailureKind;
use onevpn_types::{ClientState, GateStatus, GateView};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

/// Why the account is suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SuspendReason {
    Maintenance,
    Banned,
}

/// Current gate state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GateState {
    /// Resolving the credential and opening the backend session.
    Bootstrapping,
    /// The user has to join the required channel.
    AwaitingSubscription { required_channel: Option<String> },
    /// The user has to accept the privacy policy.
    AwaitingPolicy { policy_url: Option<String> },
    /// All preconditions hold; the main view is shown.
    Active,
    /// Access is blocked by the backend.
    Suspended(SuspendReason),
    /// Bootstrap or gate check failed; retry is offered.
    Error { message: String },
}

/// User actions a gate state offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GateAction {
    /// Open the required channel.
    OpenChannel,
    /// Re-evaluate gate status without redoing bootstrap.
    Recheck,
    /// Open the policy document.
    ViewPolicy,
    /// Accept the policy.
    Accept,
    /// Re-enter bootstrapping.
    Retry,
    /// Open the support contact.
    ContactSupport,
}

impl GateState {
    /// Actions offered in this state, in display order.
    #[must_use]
    pub fn actions(&self) -> Vec<GateAction> {
        match self {
            GateState::Error { .. } => vec![GateAction::Retry],
            GateState::AwaitingSubscription { .. } => {
                vec![GateAction::OpenChannel, GateAction::Recheck]
            }
            GateState::AwaitingPolicy { policy_url } => {
                let mut actions = Vec::with_capacity(2);
                if policy_url.is_some() {
                    actions.push(GateAction::ViewPolicy);
                }
                actions.push(GateAction::Accept);
                actions
            }
            GateState::Suspended(SuspendReason::Banned) => vec![GateAction::ContactSupport],
            GateState::Bootstrapping
            | GateState::Active
            | GateState::Suspended(SuspendReason::Maintenance) => Vec::new(),
        }
    }

    /// Whether account state is polled in this state.
    #[must_use]
    pub fn polls(&self) -> bool {
        matches!(
            self,
            GateState::Active | GateState::Suspended(SuspendReason::Maintenance)
        )
    }

    /// Whether the main account view is visible.
    #[must_use]
    pub fn shows_main_view(&self) -> bool {
        matches!(self, GateState::Active)
    }

    /// Whether this state only ends by an external reset.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, GateState::Suspended(SuspendReason::Banned))
    }

    fn name(&self) -> &'static str {
        match self {
            GateState::Bootstrapping => "Bootstrapping",
            GateState::AwaitingSubscription { .. } => "AwaitingSubscription",
            GateState::AwaitingPolicy { .. } => "AwaitingPolicy",
            GateState::Active => "Active",
            GateState::Suspended(SuspendReason::Maintenance) => "Suspended(Maintenance)",
            GateState::Suspended(SuspendReason::Banned) => "Suspended(Banned)",
            GateState::Error { .. } => "Error",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn is_edge(from: &GateState, to: &GateState) -> bool {
    use GateState::*;
    use SuspendReason::*;

    match (from, to) {
        (Bootstrapping, Error { .. })
        | (Bootstrapping, AwaitingSubscription { .. })
        | (Bootstrapping, AwaitingPolicy { .. })
        | (Bootstrapping, Active)
        | (Bootstrapping, Suspended(Banned)) => true,

        (Error { .. }, Bootstrapping) => true,

        (AwaitingSubscription { .. }, AwaitingSubscription { .. })
        | (AwaitingSubscription { .. }, AwaitingPolicy { .. })
        | (AwaitingSubscription { .. }, Active)
        | (AwaitingSubscription { .. }, Error { .. })
        | (AwaitingSubscription { .. }, Suspended(Banned)) => true,

        (AwaitingPolicy { .. }, Active) => true,

        (Active, AwaitingSubscription { .. })
        | (Active, Suspended(_))
        | (Active, Bootstrapping) => true,

        (Suspended(Maintenance), Active)
        | (Suspended(Maintenance), Suspended(Banned))
        | (Suspended(Maintenance), AwaitingSubscription { .. })
        | (Suspended(Maintenance), Bootstrapping) => true,

        _ => false,
    }
}

/// Owns the gate state. The only writer of it.
#[derive(Debug, Clone)]
pub struct GateController {
    state: GateState,
    last_status: Option<GateStatus>,
}

impl Default for GateController {
    fn default() -> Self {
        Self::new()
    }
}

impl GateController {
    /// Creates a controller in `Bootstrapping`.
    pub fn new() -> Self {
        Self {
            state: GateState::Bootstrapping,
            last_status: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> &GateState {
        &self.state
    }

    /// Actions offered by the current state.
    pub fn actions(&self) -> Vec<GateAction> {
        self.state.actions()
    }

    /// Last gate status received from the backend.
    pub fn last_status(&self) -> Option<&GateStatus> {
        self.last_status.as_ref()
    }

    /// Checks that `action` is offered right now.
    pub fn ensure_action(&self, action: GateAction) -> GateResult<()> {
        if self.actions().contains(&action) {
            Ok(())
        } else {
            Err(GateError::ActionUnavailable {
                action,
                state: self.state.clone(),
            })
        }
    }

    /// Applies `next` if it is an edge of the gate graph.
    ///
    /// Returns `Ok(false)` when `next` equals the current state.
    pub fn transition(&mut self, next: GateState) -> GateResult<bool> {
        if next == self.state {
            return Ok(false);
        }
        if !is_edge(&self.state, &next) {
            warn!("[GATE] Rejected transition {} -> {}", self.state, next);
            return Err(GateError::InvalidTransition {
                from: self.state.clone(),
                to: next,
            });
        }
        info!("[GATE] {} -> {}", self.state, next);
        self.state = next;
        Ok(true)
    }

    /// Forces `Bootstrapping`. Used when a new credential arrives.
    pub fn reset(&mut self) {
        info!("[GATE] Reset from {}", self.state);
        self.state = GateState::Bootstrapping;
        self.last_status = None;
    }

    /// Target state for a fresh gate status.
    ///
    /// Subscription is checked first, then the local policy flag.
    pub fn evaluate(&mut self, view: &GateView) -> GateState {
        self.last_status = Some(view.status.clone());
        if !view.status.subscribed {
            GateState::AwaitingSubscription {
                required_channel: view.status.required_channel.clone(),
            }
        } else if !view.policy_accepted {
            GateState::AwaitingPolicy {
                policy_url: view.status.policy_url.clone(),
            }
        } else {
            GateState::Active
        }
    }

    /// Target state for a failed state fetch, or `None` to stay put.
    pub fn on_sync_failure(&self, kind: FailureKind) -> Option<GateState> {
        match kind {
            FailureKind::Transient => None,
            FailureKind::SubscriptionRevoked => Some(GateState::AwaitingSubscription {
                required_channel: self
                    .last_status
                    .as_ref()
                    .and_then(|s| s.required_channel.clone()),
            }),
            FailureKind::Maintenance => Some(GateState::Suspended(SuspendReason::Maintenance)),
            FailureKind::Banned => Some(GateState::Suspended(SuspendReason::Banned)),
            FailureKind::SessionInvalid => Some(GateState::Bootstrapping),
        }
    }

    /// Target state for a successful state fetch, or `None` to stay put.
    pub fn on_sync_success(&self, state: &ClientState) -> Option<GateState> {
        if state.banned {
            return Some(GateState::Suspended(SuspendReason::Banned));
        }
        if self.state == GateState::Suspended(SuspendReason::Maintenance) {
            debug!("[GATE] Maintenance over");
            return Some(GateState::Active);
        }
        None
    }

    /// Target state for a failed bootstrap or gate check.
    ///
    /// Only a ban is distinguished; everything else offers a retry, since
    /// nothing polls before `Active`.
    pub fn on_gate_failure(&self, kind: FailureKind, message: impl Into<String>) -> GateState {
        match kind {
            FailureKind::Banned => GateState::Suspended(SuspendReason::Banned),
            _ => GateState::Error {
                message: message.into(),
            },
        }
    }
}
