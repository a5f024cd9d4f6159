//! Bookkeeping for the periodic state fetch.
//!
//! The synchronizer performs no I/O. The orchestrator asks it for a
//! [`FetchTicket`] before each fetch and hands the result back with the
//! ticket. At most one ticket is outstanding; a result whose ticket is not
//! the outstanding one is stale and dropped.

use crate::diff::{diff, StateChange};
use crate::failure::FailureKind;
use onevpn_api::{ApiError, ApiResult};
use onevpn_types::ClientState;
use tracing::{debug, trace};

/// Permission to run one state fetch, tagged with its sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    seq: u64,
}

impl FetchTicket {
    /// Sequence number of this fetch.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// What a completed fetch means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The snapshot changed in these fields.
    Updated(Vec<StateChange>),
    /// The snapshot is identical to the previous one.
    Unchanged,
    /// The response belongs to a superseded fetch and was dropped.
    Stale,
    /// The fetch failed. `surface` carries a message when this failure is
    /// new enough to show the user.
    Failed {
        kind: FailureKind,
        surface: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FailureSignature {
    kind: FailureKind,
    status: Option<u16>,
    detail: String,
}

impl FailureSignature {
    fn of(kind: FailureKind, err: &ApiError) -> Self {
        Self {
            kind,
            status: err.status_code(),
            detail: err.detail(),
        }
    }
}

/// Owns the authoritative [`ClientState`] snapshot.
#[derive(Debug, Default)]
pub struct StateSynchronizer {
    snapshot: Option<ClientState>,
    last_seq: u64,
    in_flight: Option<u64>,
    last_failure: Option<FailureSignature>,
    failure_streak: u32,
}

impl StateSynchronizer {
    /// Creates a synchronizer with no snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest snapshot, if any fetch has succeeded.
    pub fn snapshot(&self) -> Option<&ClientState> {
        self.snapshot.as_ref()
    }

    /// Whether a fetch is outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Consecutive failed fetches since the last success.
    pub fn failure_streak(&self) -> u32 {
        self.failure_streak
    }

    /// Issues a ticket, or `None` if a fetch is already outstanding.
    pub fn begin_fetch(&mut self) -> Option<FetchTicket> {
        if let Some(seq) = self.in_flight {
            debug!("[SYNC] Fetch #{} still in flight, skipping", seq);
            return None;
        }
        self.last_seq += 1;
        self.in_flight = Some(self.last_seq);
        trace!("[SYNC] Issued fetch #{}", self.last_seq);
        Some(FetchTicket { seq: self.last_seq })
    }

    /// Folds a fetch result into the snapshot.
    pub fn complete(&mut self, ticket: FetchTicket, result: ApiResult<ClientState>) -> SyncOutcome {
        if self.in_flight != Some(ticket.seq) {
            debug!(
                "[SYNC] Dropping stale response #{} (latest #{})",
                ticket.seq, self.last_seq
            );
            return SyncOutcome::Stale;
        }
        self.in_flight = None;

        match result {
            Ok(state) => {
                self.last_failure = None;
                self.failure_streak = 0;
                let changes = diff(self.snapshot.as_ref(), &state);
                self.snapshot = Some(state);
                if changes.is_empty() {
                    SyncOutcome::Unchanged
                } else {
                    SyncOutcome::Updated(changes)
                }
            }
            Err(err) => {
                let kind = FailureKind::classify(&err);
                self.failure_streak += 1;
                let signature = FailureSignature::of(kind, &err);
                let surface = (!kind.changes_gate()
                    && self.last_failure.as_ref() != Some(&signature))
                .then(|| err.detail());
                self.last_failure = Some(signature);
                SyncOutcome::Failed { kind, surface }
            }
        }
    }

    /// Abandons any outstanding fetch; its result will be stale.
    ///
    /// The snapshot is kept so the next diff only reports real changes.
    pub fn reset(&mut self) {
        if let Some(seq) = self.in_flight.take() {
            debug!("[SYNC] Abandoned fetch #{}", seq);
        }
    }
}
