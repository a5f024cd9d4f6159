//! Device-count reconciliation.
//!
//! Converts a desired device count into add/remove calls. Adds get a fresh
//! fingerprint and a label from their ordinal position; removals take the
//! newest devices first and never touch the protected prefix of the list.
//! Calls run one at a time and a failed call does not stop the rest.

use crate::failure::FailureKind;
use onevpn_api::Backend;
use onevpn_types::{Device, DeviceId, Fingerprint};
use serde::Serialize;
use tracing::{debug, info, warn};

/// One device call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DeviceOp {
    Add { fingerprint: Fingerprint, label: String },
    Remove { id: DeviceId, label: String },
}

impl DeviceOp {
    fn describe(&self) -> String {
        match self {
            DeviceOp::Add { label, .. } => format!("add {label}"),
            DeviceOp::Remove { id, label } => format!("remove {label} (#{id})"),
        }
    }
}

/// A device call that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpFailure {
    pub op: DeviceOp,
    pub kind: FailureKind,
    pub detail: String,
}

/// Outcome of one reconciliation round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub desired: usize,
    pub applied: Vec<DeviceOp>,
    pub failures: Vec<OpFailure>,
}

impl ReconcileReport {
    /// Number of calls issued.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.applied.len() + self.failures.len()
    }

    /// Whether every call succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// One-line aggregate of the failures, if any.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        let first = self.failures.first()?;
        let mut message = format!(
            "{} of {} device changes failed: {}",
            self.failures.len(),
            self.attempted(),
            first.detail
        );
        if self.failures.len() > 1 {
            message.push_str(" (and others)");
        }
        Some(message)
    }
}

/// Plans and executes device reconciliation.
#[derive(Debug, Clone, Copy)]
pub struct DeviceReconciler {
    protected: usize,
}

impl DeviceReconciler {
    /// Creates a reconciler that never removes the first `protected` devices.
    pub fn new(protected: usize) -> Self {
        Self { protected }
    }

    /// Number of protected devices at the head of the list.
    pub fn protected(&self) -> usize {
        self.protected
    }

    /// Operations moving `devices` to `desired` entries.
    ///
    /// Adds are labelled `Device N+1`, `Device N+2`, ... Removals run from
    /// the tail; a desired count below the protected count stops there.
    #[must_use]
    pub fn plan(&self, devices: &[Device], desired: usize) -> Vec<DeviceOp> {
        let current = devices.len();
        if desired > current {
            (current + 1..=desired)
                .map(|ordinal| DeviceOp::Add {
                    fingerprint: Fingerprint::generate(),
                    label: format!("Device {ordinal}"),
                })
                .collect()
        } else {
            let floor = desired.max(self.protected);
            devices
                .iter()
                .skip(floor)
                .rev()
                .map(|device| DeviceOp::Remove {
                    id: device.id,
                    label: device.label.clone(),
                })
                .collect()
        }
    }

    /// Runs `plan` sequentially against `backend`, collecting failures.
    pub async fn execute(
        &self,
        backend: &dyn Backend,
        desired: usize,
        plan: Vec<DeviceOp>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport {
            desired,
            ..Default::default()
        };
        if plan.is_empty() {
            debug!("[RECONCILE] Already at {} devices", desired);
            return report;
        }
        info!("[RECONCILE] {} operation(s) toward {} devices", plan.len(), desired);

        for op in plan {
            let result = match &op {
                DeviceOp::Add { fingerprint, label } => {
                    backend.add_device(fingerprint, label).await.map(|_| ())
                }
                DeviceOp::Remove { id, .. } => backend.remove_device(*id).await,
            };
            match result {
                Ok(()) => {
                    debug!("[RECONCILE] {}", op.describe());
                    report.applied.push(op);
                }
                Err(err) => {
                    warn!("[RECONCILE] {} failed: {}", op.describe(), err);
                    report.failures.push(OpFailure {
                        kind: FailureKind::classify(&err),
                        detail: err.detail(),
                        op,
                    });
                }
            }
        }

        info!(
            "[RECONCILE] Done: {} applied, {} failed",
            report.applied.len(),
            report.failures.len()
        );
        report
    }
}
