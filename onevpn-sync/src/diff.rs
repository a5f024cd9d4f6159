//! Field-level diff between account snapshots.

use chrono::{DateTime, Utc};
use onevpn_types::{ClientState, Device, HelpUrls, ServerInfo, Tariff};
use serde::Serialize;

/// One changed field of [`ClientState`], carrying its new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StateChange {
    Balance(i64),
    EstimatedDays(i64),
    AllowedDevices(u32),
    Devices(Vec<Device>),
    Link(Option<String>),
    LinkSuspended(bool),
    Admin(bool),
    HelpUrls(HelpUrls),
    SupportUrl(String),
    SubscriptionEnd(Option<DateTime<Utc>>),
    Banned(bool),
    Tariffs(Vec<Tariff>),
    Server(Option<ServerInfo>),
}

impl StateChange {
    /// Name of the changed field, for logs.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            StateChange::Balance(_) => "balance",
            StateChange::EstimatedDays(_) => "estimated_days",
            StateChange::AllowedDevices(_) => "allowed_devices",
            StateChange::Devices(_) => "devices",
            StateChange::Link(_) => "link",
            StateChange::LinkSuspended(_) => "link_suspended",
            StateChange::Admin(_) => "is_admin",
            StateChange::HelpUrls(_) => "help_urls",
            StateChange::SupportUrl(_) => "support_url",
            StateChange::SubscriptionEnd(_) => "subscription_end",
            StateChange::Banned(_) => "banned",
            StateChange::Tariffs(_) => "tariffs",
            StateChange::Server(_) => "server",
        }
    }
}

/// Shallow per-field diff. With no previous snapshot every field is reported.
#[must_use]
pub fn diff(prev: Option<&ClientState>, next: &ClientState) -> Vec<StateChange> {
    let mut changes = Vec::new();

    macro_rules! field {
        ($field:ident => $variant:ident) => {
            if prev.is_none_or(|p| p.$field != next.$field) {
                changes.push(StateChange::$variant(next.$field.clone()));
            }
        };
    }

    field!(balance => Balance);
    field!(estimated_days_remaining => EstimatedDays);
    field!(allowed_devices => AllowedDevices);
    field!(devices => Devices);
    field!(link => Link);
    field!(link_suspended => LinkSuspended);
    field!(is_admin => Admin);
    field!(help_urls => HelpUrls);
    field!(support_url => SupportUrl);
    field!(subscription_end => SubscriptionEnd);
    field!(banned => Banned);
    field!(tariffs => Tariffs);
    field!(server => Server);

    changes
}
