//! Account state as reported by the backend.

use crate::ids::{DeviceId, TariffId};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A registered client device.
///
/// Devices arrive in registration order; index 0 is the oldest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub fingerprint: crate::Fingerprint,
    pub label: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub last_seen: DateTime<Utc>,
}

/// Installation guides linked from the main view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpUrls {
    #[serde(rename = "ios_help_url", default)]
    pub ios: String,
    #[serde(rename = "android_help_url", default)]
    pub android: String,
}

/// VPN server the account is pinned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub id: i64,
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub capacity: u32,
}

/// A purchasable subscription plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tariff {
    pub id: TariffId,
    pub name: String,
    pub days: u32,
    pub price: i64,
    #[serde(default = "default_base_devices")]
    pub base_devices: u32,
}

fn default_base_devices() -> u32 {
    1
}

impl Tariff {
    /// Price of this tariff for `devices` slots, rounded up.
    ///
    /// The plan price covers `base_devices` slots; each slot costs the
    /// same share of it. Computed in `f64` the way the backend charges, so
    /// the result matches the amount actually deducted. Saturates at
    /// `i64::MAX`.
    #[must_use]
    pub fn quote(&self, devices: u32) -> i64 {
        let per_device = self.price.max(0) as f64 / f64::from(self.base_devices.max(1));
        (per_device * f64::from(devices)).ceil() as i64
    }
}

/// Authoritative account snapshot returned by `GET /api/state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    pub balance: i64,
    #[serde(rename = "estimated_days", default)]
    pub estimated_days_remaining: i64,
    #[serde(default)]
    pub allowed_devices: u32,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub link_suspended: bool,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(flatten)]
    pub help_urls: HelpUrls,
    #[serde(default)]
    pub support_url: String,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub subscription_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub tariffs: Vec<Tariff>,
    #[serde(default)]
    pub server: Option<ServerInfo>,
}

impl ClientState {
    /// Number of registered devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Whether more devices are registered than the plan allows.
    #[must_use]
    pub fn over_quota(&self) -> bool {
        self.devices.len() > self.allowed_devices as usize
    }

    /// Whether the connection link can be handed to a VPN client.
    #[must_use]
    pub fn is_connectable(&self) -> bool {
        self.link.as_deref().is_some_and(|l| !l.is_empty()) && !self.link_suspended
    }

    /// Looks up a tariff by id.
    #[must_use]
    pub fn tariff(&self, id: TariffId) -> Option<&Tariff> {
        self.tariffs.iter().find(|t| t.id == id)
    }
}

/// Server-side part of the access gate, from `GET /api/gate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStatus {
    pub subscribed: bool,
    #[serde(default)]
    pub required_channel: Option<String>,
    #[serde(default)]
    pub policy_url: Option<String>,
}

/// Gate status combined with the locally persisted policy acceptance.
///
/// `policy_accepted` is client-side only; the backend never reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateView {
    pub status: GateStatus,
    pub policy_accepted: bool,
}

impl GateView {
    /// Whether both subscription and policy preconditions hold.
    #[must_use]
    pub fn passes(&self) -> bool {
        self.status.subscribed && self.policy_accepted
    }
}

// The backend emits both RFC 3339 and naive ISO timestamps; naive ones are UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

pub(crate) fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
        None => Ok(None),
    }
}

/// Backend acknowledgement of a subscription purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionAck {
    #[serde(default)]
    pub ok: bool,
    #[serde(default, deserialize_with = "deserialize_optional_timestamp")]
    pub subscription_end: Option<DateTime<Utc>>,
    pub balance: i64,
}
