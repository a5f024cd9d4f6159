//! The backend REST surface.

use crate::client::ApiClient;
use crate::error::{ApiError, ApiResult};
use async_trait::async_trait;
use onevpn_types::{
    ClientState, Credential, Device, DeviceId, Fingerprint, GateStatus, Payment, TariffId,
    TopupReceipt, MIN_TOPUP_AMOUNT,
};
use serde::{Deserialize, Serialize};
use tracing::info;

pub use onevpn_types::SubscriptionAck;

/// Session acknowledgement returned by `init`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitAck {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub link: Option<String>,
}

/// Endpoints consumed by the client core.
///
/// Implementations return backend failures as [`ApiError`] untouched;
/// classifying them is the caller's job.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Opens the backend session. Must precede every other call.
    async fn init(&self, credential: &Credential) -> ApiResult<InitAck>;

    /// Swaps the credential attached to subsequent calls without calling `init`.
    async fn use_credential(&self, _credential: &Credential) {}

    /// Subscription status and gate links.
    async fn gate_status(&self) -> ApiResult<GateStatus>;

    /// Authoritative account snapshot.
    async fn state(&self) -> ApiResult<ClientState>;

    /// Registers a device. Returns the created device when the backend echoes it.
    async fn add_device(&self, fingerprint: &Fingerprint, label: &str) -> ApiResult<Option<Device>>;

    /// Unregisters a device.
    async fn remove_device(&self, id: DeviceId) -> ApiResult<()>;

    /// Payment history, in the order the backend returns it.
    async fn list_payments(&self) -> ApiResult<Vec<Payment>>;

    /// Starts a top-up and returns the provider confirmation URL.
    async fn create_topup(&self, amount: i64, provider: &str) -> ApiResult<TopupReceipt>;

    /// Buys `devices` slots of a tariff from the account balance.
    async fn start_subscription(&self, tariff: TariffId, devices: u32) -> ApiResult<SubscriptionAck>;
}

#[derive(Serialize)]
struct InitRequest<'a> {
    #[serde(rename = "initData")]
    init_data: &'a str,
}

#[derive(Serialize)]
struct DeviceRequest<'a> {
    fingerprint: &'a str,
    label: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AddDeviceResponse {
    Created(Device),
    Counted {
        #[allow(dead_code)]
        devices: Option<u32>,
    },
}

#[derive(Serialize)]
struct TopupRequest<'a> {
    amount: i64,
    provider: &'a str,
}

#[derive(Serialize)]
struct SubscriptionRequest {
    tariff_id: TariffId,
    devices: u32,
}

/// [`Backend`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: ApiClient,
}

impl HttpBackend {
    /// Wraps a configured client.
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn init(&self, credential: &Credential) -> ApiResult<InitAck> {
        self.client.set_credential(credential.clone()).await;
        let ack: InitAck = self
            .client
            .post(
                "/api/init",
                &InitRequest {
                    init_data: credential.expose(),
                },
            )
            .await?;
        info!("Backend session initialized");
        Ok(ack)
    }

    async fn use_credential(&self, credential: &Credential) {
        self.client.set_credential(credential.clone()).await;
    }

    async fn gate_status(&self) -> ApiResult<GateStatus> {
        self.client.get("/api/gate").await
    }

    async fn state(&self) -> ApiResult<ClientState> {
        self.client.get("/api/state").await
    }

    async fn add_device(&self, fingerprint: &Fingerprint, label: &str) -> ApiResult<Option<Device>> {
        let response: AddDeviceResponse = self
            .client
            .post(
                "/api/device",
                &DeviceRequest {
                    fingerprint: fingerprint.as_str(),
                    label,
                },
            )
            .await?;
        Ok(match response {
            AddDeviceResponse::Created(device) => Some(device),
            AddDeviceResponse::Counted { .. } => None,
        })
    }

    async fn remove_device(&self, id: DeviceId) -> ApiResult<()> {
        let _: serde_json::Value = self.client.delete(&format!("/api/device/{id}")).await?;
        Ok(())
    }

    async fn list_payments(&self) -> ApiResult<Vec<Payment>> {
        self.client.get("/api/payments").await
    }

    async fn create_topup(&self, amount: i64, provider: &str) -> ApiResult<TopupReceipt> {
        if amount < MIN_TOPUP_AMOUNT {
            return Err(ApiError::InvalidRequest(format!(
                "minimum top-up is {MIN_TOPUP_AMOUNT}"
            )));
        }
        self.client
            .post("/api/topup", &TopupRequest { amount, provider })
            .await
    }

    async fn start_subscription(&self, tariff: TariffId, devices: u32) -> ApiResult<SubscriptionAck> {
        if devices == 0 {
            return Err(ApiError::InvalidRequest("at least one device is required".into()));
        }
        self.client
            .post(
                "/api/subscription",
                &SubscriptionRequest {
                    tariff_id: tariff,
                    devices,
                },
            )
            .await
    }
}
