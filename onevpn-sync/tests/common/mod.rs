//! Shared fixtures: a scripted in-memory backend and a recording host.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use onevpn_api::{ApiError, ApiResult, Backend, InitAck, SubscriptionAck};
use onevpn_session::{select_host, Host, MemoryStore, SessionBootstrapper, SessionStore};
use onevpn_sync::{ClientConfig, ClientEvent, GateAction, GateState};
use onevpn_types::{
    ClientState, Credential, Device, DeviceId, Fingerprint, GateStatus, Payment, PaymentId,
    PaymentStatus, TariffId, TopupReceipt,
};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const TOKEN: &str = "query_id=AAE&user=%7B%22id%22%3A42%7D&hash=abc";

/// Scripted reply to one `state()` call.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok,
    Fail(u16, &'static str),
}

pub fn device(id: i64, label: &str) -> Device {
    Device {
        id: DeviceId::new(id),
        fingerprint: Fingerprint::from_string(format!("fp-{id}")),
        label: label.to_string(),
        last_seen: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
    }
}

pub fn devices(n: usize) -> Vec<Device> {
    (1..=n)
        .map(|i| device(100 + i as i64, &format!("Device {i}")))
        .collect()
}

/// In-memory backend whose device list behaves like the real one.
pub struct ScriptedBackend {
    gate: Mutex<VecDeque<GateStatus>>,
    default_gate: Mutex<GateStatus>,
    base: Mutex<ClientState>,
    devices: Mutex<Vec<Device>>,
    next_id: AtomicUsize,
    replies: Mutex<VecDeque<Reply>>,
    latency: Mutex<Duration>,
    init_failures: AtomicUsize,
    failing_adds: Mutex<HashSet<usize>>,
    failing_removes: Mutex<HashSet<i64>>,
    add_calls: AtomicUsize,
    pub init_calls: AtomicUsize,
    pub gate_calls: AtomicUsize,
    pub state_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Mutex<Vec<String>>,
    topups: Mutex<Vec<(i64, String)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::with_devices(devices(1))
    }

    pub fn with_devices(devices: Vec<Device>) -> Self {
        let next = devices.iter().map(|d| d.id.get()).max().unwrap_or(100) + 1;
        Self {
            gate: Mutex::new(VecDeque::new()),
            default_gate: Mutex::new(GateStatus {
                subscribed: true,
                required_channel: Some("@onevpn".to_string()),
                policy_url: Some("https://onevpn.example/policy".to_string()),
            }),
            base: Mutex::new(ClientState {
                balance: 500,
                estimated_days_remaining: 30,
                allowed_devices: 5,
                link: Some("vless://example".to_string()),
                support_url: "https://t.me/onevpn_help".to_string(),
                ..Default::default()
            }),
            devices: Mutex::new(devices),
            next_id: AtomicUsize::new(next as usize),
            replies: Mutex::new(VecDeque::new()),
            latency: Mutex::new(Duration::ZERO),
            init_failures: AtomicUsize::new(0),
            failing_adds: Mutex::new(HashSet::new()),
            failing_removes: Mutex::new(HashSet::new()),
            add_calls: AtomicUsize::new(0),
            init_calls: AtomicUsize::new(0),
            gate_calls: AtomicUsize::new(0),
            state_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
            topups: Mutex::new(Vec::new()),
        }
    }

    // ── Scripting ────────────────────────────────────────────────────

    /// Gate status returned once, before falling back to the default.
    pub fn queue_gate(&self, status: GateStatus) {
        self.gate.lock().unwrap().push_back(status);
    }

    pub fn set_default_gate(&self, status: GateStatus) {
        *self.default_gate.lock().unwrap() = status;
    }

    /// Replies for upcoming `state()` calls; `Reply::Ok` once exhausted.
    pub fn queue_state(&self, replies: impl IntoIterator<Item = Reply>) {
        self.replies.lock().unwrap().extend(replies);
    }

    pub fn edit_state(&self, edit: impl FnOnce(&mut ClientState)) {
        let mut base = self.base.lock().unwrap();
        edit(&mut *base);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn fail_next_inits(&self, n: usize) {
        self.init_failures.store(n, Ordering::SeqCst);
    }

    /// Makes the `nth` add call (1-based) fail with the quota error.
    pub fn fail_add(&self, nth: usize) {
        self.failing_adds.lock().unwrap().insert(nth);
    }

    pub fn fail_remove(&self, id: i64) {
        self.failing_removes.lock().unwrap().insert(id);
    }

    // ── Inspection ───────────────────────────────────────────────────

    pub fn device_ids(&self) -> Vec<i64> {
        self.devices.lock().unwrap().iter().map(|d| d.id.get()).collect()
    }

    pub fn device_labels(&self) -> Vec<String> {
        self.devices.lock().unwrap().iter().map(|d| d.label.clone()).collect()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn state_calls(&self) -> usize {
        self.state_calls.load(Ordering::SeqCst)
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn topups(&self) -> Vec<(i64, String)> {
        self.topups.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn init(&self, _credential: &Credential) -> ApiResult<InitAck> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.init_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.init_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ApiError::Network("connection refused".into()));
        }
        Ok(InitAck {
            ok: true,
            link: None,
        })
    }

    async fn gate_status(&self) -> ApiResult<GateStatus> {
        self.gate_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.gate.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_else(|| self.default_gate.lock().unwrap().clone()))
    }

    async fn state(&self) -> ApiResult<ClientState> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let reply = self.replies.lock().unwrap().pop_front().unwrap_or(Reply::Ok);
        match reply {
            Reply::Fail(status, detail) => Err(ApiError::status(status, detail)),
            Reply::Ok => {
                let mut state = self.base.lock().unwrap().clone();
                state.devices = self.devices.lock().unwrap().clone();
                Ok(state)
            }
        }
    }

    async fn add_device(&self, fingerprint: &Fingerprint, label: &str) -> ApiResult<Option<Device>> {
        let nth = self.add_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(format!("add {label}"));
        if self.failing_adds.lock().unwrap().contains(&nth) {
            return Err(ApiError::status(
                403,
                "Слишком много устройств. Купите еще слот.",
            ));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i64;
        let created = Device {
            id: DeviceId::new(id),
            fingerprint: fingerprint.clone(),
            label: label.to_string(),
            last_seen: Utc.with_ymd_and_hms(2025, 3, 2, 8, 0, 0).unwrap(),
        };
        self.devices.lock().unwrap().push(created.clone());
        Ok(Some(created))
    }

    async fn remove_device(&self, id: DeviceId) -> ApiResult<()> {
        self.record(format!("remove {id}"));
        if self.failing_removes.lock().unwrap().contains(&id.get()) {
            return Err(ApiError::status(500, "Internal Server Error"));
        }
        let mut devices = self.devices.lock().unwrap();
        let before = devices.len();
        devices.retain(|d| d.id != id);
        if devices.len() == before {
            return Err(ApiError::status(404, "Не найдено"));
        }
        Ok(())
    }

    async fn list_payments(&self) -> ApiResult<Vec<Payment>> {
        Ok([7, 3, 9]
            .into_iter()
            .map(|id| Payment {
                id: PaymentId::new(id),
                amount: id * 100,
                provider: "yookassa".to_string(),
                status: PaymentStatus::Succeeded,
                created_at: Utc.with_ymd_and_hms(2025, 2, id as u32, 10, 0, 0).unwrap(),
            })
            .collect())
    }

    async fn create_topup(&self, amount: i64, provider: &str) -> ApiResult<TopupReceipt> {
        self.topups.lock().unwrap().push((amount, provider.to_string()));
        Ok(TopupReceipt {
            confirmation_url: format!("https://pay.example/confirm/{amount}"),
            payment_id: Some(PaymentId::new(77)),
        })
    }

    async fn start_subscription(&self, _tariff: TariffId, _devices: u32) -> ApiResult<SubscriptionAck> {
        let mut base = self.base.lock().unwrap();
        base.balance -= 100;
        Ok(SubscriptionAck {
            ok: true,
            subscription_end: None,
            balance: base.balance,
        })
    }
}

/// Host that records the links and popups it is asked to show.
#[derive(Default)]
pub struct RecordingHost {
    pub links: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn links(&self) -> Vec<String> {
        self.links.lock().unwrap().clone()
    }
}

impl Host for RecordingHost {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn init_data(&self) -> Option<Credential> {
        Some(Credential::new(TOKEN))
    }

    fn open_link(&self, url: &str) {
        self.links.lock().unwrap().push(url.to_string());
    }
}

/// Everything a test needs to drive an orchestrator.
pub struct Harness {
    pub backend: Arc<ScriptedBackend>,
    pub store: Arc<MemoryStore>,
    pub host: Arc<RecordingHost>,
    pub handle: onevpn_sync::OrchestratorHandle,
    pub events: mpsc::Receiver<ClientEvent>,
}

impl Harness {
    /// Spawns an orchestrator over `backend`. `policy_accepted` pre-seeds the store.
    pub fn spawn(backend: ScriptedBackend, policy_accepted: bool) -> Self {
        let backend = Arc::new(backend);
        let store = Arc::new(MemoryStore::new());
        if policy_accepted {
            store.accept_policy().unwrap();
        }
        let host = Arc::new(RecordingHost::default());
        let bootstrapper = SessionBootstrapper::new(
            select_host(Some(host.clone())),
            store.clone(),
            backend.clone(),
        );
        let (handle, events, commands, orchestrator) =
            onevpn_sync::create_orchestrator(ClientConfig::default(), bootstrapper);
        tokio::spawn(orchestrator.run(commands));
        Self {
            backend,
            store,
            host,
            handle,
            events,
        }
    }

    /// Next event of any kind.
    pub async fn next_event(&mut self) -> ClientEvent {
        self.events.recv().await.expect("orchestrator stopped")
    }

    /// Skips to the next gate change.
    pub async fn next_gate(&mut self) -> (GateState, Vec<GateAction>) {
        loop {
            if let ClientEvent::GateChanged { state, actions } = self.next_event().await {
                return (state, actions);
            }
        }
    }

    /// Skips gate changes until `expected` is reached.
    pub async fn wait_for(&mut self, expected: &GateState) -> Vec<GateAction> {
        loop {
            let (state, actions) = self.next_gate().await;
            if &state == expected {
                return actions;
            }
        }
    }

    /// Skips to the next reconciliation report.
    pub async fn next_report(&mut self) -> onevpn_sync::ReconcileReport {
        loop {
            if let ClientEvent::Reconciled(report) = self.next_event().await {
                return report;
            }
        }
    }

    /// Drops queued events.
    pub fn drain(&mut self) -> Vec<ClientEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}
