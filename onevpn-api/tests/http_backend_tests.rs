use onevpn_api::{ApiClient, ApiConfig, ApiError, Backend, HttpBackend, Method};
use onevpn_types::{Credential, DeviceId, Fingerprint, PaymentStatus, TariffId};
use pretty_assertions::assert_eq;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const INIT_DATA: &str = "query_id=AAH&user=%7B%22id%22%3A42%7D&hash=abc123";

fn mock_backend(server: &MockServer) -> HttpBackend {
    let config = ApiConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    HttpBackend::new(ApiClient::new(config, Credential::new(INIT_DATA)).unwrap())
}

fn state_body() -> serde_json::Value {
    serde_json::json!({
        "balance": 120,
        "estimated_days": 18,
        "allowed_devices": 3,
        "devices": [
            {"id": 1, "fingerprint": "f1", "label": "Device 1", "last_seen": "2025-02-01T08:00:00"}
        ],
        "link": "https://vpn.example/slug",
        "link_suspended": false,
        "is_admin": true,
        "ios_help_url": "https://help/ios",
        "android_help_url": "https://help/android",
        "support_url": "https://t.me/support"
    })
}

// ── Config defaults ─────────────────────────────────────────────

#[test]
fn api_config_default() {
    let cfg = ApiConfig::default();
    assert_eq!(cfg.credential_header, "X-Telegram-Init");
    assert_eq!(cfg.timeout_secs, 30);
}

#[test]
fn api_config_partial_json_uses_defaults() {
    let cfg: ApiConfig = serde_json::from_str(r#"{"base_url":"https://vpn.example"}"#).unwrap();
    assert_eq!(cfg.base_url, "https://vpn.example");
    assert_eq!(cfg.credential_header, "X-Telegram-Init");
}

// ── Credential header ───────────────────────────────────────────

#[tokio::test]
async fn every_call_carries_the_credential_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/state"))
        .and(header("X-Telegram-Init", INIT_DATA))
        .respond_with(ResponseTemplate::new(200).set_body_json(state_body()))
        .expect(1)
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    let state = backend.state().await.unwrap();
    assert_eq!(state.balance, 120);
    assert!(state.is_admin);
}

#[tokio::test]
async fn refreshed_credential_is_used_for_later_calls() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/gate"))
        .and(header("X-Telegram-Init", "fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"subscribed": true})))
        .expect(1)
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    backend.use_credential(&Credential::new("fresh")).await;
    assert!(backend.gate_status().await.unwrap().subscribed);
}

#[tokio::test]
async fn init_posts_init_data() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/init"))
        .and(body_json(serde_json::json!({"initData": "new-token"})))
        .and(header("X-Telegram-Init", "new-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"ok": true, "link": "https://vpn.example/x"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    let ack = backend.init(&Credential::new("new-token")).await.unwrap();
    assert!(ack.ok);
    assert_eq!(ack.link.as_deref(), Some("https://vpn.example/x"));
}

// ── Error normalization ─────────────────────────────────────────

#[tokio::test]
async fn error_detail_comes_from_body() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/state"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(serde_json::json!({"detail": "subscribe_required"})),
        )
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    match backend.state().await {
        Err(ApiError::Status { status, detail }) => {
            assert_eq!(status, 403);
            assert_eq!(detail, "subscribe_required");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn error_without_body_uses_status_text() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/gate"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    let err = backend.gate_status().await.unwrap_err();
    assert_eq!(err.status_code(), Some(503));
    assert_eq!(err.detail(), "Service Unavailable");
}

#[tokio::test]
async fn unreachable_backend_is_network_error() {
    let config = ApiConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        timeout_secs: 2,
        ..Default::default()
    };
    let backend = HttpBackend::new(ApiClient::new(config, Credential::new("x")).unwrap());
    let err = backend.state().await.unwrap_err();
    assert!(err.is_network());
    assert_eq!(err.status_code(), None);
}

#[tokio::test]
async fn malformed_success_body_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/state"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"devices": "nope"})))
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    assert!(matches!(backend.state().await, Err(ApiError::Decode(_))));
}

// ── Devices ─────────────────────────────────────────────────────

#[tokio::test]
async fn add_device_accepts_count_acknowledgement() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/device"))
        .and(body_json(serde_json::json!({"fingerprint": "fp-1", "label": "Device 2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true, "devices": 2})))
        .expect(1)
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    let created = backend
        .add_device(&Fingerprint::from_string("fp-1"), "Device 2")
        .await
        .unwrap();
    assert!(created.is_none());
}

#[tokio::test]
async fn add_device_returns_echoed_device() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/device"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 11, "fingerprint": "fp-2", "label": "Device 3", "last_seen": "2025-02-01T08:00:00Z"
        })))
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    let created = backend
        .add_device(&Fingerprint::from_string("fp-2"), "Device 3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.id, DeviceId::new(11));
}

#[tokio::test]
async fn add_device_over_quota_surfaces_detail() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/device"))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(serde_json::json!({"detail": "Слишком много устройств. Купите еще слот."})),
        )
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    let err = backend
        .add_device(&Fingerprint::generate(), "Device 4")
        .await
        .unwrap_err();
    assert!(err.detail().contains("Слишком много устройств"));
}

#[tokio::test]
async fn remove_device_hits_device_path() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/device/17"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    backend.remove_device(DeviceId::new(17)).await.unwrap();
}

#[tokio::test]
async fn remove_device_accepts_empty_body() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/device/3"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    backend.remove_device(DeviceId::new(3)).await.unwrap();
}

// ── Payments ────────────────────────────────────────────────────

#[tokio::test]
async fn list_payments_preserves_backend_order() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/payments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": 5, "amount": 100, "provider": "yookassa", "status": "pending", "created_at": "2025-03-05T00:00:00"},
            {"id": 9, "amount": 300, "provider": "yookassa", "status": "succeeded", "created_at": "2025-03-09T00:00:00"},
            {"id": 2, "amount": 50, "provider": "yookassa", "status": "canceled", "created_at": "2025-03-01T00:00:00"}
        ])))
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    let payments = backend.list_payments().await.unwrap();
    let ids: Vec<i64> = payments.iter().map(|p| p.id.get()).collect();
    assert_eq!(ids, vec![5, 9, 2]);
    assert_eq!(payments[1].status, PaymentStatus::Succeeded);
}

#[tokio::test]
async fn create_topup_returns_confirmation_url() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/topup"))
        .and(body_json(serde_json::json!({"amount": 150, "provider": "sbp"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "confirmation_url": "https://pay.example/confirm/1",
            "payment_id": 1
        })))
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    let receipt = backend.create_topup(150, "sbp").await.unwrap();
    assert_eq!(receipt.confirmation_url, "https://pay.example/confirm/1");
}

#[tokio::test]
async fn create_topup_below_minimum_is_rejected_locally() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/topup"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    let err = backend.create_topup(49, "sbp").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest(_)));
}

#[tokio::test]
async fn start_subscription_posts_tariff_and_devices() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/subscription"))
        .and(body_json(serde_json::json!({"tariff_id": 2, "devices": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "subscription_end": "2025-04-01T00:00:00+00:00",
            "balance": 10
        })))
        .mount(&server)
        .await;

    let backend = mock_backend(&server);
    let ack = backend.start_subscription(TariffId::new(2), 3).await.unwrap();
    assert!(ack.ok);
    assert_eq!(ack.balance, 10);
    assert!(ack.subscription_end.is_some());
}

// ── Raw request surface ─────────────────────────────────────────

#[tokio::test]
async fn raw_request_with_method_and_body() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/custom"))
        .and(body_json(serde_json::json!({"k": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"echo": 1})))
        .mount(&server)
        .await;

    let config = ApiConfig {
        base_url: server.uri(),
        ..Default::default()
    };
    let client = ApiClient::new(config, Credential::new("c")).unwrap();
    let value: serde_json::Value = client
        .request("/api/custom", Method::PUT, Some(&serde_json::json!({"k": 1})))
        .await
        .unwrap();
    assert_eq!(value["echo"], 1);
}
