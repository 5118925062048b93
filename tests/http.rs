use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use feeding_sync::{
    AuthSession, Config, ErrorCode, FeedingApi, FeedingStore, NetworkMonitor, RemoteClient,
};
use serde_json::{Value, json};
use std::net::TcpListener;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Default)]
struct MockData {
    total: f64,
    target: f64,
    feedings: Vec<Value>,
    history: Vec<Value>,
    next_id: i64,
    slow_target_posts: u32,
    target_posts: u32,
    fail_feeding: bool,
    authorization: Vec<Option<String>>,
    platforms: Vec<Option<String>>,
}

#[derive(Clone)]
struct MockApi(Arc<Mutex<MockData>>);

impl MockApi {
    fn record(&self, headers: &HeaderMap) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let mut data = self.0.lock().unwrap();
        data.authorization.push(header("authorization"));
        data.platforms.push(header("x-device-platform"));
    }
}

async fn feedings(State(api): State<MockApi>, headers: HeaderMap) -> Json<Value> {
    api.record(&headers);
    Json(Value::Array(api.0.lock().unwrap().feedings.clone()))
}

async fn total(State(api): State<MockApi>, headers: HeaderMap) -> Json<Value> {
    api.record(&headers);
    Json(json!({ "total": api.0.lock().unwrap().total }))
}

async fn target(State(api): State<MockApi>, headers: HeaderMap) -> Json<Value> {
    api.record(&headers);
    Json(json!({ "target": api.0.lock().unwrap().target }))
}

async fn set_target(State(api): State<MockApi>, Json(body): Json<Value>) -> Response {
    let slow = {
        let mut data = api.0.lock().unwrap();
        data.target_posts += 1;
        if data.slow_target_posts > 0 {
            data.slow_target_posts -= 1;
            true
        } else {
            false
        }
    };
    if slow {
        sleep(Duration::from_millis(600)).await;
    }

    let requested = body["target"].as_f64().unwrap_or(-1.0);
    if requested > 10.0 {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "code": "TARGET_TOO_HIGH", "message": "Target exceeds 10 cups" })),
        )
            .into_response();
    }
    api.0.lock().unwrap().target = requested;
    Json(json!({ "target": requested })).into_response()
}

async fn history(State(api): State<MockApi>) -> Json<Value> {
    Json(Value::Array(api.0.lock().unwrap().history.clone()))
}

async fn add_feeding(State(api): State<MockApi>, Json(body): Json<Value>) -> Response {
    let mut data = api.0.lock().unwrap();
    if data.fail_feeding {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "Database unavailable" })),
        )
            .into_response();
    }

    let amount = body["amount"].as_f64().unwrap_or(0.0);
    data.next_id += 1;
    data.total += amount;
    let event = json!({
        "id": data.next_id,
        "timestamp": "2026-01-05T20:15:00",
        "amount": amount,
        "last_updated_by": "tester"
    });
    data.feedings.push(event.clone());

    let mut response = event;
    response["total"] = json!(data.total);
    Json(response).into_response()
}

fn seeded() -> MockData {
    MockData {
        total: 1.0,
        target: 2.0,
        feedings: vec![
            json!({ "id": 1, "timestamp": "2026-01-05T16:02:00", "amount": 0.5, "last_updated_by": null }),
            json!({ "id": 2, "timestamp": "2026-01-05T16:14:00Z", "amount": 0.5, "last_updated_by": "sam" }),
        ],
        history: vec![
            json!({ "date": "2026-01-04", "amountFed": 2.5, "target": 2.0, "feedings": [] }),
            json!({ "date": "2026-01-03", "amountFed": 1.5, "target": 2.0, "feedings": [] }),
        ],
        next_id: 2,
        ..MockData::default()
    }
}

async fn spawn_mock(data: MockData) -> (String, MockApi) {
    let api = MockApi(Arc::new(Mutex::new(data)));
    let app = Router::new()
        .route("/api/daily/feedings", get(feedings))
        .route("/api/daily/total", get(total))
        .route("/api/settings/target", get(target).post(set_target))
        .route("/api/history", get(history))
        .route("/api/feeding", post(add_feeding))
        .with_state(api.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/api"), api)
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn test_config(base_url: &str) -> Config {
    Config {
        base_url: base_url.to_string(),
        timeout: Duration::from_millis(250),
        retry_base_delay: Duration::from_millis(10),
        device_platform: "test-os".to_string(),
        ..Config::default()
    }
}

fn client(base_url: &str, token: Option<&str>) -> RemoteClient {
    let session = AuthSession::new(token.map(str::to_string));
    RemoteClient::new(&test_config(base_url), session, NetworkMonitor::default()).unwrap()
}

#[tokio::test]
async fn http_reads_attach_credentials_and_device_headers() {
    let (base_url, api) = spawn_mock(seeded()).await;
    let client = client(&base_url, Some("secret"));

    assert_eq!(client.today_total().await.unwrap(), 1.0);
    assert_eq!(client.daily_target().await.unwrap(), 2.0);
    let events = client.today_feedings().await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].updated_by.as_deref(), Some("sam"));

    let data = api.0.lock().unwrap();
    assert!(data.authorization.iter().all(|auth| auth.as_deref() == Some("Bearer secret")));
    assert!(data.platforms.iter().all(|platform| platform.as_deref() == Some("test-os")));
}

#[tokio::test]
async fn http_requests_without_session_carry_no_credential() {
    let (base_url, api) = spawn_mock(seeded()).await;
    let client = client(&base_url, None);

    client.today_total().await.unwrap();
    assert_eq!(api.0.lock().unwrap().authorization, vec![None]);
}

#[tokio::test]
async fn http_update_target_retries_timeouts() {
    let mut data = seeded();
    data.slow_target_posts = 2;
    let (base_url, api) = spawn_mock(data).await;
    let client = client(&base_url, Some("secret"));

    assert_eq!(client.update_target(2.5).await.unwrap(), 2.5);
    assert_eq!(api.0.lock().unwrap().target_posts, 3);
}

#[tokio::test]
async fn http_update_target_gives_up_after_three_attempts() {
    let mut data = seeded();
    data.slow_target_posts = 10;
    let (base_url, api) = spawn_mock(data).await;
    let client = client(&base_url, Some("secret"));

    let err = client.update_target(2.5).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Timeout);
    assert_eq!(api.0.lock().unwrap().target_posts, 3);
}

#[tokio::test]
async fn http_server_errors_are_not_retried() {
    let (base_url, api) = spawn_mock(seeded()).await;
    let client = client(&base_url, Some("secret"));

    let err = client.update_target(50.0).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Server("TARGET_TOO_HIGH".to_string()));
    assert_eq!(err.message, "Target exceeds 10 cups");
    assert_eq!(err.details.unwrap()["code"], "TARGET_TOO_HIGH");
    assert_eq!(api.0.lock().unwrap().target_posts, 1);
}

#[tokio::test]
async fn http_unreachable_server_is_a_connection_error() {
    let base_url = format!("http://127.0.0.1:{}/api", pick_free_port());
    let client = client(&base_url, None);

    let err = client.history().await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ConnectionError);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn http_store_refreshes_and_records_feedings() {
    let (base_url, _api) = spawn_mock(seeded()).await;
    let client = client(&base_url, Some("secret"));
    let store = FeedingStore::new(Arc::new(client), AuthSession::new(Some("secret".into())));

    store.mount().await.unwrap();
    let state = store.snapshot();
    let current = state.current.unwrap();
    assert_eq!(current.amount_fed, 1.0);
    assert_eq!(current.events.len(), 2);
    assert_eq!(state.history.len(), 2);
    assert!(!state.loading);

    let event = store.add_feeding(0.75).await.unwrap();
    assert_eq!(event.id.to_string(), "3");
    let current = store.snapshot().current.unwrap();
    assert_eq!(current.amount_fed, 1.75);
    assert_eq!(current.events.len(), 3);
}

#[tokio::test]
async fn http_store_keeps_state_when_feeding_fails() {
    let (base_url, api) = spawn_mock(seeded()).await;
    let client = client(&base_url, Some("secret"));
    let store = FeedingStore::new(Arc::new(client), AuthSession::new(Some("secret".into())));
    store.mount().await.unwrap();
    let before = store.snapshot();

    api.0.lock().unwrap().fail_feeding = true;
    let err = store.add_feeding(0.5).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Server("HTTP_500".to_string()));

    let after = store.snapshot();
    assert_eq!(after.current, before.current);
    assert_eq!(after.error.as_deref(), Some("Database unavailable"));
}

#[tokio::test]
async fn http_binary_prints_snapshot_once() {
    let (base_url, _api) = spawn_mock(seeded()).await;

    let output = tokio::task::spawn_blocking(move || {
        Command::new(env!("CARGO_BIN_EXE_feeding_sync"))
            .arg("--once")
            .env("FEEDING_API_URL", base_url)
            .env("FEEDING_API_TOKEN", "secret")
            .env("RUST_LOG", "info")
            .output()
            .expect("failed to run binary")
    })
    .await
    .unwrap();

    assert!(output.status.success());
    let snapshot: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(snapshot["current"]["amountFed"], 1.0);
    assert_eq!(snapshot["current"]["target"], 2.0);
    assert_eq!(snapshot["current"]["feedings"].as_array().unwrap().len(), 2);
    assert_eq!(snapshot["history"][0]["date"], "2026-01-04");
    assert_eq!(snapshot["loading"], false);
}
