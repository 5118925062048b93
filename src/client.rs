//! Typed access to the feeding API.
//!
//! Every operation resolves to `Result<T, ApiError>`; transport failures from
//! reqwest are mapped into the retryable codes and never escape raw.

use async_trait::async_trait;
use reqwest::{
    Method, StatusCode,
    header::{ACCEPT, HeaderMap, HeaderName, HeaderValue},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::{
    future::Future,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tracing::{debug, warn};

use crate::config::Config;
use crate::errors::{ApiError, DEFAULT_SERVER_MESSAGE};
use crate::models::{
    CreatedFeeding, DailyAggregate, FeedingEvent, FeedingRequest, TargetBody, TotalResponse,
};

pub const FEEDINGS_PATH: &str = "/daily/feedings";
pub const TOTAL_PATH: &str = "/daily/total";
pub const TARGET_PATH: &str = "/settings/target";
pub const HISTORY_PATH: &str = "/history";
pub const FEEDING_PATH: &str = "/feeding";

const DEVICE_PLATFORM: HeaderName = HeaderName::from_static("x-device-platform");
const DEVICE_VERSION: HeaderName = HeaderName::from_static("x-device-version");

#[async_trait]
pub trait FeedingApi: Send + Sync {
    async fn today_feedings(&self) -> Result<Vec<FeedingEvent>, ApiError>;

    async fn today_total(&self) -> Result<f64, ApiError>;

    async fn daily_target(&self) -> Result<f64, ApiError>;

    /// Returns the target the server stored.
    async fn update_target(&self, target: f64) -> Result<f64, ApiError>;

    async fn history(&self) -> Result<Vec<DailyAggregate>, ApiError>;

    async fn add_feeding(&self, amount: f64) -> Result<CreatedFeeding, ApiError>;
}

/// Bearer credential shared between the login flow and the client.
#[derive(Debug, Clone, Default)]
pub struct AuthSession {
    token: Arc<RwLock<Option<String>>>,
}

impl AuthSession {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token)),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|token| token.clone())
    }

    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.into());
        }
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }
}

/// Connectivity flag fed by the host platform; the client refuses to build
/// requests while it reads offline.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    online: Arc<AtomicBool>,
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self {
            online: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl NetworkMonitor {
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn set_online(&self, online: bool) {
        let previous = self.online.swap(online, Ordering::SeqCst);
        if previous != online {
            debug!(online, "network status changed");
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    base_url: String,
    session: AuthSession,
    network: NetworkMonitor,
    retry_attempts: u32,
    retry_base_delay: Duration,
}

impl RemoteClient {
    pub fn new(config: &Config, session: AuthSession, network: NetworkMonitor) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(DEVICE_PLATFORM, header_value(&config.device_platform)?);
        headers.insert(DEVICE_VERSION, header_value(&config.device_version)?);

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            session,
            network,
            retry_attempts: config.retry_attempts,
            retry_base_delay: config.retry_base_delay,
        })
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        if !self.network.is_online() {
            warn!(%method, path, "refusing request while offline");
            return Err(ApiError::offline());
        }

        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method.clone(), &url);
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &body {
            request = request.json(body);
        }

        debug!(%method, path, body = ?body, "api request");
        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        debug!(%method, path, status = status.as_u16(), "api response");

        if !status.is_success() {
            let err = server_error(status, &bytes);
            warn!(%method, path, code = %err.code, message = %err.message, "api request failed");
            return Err(err);
        }

        serde_json::from_slice(&bytes)
            .map_err(|err| ApiError::parse(format!("invalid response from {path}: {err}")))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(Method::GET, path, None).await
    }
}

#[async_trait]
impl FeedingApi for RemoteClient {
    async fn today_feedings(&self) -> Result<Vec<FeedingEvent>, ApiError> {
        self.get(FEEDINGS_PATH).await
    }

    async fn today_total(&self) -> Result<f64, ApiError> {
        let response: TotalResponse = self.get(TOTAL_PATH).await?;
        Ok(response.total)
    }

    async fn daily_target(&self) -> Result<f64, ApiError> {
        let response: TargetBody = self.get(TARGET_PATH).await?;
        Ok(response.target)
    }

    async fn update_target(&self, target: f64) -> Result<f64, ApiError> {
        let body = serde_json::to_value(TargetBody { target })
            .map_err(|err| ApiError::parse(err.to_string()))?;
        let response: TargetBody = retry_with_backoff(self.retry_attempts, self.retry_base_delay, || {
            self.execute(Method::POST, TARGET_PATH, Some(body.clone()))
        })
        .await?;
        Ok(response.target)
    }

    async fn history(&self) -> Result<Vec<DailyAggregate>, ApiError> {
        self.get(HISTORY_PATH).await
    }

    async fn add_feeding(&self, amount: f64) -> Result<CreatedFeeding, ApiError> {
        let body = serde_json::to_value(FeedingRequest { amount })
            .map_err(|err| ApiError::parse(err.to_string()))?;
        self.execute(Method::POST, FEEDING_PATH, Some(body)).await
    }
}

/// Runs `operation` up to `attempts` times. After failed attempt `n` it waits
/// `base_delay * n`; only retryable transport codes are retried.
pub async fn retry_with_backoff<T, F, Fut>(
    attempts: u32,
    base_delay: Duration,
    mut operation: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < attempts => {
                let delay = base_delay * attempt;
                warn!(attempt, code = %err.code, delay_ms = delay.as_millis() as u64, "retrying request");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn server_error(status: StatusCode, bytes: &[u8]) -> ApiError {
    let details = serde_json::from_slice::<Value>(bytes).ok().or_else(|| {
        let text = String::from_utf8_lossy(bytes).trim().to_string();
        (!text.is_empty()).then_some(Value::String(text))
    });

    let field = |name: &str| {
        details
            .as_ref()
            .and_then(|body| body.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let code = field("code").unwrap_or_else(|| format!("HTTP_{}", status.as_u16()));
    let message = field("message")
        .or_else(|| field("error"))
        .unwrap_or_else(|| DEFAULT_SERVER_MESSAGE.to_string());

    ApiError::server(code, message, details)
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|err| ApiError::network(format!("invalid header value '{value}': {err}")))
}
