use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::{info, warn};

const DEVELOPMENT_URL: &str = "http://127.0.0.1:5002/api";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_POLL_SECS: u64 = 30;
const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub device_platform: String,
    pub device_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            base_url: DEVELOPMENT_URL.to_string(),
            token: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            device_platform: env::consts::OS.to_string(),
            device_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Config {
    /// Reads `FEEDING_*` variables, keeping defaults for anything unset or
    /// malformed.
    pub fn load() -> Self {
        let defaults = Config::default();
        let environment = try_load("FEEDING_ENV", defaults.environment);

        // Production has no built-in host, so the URL must come from the environment.
        let base_url = match var("FEEDING_API_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                if environment == Environment::Production {
                    warn!("FEEDING_API_URL not set in production, falling back to {DEVELOPMENT_URL}");
                }
                defaults.base_url
            }
        };

        Self {
            environment,
            base_url,
            token: var("FEEDING_API_TOKEN").filter(|token| !token.trim().is_empty()),
            timeout: Duration::from_millis(try_load("FEEDING_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)),
            poll_interval: Duration::from_secs(try_load("FEEDING_POLL_SECS", DEFAULT_POLL_SECS).max(1)),
            retry_attempts: try_load("FEEDING_RETRY_ATTEMPTS", defaults.retry_attempts).max(1),
            retry_base_delay: Duration::from_millis(try_load(
                "FEEDING_RETRY_DELAY_MS",
                DEFAULT_RETRY_DELAY_MS,
            )),
            device_platform: var("FEEDING_DEVICE_PLATFORM").unwrap_or(defaults.device_platform),
            device_version: defaults.device_version,
        }
    }

    pub fn user_agent(&self) -> String {
        format!(
            "FeedingSync/{} ({}; {})",
            env!("CARGO_PKG_VERSION"),
            self.device_platform,
            self.device_version
        )
    }
}

impl Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Production => f.write_str("production"),
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match var(key) {
        None => {
            info!("{key} not set, using default: {default}");
            default
        }
        Some(raw) => raw.trim().parse().unwrap_or_else(|err| {
            warn!("Invalid {key} value '{raw}': {err}, using default: {default}");
            default
        }),
    }
}
