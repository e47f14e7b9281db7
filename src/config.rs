use std::time::Duration;

use crate::errors::MessagingError;

const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_CONVERSATION_POLL_MS: u64 = 3000;
const DEFAULT_THREAD_POLL_MS: u64 = 2000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base of the REST API, e.g. `http://localhost:5000/api`.
    pub api_base_url: String,
    pub conversation_poll_interval: Duration,
    pub thread_poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            conversation_poll_interval: Duration::from_millis(DEFAULT_CONVERSATION_POLL_MS),
            thread_poll_interval: Duration::from_millis(DEFAULT_THREAD_POLL_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Reads the configuration from the environment, loading `.env` first.
    pub fn from_env() -> Result<Self, MessagingError> {
        // Load .env if present (development convenience)
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, MessagingError> {
        let defaults = Self::default();
        let duration = |key: &str,
                        default: Duration,
                        unit: fn(u64) -> Duration|
         -> Result<Duration, MessagingError> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .ok()
                    .filter(|v| *v > 0)
                    .map(unit)
                    .ok_or(MessagingError::InvalidConfig { key: key.to_string(), value: raw }),
            }
        };

        Ok(Self {
            api_base_url: lookup("JOBCONNECT_API_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base_url),
            conversation_poll_interval: duration(
                "JOBCONNECT_CONVERSATION_POLL_MS",
                defaults.conversation_poll_interval,
                Duration::from_millis,
            )?,
            thread_poll_interval: duration(
                "JOBCONNECT_THREAD_POLL_MS",
                defaults.thread_poll_interval,
                Duration::from_millis,
            )?,
            request_timeout: duration(
                "JOBCONNECT_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout,
                Duration::from_secs,
            )?,
        })
    }
}
