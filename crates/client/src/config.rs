//! Client configuration from environment variables or JSON.

use std::time::Duration;

use hirewire_shared::{is_local_address, Destinations};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::RealtimeError;
use crate::ws::ReconnectConfig;

const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/ws";
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Settings for one real-time session.
///
/// The reconnect options are flattened, so `{ "reconnectDelayMs": 2000 }` is
/// accepted at the top level of a JSON config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RealtimeConfig {
    /// WebSocket endpoint of the STOMP broker.
    pub endpoint: String,
    /// Base URL of the REST API.
    pub api_base_url: String,
    #[serde(flatten)]
    pub reconnect: ReconnectConfig,
    /// Upper bound on socket open + CONNECTED round trip.
    pub handshake_timeout_ms: u64,
    pub destinations: Destinations,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            reconnect: ReconnectConfig::default(),
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            destinations: Destinations::default(),
        }
    }
}

impl RealtimeConfig {
    /// Build a config from environment variables.
    ///
    /// Environment variables:
    /// - `HIREWIRE_WS_URL`: broker endpoint (default: "ws://localhost:8080/ws")
    /// - `HIREWIRE_API_URL`: REST base URL (default: "http://localhost:8080")
    /// - `HIREWIRE_RECONNECT_DELAY_MS`: fixed retry delay (default: 5000)
    pub fn from_env() -> Result<Self, RealtimeError> {
        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var("HIREWIRE_WS_URL") {
            config.endpoint = endpoint;
        }
        if let Ok(api) = std::env::var("HIREWIRE_API_URL") {
            config.api_base_url = api;
        }
        if let Ok(delay) = std::env::var("HIREWIRE_RECONNECT_DELAY_MS") {
            config.reconnect.reconnect_delay_ms = delay.trim().parse().map_err(|_| {
                RealtimeError::Config(format!("HIREWIRE_RECONNECT_DELAY_MS is not a number: {delay}"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config document and validate it.
    pub fn from_json(json: &str) -> Result<Self, RealtimeError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| RealtimeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RealtimeError> {
        let endpoint = Url::parse(&self.endpoint)
            .map_err(|e| RealtimeError::Config(format!("invalid endpoint {}: {e}", self.endpoint)))?;
        match endpoint.scheme() {
            "ws" => {
                let host = endpoint.host_str().unwrap_or_default();
                if !is_local_address(host) {
                    tracing::warn!(endpoint = %self.endpoint, "unencrypted websocket to a remote host");
                }
            }
            "wss" => {}
            other => {
                return Err(RealtimeError::Config(format!(
                    "endpoint scheme must be ws or wss, got {other}"
                )))
            }
        }

        let api = Url::parse(&self.api_base_url).map_err(|e| {
            RealtimeError::Config(format!("invalid api base url {}: {e}", self.api_base_url))
        })?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(RealtimeError::Config(format!(
                "api base url scheme must be http or https, got {}",
                api.scheme()
            )));
        }

        if self.reconnect.reconnect_delay_ms == 0 {
            return Err(RealtimeError::Config(
                "reconnectDelayMs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Value of the STOMP `host` header: `host[:port]` of the endpoint.
    pub fn broker_host(&self) -> String {
        match Url::parse(&self.endpoint) {
            Ok(url) => match (url.host_str(), url.port()) {
                (Some(host), Some(port)) => format!("{host}:{port}"),
                (Some(host), None) => host.to_string(),
                _ => String::new(),
            },
            Err(_) => String::new(),
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}
