//! Configuration sections - one struct per `[section]` of the TOML file.
//!
//! Every field follows the same shape: a `#[serde(default = "...")]`
//! attribute pointing at a private `default_*` function, and a `Default`
//! impl for the struct that delegates to those functions. This lets a
//! partial TOML file (or none at all) still produce a fully-populated
//! config.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem paths used by the gateway process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root directory holding one credential subdirectory per tenant.
    /// Its presence drives `reconnectExistingSessions`.
    /// Default: ~/.local/share/gateway/auth
    #[serde(default = "PathsConfig::default_auth_root")]
    pub auth_root: PathBuf,

    /// Single JSON file backing the inbound delivery queue.
    /// Default: ~/.local/share/gateway/queue.json
    #[serde(default = "PathsConfig::default_queue_file")]
    pub queue_file: PathBuf,
}

impl PathsConfig {
    fn default_auth_root() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/gateway/auth"))
            .unwrap_or_else(|| PathBuf::from(".local/share/gateway/auth"))
    }

    fn default_queue_file() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".local/share/gateway/queue.json"))
            .unwrap_or_else(|| PathBuf::from(".local/share/gateway/queue.json"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            auth_root: Self::default_auth_root(),
            queue_file: Self::default_queue_file(),
        }
    }
}

/// Network bind address for the admin HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindConfig {
    /// Default: 8080
    #[serde(default = "BindConfig::default_http_port")]
    pub http_port: u16,
}

impl BindConfig {
    fn default_http_port() -> u16 {
        8080
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            http_port: Self::default_http_port(),
        }
    }
}

/// Telemetry and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// OTLP gRPC endpoint for OpenTelemetry.
    /// Default: 127.0.0.1:4317
    #[serde(default = "TelemetryConfig::default_otlp_endpoint")]
    pub otlp_endpoint: String,

    /// Log level (trace, debug, info, warn, error).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_otlp_endpoint() -> String {
        "127.0.0.1:4317".to_string()
    }

    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: Self::default_otlp_endpoint(),
            log_level: Self::default_log_level(),
        }
    }
}

/// Which provider is primary, and which are enabled at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryProvider {
    P1,
    P2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Default: p1
    #[serde(default = "ProviderConfig::default_primary")]
    pub primary: PrimaryProvider,

    /// Default: true
    #[serde(default = "ProviderConfig::default_p1_enabled")]
    pub p1_enabled: bool,

    /// Default: true
    #[serde(default = "ProviderConfig::default_p2_enabled")]
    pub p2_enabled: bool,

    /// Opaque credential blob for P1 (API token, app secret, ...).
    /// Default: none
    #[serde(default)]
    pub p1_credentials: Option<String>,

    /// Base URL of the official HTTP provider's API. Default: none (P1 is
    /// unavailable without it, same as missing credentials).
    #[serde(default)]
    pub p1_base_url: Option<String>,
}

impl ProviderConfig {
    fn default_primary() -> PrimaryProvider {
        PrimaryProvider::P1
    }

    fn default_p1_enabled() -> bool {
        true
    }

    fn default_p2_enabled() -> bool {
        true
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            primary: Self::default_primary(),
            p1_enabled: Self::default_p1_enabled(),
            p2_enabled: Self::default_p2_enabled(),
            p1_credentials: None,
            p1_base_url: None,
        }
    }
}

/// Which error classes currently cause the send router to fail over to
/// the next provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FallbackTriggersConfig {
    #[serde(default = "FallbackTriggersConfig::default_true")]
    pub timeout: bool,
    #[serde(default = "FallbackTriggersConfig::default_true")]
    pub rate_limit: bool,
    #[serde(default = "FallbackTriggersConfig::default_true")]
    pub template_error: bool,
    #[serde(default = "FallbackTriggersConfig::default_true")]
    pub server_error: bool,
}

impl FallbackTriggersConfig {
    fn default_true() -> bool {
        true
    }
}

impl Default for FallbackTriggersConfig {
    fn default() -> Self {
        Self {
            timeout: true,
            rate_limit: true,
            template_error: true,
            server_error: true,
        }
    }
}

/// Send-router retry/fallback policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Default: true
    #[serde(default = "FallbackConfig::default_enabled")]
    pub enabled: bool,

    /// Retry budget per candidate provider. Default: 3
    #[serde(default = "FallbackConfig::default_max_retries")]
    pub max_retries: u32,

    /// Base inter-retry delay, multiplied by attempt number. Default: 1000
    #[serde(default = "FallbackConfig::default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default)]
    pub triggers: FallbackTriggersConfig,
}

impl FallbackConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_max_retries() -> u32 {
        3
    }

    fn default_retry_delay_ms() -> u64 {
        1000
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            max_retries: Self::default_max_retries(),
            retry_delay_ms: Self::default_retry_delay_ms(),
            triggers: FallbackTriggersConfig::default(),
        }
    }
}

/// Outbound poller tick interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Default: 5000
    #[serde(default = "PollingConfig::default_interval_ms")]
    pub interval_ms: u64,
}

impl PollingConfig {
    fn default_interval_ms() -> u64 {
        5000
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: Self::default_interval_ms(),
        }
    }
}

/// Application webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Default: none (forwarder skips with a warning when unset)
    #[serde(default)]
    pub url: Option<String>,

    /// Default: 15000
    #[serde(default = "WebhookConfig::default_timeout_ms")]
    pub timeout_ms: u64,

    /// `hub.verify_token` expected on the P1 webhook subscription challenge.
    /// Default: none
    #[serde(default)]
    pub verify_token: Option<String>,
}

impl WebhookConfig {
    fn default_timeout_ms() -> u64 {
        15_000
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: Self::default_timeout_ms(),
            verify_token: None,
        }
    }
}

/// Application backend pull/ack endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_default_under_home() {
        let paths = PathsConfig::default();
        assert!(paths.auth_root.to_string_lossy().contains("gateway"));
        assert!(paths.queue_file.to_string_lossy().ends_with("queue.json"));
    }

    #[test]
    fn bind_default_port() {
        assert_eq!(BindConfig::default().http_port, 8080);
    }

    #[test]
    fn provider_defaults() {
        let provider = ProviderConfig::default();
        assert_eq!(provider.primary, PrimaryProvider::P1);
        assert!(provider.p1_enabled);
        assert!(provider.p2_enabled);
        assert!(provider.p1_credentials.is_none());
    }

    #[test]
    fn fallback_defaults() {
        let fallback = FallbackConfig::default();
        assert!(fallback.enabled);
        assert_eq!(fallback.max_retries, 3);
        assert_eq!(fallback.retry_delay_ms, 1000);
        assert!(fallback.triggers.timeout);
        assert!(fallback.triggers.server_error);
    }

    #[test]
    fn polling_and_webhook_defaults() {
        assert_eq!(PollingConfig::default().interval_ms, 5000);
        assert_eq!(WebhookConfig::default().timeout_ms, 15_000);
        assert!(WebhookConfig::default().url.is_none());
    }
}
