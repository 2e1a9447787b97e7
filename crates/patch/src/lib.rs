//! Minimal configuration loading for the messaging gateway.
//!
//! This crate provides configuration loading with minimal dependencies,
//! designed to be imported by every gateway crate without causing
//! circular dependency issues.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/gateway/config.toml` (system)
//! 2. `~/.config/gateway/config.toml` (user)
//! 3. `./gateway.toml` (local override, or `--config` path)
//! 4. Environment variables (`GATEWAY_*`)
//!
//! # Example Config
//!
//! ```toml
//! [provider]
//! primary = "p1"
//! p1_enabled = true
//! p2_enabled = true
//!
//! [fallback]
//! max_retries = 3
//!
//! [polling]
//! interval_ms = 5000
//!
//! [webhook]
//! url = "https://app.example.com/webhooks/messages"
//!
//! [backend]
//! url = "https://app.example.com/api"
//! key = "..."
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sections::{
    BackendConfig, BindConfig, FallbackConfig, FallbackTriggersConfig, PathsConfig,
    PollingConfig, PrimaryProvider, ProviderConfig, TelemetryConfig, WebhookConfig,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Full gateway configuration, merged from defaults, files, and env.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub bind: BindConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

impl GatewayConfig {
    /// Load configuration from compiled defaults + discovered files + env.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _) = Self::load_with_sources()?;
        Ok(config)
    }

    /// Load configuration from a specific file, ignoring discovery.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = loader::load_from_file(path)?;
        let mut sources = ConfigSources {
            files: vec![path.to_path_buf()],
            env_overrides: Vec::new(),
        };
        loader::apply_env_overrides(&mut config, &mut sources);
        Ok(config)
    }

    /// Load configuration, also returning which files/env vars contributed.
    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    /// Load configuration, optionally overriding the local file with an
    /// explicit CLI path.
    pub fn load_with_sources_from(cli_path: Option<&Path>) -> Result<(Self, ConfigSources), ConfigError> {
        let files = loader::discover_config_files_with_override(cli_path);

        let mut config = Self::default();
        for file in &files {
            config = loader::load_from_file_onto(file, config)?;
        }

        let mut sources = ConfigSources {
            files,
            env_overrides: Vec::new(),
        };
        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Render the effective configuration back to TOML, for `--show-config`.
    pub fn to_toml(&self) -> String {
        let mut out = String::new();

        out.push_str("[paths]\n");
        out.push_str(&format!("auth_root = \"{}\"\n", self.paths.auth_root.display()));
        out.push_str(&format!("queue_file = \"{}\"\n\n", self.paths.queue_file.display()));

        out.push_str("[bind]\n");
        out.push_str(&format!("http_port = {}\n\n", self.bind.http_port));

        out.push_str("[telemetry]\n");
        out.push_str(&format!("otlp_endpoint = \"{}\"\n", self.telemetry.otlp_endpoint));
        out.push_str(&format!("log_level = \"{}\"\n\n", self.telemetry.log_level));

        out.push_str("[provider]\n");
        out.push_str(&format!(
            "primary = \"{}\"\n",
            match self.provider.primary {
                PrimaryProvider::P1 => "p1",
                PrimaryProvider::P2 => "p2",
            }
        ));
        out.push_str(&format!("p1_enabled = {}\n", self.provider.p1_enabled));
        out.push_str(&format!("p2_enabled = {}\n", self.provider.p2_enabled));
        out.push_str(&format!("p1_base_url = {:?}\n\n", self.provider.p1_base_url));

        out.push_str("[fallback]\n");
        out.push_str(&format!("enabled = {}\n", self.fallback.enabled));
        out.push_str(&format!("max_retries = {}\n", self.fallback.max_retries));
        out.push_str(&format!("retry_delay_ms = {}\n\n", self.fallback.retry_delay_ms));

        out.push_str("[fallback.triggers]\n");
        out.push_str(&format!("timeout = {}\n", self.fallback.triggers.timeout));
        out.push_str(&format!("rate_limit = {}\n", self.fallback.triggers.rate_limit));
        out.push_str(&format!("template_error = {}\n", self.fallback.triggers.template_error));
        out.push_str(&format!("server_error = {}\n\n", self.fallback.triggers.server_error));

        out.push_str("[polling]\n");
        out.push_str(&format!("interval_ms = {}\n\n", self.polling.interval_ms));

        out.push_str("[webhook]\n");
        out.push_str(&format!("url = {:?}\n", self.webhook.url));
        out.push_str(&format!("timeout_ms = {}\n\n", self.webhook.timeout_ms));

        out.push_str("[backend]\n");
        out.push_str(&format!("url = {:?}\n", self.backend.url));

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads() {
        let config = GatewayConfig::default();
        assert_eq!(config.bind.http_port, 8080);
        assert_eq!(config.provider.primary, PrimaryProvider::P1);
    }

    #[test]
    fn to_toml_contains_sections() {
        let config = GatewayConfig::default();
        let toml = config.to_toml();
        assert!(toml.contains("[provider]"));
        assert!(toml.contains("[fallback.triggers]"));
    }

    #[test]
    fn load_from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[webhook]\nurl = \"https://example.com\"\n").unwrap();

        let config = GatewayConfig::load_from(&path).unwrap();
        assert_eq!(config.webhook.url.as_deref(), Some("https://example.com"));
    }
}
