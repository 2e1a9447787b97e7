//! Config file discovery, loading, and environment variable overlay.

use crate::sections::PrimaryProvider;
use crate::{ConfigError, GatewayConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order).
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values.
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local/cli).
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/gateway/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("gateway/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("gateway.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Load config from a TOML file, starting from compiled defaults.
pub fn load_from_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    load_from_file_onto(path, GatewayConfig::default())
}

/// Load config from a TOML file, overlaying it onto an existing config.
///
/// Used when multiple files are discovered (system, user, local): each
/// later file overlays only the fields it sets, onto the previous file's
/// result, rather than resetting unset fields back to defaults.
pub fn load_from_file_onto(path: &Path, base: GatewayConfig) -> Result<GatewayConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_toml(&contents, path, base)
}

/// Parse config from a TOML string, overlaying any set field onto `config`
/// and falling back to `config`'s existing value for everything absent.
fn parse_toml(contents: &str, path: &Path, mut config: GatewayConfig) -> Result<GatewayConfig, ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;


    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("auth_root").and_then(|v| v.as_str()) {
            config.paths.auth_root = expand_path(v);
        }
        if let Some(v) = paths.get("queue_file").and_then(|v| v.as_str()) {
            config.paths.queue_file = expand_path(v);
        }
    }

    if let Some(bind) = table.get("bind").and_then(|v| v.as_table()) {
        if let Some(v) = bind.get("http_port").and_then(|v| v.as_integer()) {
            config.bind.http_port = v as u16;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.telemetry.otlp_endpoint = v.to_string();
        }
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
    }

    if let Some(provider) = table.get("provider").and_then(|v| v.as_table()) {
        if let Some(v) = provider.get("primary").and_then(|v| v.as_str()) {
            config.provider.primary = match v {
                "p2" => PrimaryProvider::P2,
                _ => PrimaryProvider::P1,
            };
        }
        if let Some(v) = provider.get("p1_enabled").and_then(|v| v.as_bool()) {
            config.provider.p1_enabled = v;
        }
        if let Some(v) = provider.get("p2_enabled").and_then(|v| v.as_bool()) {
            config.provider.p2_enabled = v;
        }
        if let Some(v) = provider.get("p1_credentials").and_then(|v| v.as_str()) {
            config.provider.p1_credentials = Some(v.to_string());
        }
        if let Some(v) = provider.get("p1_base_url").and_then(|v| v.as_str()) {
            config.provider.p1_base_url = Some(v.to_string());
        }
    }

    if let Some(fallback) = table.get("fallback").and_then(|v| v.as_table()) {
        if let Some(v) = fallback.get("enabled").and_then(|v| v.as_bool()) {
            config.fallback.enabled = v;
        }
        if let Some(v) = fallback.get("max_retries").and_then(|v| v.as_integer()) {
            config.fallback.max_retries = v as u32;
        }
        if let Some(v) = fallback.get("retry_delay_ms").and_then(|v| v.as_integer()) {
            config.fallback.retry_delay_ms = v as u64;
        }
        if let Some(triggers) = fallback.get("triggers").and_then(|v| v.as_table()) {
            if let Some(v) = triggers.get("timeout").and_then(|v| v.as_bool()) {
                config.fallback.triggers.timeout = v;
            }
            if let Some(v) = triggers.get("rate_limit").and_then(|v| v.as_bool()) {
                config.fallback.triggers.rate_limit = v;
            }
            if let Some(v) = triggers.get("template_error").and_then(|v| v.as_bool()) {
                config.fallback.triggers.template_error = v;
            }
            if let Some(v) = triggers.get("server_error").and_then(|v| v.as_bool()) {
                config.fallback.triggers.server_error = v;
            }
        }
    }

    if let Some(polling) = table.get("polling").and_then(|v| v.as_table()) {
        if let Some(v) = polling.get("interval_ms").and_then(|v| v.as_integer()) {
            config.polling.interval_ms = v as u64;
        }
    }

    if let Some(webhook) = table.get("webhook").and_then(|v| v.as_table()) {
        if let Some(v) = webhook.get("url").and_then(|v| v.as_str()) {
            config.webhook.url = Some(v.to_string());
        }
        if let Some(v) = webhook.get("timeout_ms").and_then(|v| v.as_integer()) {
            config.webhook.timeout_ms = v as u64;
        }
        if let Some(v) = webhook.get("verify_token").and_then(|v| v.as_str()) {
            config.webhook.verify_token = Some(v.to_string());
        }
    }

    if let Some(backend) = table.get("backend").and_then(|v| v.as_table()) {
        if let Some(v) = backend.get("url").and_then(|v| v.as_str()) {
            config.backend.url = Some(v.to_string());
        }
        if let Some(v) = backend.get("key").and_then(|v| v.as_str()) {
            config.backend.key = Some(v.to_string());
        }
    }

    Ok(config)
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut GatewayConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("GATEWAY_AUTH_ROOT") {
        config.paths.auth_root = expand_path(&v);
        sources.env_overrides.push("GATEWAY_AUTH_ROOT".to_string());
    }
    if let Ok(v) = env::var("GATEWAY_QUEUE_FILE") {
        config.paths.queue_file = expand_path(&v);
        sources.env_overrides.push("GATEWAY_QUEUE_FILE".to_string());
    }
    if let Ok(v) = env::var("GATEWAY_HTTP_PORT") {
        if let Ok(port) = v.parse() {
            config.bind.http_port = port;
            sources.env_overrides.push("GATEWAY_HTTP_PORT".to_string());
        }
    }
    if let Ok(v) = env::var("GATEWAY_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = v;
        sources.env_overrides.push("GATEWAY_OTLP_ENDPOINT".to_string());
    }
    if let Ok(v) = env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = v;
        sources.env_overrides.push("OTEL_EXPORTER_OTLP_ENDPOINT".to_string());
    }
    if let Ok(v) = env::var("GATEWAY_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("GATEWAY_LOG_LEVEL".to_string());
    }
    if let Ok(v) = env::var("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
    if let Ok(v) = env::var("GATEWAY_PRIMARY_PROVIDER") {
        config.provider.primary = match v.as_str() {
            "p2" => PrimaryProvider::P2,
            _ => PrimaryProvider::P1,
        };
        sources.env_overrides.push("GATEWAY_PRIMARY_PROVIDER".to_string());
    }
    if let Ok(v) = env::var("GATEWAY_P1_CREDENTIALS") {
        config.provider.p1_credentials = Some(v);
        sources.env_overrides.push("GATEWAY_P1_CREDENTIALS".to_string());
    }
    if let Ok(v) = env::var("GATEWAY_P1_BASE_URL") {
        config.provider.p1_base_url = Some(v);
        sources.env_overrides.push("GATEWAY_P1_BASE_URL".to_string());
    }
    if let Ok(v) = env::var("GATEWAY_WEBHOOK_URL") {
        config.webhook.url = Some(v);
        sources.env_overrides.push("GATEWAY_WEBHOOK_URL".to_string());
    }
    if let Ok(v) = env::var("GATEWAY_WEBHOOK_VERIFY_TOKEN") {
        config.webhook.verify_token = Some(v);
        sources.env_overrides.push("GATEWAY_WEBHOOK_VERIFY_TOKEN".to_string());
    }
    if let Ok(v) = env::var("GATEWAY_BACKEND_URL") {
        config.backend.url = Some(v);
        sources.env_overrides.push("GATEWAY_BACKEND_URL".to_string());
    }
    if let Ok(v) = env::var("GATEWAY_BACKEND_KEY") {
        config.backend.key = Some(v);
        sources.env_overrides.push("GATEWAY_BACKEND_KEY".to_string());
    }
}

/// Expand `~` and `$VAR` prefixes in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
        return PathBuf::from(path);
    }

    if let Some(stripped) = path.strip_prefix('$') {
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            if let Ok(var_value) = env::var(var_name) {
                return PathBuf::from(var_value).join(&stripped[slash_pos + 1..]);
            }
            return PathBuf::from(path);
        }
        return env::var(stripped)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(path));
    }

    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn expand_path_absolute() {
        let expanded = expand_path("/absolute/path");
        assert_eq!(expanded, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn discover_config_files_does_not_panic() {
        let _files = discover_config_files();
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
[webhook]
url = "https://example.com/webhook"
"#;
        let config = parse_toml(toml, Path::new("test.toml"), GatewayConfig::default()).unwrap();
        assert_eq!(config.webhook.url.as_deref(), Some("https://example.com/webhook"));
        assert_eq!(config.bind.http_port, 8080);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[bind]
http_port = 9000

[provider]
primary = "p2"
p1_enabled = false

[fallback]
max_retries = 5

[fallback.triggers]
server_error = false

[polling]
interval_ms = 2000

[webhook]
url = "https://example.com/hook"
timeout_ms = 20000

[backend]
url = "https://backend.example.com"
key = "secret"
"#;
        let config = parse_toml(toml, Path::new("test.toml"), GatewayConfig::default()).unwrap();
        assert_eq!(config.bind.http_port, 9000);
        assert_eq!(config.provider.primary, PrimaryProvider::P2);
        assert!(!config.provider.p1_enabled);
        assert_eq!(config.fallback.max_retries, 5);
        assert!(!config.fallback.triggers.server_error);
        assert!(config.fallback.triggers.timeout);
        assert_eq!(config.polling.interval_ms, 2000);
        assert_eq!(config.webhook.timeout_ms, 20000);
        assert_eq!(config.backend.key.as_deref(), Some("secret"));
    }
}
