//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.beacon/config.json`) and environment.
//! Secrets can live in either; environment variables win.

use anyhow::{Context, Result};
use rand::distributions::{Alphanumeric, DistString};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::security;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Webhook gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Chat platform connection.
    #[serde(default)]
    pub slack: SlackConfig,

    /// Monitoring API poller. Disabled unless both key and app id are set.
    #[serde(default)]
    pub new_relic: NewRelicConfig,

    /// Security status feed.
    #[serde(default)]
    pub security: SecurityConfig,
}

/// Gateway bind, port, and relay token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Token required on `/message`. Overridden by BEACON_AUTH_TOKEN env. Random when unset.
    pub auth_token: Option<String>,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlackConfig {
    /// Bot token. Overridden by SLACK_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRelicConfig {
    /// API key. Overridden by NEW_RELIC_API_KEY env.
    pub api_key: Option<String>,
    /// Application id. Overridden by NEW_RELIC_APP_ID env.
    pub app_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    #[serde(default = "default_status_url")]
    pub status_url: String,
    /// Upper bound for one status fetch, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_status_url() -> String {
    security::DEFAULT_STATUS_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    security::DEFAULT_TIMEOUT_SECS
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            status_url: default_status_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Env var wins when non-empty; otherwise the trimmed config value, if non-empty.
fn env_or(var: &str, configured: Option<&String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            configured
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the Slack bot token: env SLACK_BOT_TOKEN overrides config.
pub fn resolve_slack_token(config: &Config) -> Option<String> {
    env_or("SLACK_BOT_TOKEN", config.slack.bot_token.as_ref())
}

/// Resolve the relay token: env BEACON_AUTH_TOKEN overrides config.
pub fn resolve_auth_token(config: &Config) -> Option<String> {
    env_or("BEACON_AUTH_TOKEN", config.gateway.auth_token.as_ref())
}

/// Resolve monitoring credentials; `None` unless both key and app id are present.
pub fn resolve_new_relic(config: &Config) -> Option<(String, String)> {
    let key = env_or("NEW_RELIC_API_KEY", config.new_relic.api_key.as_ref())?;
    let app = env_or("NEW_RELIC_APP_ID", config.new_relic.app_id.as_ref())?;
    Some((key, app))
}

/// Random token for the relay endpoint when none is configured.
pub fn generate_auth_token() -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), 8)
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("BEACON_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".beacon").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, or the default path. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Write a default config file (and its directory) unless one already exists.
/// Returns true if a file was written.
pub fn init_config_file(path: &std::path::Path) -> Result<bool> {
    if path.exists() {
        log::debug!("config already exists at {}, skipping", path.display());
        return Ok(false);
    }
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
    }
    let body = serde_json::to_string_pretty(&Config::default())?;
    std::fs::write(path, body)
        .with_context(|| format!("writing default config to {}", path.display()))?;
    log::info!("created default config at {}", path.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.gateway.port, 8080);
        assert_eq!(c.gateway.bind, "0.0.0.0");
        assert_eq!(c.security.status_url, "https://istheinternetonfire.com/status.json");
        assert_eq!(c.security.timeout_secs, 10);
    }

    #[test]
    fn parses_camel_case_file() {
        let c: Config = serde_json::from_str(
            r#"{"gateway":{"port":9000,"authToken":"s3cret"},"newRelic":{"apiKey":"k","appId":"1"}}"#,
        )
        .unwrap();
        assert_eq!(c.gateway.port, 9000);
        assert_eq!(c.gateway.bind, "0.0.0.0");
        assert_eq!(c.gateway.auth_token.as_deref(), Some("s3cret"));
        assert_eq!(c.new_relic.app_id.as_deref(), Some("1"));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let blank = " ".to_string();
        assert_eq!(env_or("BEACON_TEST_UNSET_VAR", Some(&blank)), None);
        let set = " tok ".to_string();
        assert_eq!(env_or("BEACON_TEST_UNSET_VAR", Some(&set)).as_deref(), Some("tok"));
    }

    #[test]
    fn generated_token_is_eight_alphanumerics() {
        let t = generate_auth_token();
        assert_eq!(t.len(), 8);
        assert!(t.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn missing_file_loads_defaults() {
        let path = std::env::temp_dir().join(format!("beacon-missing-{}.json", uuid::Uuid::new_v4()));
        let (c, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(c.gateway.port, 8080);
    }

    #[test]
    fn init_writes_once() {
        let dir = std::env::temp_dir().join(format!("beacon-init-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        assert!(init_config_file(&path).unwrap());
        assert!(!init_config_file(&path).unwrap());
        let (c, _) = load_config(Some(path)).unwrap();
        assert_eq!(c.gateway.port, 8080);
        let _ = std::fs::remove_dir_all(dir);
    }
}
