use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Configuration pointing at `base_url`, defaults elsewhere.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        let mut cfg = Self::default();
        cfg.api.base_url = base_url.into();
        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        Url::parse(&self.api.base_url)
            .map_err(|e| format!("api.base_url is not a valid URL: {e}"))?;
        if let Some(health) = &self.api.health_url {
            Url::parse(health).map_err(|e| format!("api.health_url is not a valid URL: {e}"))?;
        }
        if self.api.request_timeout_ms == 0 {
            return Err("api.request_timeout_ms must be > 0".into());
        }
        if self.cache.stale_time_ms == 0 {
            return Err("cache.stale_time_ms must be > 0".into());
        }
        if self.events.capacity == 0 {
            return Err("events.capacity must be > 0".into());
        }
        if self.auth.expired_token_marker.trim().is_empty() {
            return Err("auth.expired_token_marker must not be empty".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

/// How session credentials are attached to authenticated requests.
/// Chosen once at startup, never per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialPolicy {
    /// Session cookies set by the server (`auth_token`, `refresh_token`)
    #[default]
    Cookie,
    /// `Authorization: Bearer <token>` using a raw development token
    Bearer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RefreshMethod {
    Get,
    #[default]
    Post,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Health endpoint; derived from `base_url` when unset
    #[serde(default)]
    pub health_url: Option<String>,
    #[serde(default)]
    pub credentials: CredentialPolicy,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Raw token for development logins
    #[serde(default)]
    pub dev_token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".into()
}
fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            health_url: None,
            credentials: CredentialPolicy::default(),
            request_timeout_ms: default_request_timeout_ms(),
            dev_token: None,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// `health_url` if set, else the base URL with its `/api` suffix replaced by `/health`.
    pub fn resolved_health_url(&self) -> String {
        if let Some(url) = &self.health_url {
            return url.clone();
        }
        let base = self.base_url.trim_end_matches('/');
        let root = base.strip_suffix("/api").unwrap_or(base);
        format!("{root}/health")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Substring of a 401 message that means "renew", not "log out"
    #[serde(default = "default_expired_token_marker")]
    pub expired_token_marker: String,
    #[serde(default)]
    pub refresh_method: RefreshMethod,
}

fn default_expired_token_marker() -> String {
    "expired token".into()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            expired_token_marker: default_expired_token_marker(),
            refresh_method: RefreshMethod::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a fetched entry is served without a network call
    #[serde(default = "default_stale_time_ms")]
    pub stale_time_ms: u64,
}

fn default_stale_time_ms() -> u64 {
    5 * 60 * 1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: default_stale_time_ms(),
        }
    }
}

impl CacheConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_events_capacity")]
    pub capacity: usize,
}

fn default_events_capacity() -> usize {
    roshnii_core::events::broadcaster::DEFAULT_BUFFER_SIZE
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_events_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "warn".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::ClientConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_CONFIG_FILE: &str = "roshnii.toml";

    /// Loads `path` (or `roshnii.toml` when present) and applies
    /// `ROSHNII__SECTION__KEY` environment overrides on top.
    pub fn load_config(path: Option<&str>) -> Result<ClientConfig, String> {
        let mut builder = Config::builder();
        let file = path
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        } else if let Some(p) = path {
            return Err(format!("config file not found: {p}"));
        }
        // e.g. ROSHNII__API__BASE_URL=https://photos.example.com/api
        builder = builder.add_source(
            Environment::with_prefix("ROSHNII")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: ClientConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = ClientConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.api.credentials, CredentialPolicy::Cookie);
        assert_eq!(cfg.cache.stale_time(), Duration::from_secs(300));
        assert_eq!(cfg.auth.expired_token_marker, "expired token");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = ClientConfig::for_base_url("not a url");
        assert!(cfg.validate().is_err());

        cfg = ClientConfig::default();
        cfg.cache.stale_time_ms = 0;
        assert!(cfg.validate().is_err());

        cfg = ClientConfig::default();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_health_url_derivation() {
        let api = ApiConfig {
            base_url: "http://localhost:8080/api/".into(),
            ..ApiConfig::default()
        };
        assert_eq!(api.resolved_health_url(), "http://localhost:8080/health");

        let api = ApiConfig {
            health_url: Some("http://status.local/ping".into()),
            ..ApiConfig::default()
        };
        assert_eq!(api.resolved_health_url(), "http://status.local/ping");
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[api]
base_url = "https://photos.example.com/api"
credentials = "bearer"

[cache]
stale_time_ms = 1000
"#
        )
        .unwrap();

        let cfg = loader::load_config(file.path().to_str()).unwrap();
        assert_eq!(cfg.api.base_url, "https://photos.example.com/api");
        assert_eq!(cfg.api.credentials, CredentialPolicy::Bearer);
        assert_eq!(cfg.cache.stale_time_ms, 1000);
        assert_eq!(cfg.auth.refresh_method, RefreshMethod::Post);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        assert!(loader::load_config(Some("/nonexistent/roshnii.toml")).is_err());
    }
}
