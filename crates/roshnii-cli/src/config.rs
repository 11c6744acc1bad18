use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::credentials;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProfileConfig {
    pub server: Option<String>,
    pub format: Option<String>,
}

pub type ConfigFile = HashMap<String, ProfileConfig>;

/// `~/.roshnii`, created on first use.
pub fn state_dir() -> Result<PathBuf> {
    let dir = dirs::home_dir()
        .context("Cannot determine home directory")?
        .join(".roshnii");
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn config_path(dir: &Path) -> PathBuf {
    dir.join("config.toml")
}

pub fn load_all(dir: &Path) -> Result<ConfigFile> {
    let path = config_path(dir);
    if !path.exists() {
        return Ok(ConfigFile::new());
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let cfg: ConfigFile =
        toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))?;
    Ok(cfg)
}

pub fn load_profile(dir: &Path, profile: &str) -> Result<ProfileConfig> {
    Ok(load_all(dir)?.remove(profile).unwrap_or_default())
}

pub fn save_profile(dir: &Path, profile: &str, config: &ProfileConfig) -> Result<()> {
    let mut all = load_all(dir)?;
    all.insert(profile.to_string(), config.clone());
    let content = toml::to_string_pretty(&all)?;
    fs::write(config_path(dir), content)?;
    Ok(())
}

/// Server URL for this invocation: `--server`/`ROSHNII_URL`, then the
/// profile, then the server the stored session was opened against.
/// `None` leaves the client settings' `api.base_url` in charge.
pub fn resolve_server(
    dir: &Path,
    cli_server: Option<&str>,
    profile: &str,
) -> Result<Option<String>> {
    if let Some(s) = cli_server {
        return Ok(Some(s.to_string()));
    }
    if let Some(s) = load_profile(dir, profile)?.server {
        return Ok(Some(s));
    }
    if let Ok(Some(stored)) = credentials::load_session(dir, profile) {
        return Ok(Some(stored.server));
    }
    Ok(None)
}

/// API base for a server URL: the service mounts its API under `/api`.
pub fn api_base(server: &str) -> String {
    let trimmed = server.trim_end_matches('/');
    if trimmed.ends_with("/api") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/api")
    }
}
