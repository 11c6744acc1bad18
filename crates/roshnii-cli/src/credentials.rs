use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Session credentials persisted between invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub server: String,
    /// `Cookie` header exported from the client's jar
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
    /// Raw token, kept for the bearer credential policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl StoredSession {
    pub fn new(server: impl Into<String>, cookies: Option<String>, token: Option<String>) -> Self {
        Self {
            server: server.into(),
            cookies,
            token,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_none() && self.token.is_none()
    }

    /// Short form of the stored secret for display.
    pub fn preview(&self) -> String {
        let secret = self
            .token
            .as_deref()
            .or(self.cookies.as_deref())
            .unwrap_or_default();
        if secret.chars().count() > 20 {
            let head: String = secret.chars().take(8).collect();
            let tail: String = secret
                .chars()
                .rev()
                .take(8)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("{head}...{tail}")
        } else {
            secret.to_string()
        }
    }
}

fn session_path(dir: &Path, profile: &str) -> PathBuf {
    dir.join(format!("session.{profile}.json"))
}

pub fn load_session(dir: &Path, profile: &str) -> Result<Option<StoredSession>> {
    let path = session_path(dir, profile);
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&path)?;
    let stored: StoredSession = serde_json::from_str(&content)
        .with_context(|| format!("Corrupt session file {}", path.display()))?;
    Ok(Some(stored))
}

pub fn save_session(dir: &Path, profile: &str, session: &StoredSession) -> Result<()> {
    let content = serde_json::to_string_pretty(session)?;
    fs::write(session_path(dir, profile), content)?;
    Ok(())
}

pub fn remove_session(dir: &Path, profile: &str) -> Result<bool> {
    let path = session_path(dir, profile);
    if path.exists() {
        fs::remove_file(path)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_session(dir.path(), "default").unwrap().is_none());

        let stored = StoredSession::new(
            "http://localhost:8080",
            Some("auth_token=a; refresh_token=r".into()),
            None,
        );
        save_session(dir.path(), "default", &stored).unwrap();
        assert_eq!(load_session(dir.path(), "default").unwrap(), Some(stored));
        assert!(load_session(dir.path(), "other").unwrap().is_none());

        assert!(remove_session(dir.path(), "default").unwrap());
        assert!(!remove_session(dir.path(), "default").unwrap());
    }

    #[test]
    fn test_token_only_file_omits_cookies() {
        let dir = tempfile::tempdir().unwrap();
        let stored = StoredSession::new("http://x", None, Some("tok".into()));
        save_session(dir.path(), "dev", &stored).unwrap();

        let raw = fs::read_to_string(dir.path().join("session.dev.json")).unwrap();
        assert!(!raw.contains("cookies"));
        assert!(!stored.is_empty());
    }

    #[test]
    fn test_preview_shortens_long_secrets() {
        let stored = StoredSession::new("http://x", None, Some("abcdefgh0123456789ZYXWVUTS".into()));
        assert_eq!(stored.preview(), "abcdefgh...ZYXWVUTS");
        let short = StoredSession::new("http://x", None, Some("tok".into()));
        assert_eq!(short.preview(), "tok");
    }
}
