pub mod albums;
pub mod auth;
pub mod images;
pub mod server;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use roshnii_client::config::loader;
use roshnii_client::{ClientConfig, CredentialPolicy, PhotoClient, Transport};
use tracing::debug;

use crate::cli::OutputFormat;
use crate::config::{self, api_base};
use crate::credentials::{self, StoredSession};

/// Everything a command needs: the client for the resolved server with
/// the profile's stored session restored into it.
pub struct Context {
    pub client: PhotoClient,
    pub server: String,
    pub profile: String,
    pub format: OutputFormat,
    dir: PathBuf,
    restored: Option<StoredSession>,
}

/// Client settings from `--config` (or `./roshnii.toml`) and `ROSHNII__*`.
pub fn load_settings(path: Option<&str>) -> Result<ClientConfig> {
    loader::load_config(path)
        .map_err(anyhow::Error::msg)
        .context("Invalid client settings")
}

impl Context {
    pub fn open(
        dir: PathBuf,
        mut settings: ClientConfig,
        cli_server: Option<&str>,
        profile: &str,
        format: OutputFormat,
    ) -> Result<Self> {
        let server = match config::resolve_server(&dir, cli_server, profile)? {
            Some(server) => server,
            None => settings
                .api
                .base_url
                .trim_end_matches('/')
                .trim_end_matches("/api")
                .to_string(),
        };
        settings.api.base_url = api_base(&server);
        settings
            .validate()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("Invalid server URL: {server}"))?;

        let client = PhotoClient::new(settings).context("Failed to create client")?;
        let restored = credentials::load_session(&dir, profile)?
            .filter(|stored| stored.server == server);
        if let (Some(stored), Some(http)) = (&restored, client.http()) {
            debug!(profile, server = %server, "restoring stored session");
            if let Some(token) = &stored.token {
                http.install_token(token);
            }
            if let Some(cookies) = &stored.cookies {
                http.import_cookies(cookies);
            }
        }

        Ok(Self {
            client,
            server,
            profile: profile.to_string(),
            format,
            dir,
            restored,
        })
    }

    pub fn has_stored_session(&self) -> bool {
        self.restored.is_some()
    }

    pub fn stored_session(&self) -> Option<&StoredSession> {
        self.restored.as_ref()
    }

    /// Writes the client's current credentials back to the profile's
    /// session file, or removes the file once the client holds none.
    pub fn persist(&self) -> Result<()> {
        let token = match self.client.config().api.credentials {
            CredentialPolicy::Bearer => self.client.dev_token(),
            CredentialPolicy::Cookie => None,
        };
        let current = StoredSession::new(self.server.clone(), self.client.export_cookies(), token);
        if current.is_empty() {
            if self.restored.is_some() {
                credentials::remove_session(&self.dir, &self.profile)?;
            }
        } else if self.restored.as_ref() != Some(&current) {
            credentials::save_session(&self.dir, &self.profile, &current)?;
        }
        Ok(())
    }

    /// Drops the profile's stored session regardless of client state.
    pub fn forget(&self) -> Result<bool> {
        credentials::remove_session(&self.dir, &self.profile)
    }
}
