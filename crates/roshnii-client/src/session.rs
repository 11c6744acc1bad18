//! Session state machine.
//!
//! ```text
//! Loading ──/me ok──► Authenticated(user)
//!    │                     │
//!    └──auth failure──► Unauthenticated ◄──logout / AuthError / SessionExpired
//!                          │
//!                          └──login attempt──► Loading
//! ```
//!
//! Terminal session events published on the broadcaster (by the refresh
//! coordinator or anyone else) are consumed by a background listener that
//! clears the cache and every held credential.

use std::sync::Arc;

use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use url::Url;

use roshnii_core::{
    DevLoginRequest, DevLoginResponse, LoginUrlResponse, SessionEvent, SessionEventBroadcaster,
    User,
};

use crate::cache::{CacheKey, CacheStore, CacheValue};
use crate::error::{ApiError, Result};
use crate::http::{ApiRequest, ResponseKind, Transport};
use crate::refresh::RefreshCoordinator;

pub const LOGIN_URL_PATH: &str = "/auth/google/login";
pub const LOGOUT_PATH: &str = "/auth/google/logout";
pub const DEV_LOGIN_PATH: &str = "/auth/dev/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Current user lookup in flight
    Loading,
    Authenticated(User),
    Unauthenticated,
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Loading => "loading",
            SessionState::Authenticated(_) => "authenticated",
            SessionState::Unauthenticated => "unauthenticated",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Authenticated(user) => write!(f, "authenticated as {}", user.email),
            other => f.write_str(other.as_str()),
        }
    }
}

/// State shared with the event listener task.
struct SessionCore {
    cache: CacheStore,
    transport: Arc<dyn Transport>,
    state: watch::Sender<SessionState>,
    /// Terminal events older than the latest login attempt are ignored.
    attempt_started: Mutex<OffsetDateTime>,
}

impl SessionCore {
    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        let current = self.state.borrow();
        if previous != *current {
            tracing::info!(from = previous.as_str(), to = current.as_str(), "session state changed");
        }
    }

    /// Ends the session locally: cache emptied, user known absent,
    /// credentials dropped.
    fn terminate(&self, reason: &str) {
        self.cache.clear();
        self.cache.write(&CacheKey::CurrentUser, CacheValue::User(None));
        self.transport.clear_session();
        tracing::warn!(%reason, "session terminated");
        self.set_state(SessionState::Unauthenticated);
    }

    fn handle_event(&self, event: &SessionEvent) {
        if !event.kind.is_terminal() {
            return;
        }
        if event.timestamp < *self.attempt_started.lock() {
            tracing::debug!(kind = %event.kind, "ignoring terminal event from a previous session");
            return;
        }
        let reason = event.reason.as_deref().unwrap_or(event.kind.as_str());
        self.terminate(reason);
    }
}

pub struct Session {
    core: Arc<SessionCore>,
    coordinator: RefreshCoordinator,
    events: SessionEventBroadcaster,
    listener: AbortHandle,
}

impl Session {
    /// Starts in `Loading` and spawns the session event listener, so it must
    /// be created inside a Tokio runtime.
    pub fn new(
        coordinator: RefreshCoordinator,
        cache: CacheStore,
        events: SessionEventBroadcaster,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        let core = Arc::new(SessionCore {
            cache,
            transport: coordinator.transport().clone(),
            state,
            attempt_started: Mutex::new(OffsetDateTime::UNIX_EPOCH),
        });

        let mut rx = events.subscribe();
        let listener_core = core.clone();
        let listener = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => listener_core.handle_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "session listener lagged behind events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
        .abort_handle();

        Self {
            core,
            coordinator,
            events,
            listener,
        }
    }

    pub fn state(&self) -> SessionState {
        self.core.state.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.core.state.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.core.state.borrow().user().cloned()
    }

    /// Resolves the current user through the cache and settles the state.
    ///
    /// Auth failures end the session. Any other failure (network, server)
    /// leaves the client `Unauthenticated` but keeps its credentials, so a
    /// later `load` can still succeed.
    pub async fn load(&self) -> Result<SessionState> {
        self.core.set_state(SessionState::Loading);
        match self
            .core
            .cache
            .read_as::<Option<User>>(&CacheKey::CurrentUser)
            .await
        {
            Ok(Some(user)) => {
                self.core.set_state(SessionState::Authenticated(user));
                Ok(self.state())
            }
            Ok(None) => {
                self.core.set_state(SessionState::Unauthenticated);
                Ok(self.state())
            }
            Err(err) => {
                if err.is_auth_failure() {
                    self.core.terminate(&err.to_string());
                } else {
                    tracing::warn!(error = %err, "current user lookup failed");
                    self.core.set_state(SessionState::Unauthenticated);
                }
                Err(err)
            }
        }
    }

    /// URL of the provider's consent page. Navigating there is up to the
    /// caller; the session cookies it yields go to [`login_with_cookies`].
    ///
    /// [`login_with_cookies`]: Self::login_with_cookies
    pub async fn begin_oauth_login(&self) -> Result<Url> {
        let response: LoginUrlResponse = self
            .core
            .transport
            .send(&ApiRequest::get(LOGIN_URL_PATH).public())
            .await?
            .into_json()?;
        if response.auth_url.trim().is_empty() {
            return Err(ApiError::decode("login response has no auth_url"));
        }
        Url::parse(&response.auth_url)
            .map_err(|e| ApiError::decode(format!("invalid auth_url: {e}")))
    }

    /// Development login: exchanges an email and name for a raw token.
    pub async fn dev_login(&self, email: &str, name: &str) -> Result<User> {
        self.begin_attempt();
        let request = ApiRequest::post(DEV_LOGIN_PATH)
            .json(&DevLoginRequest {
                email: email.to_string(),
                name: name.to_string(),
            })?
            .public();
        let response = match self.core.transport.send(&request).await {
            Ok(body) => body.into_json::<DevLoginResponse>(),
            Err(err) => Err(err),
        };
        match response {
            Ok(login) => {
                tracing::debug!(user_id = %login.user_id, "development login accepted");
                self.core.transport.install_token(&login.token);
                self.finish_attempt().await
            }
            Err(err) => {
                self.core.set_state(SessionState::Unauthenticated);
                Err(err)
            }
        }
    }

    /// Adopts session cookies obtained elsewhere (`auth_token=...; refresh_token=...`).
    pub async fn login_with_cookies(&self, header: &str) -> Result<User> {
        self.begin_attempt();
        self.core.transport.import_cookies(header);
        self.finish_attempt().await
    }

    /// Adopts a raw session token.
    pub async fn login_with_token(&self, token: &str) -> Result<User> {
        self.begin_attempt();
        self.core.transport.install_token(token);
        self.finish_attempt().await
    }

    /// Ends the session.
    ///
    /// The cache and the refresh coordinator are reset before the logout
    /// request is sent, so nothing issued meanwhile can renew the session.
    /// The local session is over even when the server call fails; the error
    /// is still returned for reporting.
    pub async fn logout(&self) -> Result<()> {
        self.coordinator.reset();
        self.core.cache.clear();
        self.core
            .cache
            .write(&CacheKey::CurrentUser, CacheValue::User(None));
        self.core.set_state(SessionState::Unauthenticated);

        let result = self
            .core
            .transport
            .send(&ApiRequest::post(LOGOUT_PATH).expect(ResponseKind::Empty))
            .await;

        self.core.transport.clear_session();
        self.events.send(SessionEvent::logged_out());
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "server logout failed, session ended locally");
                Err(err)
            }
        }
    }

    /// Ends the session after an auth failure observed by the caller.
    pub fn terminate(&self, reason: &str) {
        self.core.terminate(reason);
    }

    fn begin_attempt(&self) {
        *self.core.attempt_started.lock() = OffsetDateTime::now_utc();
        self.coordinator.rearm();
        self.core.cache.clear();
        self.core.set_state(SessionState::Loading);
    }

    async fn finish_attempt(&self) -> Result<User> {
        match self.load().await? {
            SessionState::Authenticated(user) => {
                self.events.send(SessionEvent::logged_in());
                Ok(user)
            }
            _ => Err(ApiError::Unauthorized {
                message: "login did not establish a session".into(),
            }),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("refresh", &self.coordinator.state())
            .finish()
    }
}
