//! Single-flight session renewal.
//!
//! ```text
//! Idle ──AuthExpired──► Refreshing ──renewed──► Idle   (queue replayed FIFO)
//!                            │
//!                            └──renewal failed──► Failed (queue rejected,
//!                                                 SessionExpired broadcast)
//! Failed ──rearm() on login──► Idle
//! ```
//!
//! `reset()` on logout also returns to `Idle` but leaves the coordinator
//! closed: no renewal starts until the next `rearm()`, so a request that
//! expires while the logout call is still in flight cannot revive the
//! session.
//!
//! The state and queue live behind one lock and are only touched by the
//! transitions in this module. The renewal itself and the replay of queued
//! requests run in a spawned task so that a cancelled caller can never leave
//! the coordinator stuck in `Refreshing`.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use roshnii_core::{SessionEvent, SessionEventBroadcaster};

use crate::error::{ApiError, Result};
use crate::http::{ApiRequest, ResponseBody, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
    Failed,
}

impl RefreshState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshState::Idle => "idle",
            RefreshState::Refreshing => "refreshing",
            RefreshState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RefreshState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request parked until the in-flight renewal settles.
struct Waiter {
    request: ApiRequest,
    reply: oneshot::Sender<Result<ResponseBody>>,
}

struct Inner {
    state: RefreshState,
    queue: VecDeque<Waiter>,
    /// Bumped by `reset()`; a renewal started under an older epoch is void.
    epoch: u64,
    /// Set by `reset()`, cleared by `rearm()`.
    closed: bool,
    renewals: u64,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    events: SessionEventBroadcaster,
    inner: Arc<Mutex<Inner>>,
}

impl RefreshCoordinator {
    pub fn new(transport: Arc<dyn Transport>, events: SessionEventBroadcaster) -> Self {
        Self {
            transport,
            events,
            inner: Arc::new(Mutex::new(Inner {
                state: RefreshState::Idle,
                queue: VecDeque::new(),
                epoch: 0,
                closed: false,
                renewals: 0,
            })),
        }
    }

    pub fn state(&self) -> RefreshState {
        self.inner.lock().state
    }

    /// Number of requests parked behind the current renewal.
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Renewal calls issued since construction.
    pub fn renewal_count(&self) -> u64 {
        self.inner.lock().renewals
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Send `request`, recovering transparently from an expired session.
    ///
    /// A request is replayed at most once after a renewal. A non-expired 401
    /// never triggers renewal: it is broadcast as an auth error and returned.
    pub async fn guard(&self, request: &ApiRequest) -> Result<ResponseBody> {
        match self.transport.send(request).await {
            Err(ApiError::AuthExpired) => self.recover(request).await,
            other => self.surface(other),
        }
    }

    /// Logout: back to `Idle`, rejecting anything still queued.
    ///
    /// A renewal already in flight is voided and cannot revive the session.
    pub fn reset(&self) {
        let waiters = {
            let mut inner = self.inner.lock();
            inner.epoch += 1;
            inner.closed = true;
            inner.state = RefreshState::Idle;
            std::mem::take(&mut inner.queue)
        };
        if !waiters.is_empty() {
            tracing::info!(rejected = waiters.len(), "refresh queue rejected by logout");
        }
        for waiter in waiters {
            let _ = waiter.reply.send(Err(ApiError::SessionExpired));
        }
    }

    /// Login: leave `Failed` or a logout so expired sessions can be renewed
    /// again.
    pub fn rearm(&self) {
        let mut inner = self.inner.lock();
        inner.closed = false;
        if inner.state == RefreshState::Failed {
            inner.state = RefreshState::Idle;
            tracing::debug!("refresh coordinator re-armed");
        }
    }

    fn surface(&self, result: Result<ResponseBody>) -> Result<ResponseBody> {
        if let Err(ApiError::Unauthorized { message }) = &result {
            tracing::warn!(%message, "credentials rejected, forcing logout");
            self.events.send(SessionEvent::auth_error(message.clone()));
        }
        result
    }

    async fn recover(&self, request: &ApiRequest) -> Result<ResponseBody> {
        let (reply, rx) = oneshot::channel();
        let waiter = Waiter {
            request: request.clone(),
            reply,
        };

        let start_epoch = {
            let mut inner = self.inner.lock();
            match inner.state {
                RefreshState::Failed => return Err(ApiError::SessionExpired),
                _ if inner.closed => {
                    tracing::debug!(path = %request.path, "expired token after logout, not renewing");
                    return Err(ApiError::SessionExpired);
                }
                _ if !self.transport.has_session() => {
                    tracing::debug!(path = %request.path, "expired token without a session, not renewing");
                    self.events
                        .send(SessionEvent::session_expired("no credentials to renew"));
                    return Err(ApiError::SessionExpired);
                }
                RefreshState::Refreshing => {
                    inner.queue.push_back(waiter);
                    tracing::debug!(path = %request.path, queued = inner.queue.len(), "joined pending refresh");
                    None
                }
                RefreshState::Idle => {
                    inner.state = RefreshState::Refreshing;
                    inner.renewals += 1;
                    inner.queue.push_back(waiter);
                    Some(inner.epoch)
                }
            }
        };

        if let Some(epoch) = start_epoch {
            tracing::info!(path = %request.path, "session expired, renewing");
            tokio::spawn(self.clone().run_refresh(epoch));
        }

        rx.await.unwrap_or(Err(ApiError::SessionExpired))
    }

    async fn run_refresh(self, epoch: u64) {
        let outcome = self.transport.renew().await;

        let waiters = {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                drop(inner);
                if outcome.is_ok() {
                    // Logged out while renewing: drop whatever the renewal set.
                    self.transport.clear_session();
                }
                return;
            }
            inner.state = if outcome.is_ok() {
                RefreshState::Idle
            } else {
                RefreshState::Failed
            };
            std::mem::take(&mut inner.queue)
        };

        match outcome {
            Ok(()) => {
                tracing::info!(replaying = waiters.len(), "session renewed");
                self.events.send(SessionEvent::token_refreshed());
                self.replay(waiters).await;
            }
            Err(err) => {
                tracing::warn!(error = %err, rejected = waiters.len(), "session renewal failed");
                for waiter in waiters {
                    let _ = waiter.reply.send(Err(ApiError::SessionExpired));
                }
                self.events
                    .send(SessionEvent::session_expired(format!("renewal failed: {err}")));
            }
        }
    }

    /// Replays each parked request exactly once, in the order it was parked.
    async fn replay(&self, waiters: VecDeque<Waiter>) {
        let mut expired_again = false;
        for waiter in waiters {
            if waiter.reply.is_closed() {
                continue;
            }
            let result = match self.transport.send(&waiter.request).await {
                Err(ApiError::AuthExpired) => {
                    expired_again = true;
                    Err(ApiError::SessionExpired)
                }
                other => self.surface(other),
            };
            let _ = waiter.reply.send(result);
        }
        if expired_again {
            self.events.send(SessionEvent::session_expired(
                "request still expired after renewal",
            ));
        }
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("RefreshCoordinator")
            .field("state", &inner.state)
            .field("queued", &inner.queue.len())
            .field("renewals", &inner.renewals)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transport shared by the unit tests of this crate.

    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use crate::error::{ApiError, Result};
    use crate::http::{ApiRequest, ResponseBody, Transport};

    /// Answers each path from a per-path script, falling back to a JSON echo
    /// of the path once the script runs dry.
    pub struct ScriptedTransport {
        scripts: Mutex<HashMap<String, VecDeque<Result<ResponseBody>>>>,
        renewals: Mutex<VecDeque<Result<()>>>,
        renew_delay: Duration,
        send_delay: Duration,
        pub sent: Mutex<Vec<String>>,
        pub renew_calls: AtomicUsize,
        session: AtomicBool,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
                renewals: Mutex::new(VecDeque::new()),
                renew_delay: Duration::from_millis(20),
                send_delay: Duration::ZERO,
                sent: Mutex::new(Vec::new()),
                renew_calls: AtomicUsize::new(0),
                session: AtomicBool::new(true),
            }
        }

        pub fn with_send_delay(mut self, delay: Duration) -> Self {
            self.send_delay = delay;
            self
        }

        pub fn script(&self, path: &str, result: Result<ResponseBody>) {
            self.scripts
                .lock()
                .entry(path.to_string())
                .or_default()
                .push_back(result);
        }

        pub fn script_renewal(&self, result: Result<()>) {
            self.renewals.lock().push_back(result);
        }

        pub fn set_session(&self, present: bool) {
            self.session.store(present, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().clone()
        }

        pub fn sent_count(&self, path: &str) -> usize {
            self.sent.lock().iter().filter(|p| *p == path).count()
        }

        pub fn renew_count(&self) -> usize {
            self.renew_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &ApiRequest) -> Result<ResponseBody> {
            self.sent.lock().push(request.path.clone());
            if !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            let scripted = self
                .scripts
                .lock()
                .get_mut(&request.path)
                .and_then(VecDeque::pop_front);
            scripted.unwrap_or_else(|| Ok(ResponseBody::Json(json!({ "path": request.path }))))
        }

        async fn renew(&self) -> Result<()> {
            self.renew_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.renew_delay).await;
            self.renewals.lock().pop_front().unwrap_or(Ok(()))
        }

        fn has_session(&self) -> bool {
            self.session.load(Ordering::SeqCst)
        }

        fn clear_session(&self) {
            self.session.store(false, Ordering::SeqCst);
        }

        fn install_token(&self, _token: &str) {
            self.session.store(true, Ordering::SeqCst);
        }

        fn import_cookies(&self, header: &str) {
            if header.contains('=') {
                self.session.store(true, Ordering::SeqCst);
            }
        }
    }

    pub fn expired() -> Result<ResponseBody> {
        Err(ApiError::AuthExpired)
    }
}
