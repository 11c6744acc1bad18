//! HTTP client core.
//!
//! Issues requests against the photo API, attaches session credentials
//! according to the startup [`CredentialPolicy`], and classifies responses
//! into success, `AuthExpired`, or a generic error. It never triggers a
//! session refresh itself; that is the [`RefreshCoordinator`]'s job.
//!
//! [`RefreshCoordinator`]: crate::refresh::RefreshCoordinator

use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{ACCEPT, SET_COOKIE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use roshnii_core::HealthStatus;

use crate::config::{ClientConfig, CredentialPolicy, RefreshMethod};
use crate::error::{ApiError, Result};

pub const REFRESH_PATH: &str = "/auth/google/refresh";
/// Cookie carrying the short-lived session token.
pub const AUTH_COOKIE: &str = "auth_token";

/// Shape the caller expects back from a successful response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Json,
    Binary,
    Empty,
}

/// A file sent as `multipart/form-data`.
///
/// Kept as raw bytes so the request can be rebuilt when it is replayed
/// after a session refresh.
#[derive(Debug, Clone)]
pub struct MultipartFile {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Arc<[u8]>,
}

impl MultipartFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            field: "file".to_string(),
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    fn to_form(&self) -> Result<reqwest::multipart::Form> {
        let part = reqwest::multipart::Part::bytes(self.bytes.to_vec())
            .file_name(self.file_name.clone())
            .mime_str(&self.content_type)
            .map_err(|e| {
                ApiError::invalid_request(format!(
                    "invalid content type {}: {e}",
                    self.content_type
                ))
            })?;
        Ok(reqwest::multipart::Form::new().part(self.field.clone(), part))
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(MultipartFile),
}

/// A replayable description of one API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API base URL, starting with `/`
    pub path: String,
    pub body: RequestBody,
    pub requires_auth: bool,
    pub expect: ResponseKind,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: RequestBody::Empty,
            requires_auth: true,
            expect: ResponseKind::Json,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json<T: serde::Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = RequestBody::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn multipart(mut self, file: MultipartFile) -> Self {
        self.body = RequestBody::Multipart(file);
        self
    }

    /// Send without session credentials.
    pub fn public(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    pub fn expect(mut self, kind: ResponseKind) -> Self {
        self.expect = kind;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Binary(Arc<[u8]>),
    Empty,
}

impl ResponseBody {
    /// Deserialize a JSON body into `T`.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            ResponseBody::Json(value) => Ok(serde_json::from_value(value)?),
            ResponseBody::Empty => Ok(serde_json::from_value(Value::Null)?),
            ResponseBody::Binary(_) => Err(ApiError::decode("expected JSON, got binary body")),
        }
    }

    pub fn into_bytes(self) -> Result<Arc<[u8]>> {
        match self {
            ResponseBody::Binary(bytes) => Ok(bytes),
            _ => Err(ApiError::decode("expected binary body")),
        }
    }
}

/// The network seam below the refresh coordinator.
///
/// [`HttpClient`] is the production implementation; tests script their own.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one request. Must not attempt any session renewal.
    async fn send(&self, request: &ApiRequest) -> Result<ResponseBody>;

    /// Call the refresh endpoint once.
    async fn renew(&self) -> Result<()>;

    /// Whether any session credential is currently held.
    fn has_session(&self) -> bool;

    /// Drop every held credential.
    fn clear_session(&self);

    /// Install a raw session token obtained outside the refresh flow.
    fn install_token(&self, token: &str);

    /// Import session cookies from a `Cookie` header value.
    fn import_cookies(&self, header: &str);
}

/// Best-effort shape of the server's error bodies.
#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorPayload {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn text(&self, status: StatusCode) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("API error: {}", status.as_u16()))
    }

    fn mentions(&self, marker: &str) -> bool {
        [&self.error, &self.message]
            .into_iter()
            .flatten()
            .any(|m| m.to_lowercase().contains(marker))
    }
}

pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    cookie_url: Url,
    health_url: String,
    policy: CredentialPolicy,
    refresh_method: RefreshMethod,
    /// Lowercased expired-token marker
    expired_marker: String,
    cookies: ArcSwap<Jar>,
    dev_token: ArcSwapOption<String>,
}

impl HttpClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = config.api.base_url.trim_end_matches('/').to_string();
        let cookie_url = Url::parse(&format!("{base_url}/"))
            .map_err(|e| ApiError::config(format!("invalid base URL {base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(config.api.request_timeout())
            .build()
            .map_err(|e| ApiError::config(format!("failed to build HTTP client: {e}")))?;

        let client = Self {
            http,
            base_url,
            cookie_url,
            health_url: config.api.resolved_health_url(),
            policy: config.api.credentials,
            refresh_method: config.auth.refresh_method,
            expired_marker: config.auth.expired_token_marker.to_lowercase(),
            cookies: ArcSwap::from_pointee(Jar::default()),
            dev_token: ArcSwapOption::empty(),
        };
        if let Some(token) = &config.api.dev_token {
            client.set_dev_token(token.clone());
        }
        Ok(client)
    }

    pub fn policy(&self) -> CredentialPolicy {
        self.policy
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Store the raw development token used under the bearer policy.
    pub fn set_dev_token(&self, token: impl Into<String>) {
        self.dev_token.store(Some(Arc::new(token.into())));
    }

    pub fn dev_token(&self) -> Option<String> {
        self.dev_token.load_full().map(|t| t.as_ref().clone())
    }

    /// Import session cookies from a `Cookie` header value (`a=1; b=2`).
    pub fn import_cookies(&self, header: &str) {
        let jar = self.cookies.load();
        for pair in header.split(';').map(str::trim).filter(|p| p.contains('=')) {
            jar.add_cookie_str(&format!("{pair}; Path=/"), &self.cookie_url);
        }
    }

    /// Current session cookies as a `Cookie` header value.
    pub fn export_cookies(&self) -> Option<String> {
        self.cookies
            .load()
            .cookies(&self.cookie_url)
            .and_then(|v| v.to_str().ok().map(str::to_string))
    }

    /// `GET /health`, outside the API prefix and without credentials.
    pub async fn health(&self) -> Result<HealthStatus> {
        let resp = self
            .http
            .get(&self.health_url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ApiError::network(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            let payload = ErrorPayload::parse(&body);
            return Err(ApiError::from_status(status.as_u16(), payload.text(status)));
        }
        Ok(serde_json::from_str(&body)?)
    }

    fn attach_credentials(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.policy {
            CredentialPolicy::Cookie => match self.cookies.load().cookies(&self.cookie_url) {
                Some(cookie) => req.header(reqwest::header::COOKIE, cookie),
                None => req,
            },
            CredentialPolicy::Bearer => match self.dev_token.load_full() {
                Some(token) => req.bearer_auth(token.as_str()),
                None => req,
            },
        }
    }

    fn capture_cookies(&self, resp: &reqwest::Response) {
        let mut headers = resp.headers().get_all(SET_COOKIE).iter().peekable();
        if headers.peek().is_some() {
            self.cookies.load().set_cookies(&mut headers, &self.cookie_url);
        }
    }

    async fn classify(&self, expect: ResponseKind, resp: reqwest::Response) -> Result<ResponseBody> {
        let status = resp.status();

        if status.is_success() {
            return match expect {
                ResponseKind::Binary => {
                    let bytes = resp.bytes().await?;
                    Ok(ResponseBody::Binary(Arc::from(bytes.as_ref())))
                }
                ResponseKind::Empty => Ok(ResponseBody::Empty),
                ResponseKind::Json => {
                    let body = resp.text().await?;
                    if body.trim().is_empty() {
                        return Ok(ResponseBody::Empty);
                    }
                    let value = serde_json::from_str(&body)
                        .map_err(|e| ApiError::decode(format!("invalid JSON body: {e}")))?;
                    Ok(ResponseBody::Json(value))
                }
            };
        }

        let body = resp.text().await.unwrap_or_default();
        let payload = ErrorPayload::parse(&body);

        if status == StatusCode::UNAUTHORIZED {
            if payload.mentions(&self.expired_marker) {
                return Err(ApiError::AuthExpired);
            }
            return Err(ApiError::Unauthorized {
                message: payload.text(status),
            });
        }

        Err(ApiError::from_status(status.as_u16(), payload.text(status)))
    }
}

#[async_trait]
impl Transport for HttpClient {
    async fn send(&self, request: &ApiRequest) -> Result<ResponseBody> {
        let url = self.url(&request.path);
        let mut builder = self.http.request(request.method.clone(), &url);

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            // No explicit Content-Type: reqwest sets it with the boundary.
            RequestBody::Multipart(file) => builder.multipart(file.to_form()?),
        };
        builder = match request.expect {
            ResponseKind::Binary => builder.header(ACCEPT, "*/*"),
            _ => builder.header(ACCEPT, "application/json"),
        };
        if request.requires_auth {
            builder = self.attach_credentials(builder);
        }

        tracing::debug!(method = %request.method, path = %request.path, "sending request");
        let resp = builder.send().await.map_err(|e| {
            tracing::warn!(method = %request.method, path = %request.path, error = %e, "request failed");
            ApiError::network(e.to_string())
        })?;
        self.capture_cookies(&resp);

        let result = self.classify(request.expect, resp).await;
        if let Err(err) = &result {
            tracing::debug!(path = %request.path, kind = %err.kind(), "request returned error");
        }
        result
    }

    async fn renew(&self) -> Result<()> {
        let method = match self.refresh_method {
            RefreshMethod::Get => Method::GET,
            RefreshMethod::Post => Method::POST,
        };
        let body = self.send(&ApiRequest::new(method, REFRESH_PATH)).await?;
        // Bearer sessions may rotate the raw token in the body.
        if let ResponseBody::Json(value) = body
            && let Some(token) = value
                .get("token")
                .or_else(|| value.get("access_token"))
                .and_then(Value::as_str)
        {
            self.set_dev_token(token);
        }
        Ok(())
    }

    fn has_session(&self) -> bool {
        match self.policy {
            CredentialPolicy::Cookie => self.cookies.load().cookies(&self.cookie_url).is_some(),
            CredentialPolicy::Bearer => self.dev_token.load().is_some(),
        }
    }

    fn clear_session(&self) {
        self.cookies.store(Arc::new(Jar::default()));
        self.dev_token.store(None);
    }

    fn install_token(&self, token: &str) {
        self.set_dev_token(token);
        // The server reads `auth_token` from cookies before the header.
        if self.policy == CredentialPolicy::Cookie {
            HttpClient::import_cookies(self, &format!("{AUTH_COOKIE}={token}"));
        }
    }

    fn import_cookies(&self, header: &str) {
        HttpClient::import_cookies(self, header);
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("policy", &self.policy)
            .field("has_session", &self.has_session())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(policy: CredentialPolicy) -> HttpClient {
        let mut cfg = ClientConfig::for_base_url("http://localhost:8080/api/");
        cfg.api.credentials = policy;
        HttpClient::new(&cfg).unwrap()
    }

    #[test]
    fn test_url_joining() {
        let c = client(CredentialPolicy::Cookie);
        assert_eq!(c.base_url(), "http://localhost:8080/api");
        assert_eq!(c.url("/albums"), "http://localhost:8080/api/albums");
    }

    #[test]
    fn test_error_payload_prefers_error_field() {
        let payload = ErrorPayload::parse(r#"{"error":"Invalid or expired token","message":"x"}"#);
        assert_eq!(payload.text(StatusCode::UNAUTHORIZED), "Invalid or expired token");
        assert!(payload.mentions("expired token"));

        let payload = ErrorPayload::parse("not json");
        assert_eq!(payload.text(StatusCode::BAD_GATEWAY), "API error: 502");
        assert!(!payload.mentions("expired token"));
    }

    #[test]
    fn test_expired_marker_is_case_insensitive() {
        let payload = ErrorPayload::parse(r#"{"message":"Expired Token"}"#);
        assert!(payload.mentions("expired token"));
    }

    #[test]
    fn test_cookie_import_export_and_clear() {
        let c = client(CredentialPolicy::Cookie);
        assert!(!c.has_session());

        c.import_cookies("auth_token=abc; refresh_token=def");
        assert!(c.has_session());
        let exported = c.export_cookies().unwrap();
        assert!(exported.contains("auth_token=abc"));
        assert!(exported.contains("refresh_token=def"));

        c.clear_session();
        assert!(!c.has_session());
        assert!(c.export_cookies().is_none());
    }

    #[test]
    fn test_bearer_session_tracks_dev_token() {
        let c = client(CredentialPolicy::Bearer);
        assert!(!c.has_session());
        c.set_dev_token("raw-token");
        assert!(c.has_session());
        assert_eq!(c.dev_token().as_deref(), Some("raw-token"));
        c.clear_session();
        assert!(c.dev_token().is_none());
    }

    #[test]
    fn test_install_token_follows_policy() {
        let c = client(CredentialPolicy::Cookie);
        c.install_token("dev-123");
        assert_eq!(c.export_cookies().as_deref(), Some("auth_token=dev-123"));

        let c = client(CredentialPolicy::Bearer);
        c.install_token("dev-123");
        assert!(c.export_cookies().is_none());
        assert!(c.has_session());
    }

    #[test]
    fn test_request_builders() {
        let req = ApiRequest::get("/images/1/download")
            .expect(ResponseKind::Binary)
            .public();
        assert_eq!(req.method, Method::GET);
        assert!(!req.requires_auth);
        assert_eq!(req.expect, ResponseKind::Binary);

        let req = ApiRequest::post("/albums")
            .json(&serde_json::json!({"name": "Trip"}))
            .unwrap();
        assert!(matches!(req.body, RequestBody::Json(_)));
    }

    #[test]
    fn test_response_body_conversions() {
        let body = ResponseBody::Json(serde_json::json!({"message": "ok"}));
        let msg: roshnii_core::ServerMessage = body.into_json().unwrap();
        assert_eq!(msg.message, "ok");

        let err = ResponseBody::Binary(Arc::from(&b"x"[..])).into_json::<Value>();
        assert!(matches!(err, Err(ApiError::Decode(_))));

        let bytes = ResponseBody::Binary(Arc::from(&b"abc"[..])).into_bytes().unwrap();
        assert_eq!(&bytes[..], b"abc");
    }
}
