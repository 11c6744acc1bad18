//! Typed facade over the session and cache layers.
//!
//! Queries read through the [`CacheStore`]; mutations go through the
//! [`RefreshCoordinator`] and then apply their invalidation rule. Any auth
//! failure that reaches this layer ends the session.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use roshnii_core::{
    AddImageToAlbumRequest, Album, AlbumId, CreateAlbumRequest, HealthStatus, ImageId,
    ImageMetadata, SessionEventBroadcaster, UpdateAlbumRequest, User, validate_id,
};

use crate::cache::{CacheKey, CacheStore, CacheValue, Fetcher};
use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::http::{ApiRequest, HttpClient, MultipartFile, ResponseBody, ResponseKind, Transport};
use crate::invalidation::{Mutation, apply_optimistic, settle_failure, settle_success};
use crate::refresh::RefreshCoordinator;
use crate::session::Session;

pub const ME_PATH: &str = "/me";

fn segment(id: &str) -> Result<&str> {
    validate_id(id).map_err(|e| ApiError::invalid_request(e.to_string()))?;
    Ok(id)
}

/// Decodes a JSON list; the server encodes an empty list as `null`.
fn list<T: DeserializeOwned>(body: ResponseBody) -> Result<Vec<T>> {
    match body {
        ResponseBody::Empty => Ok(Vec::new()),
        other => Ok(other.into_json::<Option<Vec<T>>>()?.unwrap_or_default()),
    }
}

/// Loads cache keys from the API through the refresh coordinator.
pub struct ResourceFetcher {
    coordinator: RefreshCoordinator,
}

impl ResourceFetcher {
    pub fn new(coordinator: RefreshCoordinator) -> Self {
        Self { coordinator }
    }

    /// The request that loads `key`.
    pub fn request_for(key: &CacheKey) -> Result<ApiRequest> {
        Ok(match key {
            CacheKey::CurrentUser => ApiRequest::get(ME_PATH),
            CacheKey::AlbumsList => ApiRequest::get("/albums"),
            CacheKey::AlbumDetail(id) => ApiRequest::get(format!("/albums/{}", segment(id.as_str())?)),
            CacheKey::AlbumImages(id) => {
                ApiRequest::get(format!("/albums/{}/images", segment(id.as_str())?))
            }
            CacheKey::ImagesList => ApiRequest::get("/images"),
            CacheKey::ImageDetail(id) => ApiRequest::get(format!("/images/{}", segment(id.as_str())?)),
            CacheKey::ImageBlob(id) => {
                ApiRequest::get(format!("/images/{}/download", segment(id.as_str())?))
                    .expect(ResponseKind::Binary)
            }
        })
    }
}

#[async_trait]
impl Fetcher for ResourceFetcher {
    async fn fetch(&self, key: &CacheKey) -> Result<CacheValue> {
        let body = self.coordinator.guard(&Self::request_for(key)?).await?;
        Ok(match key {
            CacheKey::CurrentUser => CacheValue::User(Some(body.into_json()?)),
            CacheKey::AlbumsList => CacheValue::Albums(list(body)?),
            CacheKey::AlbumDetail(_) => CacheValue::Album(body.into_json()?),
            CacheKey::AlbumImages(_) | CacheKey::ImagesList => CacheValue::Images(list(body)?),
            CacheKey::ImageDetail(_) => CacheValue::Image(body.into_json()?),
            CacheKey::ImageBlob(_) => CacheValue::Blob(body.into_bytes()?),
        })
    }
}

struct ClientInner {
    config: ClientConfig,
    http: Option<Arc<HttpClient>>,
    coordinator: RefreshCoordinator,
    cache: CacheStore,
    events: SessionEventBroadcaster,
    session: Session,
}

/// Entry point of the library. Cheap to clone.
#[derive(Clone)]
pub struct PhotoClient {
    inner: Arc<ClientInner>,
}

impl PhotoClient {
    /// Builds the full stack over HTTP. Must be called inside a Tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate().map_err(ApiError::config)?;
        let http = Arc::new(HttpClient::new(&config)?);
        let transport: Arc<dyn Transport> = http.clone();
        Ok(Self::assemble(config, transport, Some(http)))
    }

    /// Builds the stack over a custom transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self::assemble(config, transport, None)
    }

    fn assemble(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        http: Option<Arc<HttpClient>>,
    ) -> Self {
        let events = SessionEventBroadcaster::with_capacity(config.events.capacity);
        let coordinator = RefreshCoordinator::new(transport, events.clone());
        let cache = CacheStore::new(
            Arc::new(ResourceFetcher::new(coordinator.clone())),
            config.cache.stale_time(),
        );
        let session = Session::new(coordinator.clone(), cache.clone(), events.clone());
        tracing::debug!(base_url = %config.api.base_url, credentials = ?config.api.credentials, "photo client ready");
        Self {
            inner: Arc::new(ClientInner {
                config,
                http,
                coordinator,
                cache,
                events,
                session,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    pub fn events(&self) -> &SessionEventBroadcaster {
        &self.inner.events
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    /// The HTTP transport, absent when built over a custom transport.
    pub fn http(&self) -> Option<&Arc<HttpClient>> {
        self.inner.http.as_ref()
    }

    /// Session cookies for persisting the session between runs.
    pub fn export_cookies(&self) -> Option<String> {
        self.inner.http.as_ref().and_then(|http| http.export_cookies())
    }

    pub fn dev_token(&self) -> Option<String> {
        self.inner.http.as_ref().and_then(|http| http.dev_token())
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        match &self.inner.http {
            Some(http) => http.health().await,
            None => Err(ApiError::config("health check needs the HTTP transport")),
        }
    }

    // Queries

    /// `None` once the session is known to be over.
    pub async fn current_user(&self) -> Result<Option<User>> {
        self.query(&CacheKey::CurrentUser).await
    }

    pub async fn list_albums(&self) -> Result<Vec<Album>> {
        self.query(&CacheKey::AlbumsList).await
    }

    pub async fn get_album(&self, id: &AlbumId) -> Result<Album> {
        self.query(&CacheKey::AlbumDetail(id.clone())).await
    }

    pub async fn album_images(&self, id: &AlbumId) -> Result<Vec<ImageMetadata>> {
        self.query(&CacheKey::AlbumImages(id.clone())).await
    }

    /// All images, optionally narrowed to filenames containing `filter`
    /// (case-insensitive). Filtering runs on the cached listing.
    pub async fn list_images(&self, filter: Option<&str>) -> Result<Vec<ImageMetadata>> {
        let images: Vec<ImageMetadata> = self.query(&CacheKey::ImagesList).await?;
        Ok(match filter {
            Some(query) => images
                .into_iter()
                .filter(|image| image.filename_matches(query))
                .collect(),
            None => images,
        })
    }

    pub async fn get_image(&self, id: &ImageId) -> Result<ImageMetadata> {
        self.query(&CacheKey::ImageDetail(id.clone())).await
    }

    pub async fn download_image(&self, id: &ImageId) -> Result<Arc<[u8]>> {
        self.query(&CacheKey::ImageBlob(id.clone())).await
    }

    // Mutations

    pub async fn create_album(&self, name: &str, description: &str) -> Result<Album> {
        let request = ApiRequest::post("/albums").json(&CreateAlbumRequest {
            name: name.to_string(),
            description: description.to_string(),
        })?;
        self.mutate(Mutation::CreateAlbum, request)
            .await?
            .into_json()
    }

    pub async fn update_album(&self, id: &AlbumId, name: &str, description: &str) -> Result<Album> {
        let request = ApiRequest::put(format!("/albums/{}", segment(id.as_str())?)).json(
            &UpdateAlbumRequest {
                name: name.to_string(),
                description: description.to_string(),
            },
        )?;
        let mutation = Mutation::UpdateAlbum {
            album_id: id.clone(),
        };
        self.mutate(mutation, request).await?.into_json()
    }

    pub async fn delete_album(&self, id: &AlbumId) -> Result<()> {
        let request = ApiRequest::delete(format!("/albums/{}", segment(id.as_str())?));
        let mutation = Mutation::DeleteAlbum {
            album_id: id.clone(),
        };
        self.mutate(mutation, request).await.map(drop)
    }

    pub async fn add_image_to_album(&self, album_id: &AlbumId, image_id: &ImageId) -> Result<()> {
        segment(image_id.as_str())?;
        let request = ApiRequest::post(format!("/albums/{}/images", segment(album_id.as_str())?))
            .json(&AddImageToAlbumRequest {
                image_id: image_id.clone(),
            })?;
        let mutation = Mutation::AddImageToAlbum {
            album_id: album_id.clone(),
            image_id: image_id.clone(),
        };
        self.mutate(mutation, request).await.map(drop)
    }

    pub async fn remove_image_from_album(
        &self,
        album_id: &AlbumId,
        image_id: &ImageId,
    ) -> Result<()> {
        let request = ApiRequest::delete(format!(
            "/albums/{}/images/{}",
            segment(album_id.as_str())?,
            segment(image_id.as_str())?
        ));
        let mutation = Mutation::RemoveImageFromAlbum {
            album_id: album_id.clone(),
            image_id: image_id.clone(),
        };
        self.mutate(mutation, request).await.map(drop)
    }

    /// Uploads one file as multipart form data (`file` field).
    pub async fn upload_image(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Result<ImageMetadata> {
        let request = ApiRequest::post("/images/upload").multipart(MultipartFile::new(
            file_name,
            content_type,
            bytes,
        ));
        self.mutate(Mutation::UploadImage, request)
            .await?
            .into_json()
    }

    pub async fn delete_image(&self, id: &ImageId) -> Result<()> {
        let request = ApiRequest::delete(format!("/images/{}", segment(id.as_str())?));
        let mutation = Mutation::DeleteImage {
            image_id: id.clone(),
        };
        self.mutate(mutation, request).await.map(drop)
    }

    async fn query<T: crate::cache::CacheResource>(&self, key: &CacheKey) -> Result<T> {
        self.inner
            .cache
            .read_as(key)
            .await
            .map_err(|err| self.observe(err))
    }

    async fn mutate(&self, mutation: Mutation, request: ApiRequest) -> Result<ResponseBody> {
        tracing::debug!(%mutation, path = %request.path, "dispatching mutation");
        let pending = apply_optimistic(&self.inner.cache, mutation);
        match self.inner.coordinator.guard(&request).await {
            Ok(body) => {
                settle_success(&self.inner.cache, pending);
                Ok(body)
            }
            Err(err) => {
                settle_failure(&self.inner.cache, pending);
                Err(self.observe(err))
            }
        }
    }

    fn observe(&self, err: ApiError) -> ApiError {
        if err.is_auth_failure() {
            self.inner.session.terminate(&err.to_string());
        }
        err
    }
}

impl std::fmt::Debug for PhotoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoClient")
            .field("base_url", &self.inner.config.api.base_url)
            .field("session", &self.inner.session)
            .field("cache", &self.inner.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::testing::ScriptedTransport;
    use crate::session::SessionState;
    use serde_json::json;

    fn album_json(id: &str, name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": 1,
            "name": name,
            "description": "",
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        })
    }

    fn image_json(id: &str, filename: &str) -> serde_json::Value {
        json!({
            "id": id,
            "user_id": 1,
            "filename": filename,
            "content_type": "image/jpeg",
            "size": 2048,
            "created_at": "2024-05-01T10:00:00Z",
            "updated_at": "2024-05-01T10:00:00Z"
        })
    }

    fn client() -> (PhotoClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        let dyn_transport: Arc<dyn Transport> = transport.clone();
        (
            PhotoClient::with_transport(ClientConfig::default(), dyn_transport),
            transport,
        )
    }

    #[test]
    fn test_request_mapping() {
        let req = ResourceFetcher::request_for(&CacheKey::image_blob("i1")).unwrap();
        assert_eq!(req.path, "/images/i1/download");
        assert_eq!(req.expect, ResponseKind::Binary);

        let req = ResourceFetcher::request_for(&CacheKey::album_images("42")).unwrap();
        assert_eq!(req.path, "/albums/42/images");

        let err = ResourceFetcher::request_for(&CacheKey::album("a/b")).unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_ids_that_rewrite_the_path_are_never_sent() {
        let (client, transport) = client();

        let err = client.delete_image(&ImageId::from("..")).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        let err = client.get_album(&AlbumId::from("1?admin=1")).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));
        let err = client.album_images(&AlbumId::from("1#x")).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(_)));

        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_null_list_is_empty() {
        let albums: Vec<Album> = list(ResponseBody::Json(serde_json::Value::Null)).unwrap();
        assert!(albums.is_empty());
    }

    #[tokio::test]
    async fn test_queries_are_cached() {
        let (client, transport) = client();
        transport.script(
            "/albums",
            Ok(ResponseBody::Json(json!([album_json("1", "Trip")]))),
        );

        let albums = client.list_albums().await.unwrap();
        assert_eq!(albums[0].name, "Trip");
        assert_eq!(albums[0].id.as_str(), "1");
        client.list_albums().await.unwrap();
        assert_eq!(transport.sent_count("/albums"), 1);
    }

    #[tokio::test]
    async fn test_image_filter() {
        let (client, transport) = client();
        transport.script(
            "/images",
            Ok(ResponseBody::Json(json!([
                image_json("i1", "Beach.JPG"),
                image_json("i2", "city.png")
            ]))),
        );

        let hits = client.list_images(Some("beach")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "i1");
        assert_eq!(client.list_images(None).await.unwrap().len(), 2);
        assert_eq!(transport.sent_count("/images"), 1);
    }

    #[tokio::test]
    async fn test_delete_album_drops_detail() {
        let (client, transport) = client();
        transport.script("/albums/7", Ok(ResponseBody::Json(album_json("7", "Old"))));
        transport.script("/albums", Ok(ResponseBody::Json(json!([album_json("7", "Old")]))));
        client.get_album(&"7".into()).await.unwrap();
        client.list_albums().await.unwrap();

        transport.script(
            "/albums/7",
            Ok(ResponseBody::Json(json!({"message": "Album deleted"}))),
        );
        client.delete_album(&"7".into()).await.unwrap();

        assert!(client.cache().peek(&CacheKey::album("7")).is_none());
        assert!(client.cache().entry(&CacheKey::AlbumsList).unwrap().stale);
    }

    #[tokio::test]
    async fn test_failed_add_rolls_back_optimistic_patch() {
        let (client, transport) = client();
        transport.script("/albums/a1/images", Ok(ResponseBody::Json(json!([]))));
        transport.script(
            "/images/i1",
            Ok(ResponseBody::Json(image_json("i1", "one.jpg"))),
        );
        client.album_images(&"a1".into()).await.unwrap();
        client.get_image(&"i1".into()).await.unwrap();

        transport.script(
            "/albums/a1/images",
            Err(ApiError::from_status(500, "Failed to add image")),
        );
        let err = client
            .add_image_to_album(&"a1".into(), &"i1".into())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            client.cache().peek(&CacheKey::album_images("a1")),
            Some(CacheValue::Images(vec![]))
        );
    }

    #[tokio::test]
    async fn test_auth_failure_on_mutation_ends_session() {
        let (client, transport) = client();
        transport.script(
            "/albums",
            Err(ApiError::Unauthorized {
                message: "Authentication required".into(),
            }),
        );

        let err = client.create_album("Trip", "").await.unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(client.session().state(), SessionState::Unauthenticated);
        assert_eq!(client.current_user().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_download_is_cached_and_dropped_on_delete() {
        let (client, transport) = client();
        transport.script(
            "/images/i1/download",
            Ok(ResponseBody::Binary(Arc::from(&b"jpeg"[..]))),
        );

        let bytes = client.download_image(&"i1".into()).await.unwrap();
        assert_eq!(&bytes[..], b"jpeg");
        client.download_image(&"i1".into()).await.unwrap();
        assert_eq!(transport.sent_count("/images/i1/download"), 1);

        client.delete_image(&"i1".into()).await.unwrap();
        assert!(client.cache().peek(&CacheKey::image_blob("i1")).is_none());
    }

    #[tokio::test]
    async fn test_health_requires_http_transport() {
        let (client, _) = client();
        assert!(matches!(client.health().await, Err(ApiError::Config(_))));
    }
}
