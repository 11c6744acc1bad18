//! Wire models exchanged with the photo service.
//!
//! Field names follow the server's snake_case JSON. Timestamps are RFC 3339.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::id::{AlbumId, ImageId, UserId};

/// The signed-in user, as returned by `GET /me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: AlbumId,
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Metadata of an uploaded image. The binary content is fetched separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub id: ImageId,
    pub user_id: UserId,
    pub filename: String,
    pub content_type: String,
    /// Size in bytes
    pub size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ImageMetadata {
    /// API path of the image's binary content.
    pub fn download_path(&self) -> String {
        format!("/images/{}/download", self.id)
    }

    /// Case-insensitive filename match used by gallery filtering.
    pub fn filename_matches(&self, query: &str) -> bool {
        query.is_empty()
            || self
                .filename
                .to_lowercase()
                .contains(&query.to_lowercase())
    }
}

/// Many-to-many link between an album and an image. Has no identity of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlbumImage {
    pub album_id: AlbumId,
    pub image_id: ImageId,
}

/// Plain acknowledgement body (`{"message": "..."}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAlbumRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateAlbumRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddImageToAlbumRequest {
    pub image_id: ImageId,
}

/// Body of the development-only login endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevLoginRequest {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevLoginResponse {
    pub token: String,
    pub user_id: UserId,
}

/// Response of `GET /auth/google/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginUrlResponse {
    #[serde(default)]
    pub auth_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_without_picture() {
        let user: User =
            serde_json::from_str(r#"{"id":"u1","email":"a@b.com","name":"A"}"#).unwrap();
        assert_eq!(user.id.as_str(), "u1");
        assert!(user.picture_url.is_none());
    }

    #[test]
    fn test_album_with_numeric_ids() {
        let album: Album = serde_json::from_str(
            r#"{
                "id": 7,
                "user_id": 3,
                "name": "Trip",
                "description": "",
                "created_at": "2024-05-01T10:00:00Z",
                "updated_at": "2024-05-02T10:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(album.id.as_str(), "7");
        assert_eq!(album.user_id.as_str(), "3");
    }

    #[test]
    fn test_image_optional_dimensions() {
        let image: ImageMetadata = serde_json::from_str(
            r#"{
                "id": "img-1",
                "user_id": "u1",
                "filename": "Beach.JPG",
                "content_type": "image/jpeg",
                "size": 1024,
                "created_at": "2024-05-01T10:00:00Z",
                "updated_at": "2024-05-01T10:00:00Z"
            }"#,
        )
        .unwrap();
        assert_eq!(image.width, None);
        assert_eq!(image.download_path(), "/images/img-1/download");
        assert!(image.filename_matches("beach"));
        assert!(!image.filename_matches("mountain"));
    }
}
