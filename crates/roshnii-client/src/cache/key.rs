use std::fmt;

use roshnii_core::{AlbumId, ImageId};

/// Hierarchical identifier of a cached resource.
///
/// Keys are built only through these constructors, so every caller agrees on
/// the key of a given resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    CurrentUser,
    AlbumsList,
    AlbumDetail(AlbumId),
    AlbumImages(AlbumId),
    ImagesList,
    ImageDetail(ImageId),
    /// Raw image bytes served by `/images/{id}/download`
    ImageBlob(ImageId),
}

impl CacheKey {
    pub fn album(id: impl Into<AlbumId>) -> Self {
        Self::AlbumDetail(id.into())
    }

    pub fn album_images(id: impl Into<AlbumId>) -> Self {
        Self::AlbumImages(id.into())
    }

    pub fn image(id: impl Into<ImageId>) -> Self {
        Self::ImageDetail(id.into())
    }

    pub fn image_blob(id: impl Into<ImageId>) -> Self {
        Self::ImageBlob(id.into())
    }

    /// Resource family this key belongs to (the first segment).
    pub fn family(&self) -> &'static str {
        match self {
            CacheKey::CurrentUser => "user",
            CacheKey::AlbumsList | CacheKey::AlbumDetail(_) | CacheKey::AlbumImages(_) => "albums",
            CacheKey::ImagesList | CacheKey::ImageDetail(_) | CacheKey::ImageBlob(_) => "images",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::CurrentUser => f.write_str("user/current"),
            CacheKey::AlbumsList => f.write_str("albums/list"),
            CacheKey::AlbumDetail(id) => write!(f, "albums/detail/{id}"),
            CacheKey::AlbumImages(id) => write!(f, "albums/detail/{id}/images"),
            CacheKey::ImagesList => f.write_str("images/list"),
            CacheKey::ImageDetail(id) => write!(f, "images/detail/{id}"),
            CacheKey::ImageBlob(id) => write!(f, "images/detail/{id}/blob"),
        }
    }
}

/// Selects the entries an invalidation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
    Exact(CacheKey),
    /// Every `AlbumImages(_)` entry, whatever the album
    AllAlbumImages,
}

impl KeyPattern {
    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeyPattern::Exact(exact) => exact == key,
            KeyPattern::AllAlbumImages => matches!(key, CacheKey::AlbumImages(_)),
        }
    }
}

impl From<CacheKey> for KeyPattern {
    fn from(key: CacheKey) -> Self {
        KeyPattern::Exact(key)
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPattern::Exact(key) => key.fmt(f),
            KeyPattern::AllAlbumImages => f.write_str("albums/detail/*/images"),
        }
    }
}
