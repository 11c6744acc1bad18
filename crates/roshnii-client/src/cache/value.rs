use std::sync::Arc;

use roshnii_core::{Album, ImageMetadata, User};

use crate::error::{ApiError, Result};

/// A cached resource, one variant per resource shape.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    /// `None` once the user is known to be logged out
    User(Option<User>),
    Albums(Vec<Album>),
    Album(Album),
    Images(Vec<ImageMetadata>),
    Image(ImageMetadata),
    Blob(Arc<[u8]>),
}

impl CacheValue {
    pub fn kind(&self) -> &'static str {
        match self {
            CacheValue::User(_) => "user",
            CacheValue::Albums(_) => "albums",
            CacheValue::Album(_) => "album",
            CacheValue::Images(_) => "images",
            CacheValue::Image(_) => "image",
            CacheValue::Blob(_) => "blob",
        }
    }
}

/// Typed view over [`CacheValue`].
pub trait CacheResource: Sized {
    fn into_cache_value(self) -> CacheValue;
    fn from_cache_value(value: CacheValue) -> Result<Self>;
}

macro_rules! cache_resource {
    ($ty:ty, $variant:ident) => {
        impl CacheResource for $ty {
            fn into_cache_value(self) -> CacheValue {
                CacheValue::$variant(self)
            }

            fn from_cache_value(value: CacheValue) -> Result<Self> {
                match value {
                    CacheValue::$variant(inner) => Ok(inner),
                    other => Err(ApiError::decode(format!(
                        "cached {} where {} was expected",
                        other.kind(),
                        stringify!($variant).to_lowercase()
                    ))),
                }
            }
        }
    };
}

cache_resource!(Option<User>, User);
cache_resource!(Vec<Album>, Albums);
cache_resource!(Album, Album);
cache_resource!(Vec<ImageMetadata>, Images);
cache_resource!(ImageMetadata, Image);
cache_resource!(Arc<[u8]>, Blob);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_round_trip_and_mismatch() {
        let blob: Arc<[u8]> = Arc::from(&b"\x89PNG"[..]);
        let value = blob.clone().into_cache_value();
        assert_eq!(value.kind(), "blob");
        assert_eq!(<Arc<[u8]>>::from_cache_value(value.clone()).unwrap(), blob);

        let err = Vec::<Album>::from_cache_value(value).unwrap_err();
        assert!(matches!(err, ApiError::Decode(msg) if msg.contains("albums")));
    }
}
