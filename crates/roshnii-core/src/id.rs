//! Identifier newtypes for server entities.
//!
//! The server has shipped both numeric (`int64`) and UUID identifiers for
//! users and albums over time, so every id deserializes from either a JSON
//! string or a JSON integer and is held as a string on the client.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier must not be empty")]
    Empty,

    #[error("identifier contains a path separator: {0}")]
    PathSeparator(String),

    #[error("identifier is a relative path segment: {0}")]
    DotSegment(String),

    #[error("identifier {id:?} contains reserved character {ch:?}")]
    ReservedCharacter { id: String, ch: char },
}

/// Rejects ids that cannot be embedded verbatim as a single URL path
/// segment: separators, dot segments, and anything that would start a
/// query, a fragment or a percent escape.
pub fn validate_id(id: &str) -> Result<(), IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    if id.contains(['/', '\\']) {
        return Err(IdError::PathSeparator(id.to_string()));
    }
    if id == "." || id == ".." {
        return Err(IdError::DotSegment(id.to_string()));
    }
    if let Some(ch) = id
        .chars()
        .find(|c| matches!(c, '?' | '#' | '%') || c.is_whitespace() || c.is_control())
    {
        return Err(IdError::ReservedCharacter {
            id: id.to_string(),
            ch,
        });
    }
    Ok(())
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                string_or_number(deserializer).map(Self)
            }
        }
    };
}

entity_id!(
    /// Identifier of a registered user.
    UserId
);
entity_id!(
    /// Identifier of an album.
    AlbumId
);
entity_id!(
    /// Identifier of an uploaded image.
    ImageId
);

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Signed(n) => n.to_string(),
        RawId::Unsigned(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_string_and_number() {
        let a: AlbumId = serde_json::from_str("\"4f1c\"").unwrap();
        assert_eq!(a.as_str(), "4f1c");

        let b: AlbumId = serde_json::from_str("42").unwrap();
        assert_eq!(b, AlbumId::from("42"));
    }

    #[test]
    fn test_id_serializes_as_string() {
        let id = ImageId::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("u1").is_ok());
        assert_eq!(validate_id(""), Err(IdError::Empty));
        assert!(matches!(
            validate_id("a/b"),
            Err(IdError::PathSeparator(_))
        ));
        assert!(matches!(
            validate_id("a\\b"),
            Err(IdError::PathSeparator(_))
        ));
    }

    #[test]
    fn test_validate_id_rejects_url_syntax() {
        assert_eq!(validate_id(".."), Err(IdError::DotSegment("..".into())));
        assert_eq!(validate_id("."), Err(IdError::DotSegment(".".into())));
        for (id, ch) in [("a?x=1", '?'), ("a#frag", '#'), ("a%2Fb", '%'), ("a b", ' ')] {
            assert_eq!(
                validate_id(id),
                Err(IdError::ReservedCharacter {
                    id: id.to_string(),
                    ch
                })
            );
        }
        // Dots inside an id are fine.
        assert!(validate_id("img.v2").is_ok());
        assert!(validate_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
    }
}
