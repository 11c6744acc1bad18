//! Shared types for the Roshnii photo client: entity ids, wire models and
//! the session event channel.

pub mod events;
pub mod id;
pub mod models;

pub use events::{SessionEvent, SessionEventBroadcaster, SessionEventKind};
pub use id::{AlbumId, IdError, ImageId, UserId, validate_id};
pub use models::{
    AddImageToAlbumRequest, Album, AlbumImage, CreateAlbumRequest, DevLoginRequest,
    DevLoginResponse, HealthStatus, ImageMetadata, LoginUrlResponse, ServerMessage,
    UpdateAlbumRequest, User,
};
