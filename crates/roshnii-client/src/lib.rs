//! Client-side session and cache consistency layer for the Roshnii photo API.
//!
//! Layers, bottom up:
//! - [`http`]: request/response plumbing and credential attachment
//! - [`refresh`]: single-flight session renewal and request replay
//! - [`cache`]: keyed resource cache with de-duplicated fetches
//! - [`invalidation`]: what each mutation does to the cache
//! - [`session`]: the login state machine
//! - [`api`]: the typed [`PhotoClient`] facade

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod invalidation;
pub mod refresh;
pub mod session;

pub use api::{PhotoClient, ResourceFetcher};
pub use cache::{CacheEntry, CacheKey, CacheStore, CacheValue, KeyPattern, Subscription};
pub use config::{ClientConfig, CredentialPolicy, RefreshMethod};
pub use error::{ApiError, ErrorKind, Result};
pub use http::{ApiRequest, HttpClient, ResponseBody, ResponseKind, Transport};
pub use invalidation::{InvalidationRule, Mutation, OptimisticPatch, PendingMutation};
pub use refresh::{RefreshCoordinator, RefreshState};
pub use session::{Session, SessionState};
