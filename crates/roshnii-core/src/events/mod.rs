//! Session event channel.
//!
//! Replaces ad-hoc global notifications with a typed broadcast channel:
//!
//! ```text
//! HTTP client / refresh coordinator ──publish──► SessionEventBroadcaster
//!                                                  │          │
//!                                                  ▼          ▼
//!                                        session state    diagnostics
//! ```

pub mod broadcaster;
pub mod types;

pub use broadcaster::SessionEventBroadcaster;
pub use types::{SessionEvent, SessionEventKind};
