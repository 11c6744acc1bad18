//! Client-side resource cache: keys, values, and the keyed store.

pub mod key;
pub mod store;
pub mod value;

pub use key::{CacheKey, KeyPattern};
pub use store::{CacheEntry, CacheStore, Fetcher, Subscription};
pub use value::{CacheResource, CacheValue};
