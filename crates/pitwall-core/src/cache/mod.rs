//! Local caching module for offline data access.
//!
//! This module provides the `CacheStore` for persisting raw API payloads and
//! the `RefreshGovernor` that decides when a cached payload may be replaced.
//!
//! Layout on disk:
//! - `{key}.json`: the raw payload, pretty-printed
//! - `cache_metadata.json`: last update, fetch counter and quota window per key
//!
//! Deleting the whole directory is always safe and simply means a cold start.

pub mod error;
pub mod governor;
pub mod metadata;
pub mod store;

pub use error::StorageError;
pub use governor::{schedule_interval, RefreshDecision, RefreshGovernor};
pub use metadata::{KeyMetadata, MetadataStore};
pub use store::{CacheStore, METADATA_FILE};
