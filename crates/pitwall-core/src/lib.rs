//! pitwall core: Formula 1 data with a local cache that keeps working offline.
//!
//! The pieces, bottom-up:
//!
//! - [`api`]: fetch raw JSON from an Ergast-compatible API
//! - [`cache`]: store payloads on disk and decide when they may be refetched
//! - [`models`]: shape payloads into display types
//! - [`service`]: the facade the frontends call
//! - [`background`]: refresh everything on a spawned task

pub mod api;
pub mod background;
pub mod cache;
pub mod config;
pub mod models;
pub mod service;
pub mod utils;

pub use api::{ApiError, DataSource, Endpoint, ErgastClient};
pub use background::{spawn_refresh_all, RefreshEvent};
pub use cache::{CacheStore, RefreshDecision, RefreshGovernor, StorageError};
pub use config::Config;
pub use models::{ConstructorStanding, DriverStanding, LastRace, NextRace, PodiumEntry};
pub use service::{
    CacheStatus, F1Service, Origin, RefreshError, RefreshReport, Resource, Snapshot, CURRENT_SEASON,
};
