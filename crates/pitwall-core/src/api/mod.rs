//! Client module for the Ergast-compatible F1 results API.
//!
//! The rest of the crate only sees the [`DataSource`] trait: "fetch the raw
//! JSON payload for this endpoint". [`ErgastClient`] is the HTTP
//! implementation; tests substitute their own.

pub mod client;
pub mod endpoint;
pub mod error;

pub use client::ErgastClient;
pub use endpoint::Endpoint;
pub use error::ApiError;

use futures::future::BoxFuture;
use serde_json::Value;

/// Anything that can produce a raw payload for an [`Endpoint`].
pub trait DataSource: Send + Sync {
    fn fetch<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Value, ApiError>>;
}
