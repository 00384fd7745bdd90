//! Client-side data synchronization for the painel back-office console.
//!
//! Requests flow from [`api::SyncClient`] through the [`cache::QueryCache`]
//! to the per-resource clients and the authenticated [`http::AccessPipeline`].

pub mod api;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod logging;
pub mod query;
pub mod session;

#[cfg(test)]
mod testing;

pub use api::SyncClient;
pub use cache::QueryCache;
pub use error::{Result, SyncError};
