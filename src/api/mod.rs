//! Backend resources and the cache-backed client built on them.

mod cached_client;
pub mod catalog;
mod resource;

pub use cached_client::{ResourceCall, SyncClient};
pub use catalog::Resources;
pub use resource::{CustomQuery, ResourceClient, QUERY_PARAM};
