//! In-memory cache of backend query results.
//!
//! This module provides the synchronization engine that:
//! - Keys results by resource + parameter set
//! - Shares one fetch between concurrent readers of a key
//! - Serves aged data while refreshing it in the background
//! - Refetches invalidated data before serving it
//! - Evicts entries nobody has observed for the garbage-collection window
//! - Checks mutation results against the entity lifecycles before caching them

mod engine;
mod entry;
mod key;
mod options;

pub use engine::{Observer, QueryCache};
pub use entry::{EntryStatus, Snapshot};
pub use key::{Invalidation, QueryKey};
pub use options::{CacheConfig, LifecycleGuard, MutationOptions, ReadOptions, MAX_RETRY_DELAY};
