//! Observer-bound query handles for UI collaborators.
//!
//! A `Query` pairs a cache key with the fetcher that fills it and keeps the
//! key observed for as long as the handle lives, so the entry is never
//! garbage-collected from under a live view.
//!
//! # Example
//!
//! ```ignore
//! let employees = client.resources().employees.clone();
//! let query = Query::new(&cache, employees.list_key(&Params::new()), move || {
//!     let employees = employees.clone();
//!     async move { employees.list(&Params::new()).await }
//! });
//!
//! // On mount and on every render
//! let snapshot = query.read().await;
//! match snapshot.status {
//!     EntryStatus::Fetching => render_spinner(),
//!     EntryStatus::Fresh | EntryStatus::Stale => render_data(snapshot.data()),
//!     EntryStatus::Error => render_error(snapshot.error),
//! }
//! ```

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::cache::{Observer, QueryCache, QueryKey, ReadOptions, Snapshot};
use crate::error::Result;

/// A factory function that creates futures for fetching data
type FetcherFn = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

pub struct Query {
  cache: QueryCache,
  fetcher: FetcherFn,
  options: ReadOptions,
  observer: Observer,
}

impl Query {
  /// Create a query for `key`. The key counts as observed from here on.
  pub fn new<F, Fut>(cache: &QueryCache, key: QueryKey, fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
  {
    Self {
      cache: cache.clone(),
      fetcher: Arc::new(move || fetcher().boxed()),
      options: ReadOptions::default(),
      observer: cache.observe(&key),
    }
  }

  pub fn with_options(mut self, options: ReadOptions) -> Self {
    self.options = options;
    self
  }

  pub fn key(&self) -> &QueryKey {
    self.observer.key()
  }

  /// Read through the cache, fetching when needed.
  pub async fn read(&self) -> Snapshot {
    let fetcher = Arc::clone(&self.fetcher);
    self
      .cache
      .read(self.key(), move || fetcher(), self.options)
      .await
  }

  /// Force a new fetch, clearing a cached error.
  pub async fn refetch(&self) -> Snapshot {
    let fetcher = Arc::clone(&self.fetcher);
    self
      .cache
      .refetch(self.key(), move || fetcher(), self.options)
      .await
  }

  /// What the cache holds right now, without fetching.
  pub fn snapshot(&self) -> Option<Snapshot> {
    self.observer.snapshot()
  }
}

impl std::fmt::Debug for Query {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("key", self.key())
      .field("options", &self.options)
      .finish_non_exhaustive()
  }
}
