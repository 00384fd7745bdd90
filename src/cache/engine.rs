//! The cache & synchronization engine.
//!
//! Owns every cache entry. Reads are deduplicated per key through a shared
//! future, served stale-while-revalidate once they age out, and refetched
//! before being served once a mutation has invalidated them. Mutation results
//! are checked against the lifecycle tables before they are cached.
//!
//! The entry map sits behind a mutex that is never held across an await.
//! Ordering between concurrent fetches and invalidations is kept with fetch
//! ids and per-entry invalidation epochs instead.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::entry::{EntryStatus, Snapshot};
use super::key::{Invalidation, QueryKey};
use super::options::{CacheConfig, LifecycleGuard, MutationOptions, ReadOptions};
use crate::domain::{is_initial_status, is_valid_transition};
use crate::error::{Result, SyncError};

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Value>>>>;

struct Slot {
  data: Option<Arc<Value>>,
  error: Option<SyncError>,
  fetched_at: Option<Instant>,
  fetched_wall: Option<DateTime<Utc>>,
  stale_time: Duration,
  /// Marked stale by a mutation; the next read waits for a refetch
  invalidated: bool,
  /// Bumped on every invalidation
  epoch: u64,
  /// Id of the newest fetch or mutation whose outcome is in this slot
  applied: u64,
  in_flight: Option<(u64, SharedFetch)>,
  observers: usize,
  idle_since: Option<Instant>,
}

impl Slot {
  fn new(stale_time: Duration, now: Instant, floor: u64) -> Self {
    Self {
      data: None,
      error: None,
      fetched_at: None,
      fetched_wall: None,
      stale_time,
      invalidated: false,
      epoch: 0,
      applied: floor,
      in_flight: None,
      observers: 0,
      idle_since: Some(now),
    }
  }

  fn status(&self, now: Instant) -> EntryStatus {
    if self.error.is_some() {
      return EntryStatus::Error;
    }
    if self.data.is_none() {
      return if self.in_flight.is_some() {
        EntryStatus::Fetching
      } else {
        EntryStatus::Stale
      };
    }
    let aged = self
      .fetched_at
      .map_or(true, |at| now.duration_since(at) >= self.stale_time);
    if self.invalidated || aged {
      EntryStatus::Stale
    } else {
      EntryStatus::Fresh
    }
  }

  /// Usable data that only needs a background refresh.
  fn serves_while_revalidating(&self) -> bool {
    self.data.is_some() && !self.invalidated
  }

  fn is_expired(&self, gc_time: Duration, now: Instant) -> bool {
    self.observers == 0
      && self
        .idle_since
        .is_some_and(|since| now.duration_since(since) >= gc_time)
  }

  fn invalidate(&mut self) {
    self.epoch += 1;
    self.invalidated = true;
    // An invalidated error no longer sticks
    self.error = None;
    // A read already running keeps going but no longer stands for this key
    self.in_flight = None;
  }

  fn store(&mut self, data: Arc<Value>, id: u64, now: Instant) {
    self.data = Some(data);
    self.error = None;
    self.fetched_at = Some(now);
    self.fetched_wall = Some(Utc::now());
    self.applied = id;
  }

  fn snapshot(&self, key: &QueryKey, now: Instant) -> Snapshot {
    Snapshot {
      key: key.clone(),
      status: self.status(now),
      data: self.data.clone(),
      error: self.error.clone(),
      fetched_at: self.fetched_wall,
      is_fetching: self.in_flight.is_some(),
    }
  }
}

#[derive(Default)]
struct State {
  entries: HashMap<QueryKey, Slot>,
  mutations: HashMap<QueryKey, usize>,
}

impl State {
  fn slot_mut(&mut self, key: &QueryKey, stale_time: Duration, now: Instant, floor: u64) -> &mut Slot {
    self
      .entries
      .entry(key.clone())
      .or_insert_with(|| Slot::new(stale_time, now, floor))
  }

  fn invalidate(&mut self, targets: &[Invalidation], skip: Option<&QueryKey>) -> usize {
    let mut count = 0;
    for (key, slot) in self.entries.iter_mut() {
      if skip == Some(key) {
        continue;
      }
      if targets.iter().any(|t| t.matches(key)) {
        slot.invalidate();
        count += 1;
      }
    }
    count
  }
}

struct Inner {
  config: CacheConfig,
  state: Mutex<State>,
  last_id: AtomicU64,
}

impl Inner {
  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn next_id(&self) -> u64 {
    self.last_id.fetch_add(1, Ordering::SeqCst) + 1
  }

  /// Ids at or below this belong to work started before "now".
  fn floor(&self) -> u64 {
    self.last_id.load(Ordering::SeqCst)
  }

  fn attach(&self, key: &QueryKey) {
    let mut state = self.lock();
    let now = Instant::now();
    let expired = state
      .entries
      .get(key)
      .is_some_and(|slot| slot.is_expired(self.config.gc_time, now));
    if expired {
      debug!(key = %key, "dropping expired entry before reuse");
      state.entries.remove(key);
    }
    let slot = state.slot_mut(key, self.config.stale_time, now, self.floor());
    slot.observers += 1;
    slot.idle_since = None;
  }

  fn detach(&self, key: &QueryKey) {
    let mut state = self.lock();
    if let Some(slot) = state.entries.get_mut(key) {
      slot.observers = slot.observers.saturating_sub(1);
      if slot.observers == 0 {
        slot.idle_since = Some(Instant::now());
      }
    }
  }

  /// Apply the outcome of fetch `id`, started at invalidation `epoch`.
  fn complete(&self, key: &QueryKey, id: u64, epoch: u64, result: &Result<Arc<Value>>) {
    let mut state = self.lock();
    let Some(slot) = state.entries.get_mut(key) else {
      debug!(key = %key, fetch_id = id, "entry evicted while fetching, result discarded");
      return;
    };
    if matches!(&slot.in_flight, Some((current, _)) if *current == id) {
      slot.in_flight = None;
    }
    if slot.observers == 0 {
      debug!(key = %key, fetch_id = id, "no observer left, result discarded");
      return;
    }
    if id < slot.applied {
      debug!(key = %key, fetch_id = id, "newer data already applied, result discarded");
      return;
    }

    match result {
      Ok(data) => {
        slot.store(Arc::clone(data), id, Instant::now());
        // Data fetched before an invalidation is served once but stays stale
        slot.invalidated = slot.epoch != epoch;
        debug!(key = %key, fetch_id = id, stale = slot.invalidated, "fetch applied");
      }
      Err(e) => {
        warn!(key = %key, fetch_id = id, error = %e, "fetch failed");
        slot.error = Some(e.clone());
        slot.applied = id;
      }
    }
  }

  fn collect_garbage(&self) -> usize {
    let mut state = self.lock();
    let now = Instant::now();
    let gc_time = self.config.gc_time;
    let before = state.entries.len();
    state
      .entries
      .retain(|_, slot| !slot.is_expired(gc_time, now));
    let removed = before - state.entries.len();
    if removed > 0 {
      info!(removed, "garbage-collected idle cache entries");
    }
    removed
  }
}

/// Registration of a live consumer of one key. Dropping it unregisters.
pub struct Observer {
  inner: Arc<Inner>,
  key: QueryKey,
}

impl Observer {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }

  pub fn snapshot(&self) -> Option<Snapshot> {
    let state = self.inner.lock();
    state
      .entries
      .get(&self.key)
      .map(|slot| slot.snapshot(&self.key, Instant::now()))
  }
}

impl Drop for Observer {
  fn drop(&mut self) {
    self.inner.detach(&self.key);
  }
}

impl std::fmt::Debug for Observer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Observer").field("key", &self.key).finish()
  }
}

/// Decrements the pending-mutation count even if the caller drops the future.
struct PendingMutation<'a> {
  inner: &'a Inner,
  key: &'a QueryKey,
}

impl<'a> PendingMutation<'a> {
  fn begin(inner: &'a Inner, key: &'a QueryKey) -> Self {
    *inner.lock().mutations.entry(key.clone()).or_default() += 1;
    Self { inner, key }
  }
}

impl Drop for PendingMutation<'_> {
  fn drop(&mut self) {
    let mut state = self.inner.lock();
    if let Some(count) = state.mutations.get_mut(self.key) {
      *count = count.saturating_sub(1);
      if *count == 0 {
        state.mutations.remove(self.key);
      }
    }
  }
}

/// Keyed store of query results. Cloning hands out another handle on the
/// same store.
#[derive(Clone)]
pub struct QueryCache {
  inner: Arc<Inner>,
}

impl Default for QueryCache {
  fn default() -> Self {
    Self::new(CacheConfig::default())
  }
}

impl QueryCache {
  pub fn new(config: CacheConfig) -> Self {
    Self {
      inner: Arc::new(Inner {
        config,
        state: Mutex::new(State::default()),
        last_id: AtomicU64::new(0),
      }),
    }
  }

  pub fn config(&self) -> &CacheConfig {
    &self.inner.config
  }

  /// Register a consumer of `key`. Observed entries are never evicted.
  pub fn observe(&self, key: &QueryKey) -> Observer {
    self.inner.attach(key);
    Observer {
      inner: Arc::clone(&self.inner),
      key: key.clone(),
    }
  }

  /// Current state of `key` without triggering any fetch.
  pub fn snapshot(&self, key: &QueryKey) -> Option<Snapshot> {
    let state = self.inner.lock();
    state
      .entries
      .get(key)
      .map(|slot| slot.snapshot(key, Instant::now()))
  }

  /// Read `key`, fetching when there is nothing usable.
  ///
  /// - fresh data is returned as is
  /// - aged data is returned immediately while a background fetch replaces it
  /// - missing or invalidated data waits for a fetch
  /// - an entry in error is returned without any network attempt
  ///
  /// Concurrent reads of one key share a single fetch.
  pub async fn read<F, Fut>(&self, key: &QueryKey, fetcher: F, options: ReadOptions) -> Snapshot
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
  {
    let _observer = self.observe(key);
    let retries = options.retry_count.unwrap_or(self.inner.config.read_retry);

    let pending = {
      let mut state = self.inner.lock();
      let now = Instant::now();
      let slot = state.slot_mut(key, self.inner.config.stale_time, now, self.inner.floor());
      if let Some(stale_time) = options.stale_time {
        slot.stale_time = stale_time;
      }

      match slot.status(now) {
        EntryStatus::Error => {
          debug!(key = %key, "serving cached error");
          None
        }
        _ if slot.in_flight.is_some() => {
          if slot.serves_while_revalidating() {
            None
          } else {
            debug!(key = %key, "joining in-flight fetch");
            slot.in_flight.as_ref().map(|(_, fetch)| fetch.clone())
          }
        }
        EntryStatus::Fresh => {
          debug!(key = %key, "cache hit");
          None
        }
        EntryStatus::Stale if slot.serves_while_revalidating() => {
          debug!(key = %key, "serving stale data, refreshing in background");
          let _ = self.start_fetch(slot, key, fetcher, retries, true);
          None
        }
        EntryStatus::Stale | EntryStatus::Fetching => {
          Some(self.start_fetch(slot, key, fetcher, retries, false))
        }
      }
    };

    if let Some(fetch) = pending {
      // The outcome lands in the entry; the snapshot below reports it
      let _ = fetch.await;
    }
    self.snapshot_or_empty(key)
  }

  /// Fetch `key` again no matter its state, clearing a cached error. Joins a
  /// fetch that is already running instead of starting a second one.
  pub async fn refetch<F, Fut>(&self, key: &QueryKey, fetcher: F, options: ReadOptions) -> Snapshot
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
  {
    let _observer = self.observe(key);
    let retries = options.retry_count.unwrap_or(self.inner.config.read_retry);

    let fetch = {
      let mut state = self.inner.lock();
      let now = Instant::now();
      let slot = state.slot_mut(key, self.inner.config.stale_time, now, self.inner.floor());
      if let Some(stale_time) = options.stale_time {
        slot.stale_time = stale_time;
      }
      match &slot.in_flight {
        Some((_, fetch)) => fetch.clone(),
        None => {
          slot.error = None;
          self.start_fetch(slot, key, fetcher, retries, false)
        }
      }
    };

    let _ = fetch.await;
    self.snapshot_or_empty(key)
  }

  /// Run a mutation against the backend.
  ///
  /// On success the result is stored under `key` (after the lifecycle guard,
  /// if any, accepted it) and every entry matching `invalidates` is marked
  /// stale. On failure nothing in the cache changes and the error is returned
  /// as is.
  pub async fn mutate<F, Fut>(
    &self,
    key: &QueryKey,
    mutation: F,
    invalidates: &[Invalidation],
    options: MutationOptions,
  ) -> Result<Arc<Value>>
  where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Value>>,
  {
    let retries = options
      .retry_count
      .unwrap_or(self.inner.config.mutation_retry);

    let outcome = {
      let _pending = PendingMutation::begin(&self.inner, key);
      with_retries(&self.inner.config, retries, key, mutation).await
    };
    let value = Arc::new(outcome?);

    let mut state = self.inner.lock();
    let now = Instant::now();
    let stale_time = self.inner.config.stale_time;
    let floor = self.inner.floor();

    if let Some(guard) = &options.guard {
      let cached_from = state
        .entries
        .get(key)
        .and_then(|slot| slot.data.as_deref())
        .and_then(status_of)
        .map(String::from);

      if let Err(violation) = check_guard(guard, cached_from.as_deref(), &value) {
        warn!(key = %key, error = %violation, "mutation result rejected by lifecycle rules");
        let id = self.inner.next_id();
        let slot = state.slot_mut(key, stale_time, now, floor);
        slot.error = Some(violation.clone());
        slot.applied = id;
        return Err(violation);
      }
    }

    let stored = if value.is_null() {
      // Nothing to cache (e.g. a delete); the entry itself is now outdated
      if let Some(slot) = state.entries.get_mut(key) {
        slot.invalidate();
      }
      false
    } else {
      let id = self.inner.next_id();
      let slot = state.slot_mut(key, stale_time, now, floor);
      slot.store(Arc::clone(&value), id, now);
      slot.invalidated = false;
      true
    };

    let count = state.invalidate(invalidates, stored.then_some(key));
    info!(key = %key, invalidated = count, "mutation applied");

    Ok(value)
  }

  /// Mark matching entries stale. Returns how many were hit.
  pub fn invalidate(&self, targets: &[Invalidation]) -> usize {
    let count = self.inner.lock().invalidate(targets, None);
    info!(invalidated = count, "cache entries invalidated");
    count
  }

  /// Remove every unobserved entry whose key matches `predicate`.
  pub fn evict(&self, predicate: impl Fn(&QueryKey) -> bool) -> usize {
    let mut state = self.inner.lock();
    let before = state.entries.len();
    state
      .entries
      .retain(|key, slot| slot.observers > 0 || !predicate(key));
    let removed = before - state.entries.len();
    info!(removed, "cache entries evicted");
    removed
  }

  /// Evict entries nobody has observed for the garbage-collection window.
  pub fn collect_garbage(&self) -> usize {
    self.inner.collect_garbage()
  }

  /// Sweep idle entries periodically. The task ends once every handle on
  /// this cache is gone.
  pub fn spawn_gc(&self) -> JoinHandle<()> {
    let inner = Arc::downgrade(&self.inner);
    let period = (self.inner.config.gc_time / 4).max(Duration::from_secs(1));

    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(period);
      loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
          break;
        };
        inner.collect_garbage();
      }
    })
  }

  /// Mutations currently running for `key`.
  pub fn pending_mutations(&self, key: &QueryKey) -> usize {
    self.inner.lock().mutations.get(key).copied().unwrap_or(0)
  }

  pub fn len(&self) -> usize {
    self.inner.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn snapshot_or_empty(&self, key: &QueryKey) -> Snapshot {
    self.snapshot(key).unwrap_or_else(|| Snapshot {
      key: key.clone(),
      status: EntryStatus::Stale,
      data: None,
      error: None,
      fetched_at: None,
      is_fetching: false,
    })
  }

  /// Spawn a fetch for `key`. A background fetch observes the key itself, so
  /// its result lands even after the reader that triggered it has returned.
  fn start_fetch<F, Fut>(
    &self,
    slot: &mut Slot,
    key: &QueryKey,
    fetcher: F,
    retries: u32,
    background: bool,
  ) -> SharedFetch
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
  {
    let id = self.inner.next_id();
    let epoch = slot.epoch;
    let inner = Arc::downgrade(&self.inner);
    let config = self.inner.config.clone();
    let fetch_key = key.clone();

    // The slot is already locked here, so register the observer by hand
    let holder = background.then(|| {
      slot.observers += 1;
      slot.idle_since = None;
      Observer {
        inner: Arc::clone(&self.inner),
        key: key.clone(),
      }
    });

    let fetch = async move {
      let result = with_retries(&config, retries, &fetch_key, fetcher)
        .await
        .map(Arc::new);
      if let Some(inner) = inner.upgrade() {
        inner.complete(&fetch_key, id, epoch, &result);
      }
      drop(holder);
      result
    }
    .boxed()
    .shared();

    slot.in_flight = Some((id, fetch.clone()));
    // The network call always runs to completion, even if every reader goes away
    tokio::spawn(fetch.clone());
    debug!(key = %key, fingerprint = %key.fingerprint(), fetch_id = id, "fetch started");
    fetch
  }
}

async fn with_retries<F, Fut>(config: &CacheConfig, retries: u32, key: &QueryKey, op: F) -> Result<Value>
where
  F: Fn() -> Fut,
  Fut: Future<Output = Result<Value>>,
{
  let mut attempt = 0;
  loop {
    match op().await {
      Ok(value) => return Ok(value),
      Err(e) if e.is_retryable() && attempt < retries => {
        let delay = config.backoff(attempt);
        warn!(key = %key, attempt = attempt + 1, ?delay, error = %e, "retrying");
        tokio::time::sleep(delay).await;
        attempt += 1;
      }
      Err(e) => return Err(e),
    }
  }
}

fn status_of(value: &Value) -> Option<&str> {
  value.get("status").and_then(Value::as_str)
}

fn check_guard(guard: &LifecycleGuard, cached_from: Option<&str>, result: &Value) -> Result<()> {
  let Some(to) = status_of(result) else {
    return Ok(());
  };

  match guard {
    LifecycleGuard::Creation { kind } => {
      if is_initial_status(*kind, to) {
        Ok(())
      } else {
        Err(SyncError::DomainInvariantViolation {
          kind: *kind,
          from: String::from("(new)"),
          to: to.to_string(),
        })
      }
    }
    LifecycleGuard::Transition {
      kind,
      expected_from,
    } => {
      let Some(from) = expected_from.as_deref().or(cached_from) else {
        debug!(%kind, to, "no known prior status, transition not checked");
        return Ok(());
      };
      if from == to || is_valid_transition(*kind, from, to) {
        Ok(())
      } else {
        Err(SyncError::DomainInvariantViolation {
          kind: *kind,
          from: from.to_string(),
          to: to.to_string(),
        })
      }
    }
  }
}
