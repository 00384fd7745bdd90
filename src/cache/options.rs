//! Tunables of the cache engine.

use std::time::Duration;

use crate::domain::EntityKind;

/// Engine-wide defaults. Individual reads and mutations may override the
/// staleness window and retry count.
#[derive(Debug, Clone)]
pub struct CacheConfig {
  /// How long fetched data counts as fresh
  pub stale_time: Duration,
  /// How long an unobserved entry survives
  pub gc_time: Duration,
  /// Extra attempts for failed reads
  pub read_retry: u32,
  /// Extra attempts for failed mutations
  pub mutation_retry: u32,
  /// First retry delay, doubled per attempt
  pub retry_delay: Duration,
}

/// Upper bound of the exponential retry backoff
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_millis(60_000),
      gc_time: Duration::from_millis(300_000),
      read_retry: 1,
      mutation_retry: 0,
      retry_delay: Duration::from_millis(1_000),
    }
  }
}

impl CacheConfig {
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn with_gc_time(mut self, gc_time: Duration) -> Self {
    self.gc_time = gc_time;
    self
  }

  pub fn with_read_retry(mut self, retries: u32) -> Self {
    self.read_retry = retries;
    self
  }

  pub fn with_mutation_retry(mut self, retries: u32) -> Self {
    self.mutation_retry = retries;
    self
  }

  pub fn with_retry_delay(mut self, delay: Duration) -> Self {
    self.retry_delay = delay;
    self
  }

  /// Delay before retry number `attempt` (0-based).
  pub fn backoff(&self, attempt: u32) -> Duration {
    self
      .retry_delay
      .saturating_mul(2u32.saturating_pow(attempt))
      .min(MAX_RETRY_DELAY)
  }
}

/// Per-read overrides
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
  pub stale_time: Option<Duration>,
  pub retry_count: Option<u32>,
}

impl ReadOptions {
  pub fn stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = Some(stale_time);
    self
  }

  pub fn retry_count(mut self, retries: u32) -> Self {
    self.retry_count = Some(retries);
    self
  }
}

/// How a mutation result's status is checked against the lifecycle tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleGuard {
  /// The entity exists; `from` is `expected_from`, falling back to the
  /// status in the cached entry
  Transition {
    kind: EntityKind,
    expected_from: Option<String>,
  },
  /// The entity is being created; its status must be an initial one
  Creation { kind: EntityKind },
}

impl LifecycleGuard {
  pub fn transition(kind: EntityKind) -> Self {
    Self::Transition {
      kind,
      expected_from: None,
    }
  }

  pub fn transition_from(kind: EntityKind, from: impl Into<String>) -> Self {
    Self::Transition {
      kind,
      expected_from: Some(from.into()),
    }
  }

  pub fn creation(kind: EntityKind) -> Self {
    Self::Creation { kind }
  }

  pub fn kind(&self) -> EntityKind {
    match self {
      Self::Transition { kind, .. } | Self::Creation { kind } => *kind,
    }
  }
}

/// Per-mutation settings
#[derive(Debug, Clone, Default)]
pub struct MutationOptions {
  pub retry_count: Option<u32>,
  pub guard: Option<LifecycleGuard>,
}

impl MutationOptions {
  pub fn guarded(guard: LifecycleGuard) -> Self {
    Self {
      guard: Some(guard),
      ..Self::default()
    }
  }

  pub fn retry_count(mut self, retries: u32) -> Self {
    self.retry_count = Some(retries);
    self
  }
}
