//! Read-only views of cache entries handed to collaborators.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use super::key::QueryKey;
use crate::error::{Result, SyncError, TransportFailure};

/// Where an entry stands relative to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  /// First fetch still running, no data yet
  Fetching,
  /// Data within its staleness window
  Fresh,
  /// Data served but due for a refetch (aged out or invalidated)
  Stale,
  /// Last fetch failed; kept until an explicit refetch
  Error,
}

/// Point-in-time copy of one cache entry.
#[derive(Debug, Clone)]
pub struct Snapshot {
  pub key: QueryKey,
  pub status: EntryStatus,
  /// Last successfully fetched data, also kept while in `Error`
  pub data: Option<Arc<Value>>,
  pub error: Option<SyncError>,
  /// Wall-clock time of the fetch that produced `data`
  pub fetched_at: Option<DateTime<Utc>>,
  /// A fetch for this key is running right now
  pub is_fetching: bool,
}

impl Snapshot {
  pub fn is_fresh(&self) -> bool {
    self.status == EntryStatus::Fresh
  }

  pub fn is_stale(&self) -> bool {
    self.status == EntryStatus::Stale
  }

  pub fn is_error(&self) -> bool {
    self.status == EntryStatus::Error
  }

  pub fn data(&self) -> Option<&Value> {
    self.data.as_deref()
  }

  /// The data, or the error that stands in its place.
  pub fn into_result(self) -> Result<Arc<Value>> {
    if let Some(error) = self.error {
      return Err(error);
    }
    self.data.ok_or_else(|| {
      SyncError::transport(
        TransportFailure::Network,
        format!("no data available for {}", self.key),
      )
    })
  }

  /// Deserialize the data into a typed model.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
    let data = self.clone().into_result()?;
    T::deserialize(data.as_ref()).map_err(|e| {
      SyncError::transport(
        TransportFailure::Decode,
        format!("unexpected payload for {}: {}", self.key, e),
      )
    })
  }
}
