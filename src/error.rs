//! Error taxonomy for the synchronization layer.
//!
//! Errors are `Clone` because a single shared fetch hands the same outcome to
//! every reader that joined it, and the cache keeps the last error of an entry.

use std::fmt;

use crate::domain::EntityKind;

/// How a request failed below the HTTP status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
  /// The transport gave up waiting for the backend
  Timeout,
  /// Connection refused, DNS failure, reset, ...
  Network,
  /// The backend answered with a non-2xx status other than 401
  Status(u16),
  /// A 2xx body that is not valid JSON
  Decode,
}

impl fmt::Display for TransportFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Timeout => write!(f, "timeout"),
      Self::Network => write!(f, "network error"),
      Self::Status(code) => write!(f, "HTTP {}", code),
      Self::Decode => write!(f, "undecodable response"),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
  #[error("transport error ({failure}): {message}")]
  Transport {
    failure: TransportFailure,
    message: String,
  },

  #[error("unauthorized: the session credential was rejected")]
  Unauthorized,

  #[error("{kind} cannot move from {from} to {to}")]
  DomainInvariantViolation {
    kind: EntityKind,
    from: String,
    to: String,
  },

  #[error("invalid request: {0}")]
  Validation(String),
}

impl SyncError {
  pub fn transport(failure: TransportFailure, message: impl Into<String>) -> Self {
    Self::Transport {
      failure,
      message: message.into(),
    }
  }

  pub fn validation(message: impl Into<String>) -> Self {
    Self::Validation(message.into())
  }

  /// HTTP status attached to the failure, if the backend answered at all.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Transport {
        failure: TransportFailure::Status(code),
        ..
      } => Some(*code),
      Self::Unauthorized => Some(401),
      _ => None,
    }
  }

  /// Only transport failures are worth another attempt.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Transport { .. })
  }
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
