//! Status lifecycles of the back-office entities.
//!
//! Every entity kind has a closed set of statuses and a transition table kept
//! as data. Nothing outside this module decides which moves are legal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity kinds that carry a lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  Appointment,
  Order,
  /// Approval request
  Request,
  StockItem,
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Appointment => "appointment",
      Self::Order => "order",
      Self::Request => "request",
      Self::StockItem => "stock item",
    };
    f.write_str(name)
  }
}

/// A status enumeration paired with its transition table.
pub trait Lifecycle: Copy + Eq + fmt::Debug + 'static {
  const KIND: EntityKind;
  /// Every status of the kind
  const ALL: &'static [Self];
  /// Statuses a freshly created entity may carry
  const INITIAL: &'static [Self];
  /// `(from, allowed to-statuses)`; a status missing here is terminal
  const TRANSITIONS: &'static [(Self, &'static [Self])];

  /// Wire representation, as the backend spells it.
  fn as_str(self) -> &'static str;

  fn parse(s: &str) -> Option<Self> {
    Self::ALL.iter().copied().find(|status| status.as_str() == s)
  }

  fn allowed_next(self) -> &'static [Self] {
    Self::TRANSITIONS
      .iter()
      .find(|(from, _)| *from == self)
      .map(|(_, to)| *to)
      .unwrap_or(&[])
  }

  fn can_transition_to(self, next: Self) -> bool {
    self.allowed_next().contains(&next)
  }

  fn is_terminal(self) -> bool {
    self.allowed_next().is_empty()
  }

  fn is_initial(self) -> bool {
    Self::INITIAL.contains(&self)
  }
}

// ============================================================================
// Appointment
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
  Pending,
  Confirmed,
  Canceled,
  Completed,
}

impl Lifecycle for AppointmentStatus {
  const KIND: EntityKind = EntityKind::Appointment;
  const ALL: &'static [Self] = &[
    Self::Pending,
    Self::Confirmed,
    Self::Canceled,
    Self::Completed,
  ];
  const INITIAL: &'static [Self] = &[Self::Pending];
  const TRANSITIONS: &'static [(Self, &'static [Self])] = &[
    (Self::Pending, &[Self::Confirmed, Self::Canceled]),
    (Self::Confirmed, &[Self::Completed, Self::Canceled]),
  ];

  fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "PENDING",
      Self::Confirmed => "CONFIRMED",
      Self::Canceled => "CANCELED",
      Self::Completed => "COMPLETED",
    }
  }
}

// ============================================================================
// Order
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
  Open,
  InProgress,
  Completed,
  Canceled,
}

impl Lifecycle for OrderStatus {
  const KIND: EntityKind = EntityKind::Order;
  const ALL: &'static [Self] = &[
    Self::Open,
    Self::InProgress,
    Self::Completed,
    Self::Canceled,
  ];
  const INITIAL: &'static [Self] = &[Self::Open];
  const TRANSITIONS: &'static [(Self, &'static [Self])] = &[
    (Self::Open, &[Self::InProgress, Self::Canceled]),
    (Self::InProgress, &[Self::Completed, Self::Canceled]),
  ];

  fn as_str(self) -> &'static str {
    match self {
      Self::Open => "OPEN",
      Self::InProgress => "IN_PROGRESS",
      Self::Completed => "COMPLETED",
      Self::Canceled => "CANCELED",
    }
  }
}

// ============================================================================
// Approval request
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
  Pending,
  Accepted,
  Rejected,
}

impl Lifecycle for RequestStatus {
  const KIND: EntityKind = EntityKind::Request;
  const ALL: &'static [Self] = &[Self::Pending, Self::Accepted, Self::Rejected];
  const INITIAL: &'static [Self] = &[Self::Pending];
  const TRANSITIONS: &'static [(Self, &'static [Self])] =
    &[(Self::Pending, &[Self::Accepted, Self::Rejected])];

  fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "PENDING",
      Self::Accepted => "ACCEPTED",
      Self::Rejected => "REJECTED",
    }
  }
}

// ============================================================================
// Stock item
// ============================================================================

/// Stock status follows the quantity on hand, so it cycles and never ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
  Active,
  Inactive,
  Critical,
}

impl Lifecycle for StockStatus {
  const KIND: EntityKind = EntityKind::StockItem;
  const ALL: &'static [Self] = &[Self::Active, Self::Inactive, Self::Critical];
  const INITIAL: &'static [Self] = &[Self::Active, Self::Inactive, Self::Critical];
  const TRANSITIONS: &'static [(Self, &'static [Self])] = &[
    (Self::Active, &[Self::Critical]),
    (Self::Critical, &[Self::Active, Self::Inactive]),
    (Self::Inactive, &[Self::Critical]),
  ];

  fn as_str(self) -> &'static str {
    match self {
      Self::Active => "ACTIVE",
      Self::Inactive => "INACTIVE",
      Self::Critical => "CRITICAL",
    }
  }
}

// ============================================================================
// Kind-erased checks used by the cache engine
// ============================================================================

/// True iff `to` is in the transition table of `kind` for `from`.
///
/// Statuses the kind does not know are never valid.
pub fn is_valid_transition(kind: EntityKind, from: &str, to: &str) -> bool {
  match kind {
    EntityKind::Appointment => check_transition::<AppointmentStatus>(from, to),
    EntityKind::Order => check_transition::<OrderStatus>(from, to),
    EntityKind::Request => check_transition::<RequestStatus>(from, to),
    EntityKind::StockItem => check_transition::<StockStatus>(from, to),
  }
}

/// True iff a newly created entity of `kind` may carry `status`.
pub fn is_initial_status(kind: EntityKind, status: &str) -> bool {
  match kind {
    EntityKind::Appointment => check_initial::<AppointmentStatus>(status),
    EntityKind::Order => check_initial::<OrderStatus>(status),
    EntityKind::Request => check_initial::<RequestStatus>(status),
    EntityKind::StockItem => check_initial::<StockStatus>(status),
  }
}

fn check_transition<S: Lifecycle>(from: &str, to: &str) -> bool {
  match (S::parse(from), S::parse(to)) {
    (Some(from), Some(to)) => from.can_transition_to(to),
    _ => false,
  }
}

fn check_initial<S: Lifecycle>(status: &str) -> bool {
  S::parse(status).is_some_and(S::is_initial)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_appointment_table() {
    assert!(is_valid_transition(EntityKind::Appointment, "PENDING", "CONFIRMED"));
    assert!(is_valid_transition(EntityKind::Appointment, "PENDING", "CANCELED"));
    assert!(is_valid_transition(EntityKind::Appointment, "CONFIRMED", "COMPLETED"));
    assert!(!is_valid_transition(EntityKind::Appointment, "COMPLETED", "PENDING"));
    assert!(!is_valid_transition(EntityKind::Appointment, "PENDING", "COMPLETED"));
  }

  #[test]
  fn test_order_cancel_is_one_way() {
    assert!(is_valid_transition(EntityKind::Order, "IN_PROGRESS", "CANCELED"));
    assert!(!is_valid_transition(EntityKind::Order, "CANCELED", "IN_PROGRESS"));
    assert!(!is_valid_transition(EntityKind::Order, "COMPLETED", "OPEN"));
  }

  #[test]
  fn test_request_table() {
    assert!(is_valid_transition(EntityKind::Request, "PENDING", "ACCEPTED"));
    assert!(is_valid_transition(EntityKind::Request, "PENDING", "REJECTED"));
    assert!(!is_valid_transition(EntityKind::Request, "ACCEPTED", "REJECTED"));
  }

  #[test]
  fn test_stock_cycles_through_critical() {
    assert!(is_valid_transition(EntityKind::StockItem, "ACTIVE", "CRITICAL"));
    assert!(is_valid_transition(EntityKind::StockItem, "CRITICAL", "INACTIVE"));
    assert!(is_valid_transition(EntityKind::StockItem, "INACTIVE", "CRITICAL"));
    assert!(is_valid_transition(EntityKind::StockItem, "CRITICAL", "ACTIVE"));
    assert!(!is_valid_transition(EntityKind::StockItem, "ACTIVE", "INACTIVE"));
  }

  #[test]
  fn test_terminal_states_have_no_exits() {
    for status in AppointmentStatus::ALL {
      let terminal = matches!(status, AppointmentStatus::Canceled | AppointmentStatus::Completed);
      assert_eq!(status.is_terminal(), terminal, "{:?}", status);
    }
    for status in OrderStatus::ALL {
      let terminal = matches!(status, OrderStatus::Completed | OrderStatus::Canceled);
      assert_eq!(status.is_terminal(), terminal, "{:?}", status);
    }
    assert!(RequestStatus::Accepted.is_terminal());
    assert!(RequestStatus::Rejected.is_terminal());
    assert!(StockStatus::ALL.iter().all(|s| !s.is_terminal()));
  }

  #[test]
  fn test_table_matches_typed_check() {
    for from in OrderStatus::ALL {
      for to in OrderStatus::ALL {
        assert_eq!(
          is_valid_transition(EntityKind::Order, from.as_str(), to.as_str()),
          from.allowed_next().contains(to)
        );
      }
    }
  }

  #[test]
  fn test_unknown_statuses_are_invalid() {
    assert!(!is_valid_transition(EntityKind::Order, "OPEN", "SHIPPED"));
    assert!(!is_valid_transition(EntityKind::Order, "pending", "OPEN"));
  }

  #[test]
  fn test_initial_states() {
    assert!(is_initial_status(EntityKind::Appointment, "PENDING"));
    assert!(!is_initial_status(EntityKind::Appointment, "CONFIRMED"));
    assert!(is_initial_status(EntityKind::Order, "OPEN"));
    assert!(is_initial_status(EntityKind::StockItem, "CRITICAL"));
  }

  #[test]
  fn test_wire_names_match_serde() {
    let json = serde_json::to_string(&OrderStatus::InProgress).unwrap();
    assert_eq!(json, "\"IN_PROGRESS\"");
    assert_eq!(OrderStatus::parse("IN_PROGRESS"), Some(OrderStatus::InProgress));
  }
}
