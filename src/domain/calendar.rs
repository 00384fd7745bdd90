//! Calendar projection of appointments.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::lifecycle::AppointmentStatus;
use super::models::Appointment;

/// What an appointment is booked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentCategory {
  /// Visit to produce a quote
  #[serde(rename = "ORCAMENTO")]
  Quote,
  /// The service itself
  #[serde(rename = "SERVICO")]
  Service,
}

impl AppointmentCategory {
  /// Fixed display color of the category.
  pub fn color(self) -> &'static str {
    match self {
      Self::Quote => "#f59e0b",
      Self::Service => "#3b82f6",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Self::Quote => "ORCAMENTO",
      Self::Service => "SERVICO",
    }
  }
}

/// One entry on the calendar
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEvent {
  pub id: u64,
  pub title: String,
  pub start: NaiveDateTime,
  pub color: &'static str,
  pub status: AppointmentStatus,
}

impl From<&Appointment> for CalendarEvent {
  fn from(appointment: &Appointment) -> Self {
    Self {
      id: appointment.id,
      title: format!(
        "{} ({})",
        appointment.client_name,
        appointment.category.label()
      ),
      start: appointment.scheduled_at,
      color: appointment.category.color(),
      status: appointment.status,
    }
  }
}

/// Project appointments onto the calendar, optionally keeping a single day,
/// in chronological order.
pub fn project(appointments: &[Appointment], day: Option<NaiveDate>) -> Vec<CalendarEvent> {
  let mut events: Vec<CalendarEvent> = appointments
    .iter()
    .filter(|a| day.map_or(true, |d| a.scheduled_at.date() == d))
    .map(CalendarEvent::from)
    .collect();
  events.sort_by_key(|e| e.start);
  events
}
