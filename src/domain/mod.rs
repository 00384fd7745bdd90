//! Back-office domain: entity models, status lifecycles and derived views.

pub mod calendar;
pub mod lifecycle;
pub mod models;

pub use calendar::{AppointmentCategory, CalendarEvent};
pub use lifecycle::{
  is_initial_status, is_valid_transition, AppointmentStatus, EntityKind, Lifecycle, OrderStatus,
  RequestStatus, StockStatus,
};
pub use models::{
  Appointment, ApprovalRequest, Availability, DashboardCounters, Employee, Order, StockItem,
};
