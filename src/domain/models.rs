//! Typed views of the payloads the backend returns.
//!
//! The resource client hands out raw JSON; these types are what collaborators
//! decode cache snapshots into.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::calendar::AppointmentCategory;
use super::lifecycle::{AppointmentStatus, OrderStatus, RequestStatus, StockStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
  pub id: u64,
  pub name: String,
  /// Brazilian taxpayer id, digits only
  pub cpf: String,
  pub role: Option<String>,
  pub phone: Option<String>,
  #[serde(default = "default_true")]
  pub active: bool,
}

/// Free slots of an employee on a given day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
  pub date: NaiveDate,
  #[serde(default)]
  pub slots: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
  pub id: u64,
  pub client_name: String,
  pub employee_id: Option<u64>,
  pub scheduled_at: NaiveDateTime,
  pub category: AppointmentCategory,
  pub status: AppointmentStatus,
  pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: u64,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub total: f64,
  pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
  pub id: u64,
  #[serde(default)]
  pub requester: String,
  #[serde(default)]
  pub subject: String,
  pub status: RequestStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockItem {
  pub id: u64,
  pub name: String,
  #[serde(default)]
  pub quantity: i64,
  #[serde(default)]
  pub min_quantity: i64,
  pub status: StockStatus,
}

/// Aggregate counters shown on the dashboard landing page
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardCounters {
  pub critical_stock: u64,
  pub today_appointments: u64,
  /// Fraction of bookable slots taken today, 0.0..=1.0
  pub occupancy_rate: f64,
  pub future_appointments: u64,
}

/// Read a counter endpoint payload: a bare number or `{"count": n}`.
pub fn counter_value(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::Object(map) => ["count", "value", "total", "rate"]
      .iter()
      .find_map(|field| map.get(*field).and_then(Value::as_f64)),
    _ => None,
  }
}

fn default_true() -> bool {
  true
}
