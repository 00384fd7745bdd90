//! The backend collections the console consumes.

use crate::http::AccessPipeline;

use super::resource::{CustomQuery, ResourceClient};

// Custom query names
pub const ACTIVE: &str = "active";
pub const BY_CPF: &str = "by_cpf";
pub const AVAILABILITY: &str = "availability";
pub const BY_DATE: &str = "by_date";
pub const FUTURE: &str = "future";
pub const CRITICAL: &str = "critical";
pub const CRITICAL_STOCK_COUNT: &str = "critical_stock_count";
pub const TODAY_APPOINTMENTS: &str = "today_appointments";
pub const OCCUPANCY_RATE: &str = "occupancy_rate";
pub const FUTURE_APPOINTMENTS_COUNT: &str = "future_appointments_count";
pub const FUTURE_APPOINTMENTS: &str = "future_appointments";
pub const CRITICAL_STOCK: &str = "critical_stock";

/// One client per backend collection, all sharing a pipeline.
#[derive(Debug, Clone)]
pub struct Resources {
  pub employees: ResourceClient,
  pub appointments: ResourceClient,
  pub orders: ResourceClient,
  pub requests: ResourceClient,
  pub stock: ResourceClient,
  pub dashboard: ResourceClient,
}

impl Resources {
  pub fn new(pipeline: &AccessPipeline) -> Self {
    let employees = ResourceClient::new(pipeline.clone(), "employees", "/employees")
      .with_query(CustomQuery::new(ACTIVE, "").with_param("active", "true"))
      .with_query(CustomQuery::new(BY_CPF, "/cpf/{cpf}"))
      .with_query(CustomQuery::new(AVAILABILITY, "/{id}/availability"));

    let appointments = ResourceClient::new(pipeline.clone(), "appointments", "/appointments")
      .with_query(CustomQuery::new(BY_DATE, "/date/{date}"))
      .with_query(CustomQuery::new(FUTURE, "/future"));

    let orders = ResourceClient::new(pipeline.clone(), "orders", "/orders");
    let requests = ResourceClient::new(pipeline.clone(), "requests", "/requests");

    let stock = ResourceClient::new(pipeline.clone(), "stock", "/stock")
      .with_query(CustomQuery::new(CRITICAL, "/critical"));

    let dashboard = ResourceClient::new(pipeline.clone(), "dashboard", "/dashboard")
      .with_query(CustomQuery::new(CRITICAL_STOCK_COUNT, "/critical-stock/count"))
      .with_query(CustomQuery::new(TODAY_APPOINTMENTS, "/appointments/today/count"))
      .with_query(CustomQuery::new(OCCUPANCY_RATE, "/occupancy-rate"))
      .with_query(CustomQuery::new(FUTURE_APPOINTMENTS_COUNT, "/appointments/future/count"))
      .with_query(CustomQuery::new(FUTURE_APPOINTMENTS, "/appointments/future"))
      .with_query(CustomQuery::new(CRITICAL_STOCK, "/critical-stock"));

    Self {
      employees,
      appointments,
      orders,
      requests,
      stock,
      dashboard,
    }
  }

  pub fn all(&self) -> [&ResourceClient; 6] {
    [
      &self.employees,
      &self.appointments,
      &self.orders,
      &self.requests,
      &self.stock,
      &self.dashboard,
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::Session;
  use crate::testing::MockTransport;

  #[test]
  fn test_catalogue() {
    let pipeline = AccessPipeline::new(MockTransport::new(), Session::in_memory());
    let resources = Resources::new(&pipeline);

    let names: Vec<&str> = resources.all().iter().map(|r| r.name()).collect();
    assert_eq!(
      names,
      vec!["employees", "appointments", "orders", "requests", "stock", "dashboard"]
    );
    assert_eq!(
      resources.employees.custom_query(AVAILABILITY).unwrap().placeholders(),
      vec!["id"]
    );
    for name in [
      CRITICAL_STOCK_COUNT,
      TODAY_APPOINTMENTS,
      OCCUPANCY_RATE,
      FUTURE_APPOINTMENTS_COUNT,
      FUTURE_APPOINTMENTS,
      CRITICAL_STOCK,
    ] {
      assert!(resources.dashboard.custom_query(name).is_some(), "{}", name);
    }
  }
}
