//! Synchronized client that pairs every resource call with the cache.
//!
//! This wraps the resource clients and the query cache and provides the
//! operations UI collaborators use: reads go through the cache under keys
//! derived from the call, status changes run as guarded mutations that
//! invalidate whatever they make outdated.

use chrono::NaiveDate;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{
  Invalidation, LifecycleGuard, MutationOptions, QueryCache, QueryKey, ReadOptions, Snapshot,
};
use crate::domain::{
  calendar, models::counter_value, Appointment, AppointmentStatus, ApprovalRequest, Availability,
  CalendarEvent, DashboardCounters, Employee, Lifecycle, Order, OrderStatus, RequestStatus,
  StockItem, StockStatus,
};
use crate::error::{Result, SyncError, TransportFailure};
use crate::http::{AccessPipeline, LoginRedirect, Params, Transport};
use crate::query::Query;
use crate::session::Session;

use super::catalog::{self, Resources};
use super::resource::ResourceClient;

/// One read against a resource, in a form that yields both its cache key and
/// its fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceCall {
  List(Params),
  Get(String),
  Query(String, Params),
}

impl ResourceCall {
  pub fn query(name: &str) -> Self {
    Self::Query(name.to_string(), Params::new())
  }

  pub fn key(&self, resource: &ResourceClient) -> QueryKey {
    match self {
      Self::List(params) => resource.list_key(params),
      Self::Get(id) => resource.detail_key(id),
      Self::Query(name, args) => resource.query_key(name, args),
    }
  }

  fn fetcher(
    self,
    resource: &ResourceClient,
  ) -> impl Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync + 'static {
    let resource = resource.clone();
    move || {
      let resource = resource.clone();
      let call = self.clone();
      async move {
        match call {
          Self::List(params) => resource.list(&params).await,
          Self::Get(id) => resource.get(&id).await,
          Self::Query(name, args) => resource.query(&name, &args).await,
        }
      }
      .boxed()
    }
  }
}

/// Evicts session-scoped data when the backend rejects the credential, then
/// hands over to the caller's redirect.
struct SessionTeardown {
  cache: QueryCache,
  next: Arc<dyn LoginRedirect>,
}

impl LoginRedirect for SessionTeardown {
  fn redirect_to_login(&self) {
    let removed = self.cache.evict(|_| true);
    info!(removed, "session torn down");
    self.next.redirect_to_login();
  }
}

#[derive(Clone)]
pub struct SyncClient {
  pipeline: AccessPipeline,
  resources: Resources,
  cache: QueryCache,
}

impl SyncClient {
  pub fn new(
    transport: Arc<dyn Transport>,
    session: Session,
    cache: QueryCache,
    redirect: Arc<dyn LoginRedirect>,
  ) -> Self {
    let teardown = SessionTeardown {
      cache: cache.clone(),
      next: redirect,
    };
    let pipeline = AccessPipeline::new(transport, session).with_redirect(Arc::new(teardown));
    let resources = Resources::new(&pipeline);

    Self {
      pipeline,
      resources,
      cache,
    }
  }

  pub fn resources(&self) -> &Resources {
    &self.resources
  }

  pub fn cache(&self) -> &QueryCache {
    &self.cache
  }

  pub fn is_signed_in(&self) -> bool {
    self.pipeline.is_signed_in()
  }

  /// Start a new session. Nothing cached under an earlier one survives.
  pub fn login(&self, token: &str) -> color_eyre::Result<()> {
    self.cache.evict(|_| true);
    self.pipeline.sign_in(token)
  }

  /// Drop the credential and every unobserved cache entry.
  pub fn logout(&self) -> usize {
    self.pipeline.sign_out();
    let removed = self.cache.evict(|_| true);
    info!(removed, "logged out");
    removed
  }

  /// Observer-bound handle on one read, for collaborators that render it
  /// repeatedly.
  pub fn watch(&self, resource: &ResourceClient, call: ResourceCall) -> Query {
    let key = call.key(resource);
    Query::new(&self.cache, key, call.fetcher(resource))
  }

  /// Read through the cache without decoding.
  pub async fn read(&self, resource: &ResourceClient, call: ResourceCall) -> Snapshot {
    let key = call.key(resource);
    self
      .cache
      .read(&key, call.fetcher(resource), ReadOptions::default())
      .await
  }

  async fn fetch<T: DeserializeOwned>(&self, resource: &ResourceClient, call: ResourceCall) -> Result<T> {
    self.read(resource, call).await.decode()
  }

  // ==========================================================================
  // Employees
  // ==========================================================================

  pub async fn employees(&self, active_only: bool) -> Result<Vec<Employee>> {
    let call = if active_only {
      ResourceCall::query(catalog::ACTIVE)
    } else {
      ResourceCall::List(Params::new())
    };
    self.fetch(&self.resources.employees, call).await
  }

  pub async fn employee(&self, id: u64) -> Result<Employee> {
    self
      .fetch(&self.resources.employees, ResourceCall::Get(id.to_string()))
      .await
  }

  /// Look an employee up by CPF. Punctuation in the input is ignored.
  pub async fn employee_by_cpf(&self, cpf: &str) -> Result<Employee> {
    let digits: String = cpf.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
      return Err(SyncError::validation(format!("'{}' is not a CPF", cpf)));
    }
    let args = Params::from([(String::from("cpf"), digits)]);
    self
      .fetch(
        &self.resources.employees,
        ResourceCall::Query(catalog::BY_CPF.to_string(), args),
      )
      .await
  }

  pub async fn availability(&self, employee_id: u64, date: NaiveDate) -> Result<Availability> {
    let args = Params::from([
      (String::from("id"), employee_id.to_string()),
      (String::from("date"), date.format("%Y-%m-%d").to_string()),
    ]);
    let snapshot = self
      .read(
        &self.resources.employees,
        ResourceCall::Query(catalog::AVAILABILITY.to_string(), args),
      )
      .await;

    // Some deployments answer with the bare slot list
    match snapshot.data() {
      Some(Value::Array(_)) if snapshot.error.is_none() => Ok(Availability {
        date,
        slots: snapshot.decode()?,
      }),
      _ => snapshot.decode(),
    }
  }

  // ==========================================================================
  // Appointments and calendar
  // ==========================================================================

  pub async fn appointments(&self, day: Option<NaiveDate>) -> Result<Vec<Appointment>> {
    let call = match day {
      Some(day) => ResourceCall::Query(
        catalog::BY_DATE.to_string(),
        Params::from([(String::from("date"), day.format("%Y-%m-%d").to_string())]),
      ),
      None => ResourceCall::List(Params::new()),
    };
    self.fetch(&self.resources.appointments, call).await
  }

  /// Upcoming appointments as the dashboard lists them.
  pub async fn future_appointments(&self) -> Result<Vec<Appointment>> {
    self
      .fetch(&self.resources.dashboard, ResourceCall::query(catalog::FUTURE_APPOINTMENTS))
      .await
  }

  /// Every appointment from now on, straight from the appointments resource.
  pub async fn upcoming_appointments(&self) -> Result<Vec<Appointment>> {
    self
      .fetch(&self.resources.appointments, ResourceCall::query(catalog::FUTURE))
      .await
  }

  /// Appointments projected onto the calendar, colored by category.
  pub async fn calendar(&self, day: Option<NaiveDate>) -> Result<Vec<CalendarEvent>> {
    let appointments = self.appointments(day).await?;
    Ok(calendar::project(&appointments, day))
  }

  // ==========================================================================
  // Orders, requests, stock
  // ==========================================================================

  pub async fn orders(&self) -> Result<Vec<Order>> {
    self
      .fetch(&self.resources.orders, ResourceCall::List(Params::new()))
      .await
  }

  pub async fn requests(&self) -> Result<Vec<ApprovalRequest>> {
    self
      .fetch(&self.resources.requests, ResourceCall::List(Params::new()))
      .await
  }

  /// The whole stock, or only items below their minimum quantity.
  pub async fn stock(&self, critical_only: bool) -> Result<Vec<StockItem>> {
    let call = if critical_only {
      ResourceCall::query(catalog::CRITICAL)
    } else {
      ResourceCall::List(Params::new())
    };
    self.fetch(&self.resources.stock, call).await
  }

  pub async fn critical_stock(&self) -> Result<Vec<StockItem>> {
    self
      .fetch(&self.resources.dashboard, ResourceCall::query(catalog::CRITICAL_STOCK))
      .await
  }

  // ==========================================================================
  // Dashboard
  // ==========================================================================

  pub async fn dashboard(&self) -> Result<DashboardCounters> {
    let (critical_stock, today_appointments, occupancy_rate, future_appointments) = futures::try_join!(
      self.counter(catalog::CRITICAL_STOCK_COUNT),
      self.counter(catalog::TODAY_APPOINTMENTS),
      self.counter(catalog::OCCUPANCY_RATE),
      self.counter(catalog::FUTURE_APPOINTMENTS_COUNT),
    )?;

    Ok(DashboardCounters {
      critical_stock: whole_count(catalog::CRITICAL_STOCK_COUNT, critical_stock)?,
      today_appointments: whole_count(catalog::TODAY_APPOINTMENTS, today_appointments)?,
      occupancy_rate,
      future_appointments: whole_count(catalog::FUTURE_APPOINTMENTS_COUNT, future_appointments)?,
    })
  }

  async fn counter(&self, name: &str) -> Result<f64> {
    let data = self
      .read(&self.resources.dashboard, ResourceCall::query(name))
      .await
      .into_result()?;
    counter_value(&data)
      .filter(|value| value.is_finite() && *value >= 0.0)
      .ok_or_else(|| {
        SyncError::transport(
          TransportFailure::Decode,
          format!("dashboard counter {} is not a non-negative number: {}", name, data),
        )
      })
  }

  // ==========================================================================
  // Status changes
  // ==========================================================================

  pub async fn set_order_status(&self, id: u64, status: OrderStatus) -> Result<Order> {
    self.transition(&self.resources.orders, id, status, &[]).await
  }

  pub async fn set_request_status(&self, id: u64, status: RequestStatus) -> Result<ApprovalRequest> {
    self.transition(&self.resources.requests, id, status, &[]).await
  }

  /// Appointment moves also change the dashboard and availability figures.
  pub async fn set_appointment_status(&self, id: u64, status: AppointmentStatus) -> Result<Appointment> {
    let extra = [
      self.resources.dashboard.everything(),
      self.resources.employees.everything(),
    ];
    self.transition(&self.resources.appointments, id, status, &extra).await
  }

  pub async fn set_stock_status(&self, id: u64, status: StockStatus) -> Result<StockItem> {
    let extra = [self.resources.dashboard.everything()];
    self.transition(&self.resources.stock, id, status, &extra).await
  }

  /// Move entity `id` of `resource` to `to`.
  ///
  /// The current status is fetched first so the lifecycle guard knows where
  /// the entity starts. The result is stored under the detail key, and every
  /// other query of the resource plus `extra` is invalidated.
  async fn transition<S, T>(
    &self,
    resource: &ResourceClient,
    id: u64,
    to: S,
    extra: &[Invalidation],
  ) -> Result<T>
  where
    S: Lifecycle,
    T: DeserializeOwned,
  {
    let id = id.to_string();
    let key = resource.detail_key(&id);

    let current = self
      .cache
      .refetch(
        &key,
        ResourceCall::Get(id.clone()).fetcher(resource),
        ReadOptions::default(),
      )
      .await
      .into_result()?;
    let guard = match current.get("status").and_then(Value::as_str) {
      Some(from) => LifecycleGuard::transition_from(S::KIND, from),
      None => LifecycleGuard::transition(S::KIND),
    };
    debug!(key = %key, to = to.as_str(), ?guard, "changing status");

    let mut invalidates = vec![resource.everything()];
    invalidates.extend_from_slice(extra);

    let payload = json!({ "status": to.as_str() });
    let client = resource.clone();
    let result = self
      .cache
      .mutate(
        &key,
        || {
          let client = client.clone();
          let id = id.clone();
          let payload = payload.clone();
          async move { client.update(&id, payload).await }
        },
        &invalidates,
        MutationOptions::guarded(guard),
      )
      .await?;

    T::deserialize(result.as_ref()).map_err(|e| {
      SyncError::transport(
        TransportFailure::Decode,
        format!("unexpected payload for {}: {}", key, e),
      )
    })
  }
}

/// Counts arrive as JSON numbers; anything with a fraction is not a count.
fn whole_count(name: &str, value: f64) -> Result<u64> {
  if value.fract() != 0.0 || value > u64::MAX as f64 {
    return Err(SyncError::transport(
      TransportFailure::Decode,
      format!("dashboard counter {} is not a whole number: {}", name, value),
    ));
  }
  Ok(value as u64)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::AppointmentCategory;
  use crate::http::NoRedirect;
  use crate::testing::MockTransport;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  struct CountingRedirect(AtomicUsize);

  impl LoginRedirect for CountingRedirect {
    fn redirect_to_login(&self) {
      self.0.fetch_add(1, Ordering::SeqCst);
    }
  }

  fn client(transport: &Arc<MockTransport>) -> SyncClient {
    let client = SyncClient::new(
      transport.clone(),
      Session::in_memory(),
      QueryCache::default(),
      Arc::new(NoRedirect),
    );
    client.login("token").unwrap();
    client
  }

  fn employee_json(id: u64, name: &str) -> Value {
    json!({ "id": id, "name": name, "cpf": "12345678900", "role": "stylist", "active": true })
  }

  fn appointment_json(id: u64, at: &str, category: &str, status: &str) -> Value {
    json!({
      "id": id,
      "clientName": format!("client {}", id),
      "employeeId": 1,
      "scheduledAt": at,
      "category": category,
      "status": status
    })
  }

  #[tokio::test(start_paused = true)]
  async fn test_employee_list_is_cached() {
    let transport = MockTransport::new();
    transport.respond("GET", "/employees", 200, json!([employee_json(1, "Ana")]));
    let client = client(&transport);

    let first = client.employees(false).await.unwrap();
    let second = client.employees(false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first[0].name, "Ana");
    assert_eq!(transport.call_count("GET", "/employees"), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_list_is_refreshed_in_background() {
    let transport = MockTransport::new();
    transport.respond_seq(
      "GET",
      "/employees",
      vec![json!([employee_json(1, "Ana")]), json!([employee_json(1, "Ana Lima")])],
    );
    let client = client(&transport);

    client.employees(false).await.unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;

    // Served stale while the refresh runs with nobody watching the key
    let stale = client.employees(false).await.unwrap();
    assert_eq!(stale[0].name, "Ana");
    tokio::time::sleep(Duration::from_millis(1)).await;

    let fresh = client.employees(false).await.unwrap();
    assert_eq!(fresh[0].name, "Ana Lima");
    let key = client.resources().employees.list_key(&Params::new());
    assert!(client.cache().snapshot(&key).unwrap().is_fresh());

    for _ in 0..5 {
      tokio::time::advance(Duration::from_secs(10)).await;
      assert_eq!(client.employees(false).await.unwrap()[0].name, "Ana Lima");
    }
    assert_eq!(transport.call_count("GET", "/employees"), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_reads_share_one_request() {
    let transport = MockTransport::new();
    transport.respond("GET", "/employees", 200, json!([employee_json(1, "Ana")]));
    transport.set_latency(Duration::from_millis(100));
    let client = client(&transport);

    let (first, second) = tokio::join!(client.employees(false), client.employees(false));

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(transport.call_count("GET", "/employees"), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_active_filter_is_its_own_entry() {
    let transport = MockTransport::new();
    transport.respond("GET", "/employees", 200, json!([employee_json(1, "Ana")]));
    let client = client(&transport);

    client.employees(false).await.unwrap();
    client.employees(true).await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].params.get("active").map(String::as_str), Some("true"));
    assert_eq!(client.cache().len(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_employee_by_cpf_strips_punctuation() {
    let transport = MockTransport::new();
    transport.respond("GET", "/employees/cpf/12345678900", 200, employee_json(4, "Caio"));
    let client = client(&transport);

    let employee = client.employee_by_cpf("123.456.789-00").await.unwrap();
    assert_eq!(employee.id, 4);

    let err = client.employee_by_cpf("---").await.unwrap_err();
    assert!(matches!(err, SyncError::Validation(_)));
  }

  #[tokio::test(start_paused = true)]
  async fn test_availability_accepts_bare_slot_list() {
    let transport = MockTransport::new();
    transport.respond("GET", "/employees/2/availability", 200, json!(["09:00", "10:30"]));
    let client = client(&transport);
    let date = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();

    let availability = client.availability(2, date).await.unwrap();
    assert_eq!(availability.date, date);
    assert_eq!(availability.slots, vec!["09:00", "10:30"]);
    assert_eq!(
      transport.calls()[0].params.get("date").map(String::as_str),
      Some("2024-05-02")
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_dashboard_counters() {
    let transport = MockTransport::new();
    transport.respond("GET", "/dashboard/critical-stock/count", 200, json!(3));
    transport.respond("GET", "/dashboard/appointments/today/count", 200, json!({ "count": 8 }));
    transport.respond("GET", "/dashboard/occupancy-rate", 200, json!({ "rate": 0.75 }));
    transport.respond("GET", "/dashboard/appointments/future/count", 200, json!(12));
    let client = client(&transport);

    let counters = client.dashboard().await.unwrap();
    assert_eq!(
      counters,
      DashboardCounters {
        critical_stock: 3,
        today_appointments: 8,
        occupancy_rate: 0.75,
        future_appointments: 12,
      }
    );
  }

  #[tokio::test(start_paused = true)]
  async fn test_negative_counter_is_rejected() {
    let transport = MockTransport::new();
    transport.respond("GET", "/dashboard/critical-stock/count", 200, json!(-1));
    transport.respond("GET", "/dashboard/appointments/today/count", 200, json!(8));
    transport.respond("GET", "/dashboard/occupancy-rate", 200, json!(0.5));
    transport.respond("GET", "/dashboard/appointments/future/count", 200, json!(2.5));
    let client = client(&transport);

    let err = client.dashboard().await.unwrap_err();
    assert!(matches!(
      err,
      SyncError::Transport {
        failure: TransportFailure::Decode,
        ..
      }
    ));

    transport.respond("GET", "/dashboard/critical-stock/count", 200, json!(1));
    client.cache().evict(|_| true);
    let err = client.dashboard().await.unwrap_err();
    assert!(err.to_string().contains("whole number"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_upcoming_appointments_and_critical_stock() {
    let transport = MockTransport::new();
    transport.respond(
      "GET",
      "/appointments/future",
      200,
      json!([appointment_json(3, "2024-06-01T10:00:00", "SERVICO", "PENDING")]),
    );
    transport.respond(
      "GET",
      "/stock/critical",
      200,
      json!([{ "id": 9, "name": "Shampoo", "quantity": 1, "minQuantity": 5, "status": "CRITICAL" }]),
    );
    transport.respond("GET", "/stock", 200, json!([]));
    let client = client(&transport);

    let upcoming = client.upcoming_appointments().await.unwrap();
    assert_eq!(upcoming[0].id, 3);

    let critical = client.stock(true).await.unwrap();
    assert_eq!(critical[0].status, StockStatus::Critical);
    assert!(client.stock(false).await.unwrap().is_empty());

    assert_eq!(transport.call_count("GET", "/appointments/future"), 1);
    assert_eq!(transport.call_count("GET", "/stock/critical"), 1);
    assert_eq!(client.cache().len(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_calendar_colors() {
    let transport = MockTransport::new();
    transport.respond(
      "GET",
      "/appointments",
      200,
      json!([
        appointment_json(2, "2024-05-02T14:00:00", "SERVICO", "CONFIRMED"),
        appointment_json(1, "2024-05-02T09:00:00", "ORCAMENTO", "PENDING"),
      ]),
    );
    let client = client(&transport);

    let events = client.calendar(None).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, 1);
    assert_eq!(events[0].color, AppointmentCategory::Quote.color());
    assert_eq!(events[1].color, AppointmentCategory::Service.color());
  }

  #[tokio::test(start_paused = true)]
  async fn test_order_status_change_invalidates_list() {
    let transport = MockTransport::new();
    transport.respond_seq(
      "GET",
      "/orders",
      vec![
        json!([{ "id": 5, "status": "IN_PROGRESS" }]),
        json!([{ "id": 5, "status": "CANCELED" }]),
      ],
    );
    transport.respond("GET", "/orders/5", 200, json!({ "id": 5, "status": "IN_PROGRESS" }));
    transport.respond("PUT", "/orders/5", 200, json!({ "id": 5, "status": "CANCELED" }));
    let client = client(&transport);

    client.orders().await.unwrap();
    let order = client.set_order_status(5, OrderStatus::Canceled).await.unwrap();
    assert_eq!(order.status, OrderStatus::Canceled);

    let put = transport
      .calls()
      .into_iter()
      .find(|c| c.method == "PUT")
      .unwrap();
    assert_eq!(put.body, Some(json!({ "status": "CANCELED" })));

    // Still inside the staleness window, yet the list is fetched again
    let orders = client.orders().await.unwrap();
    assert_eq!(orders[0].status, OrderStatus::Canceled);
    assert_eq!(transport.call_count("GET", "/orders"), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_reopening_canceled_order_is_rejected() {
    let transport = MockTransport::new();
    transport.respond("GET", "/orders/5", 200, json!({ "id": 5, "status": "CANCELED" }));
    // A backend that lets the move through anyway
    transport.respond("PUT", "/orders/5", 200, json!({ "id": 5, "status": "IN_PROGRESS" }));
    let client = client(&transport);

    let err = client
      .set_order_status(5, OrderStatus::InProgress)
      .await
      .unwrap_err();
    assert_eq!(
      err,
      SyncError::DomainInvariantViolation {
        kind: crate::domain::EntityKind::Order,
        from: "CANCELED".into(),
        to: "IN_PROGRESS".into(),
      }
    );

    let key = client.resources().orders.detail_key("5");
    let snapshot = client.cache().snapshot(&key).unwrap();
    assert!(snapshot.is_error());
    assert_eq!(snapshot.data().unwrap()["status"], "CANCELED");
  }

  #[tokio::test(start_paused = true)]
  async fn test_stock_status_change_invalidates_dashboard() {
    let transport = MockTransport::new();
    transport.respond_seq("GET", "/dashboard/critical-stock", vec![json!([]), json!([])]);
    transport.respond(
      "GET",
      "/stock/9",
      200,
      json!({ "id": 9, "name": "Shampoo", "status": "ACTIVE" }),
    );
    transport.respond(
      "PUT",
      "/stock/9",
      200,
      json!({ "id": 9, "name": "Shampoo", "status": "CRITICAL" }),
    );
    let client = client(&transport);

    client.critical_stock().await.unwrap();
    let item = client.set_stock_status(9, StockStatus::Critical).await.unwrap();
    assert_eq!(item.status, StockStatus::Critical);

    client.critical_stock().await.unwrap();
    assert_eq!(transport.call_count("GET", "/dashboard/critical-stock"), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_unauthorized_tears_down_session() {
    let transport = MockTransport::new();
    transport.respond("GET", "/employees", 200, json!([employee_json(1, "Ana")]));
    transport.respond("GET", "/orders", 401, json!({ "message": "expired" }));
    let redirect = Arc::new(CountingRedirect(AtomicUsize::new(0)));
    let client = SyncClient::new(
      transport.clone(),
      Session::in_memory(),
      QueryCache::default(),
      redirect.clone(),
    );
    client.login("token").unwrap();

    client.employees(false).await.unwrap();
    assert_eq!(client.cache().len(), 1);

    let err = client.orders().await.unwrap_err();
    assert_eq!(err, SyncError::Unauthorized);
    assert!(!client.is_signed_in());
    assert_eq!(redirect.0.load(Ordering::SeqCst), 1);
    // Only the entry whose read was still waiting survives
    assert_eq!(client.cache().len(), 1);
    let employees = client.resources().employees.list_key(&Params::new());
    assert!(client.cache().snapshot(&employees).is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_logout_clears_cache() {
    let transport = MockTransport::new();
    transport.respond("GET", "/requests", 200, json!([]));
    let client = client(&transport);

    client.requests().await.unwrap();
    assert_eq!(client.logout(), 1);
    assert!(client.cache().is_empty());
    assert!(!client.is_signed_in());
  }

  #[tokio::test(start_paused = true)]
  async fn test_watch_keeps_entry_observed() {
    let transport = MockTransport::new();
    transport.respond("GET", "/stock", 200, json!([]));
    let client = client(&transport);

    let query = client.watch(&client.resources().stock, ResourceCall::List(Params::new()));
    query.read().await;
    assert_eq!(client.logout(), 0);
    assert!(query.snapshot().is_some());

    drop(query);
    tokio::time::advance(Duration::from_secs(301)).await;
    assert_eq!(client.cache().collect_garbage(), 1);
  }
}
