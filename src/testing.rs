//! Scripted transport for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::http::{ApiRequest, Params, RawResponse, Transport};

/// A request as the transport saw it
#[derive(Debug, Clone)]
pub struct RecordedCall {
  pub method: String,
  pub path: String,
  pub params: Params,
  pub body: Option<Value>,
  pub bearer: Option<String>,
}

struct Route {
  method: String,
  path: String,
  /// Replies in order; the last one repeats
  replies: VecDeque<Result<RawResponse>>,
}

/// In-memory backend. Unscripted routes answer 404.
#[derive(Default)]
pub struct MockTransport {
  routes: Mutex<Vec<Route>>,
  calls: Mutex<Vec<RecordedCall>>,
  latency: Mutex<Option<Duration>>,
}

impl MockTransport {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Delay every reply; works with paused tokio time.
  pub fn set_latency(&self, latency: Duration) {
    *self.latency.lock().unwrap() = Some(latency);
  }

  pub fn respond(&self, method: &str, path: &str, status: u16, body: Value) {
    self.script(method, path, vec![Ok(RawResponse::new(status, body))]);
  }

  /// Successive calls get successive bodies, then the last one repeats.
  pub fn respond_seq(&self, method: &str, path: &str, bodies: Vec<Value>) {
    let replies = bodies
      .into_iter()
      .map(|body| Ok(RawResponse::new(200, body)))
      .collect();
    self.script(method, path, replies);
  }

  pub fn fail(&self, method: &str, path: &str, error: SyncError) {
    self.script(method, path, vec![Err(error)]);
  }

  /// Replace any earlier script for the route.
  pub fn script(&self, method: &str, path: &str, replies: Vec<Result<RawResponse>>) {
    let mut routes = self.routes.lock().unwrap();
    routes.retain(|r| !(r.method == method && r.path == path));
    routes.push(Route {
      method: method.to_string(),
      path: path.to_string(),
      replies: replies.into(),
    });
  }

  pub fn calls(&self) -> Vec<RecordedCall> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self, method: &str, path: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|c| c.method == method && c.path == path)
      .count()
  }

  fn next_reply(&self, method: &str, path: &str) -> Result<RawResponse> {
    let mut routes = self.routes.lock().unwrap();
    let route = routes
      .iter_mut()
      .find(|r| r.method == method && r.path == path);
    match route {
      Some(route) if route.replies.len() > 1 => route.replies.pop_front().unwrap(),
      Some(route) => route.replies.front().cloned().unwrap(),
      None => Ok(RawResponse::new(404, Value::String(format!("no route for {} {}", method, path)))),
    }
  }
}

#[async_trait]
impl Transport for MockTransport {
  async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<RawResponse> {
    let method = request.method.to_string();
    self.calls.lock().unwrap().push(RecordedCall {
      method: method.clone(),
      path: request.path.clone(),
      params: request.params.clone(),
      body: request.body.clone(),
      bearer: bearer.map(String::from),
    });

    let latency = *self.latency.lock().unwrap();
    if let Some(latency) = latency {
      tokio::time::sleep(latency).await;
    }

    self.next_reply(&method, &request.path)
  }
}
