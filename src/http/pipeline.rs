//! Authenticated access pipeline.
//!
//! Every outbound request goes through [`AccessPipeline::send`], which attaches
//! the session credential and tears the session down on a 401.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use super::request::ApiRequest;
use super::transport::Transport;
use crate::error::{Result, SyncError, TransportFailure};
use crate::session::Session;

/// Sends the user back to the login entry point.
pub trait LoginRedirect: Send + Sync {
  fn redirect_to_login(&self);
}

/// Redirect that does nothing, for headless use.
pub struct NoRedirect;

impl LoginRedirect for NoRedirect {
  fn redirect_to_login(&self) {}
}

#[derive(Clone)]
pub struct AccessPipeline {
  transport: Arc<dyn Transport>,
  session: Session,
  redirect: Arc<dyn LoginRedirect>,
}

impl AccessPipeline {
  pub fn new(transport: Arc<dyn Transport>, session: Session) -> Self {
    Self {
      transport,
      session,
      redirect: Arc::new(NoRedirect),
    }
  }

  /// Set the hook run after the credential is wiped on a 401.
  pub fn with_redirect(mut self, redirect: Arc<dyn LoginRedirect>) -> Self {
    self.redirect = redirect;
    self
  }

  pub fn sign_in(&self, token: &str) -> color_eyre::Result<()> {
    self.session.set(token)
  }

  pub fn sign_out(&self) {
    self.session.clear();
  }

  pub fn is_signed_in(&self) -> bool {
    self.session.is_authenticated()
  }

  /// Send one request. No retries happen here.
  pub async fn send(&self, request: ApiRequest) -> Result<Value> {
    let token = self.session.get();
    debug!(
      method = %request.method,
      path = %request.path,
      authenticated = token.is_some(),
      "sending request"
    );

    let response = self.transport.execute(&request, token.as_deref()).await?;

    if response.status == 401 {
      warn!(path = %request.path, "credential rejected, tearing down session");
      self.session.clear();
      self.redirect.redirect_to_login();
      return Err(SyncError::Unauthorized);
    }

    if !response.is_success() {
      return Err(SyncError::transport(
        TransportFailure::Status(response.status),
        error_message(&response.body),
      ));
    }

    Ok(response.body)
  }
}

/// Best-effort human message from an error body.
fn error_message(body: &Value) -> String {
  match body {
    Value::String(text) => text.clone(),
    Value::Object(map) => ["message", "error", "detail"]
      .iter()
      .find_map(|field| map.get(*field).and_then(Value::as_str))
      .map(String::from)
      .unwrap_or_else(|| body.to_string()),
    Value::Null => String::from("empty response"),
    other => other.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::MockTransport;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[derive(Default)]
  struct CountingRedirect(AtomicUsize);

  impl LoginRedirect for CountingRedirect {
    fn redirect_to_login(&self) {
      self.0.fetch_add(1, Ordering::SeqCst);
    }
  }

  #[tokio::test]
  async fn test_attaches_bearer_when_signed_in() {
    let transport = MockTransport::new();
    transport.respond("GET", "/employees", 200, json!([]));
    let pipeline = AccessPipeline::new(transport.clone(), Session::in_memory());

    pipeline.send(ApiRequest::get("/employees")).await.unwrap();
    pipeline.sign_in("secret").unwrap();
    pipeline.send(ApiRequest::get("/employees")).await.unwrap();

    let calls = transport.calls();
    assert_eq!(calls[0].bearer, None);
    assert_eq!(calls[1].bearer.as_deref(), Some("secret"));
  }

  #[tokio::test]
  async fn test_unauthorized_clears_session_and_redirects() {
    let transport = MockTransport::new();
    transport.respond("GET", "/orders", 401, json!({ "message": "expired" }));
    let redirect = Arc::new(CountingRedirect::default());
    let pipeline =
      AccessPipeline::new(transport.clone(), Session::in_memory()).with_redirect(redirect.clone());
    pipeline.sign_in("stale-token").unwrap();

    let err = pipeline.send(ApiRequest::get("/orders")).await.unwrap_err();
    assert_eq!(err, SyncError::Unauthorized);
    assert!(!pipeline.is_signed_in());
    assert_eq!(redirect.0.load(Ordering::SeqCst), 1);

    // The next call goes out without a credential
    let _ = pipeline.send(ApiRequest::get("/orders")).await;
    assert_eq!(transport.calls()[1].bearer, None);
  }

  #[tokio::test]
  async fn test_other_statuses_are_transport_errors() {
    let transport = MockTransport::new();
    transport.respond("DELETE", "/stock/4", 409, json!({ "message": "item in use" }));
    let pipeline = AccessPipeline::new(transport, Session::in_memory());
    pipeline.sign_in("t").unwrap();

    let err = pipeline.send(ApiRequest::delete("/stock/4")).await.unwrap_err();
    assert_eq!(err.status(), Some(409));
    assert!(err.to_string().contains("item in use"));
    // Only 401 logs the user out
    assert!(pipeline.is_signed_in());
  }

  #[tokio::test]
  async fn test_transport_failures_pass_through() {
    let transport = MockTransport::new();
    transport.fail(
      "GET",
      "/dashboard/occupancy-rate",
      SyncError::transport(TransportFailure::Timeout, "deadline"),
    );
    let pipeline = AccessPipeline::new(transport, Session::in_memory());

    let err = pipeline
      .send(ApiRequest::get("/dashboard/occupancy-rate"))
      .await
      .unwrap_err();
    assert_eq!(
      err,
      SyncError::transport(TransportFailure::Timeout, "deadline")
    );
  }

  #[test]
  fn test_error_message_extraction() {
    assert_eq!(error_message(&json!({ "error": "nope" })), "nope");
    assert_eq!(error_message(&json!("plain")), "plain");
    assert_eq!(error_message(&Value::Null), "empty response");
  }
}
