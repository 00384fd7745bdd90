//! HTTP transport seam and its reqwest implementation.

use async_trait::async_trait;
use color_eyre::eyre::eyre;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use super::request::{ApiRequest, Method};
use crate::error::{Result, SyncError, TransportFailure};

/// What came back over the wire, before the pipeline interprets the status.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
  pub status: u16,
  /// JSON body; `null` when empty, a JSON string when the body is not JSON
  pub body: Value,
}

impl RawResponse {
  pub fn new(status: u16, body: Value) -> Self {
    Self { status, body }
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Executes one request. Implementations never retry and never look at the
/// session; the bearer token is handed in by the pipeline.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<RawResponse>;
}

/// reqwest-backed transport against a fixed base URL
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(base_url: &str, timeout: Duration) -> color_eyre::Result<Self> {
    // A trailing slash makes Url::join append instead of replacing the last segment
    let normalized = format!("{}/", base_url.trim_end_matches('/'));
    let base_url =
      Url::parse(&normalized).map_err(|e| eyre!("Invalid API base URL {}: {}", base_url, e))?;

    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  fn url_for(&self, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| SyncError::validation(format!("invalid request path {}: {}", path, e)))
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn execute(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<RawResponse> {
    let url = self.url_for(&request.path)?;
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Put => reqwest::Method::PUT,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    };

    let mut builder = self.client.request(method, url);
    if let Some(token) = bearer {
      builder = builder.bearer_auth(token);
    }
    if !request.params.is_empty() {
      builder = builder.query(&request.params);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await.map_err(map_reqwest_error)?;
    let status = response.status().as_u16();
    let text = response.text().await.map_err(map_reqwest_error)?;

    Ok(RawResponse::new(status, parse_body(status, &text)?))
  }
}

fn parse_body(status: u16, text: &str) -> Result<Value> {
  if text.trim().is_empty() {
    return Ok(Value::Null);
  }
  match serde_json::from_str(text) {
    Ok(value) => Ok(value),
    // Error pages are often HTML; keep them as text for the error message
    Err(_) if !(200..300).contains(&status) => Ok(Value::String(text.to_string())),
    Err(e) => Err(SyncError::transport(
      TransportFailure::Decode,
      format!("response body is not JSON: {}", e),
    )),
  }
}

fn map_reqwest_error(e: reqwest::Error) -> SyncError {
  let failure = if e.is_timeout() {
    TransportFailure::Timeout
  } else if e.is_decode() {
    TransportFailure::Decode
  } else {
    TransportFailure::Network
  };
  SyncError::transport(failure, e.to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_url_join_keeps_base_path() {
    let transport = HttpTransport::new("https://backend.test/api", Duration::from_secs(5)).unwrap();
    assert_eq!(
      transport.url_for("/employees/3").unwrap().as_str(),
      "https://backend.test/api/employees/3"
    );
    assert_eq!(
      transport.url_for("dashboard/occupancy-rate").unwrap().as_str(),
      "https://backend.test/api/dashboard/occupancy-rate"
    );
  }

  #[test]
  fn test_invalid_base_url() {
    assert!(HttpTransport::new("not a url", Duration::from_secs(5)).is_err());
  }

  #[test]
  fn test_parse_body() {
    assert_eq!(parse_body(204, "").unwrap(), Value::Null);
    assert_eq!(parse_body(200, r#"{"id":1}"#).unwrap(), json!({ "id": 1 }));
    assert_eq!(
      parse_body(502, "<html>bad gateway</html>").unwrap(),
      json!("<html>bad gateway</html>")
    );

    let err = parse_body(200, "<html>").unwrap_err();
    assert!(matches!(
      err,
      SyncError::Transport {
        failure: TransportFailure::Decode,
        ..
      }
    ));
  }
}
