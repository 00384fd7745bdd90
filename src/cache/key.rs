//! Query keys and invalidation targets.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::http::Params;

/// Identity of a cached query: a resource plus an order-independent set of
/// parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey {
  resource: String,
  params: Params,
}

impl QueryKey {
  pub fn new(resource: impl Into<String>) -> Self {
    Self {
      resource: resource.into(),
      params: Params::new(),
    }
  }

  pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  pub fn with_params(mut self, params: Params) -> Self {
    self.params.extend(params);
    self
  }

  pub fn resource(&self) -> &str {
    &self.resource
  }

  pub fn params(&self) -> &Params {
    &self.params
  }

  /// Stable fixed-length identifier, used in log fields.
  pub fn fingerprint(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.resource.as_bytes());
    for (key, value) in &self.params {
      // Separators outside the printable range keep "a=b&c" and "a=b&c=" apart
      hasher.update([0x1f]);
      hasher.update(key.as_bytes());
      hasher.update([0x1e]);
      hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.resource)?;
    if !self.params.is_empty() {
      let pairs: Vec<String> = self
        .params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
      write!(f, " {{{}}}", pairs.join(", "))?;
    }
    Ok(())
  }
}

/// Which entries a successful mutation marks stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
  /// Exactly this key
  Exact(QueryKey),
  /// Every key of the resource, whatever its parameters
  Resource(String),
}

impl Invalidation {
  pub fn resource(name: impl Into<String>) -> Self {
    Self::Resource(name.into())
  }

  pub fn matches(&self, key: &QueryKey) -> bool {
    match self {
      Self::Exact(target) => target == key,
      Self::Resource(name) => key.resource() == name,
    }
  }
}

impl From<QueryKey> for Invalidation {
  fn from(key: QueryKey) -> Self {
    Self::Exact(key)
  }
}
