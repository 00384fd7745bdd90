//! Generic per-resource request builder.
//!
//! One `ResourceClient` exists per backend collection. It knows the base path,
//! the standard CRUD calls and a table of named custom queries; everything
//! goes through the access pipeline unchanged. No caching happens here.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{Invalidation, QueryKey};
use crate::error::{Result, SyncError};
use crate::http::{AccessPipeline, ApiRequest, Params};

/// Parameter under which a custom query's name is folded into its cache key
pub const QUERY_PARAM: &str = "$query";

/// A named parameterized GET below the resource's base path.
///
/// `{name}` placeholders in the path are filled from the call arguments; the
/// arguments left over go to the query string, after the fixed params.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomQuery {
  pub name: String,
  pub path: String,
  pub params: Params,
}

impl CustomQuery {
  pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      path: path.into(),
      params: Params::new(),
    }
  }

  /// Add a query-string parameter sent on every call.
  pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.params.insert(key.into(), value.into());
    self
  }

  /// Placeholder names in path order.
  pub fn placeholders(&self) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = self.path.as_str();
    while let Some(open) = rest.find('{') {
      let Some(len) = rest[open..].find('}') else {
        break;
      };
      names.push(&rest[open + 1..open + len]);
      rest = &rest[open + len + 1..];
    }
    names
  }

  /// Resolve the path and query string for one call.
  fn resolve(&self, args: &Params) -> Result<(String, Params)> {
    let mut path = self.path.clone();
    let mut leftover = args.clone();

    for name in self.placeholders() {
      let value = leftover.remove(name).unwrap_or_default();
      if value.is_empty() {
        return Err(SyncError::validation(format!(
          "query '{}' needs a value for '{}'",
          self.name, name
        )));
      }
      if value.contains('/') {
        return Err(SyncError::validation(format!(
          "'{}' is not a valid value for '{}'",
          value, name
        )));
      }
      path = path.replacen(&format!("{{{}}}", name), &value, 1);
    }

    let mut params = self.params.clone();
    params.extend(leftover);
    Ok((path, params))
  }
}

/// CRUD plus custom queries for one backend collection.
#[derive(Clone)]
pub struct ResourceClient {
  pipeline: AccessPipeline,
  name: String,
  base_path: String,
  queries: Arc<BTreeMap<String, CustomQuery>>,
}

impl ResourceClient {
  pub fn new(pipeline: AccessPipeline, name: impl Into<String>, base_path: impl Into<String>) -> Self {
    Self {
      pipeline,
      name: name.into(),
      base_path: base_path.into().trim_end_matches('/').to_string(),
      queries: Arc::new(BTreeMap::new()),
    }
  }

  /// Register a custom query. A later query with the same name replaces it.
  pub fn with_query(mut self, query: CustomQuery) -> Self {
    Arc::make_mut(&mut self.queries).insert(query.name.clone(), query);
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn base_path(&self) -> &str {
    &self.base_path
  }

  pub fn custom_query(&self, name: &str) -> Option<&CustomQuery> {
    self.queries.get(name)
  }

  // ==========================================================================
  // Calls
  // ==========================================================================

  pub async fn list(&self, params: &Params) -> Result<Value> {
    let request = ApiRequest::get(&self.base_path).with_params(params.clone());
    self.pipeline.send(request).await
  }

  pub async fn get(&self, id: &str) -> Result<Value> {
    let path = self.item_path(id)?;
    self.pipeline.send(ApiRequest::get(path)).await
  }

  pub async fn create(&self, payload: Value) -> Result<Value> {
    let request = ApiRequest::post(&self.base_path, payload);
    self.pipeline.send(request).await
  }

  pub async fn update(&self, id: &str, payload: Value) -> Result<Value> {
    let path = self.item_path(id)?;
    self.pipeline.send(ApiRequest::put(path, payload)).await
  }

  pub async fn remove(&self, id: &str) -> Result<Value> {
    let path = self.item_path(id)?;
    self.pipeline.send(ApiRequest::delete(path)).await
  }

  /// Run the custom query `name`. Bad arguments fail before any I/O.
  pub async fn query(&self, name: &str, args: &Params) -> Result<Value> {
    let request = self.query_request(name, args)?;
    self.pipeline.send(request).await
  }

  fn query_request(&self, name: &str, args: &Params) -> Result<ApiRequest> {
    let query = self.queries.get(name).ok_or_else(|| {
      SyncError::validation(format!("{} has no query named '{}'", self.name, name))
    })?;
    let (path, params) = query.resolve(args)?;
    Ok(ApiRequest::get(format!("{}{}", self.base_path, path)).with_params(params))
  }

  fn item_path(&self, id: &str) -> Result<String> {
    let id = id.trim();
    if id.is_empty() || id.contains('/') {
      return Err(SyncError::validation(format!(
        "'{}' is not a valid {} id",
        id, self.name
      )));
    }
    Ok(format!("{}/{}", self.base_path, id))
  }

  // ==========================================================================
  // Cache keys
  // ==========================================================================

  pub fn list_key(&self, params: &Params) -> QueryKey {
    QueryKey::new(&self.name).with_params(params.clone())
  }

  pub fn detail_key(&self, id: &str) -> QueryKey {
    QueryKey::new(&self.name).with_param("id", id.trim())
  }

  pub fn query_key(&self, name: &str, args: &Params) -> QueryKey {
    QueryKey::new(&self.name)
      .with_params(args.clone())
      .with_param(QUERY_PARAM, name)
  }

  /// Every cached query of this resource.
  pub fn everything(&self) -> Invalidation {
    Invalidation::resource(&self.name)
  }
}

impl std::fmt::Debug for ResourceClient {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ResourceClient")
      .field("name", &self.name)
      .field("base_path", &self.base_path)
      .field("queries", &self.queries.keys().collect::<Vec<_>>())
      .finish()
  }
}
