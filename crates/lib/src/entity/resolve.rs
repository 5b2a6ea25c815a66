//! Name-resolution service client.
//!
//! The service maps `(kind, name, version)` to the repository holding the
//! entity:
//!
//! ```text
//! GET {base}/api/v1/interface/pgsql/            -> latest
//! GET {base}/api/v1/layer/basic/?version=2      -> pinned
//!
//! {"id": "pgsql", "name": "pgsql4", "repo": "https://...", "version": 1}
//! ```
//!
//! A 404 means the service does not know the entity and is not an error.

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

use crate::layer::LayerKind;

/// Errors talking to the resolution service.
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("request to '{url}' failed: {source}")]
  Transport {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("'{url}' answered with status {status}")]
  Status { url: String, status: u16 },

  #[error("invalid response from '{url}': {source}")]
  Parse {
    url: String,
    #[source]
    source: reqwest::Error,
  },
}

/// A repository record returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResolverRecord {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub name: String,
  pub repo: String,
  #[serde(default = "default_version", deserialize_with = "version_string")]
  pub version: String,
}

fn default_version() -> String {
  "latest".to_string()
}

/// Versions arrive as either JSON numbers or strings.
fn version_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  let value = serde_json::Value::deserialize(deserializer)?;
  Ok(match value {
    serde_json::Value::String(s) => s,
    serde_json::Value::Null => default_version(),
    other => other.to_string(),
  })
}

/// Looks up where a named entity lives.
pub trait Resolver: Send + Sync {
  /// Returns `Ok(None)` when the entity is unknown.
  fn resolve(&self, kind: LayerKind, name: &str, version: Option<&str>)
  -> Result<Option<ResolverRecord>, ResolveError>;
}

/// [`Resolver`] backed by the HTTP service.
#[derive(Debug, Clone)]
pub struct HttpResolver {
  base_url: String,
}

impl HttpResolver {
  pub fn new(base_url: impl Into<String>) -> Self {
    Self {
      base_url: base_url.into().trim_end_matches('/').to_string(),
    }
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  fn endpoint(&self, kind: LayerKind, name: &str) -> String {
    format!("{}/api/v1/{}/{}/", self.base_url, kind, name)
  }
}

impl Resolver for HttpResolver {
  fn resolve(
    &self,
    kind: LayerKind,
    name: &str,
    version: Option<&str>,
  ) -> Result<Option<ResolverRecord>, ResolveError> {
    let url = self.endpoint(kind, name);
    debug!(url = %url, version = version.unwrap_or("latest"), "querying resolver");

    // The blocking client owns a runtime; it is created and dropped on the
    // calling thread, which is never an async worker.
    let client = reqwest::blocking::Client::new();
    let mut request = client.get(&url);
    if let Some(version) = version {
      request = request.query(&[("version", version)]);
    }

    let response = request.send().map_err(|source| ResolveError::Transport {
      url: url.clone(),
      source,
    })?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND {
      debug!(url = %url, "resolver does not know entity");
      return Ok(None);
    }
    if !status.is_success() {
      return Err(ResolveError::Status {
        url,
        status: status.as_u16(),
      });
    }

    let record = response
      .json::<ResolverRecord>()
      .map_err(|source| ResolveError::Parse { url, source })?;
    Ok(Some(record))
  }
}
