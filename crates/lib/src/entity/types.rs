//! Layer and interface references.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::layer::{Layer, LayerError, LayerKind};

/// Errors from parsing a reference string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntityRefError {
  #[error("empty reference")]
  Empty,

  #[error("reference '{0}' has no name")]
  MissingName(String),
}

/// A parsed reference to a layer or interface.
///
/// ```text
/// interface:mysql        -> interface "mysql", latest version
/// layer:basic@2          -> layer "basic", version "2"
/// trusty/mysql           -> layer "mysql", looked up as "trusty/mysql"
/// ./layers/tester        -> layer "tester" if the directory exists
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
  /// The reference as written.
  pub raw: String,
  pub kind: LayerKind,
  /// Entity name: the last path segment for path-style references.
  pub name: String,
  /// Relative path joined onto search-path directories.
  pub lookup: String,
  /// Explicit version from a `@VERSION` suffix.
  pub version: Option<String>,
  /// Whether the reference was written as a path rather than a `kind:` prefix.
  pub path_like: bool,
}

impl EntityRef {
  pub fn parse(raw: &str) -> Result<Self, EntityRefError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return Err(EntityRefError::Empty);
    }

    let prefixed = [("interface:", LayerKind::Interface), ("layer:", LayerKind::Layer)]
      .into_iter()
      .find_map(|(prefix, kind)| trimmed.strip_prefix(prefix).map(|rest| (kind, rest)));

    if let Some((kind, rest)) = prefixed {
      let (name, version) = match rest.split_once('@') {
        Some((name, version)) if !version.is_empty() => (name, Some(version.to_string())),
        Some((name, _)) => (name, None),
        None => (rest, None),
      };
      if name.is_empty() {
        return Err(EntityRefError::MissingName(raw.to_string()));
      }
      return Ok(Self {
        raw: raw.to_string(),
        kind,
        name: name.to_string(),
        lookup: name.to_string(),
        version,
        path_like: false,
      });
    }

    let lookup = trimmed.trim_end_matches('/');
    let name = lookup.rsplit('/').next().unwrap_or(lookup);
    if name.is_empty() {
      return Err(EntityRefError::MissingName(raw.to_string()));
    }

    Ok(Self {
      raw: raw.to_string(),
      kind: LayerKind::Layer,
      name: name.to_string(),
      lookup: lookup.to_string(),
      version: None,
      path_like: true,
    })
  }

  /// Key shared by every reference to the same entity within a build.
  pub fn identity(&self) -> (LayerKind, &str) {
    (self.kind, &self.name)
  }
}

impl fmt::Display for EntityRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.raw)
  }
}

/// A reference resolved to a local directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntity {
  pub name: String,
  pub kind: LayerKind,
  pub path: PathBuf,
  /// Human-readable origin: `local` or `<repo>@<version>`.
  pub source: String,
}

impl ResolvedEntity {
  /// Read the entity's declaration documents.
  pub fn load(&self) -> Result<Layer, LayerError> {
    Layer::load(&self.name, self.kind, &self.path, &self.source)
  }
}
