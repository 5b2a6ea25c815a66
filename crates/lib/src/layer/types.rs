//! Layer types.
//!
//! A [`Layer`] is a resolved source tree together with its parsed
//! `layer.yaml`. Interfaces are layers of kind [`LayerKind::Interface`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;

use crate::consts::{LAYER_YAML, METADATA_YAML};
use crate::options::{Definitions, NamespacedValues};

/// Keys of `layer.yaml` with meaning to the build itself.
pub const RESERVED_KEYS: &[&str] = &[
  "includes", "defines", "options", "ignore", "tactics", "is", "metadata", "config",
];

/// Whether a layer is a generic layer or a relation interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
  Layer,
  Interface,
}

impl LayerKind {
  pub fn as_str(self) -> &'static str {
    match self {
      LayerKind::Layer => "layer",
      LayerKind::Interface => "interface",
    }
  }
}

impl fmt::Display for LayerKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Edits a layer applies to a merged document after contributing to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentEdits {
  /// Keys to remove. For `config.yaml` these are option names, for
  /// `metadata.yaml` dotted paths such as `requires.db`.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub deletes: Vec<String>,
}

impl DocumentEdits {
  pub fn is_empty(&self) -> bool {
    self.deletes.is_empty()
  }
}

/// Parsed `layer.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
  /// Base layers and interfaces this layer builds on, in order.
  pub includes: Vec<String>,

  /// Option definitions, namespaced by this layer's name.
  pub defines: Definitions,

  /// Option values, keyed by namespace.
  pub options: NamespacedValues,

  /// Extra ignore patterns applied to this layer's files only.
  pub ignore: Vec<String>,

  /// Tactic overrides: glob pattern to built-in tactic name.
  pub tactics: BTreeMap<String, String>,

  /// Name recorded by a previous build of this tree.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is: Option<String>,

  #[serde(skip_serializing_if = "DocumentEdits::is_empty")]
  pub metadata: DocumentEdits,

  #[serde(skip_serializing_if = "DocumentEdits::is_empty")]
  pub config: DocumentEdits,

  /// Any other keys, carried into the composed `layer.yaml`.
  #[serde(flatten)]
  pub extra: BTreeMap<String, Value>,
}

/// Errors that can occur while loading a layer.
#[derive(Debug, Error)]
pub enum LayerError {
  #[error("layer directory does not exist: {0}")]
  Missing(PathBuf),

  #[error("failed to read '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },
}

/// A resolved layer or interface.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
  /// Layer name; also the option namespace and the manifest owner name.
  pub name: String,

  pub kind: LayerKind,

  /// Local root of the layer's files.
  pub path: PathBuf,

  /// Where the layer was found, for the manifest.
  pub source: String,

  pub config: LayerConfig,

  /// Storage endpoints declared in the layer's `metadata.yaml`.
  pub storage: Vec<String>,
}

impl Layer {
  /// Load a layer rooted at `path`.
  ///
  /// A missing `layer.yaml` yields an empty configuration. Interfaces never
  /// carry includes. A `metadata.yaml` that does not parse declares no
  /// storage endpoints; composing it fails later with the layer named.
  pub fn load(name: &str, kind: LayerKind, path: &Path, source: &str) -> Result<Self, LayerError> {
    if !path.is_dir() {
      return Err(LayerError::Missing(path.to_path_buf()));
    }

    let mut config: LayerConfig = read_yaml(&path.join(LAYER_YAML))?.unwrap_or_default();
    if kind == LayerKind::Interface && !config.includes.is_empty() {
      debug!(name, "ignoring includes declared by interface");
      config.includes.clear();
    }

    // the merge tactic reports a malformed document with its layer
    let storage = match read_yaml::<Value>(&path.join(METADATA_YAML)) {
      Ok(metadata) => metadata.map(|m| storage_endpoints(&m)).unwrap_or_default(),
      Err(LayerError::Parse { path, source }) => {
        debug!(name, path = %path.display(), error = %source, "unparsable metadata, no storage endpoints");
        Vec::new()
      }
      Err(e) => return Err(e),
    };

    Ok(Self {
      name: name.to_string(),
      kind,
      path: path.to_path_buf(),
      source: source.to_string(),
      config,
      storage,
    })
  }

  pub fn is_interface(&self) -> bool {
    self.kind == LayerKind::Interface
  }
}

/// Keys of the `storage` mapping of a metadata document.
pub fn storage_endpoints(metadata: &Value) -> Vec<String> {
  metadata
    .get("storage")
    .and_then(Value::as_mapping)
    .map(|storage| storage.keys().filter_map(|k| k.as_str().map(str::to_string)).collect())
    .unwrap_or_default()
}

/// Read and parse a YAML file, returning `None` when it does not exist.
///
/// Empty files are reported as absent.
pub fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, LayerError> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(LayerError::Read {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  if content.trim().is_empty() {
    return Ok(None);
  }

  serde_yaml::from_str(&content).map(Some).map_err(|source| LayerError::Parse {
    path: path.to_path_buf(),
    source,
  })
}
