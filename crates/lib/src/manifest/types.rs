//! Manifest types.
//!
//! # Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "layers": [
//!     {"name": "mysql", "kind": "layer", "path": "/layers/trusty/mysql", "source": "local"}
//!   ],
//!   "signatures": {
//!     "README.md": ["foo", "static", "cfac2037...de99"],
//!     "metadata.yaml": ["foo", "dynamic", "01021a65...473a5f"],
//!     ".build.manifest": ["build", "dynamic", null]
//!   }
//! }
//! ```
//!
//! Keys are relative paths with forward slashes, kept sorted so the file is
//! byte-identical across identical builds.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::MANIFEST_FILENAME;
use crate::layer::{Layer, LayerKind};
use crate::util::hash::ContentHash;

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Owner recorded for the manifest's own entry.
pub const MANIFEST_OWNER: &str = "build";

/// How a file came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
  /// Copied verbatim from a single layer.
  Static,
  /// Generated or merged from several inputs.
  Dynamic,
}

impl fmt::Display for EntryKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      EntryKind::Static => "static",
      EntryKind::Dynamic => "dynamic",
    })
  }
}

/// One signature: `[owner, kind, hash]` on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
  from = "(String, EntryKind, Option<ContentHash>)",
  into = "(String, EntryKind, Option<ContentHash>)"
)]
pub struct ManifestEntry {
  pub owner: String,
  pub kind: EntryKind,
  pub hash: Option<ContentHash>,
}

impl ManifestEntry {
  pub fn new(owner: impl Into<String>, kind: EntryKind, hash: ContentHash) -> Self {
    Self {
      owner: owner.into(),
      kind,
      hash: Some(hash),
    }
  }
}

impl From<(String, EntryKind, Option<ContentHash>)> for ManifestEntry {
  fn from((owner, kind, hash): (String, EntryKind, Option<ContentHash>)) -> Self {
    Self { owner, kind, hash }
  }
}

impl From<ManifestEntry> for (String, EntryKind, Option<ContentHash>) {
  fn from(entry: ManifestEntry) -> Self {
    (entry.owner, entry.kind, entry.hash)
  }
}

/// Where a layer of the build came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRecord {
  pub name: String,
  pub kind: LayerKind,
  pub path: PathBuf,
  pub source: String,
}

impl From<&Layer> for LayerRecord {
  fn from(layer: &Layer) -> Self {
    Self {
      name: layer.name.clone(),
      kind: layer.kind,
      path: layer.path.clone(),
      source: layer.source.clone(),
    }
  }
}

/// Relative path to signature.
pub type Signatures = BTreeMap<String, ManifestEntry>;

/// The persisted `.build.manifest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
  pub version: u32,

  #[serde(default)]
  pub layers: Vec<LayerRecord>,

  #[serde(default)]
  pub signatures: Signatures,

  /// Set when the build failed while composing; only the files that were
  /// composed are listed.
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub partial: bool,
}

impl Default for BuildManifest {
  fn default() -> Self {
    Self {
      version: MANIFEST_VERSION,
      layers: Vec::new(),
      signatures: Signatures::new(),
      partial: false,
    }
  }
}

impl BuildManifest {
  /// Create a manifest from the build's layers and composed files.
  ///
  /// The manifest's own entry is added.
  pub fn new<'a>(layers: impl IntoIterator<Item = &'a Layer>, mut signatures: Signatures) -> Self {
    signatures.insert(
      MANIFEST_FILENAME.to_string(),
      ManifestEntry {
        owner: MANIFEST_OWNER.to_string(),
        kind: EntryKind::Dynamic,
        hash: None,
      },
    );
    Self {
      version: MANIFEST_VERSION,
      layers: layers.into_iter().map(LayerRecord::from).collect(),
      signatures,
      partial: false,
    }
  }

  pub fn get(&self, rel: &str) -> Option<&ManifestEntry> {
    self.signatures.get(rel)
  }

  /// Recorded file paths, excluding the manifest itself.
  pub fn files(&self) -> impl Iterator<Item = (&str, &ManifestEntry)> {
    self
      .signatures
      .iter()
      .filter(|(rel, _)| rel.as_str() != MANIFEST_FILENAME)
      .map(|(rel, entry)| (rel.as_str(), entry))
  }
}

/// Errors reading, writing or verifying a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse manifest '{path}': {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("unsupported manifest version {found} in '{path}' (expected {expected})", expected = MANIFEST_VERSION)]
  UnsupportedVersion { path: PathBuf, found: u32 },

  #[error("failed to serialize manifest: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write manifest '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to hash '{path}': {source}")]
  Hash {
    path: PathBuf,
    #[source]
    source: crate::util::hash::HashError,
  },

  #[error("failed to walk '{path}': {source}")]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("no manifest in '{0}'")]
  Missing(PathBuf),
}
