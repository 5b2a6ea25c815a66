//! Per-path composition strategies.
//!
//! Every relative path present in any layer is produced by exactly one
//! tactic. The engine feeds the tactic each contributing layer's copy of the
//! path, base-first, then asks it to materialize the result into the staging
//! tree:
//!
//! ```text
//! README.md      copy        last writer wins                  static
//! metadata.yaml  merge       deep merge, lists unioned         dynamic
//! config.yaml    merge       deep merge, config.deletes        dynamic
//! layer.yaml     layer-yaml  includes/is/options rewritten     dynamic
//! wheelhouse.txt wheelhouse  requirements merged, pip download dynamic
//! ```
//!
//! Relation and storage hooks are not per-path; see [`hooks`].

mod copy;
pub mod engine;
pub mod hooks;
mod layer_yaml;
mod merge;
mod rules;
pub mod wheelhouse;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::layer::{IgnoreError, Layer};
use crate::manifest::{EntryKind, ManifestEntry};
use crate::options::MergedOptions;
use crate::util::hash::{HashError, hash_file};

pub use copy::CopyTactic;
pub use engine::{ComposeOptions, ComposeOutcome, compose};
pub use layer_yaml::LayerYamlTactic;
pub use merge::{MergeTactic, deep_merge};
pub use rules::{TacticKind, TacticRules};
pub use wheelhouse::{InstallError, InstallMode, Installer, InstallerCommand, ProcessInstaller, WheelhouseTactic};

/// Errors raised while composing a path.
#[derive(Debug, Error)]
pub enum TacticError {
  #[error("failed to read '{path}' from layer '{layer}': {source}")]
  Read {
    path: PathBuf,
    layer: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse '{path}' from layer '{layer}': {source}")]
  Parse {
    path: String,
    layer: String,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("failed to write '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to build dependencies for '{path}': {source}")]
  DependencyBuild {
    path: String,
    #[source]
    source: InstallError,
  },

  #[error("layer '{layer}' maps '{pattern}' to unknown tactic '{tactic}'")]
  UnknownTactic {
    layer: String,
    pattern: String,
    tactic: String,
  },

  #[error("invalid tactic pattern '{pattern}' in layer '{layer}': {source}")]
  Pattern {
    layer: String,
    pattern: String,
    #[source]
    source: globset::Error,
  },

  #[error("failed to walk layer '{layer}': {source}")]
  Walk {
    layer: String,
    #[source]
    source: walkdir::Error,
  },

  #[error(transparent)]
  Ignore(#[from] IgnoreError),

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error("compose task failed: {0}")]
  Task(String),
}

/// Build-wide inputs tactics may consult.
pub struct ComposeContext {
  /// Build name; written as `is` and used as the target's owner name.
  pub build_name: String,
  /// Includes declared by the target layer.
  pub target_includes: Vec<String>,
  /// Option values merged across the stack.
  pub options: MergedOptions,
  /// Every layer of the stack, base-first.
  pub layers: Arc<[Arc<Layer>]>,
  pub installer: Arc<dyn Installer>,
  pub install_mode: InstallMode,
}

impl std::fmt::Debug for ComposeContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ComposeContext")
      .field("build_name", &self.build_name)
      .field("target_includes", &self.target_includes)
      .field("install_mode", &self.install_mode)
      .finish_non_exhaustive()
  }
}

/// A file written into the staging tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedFile {
  /// Relative path, forward slashes.
  pub rel: String,
  pub entry: ManifestEntry,
}

impl ComposedFile {
  /// Hash the staged file at `staging/rel` and record it.
  pub fn record(staging: &Path, rel: &str, owner: &str, kind: EntryKind) -> Result<Self, TacticError> {
    let hash = hash_file(&staging.join(rel))?;
    Ok(Self {
      rel: rel.to_string(),
      entry: ManifestEntry::new(owner, kind, hash),
    })
  }
}

/// A strategy producing one relative path from its contributing layers.
pub trait Tactic: Send {
  /// Take in one contributing layer's copy of the path.
  ///
  /// Called once per contributing layer, base-first.
  fn combine(&mut self, layer: &Layer, source: &Path) -> Result<(), TacticError>;

  /// Write the result under `staging` and describe what was written.
  fn materialize(self: Box<Self>, ctx: &ComposeContext, staging: &Path) -> Result<Vec<ComposedFile>, TacticError>;
}

/// Create the tactic for `rel`.
pub fn create(kind: TacticKind, rel: &str) -> Box<dyn Tactic> {
  match kind {
    TacticKind::Copy => Box::new(CopyTactic::new(rel)),
    TacticKind::Merge => Box::new(MergeTactic::new(rel)),
    TacticKind::LayerYaml => Box::new(LayerYamlTactic::new(rel)),
    TacticKind::Wheelhouse => Box::new(WheelhouseTactic::new(rel)),
  }
}

/// Read a contributing file, attributing failures to `layer`.
pub(crate) fn read_source(layer: &Layer, source: &Path) -> Result<String, TacticError> {
  fs::read_to_string(source).map_err(|e| TacticError::Read {
    path: source.to_path_buf(),
    layer: layer.name.clone(),
    source: e,
  })
}

/// Write `content` to `staging/rel`, creating parent directories.
pub(crate) fn write_staged(staging: &Path, rel: &str, content: &[u8]) -> Result<PathBuf, TacticError> {
  let dest = staging.join(rel);
  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).map_err(|source| TacticError::Write {
      path: parent.to_path_buf(),
      source,
    })?;
  }
  fs::write(&dest, content).map_err(|source| TacticError::Write {
    path: dest.clone(),
    source,
  })?;
  Ok(dest)
}

/// Mark a staged file executable.
#[cfg(unix)]
pub(crate) fn set_executable(path: &Path) -> Result<(), TacticError> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| TacticError::Write {
    path: path.to_path_buf(),
    source,
  })
}

#[cfg(not(unix))]
pub(crate) fn set_executable(_path: &Path) -> Result<(), TacticError> {
  Ok(())
}
