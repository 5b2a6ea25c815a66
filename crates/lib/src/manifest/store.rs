//! Reading, writing and verifying `.build.manifest`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use super::types::{BuildManifest, MANIFEST_VERSION, ManifestError};
use crate::consts::MANIFEST_FILENAME;
use crate::layer::ignore::to_slash;
use crate::util::hash::hash_file;

/// Path of the manifest inside an output tree.
pub fn manifest_path(output: &Path) -> PathBuf {
  output.join(MANIFEST_FILENAME)
}

/// Read the manifest of `output`.
///
/// Returns `Ok(None)` if the tree has never been built.
pub fn read(output: &Path) -> Result<Option<BuildManifest>, ManifestError> {
  let path = manifest_path(output);

  let content = match fs::read_to_string(&path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => return Err(ManifestError::Read { path, source }),
  };

  let manifest: BuildManifest =
    serde_json::from_str(&content).map_err(|source| ManifestError::Parse { path: path.clone(), source })?;

  if manifest.version != MANIFEST_VERSION {
    return Err(ManifestError::UnsupportedVersion {
      path,
      found: manifest.version,
    });
  }

  Ok(Some(manifest))
}

/// Write the manifest of `output`.
///
/// Uses atomic write (write to temp, then rename) so a reader never sees a
/// truncated manifest.
pub fn write(output: &Path, manifest: &BuildManifest) -> Result<(), ManifestError> {
  let path = manifest_path(output);
  let temp_path = output.join(format!("{}.tmp", MANIFEST_FILENAME));

  let mut content = serde_json::to_string_pretty(manifest).map_err(ManifestError::Serialize)?;
  content.push('\n');

  fs::write(&temp_path, &content).map_err(|source| ManifestError::Write {
    path: temp_path.clone(),
    source,
  })?;
  fs::rename(&temp_path, &path).map_err(|source| ManifestError::Write { path, source })?;

  debug!(output = %output.display(), entries = manifest.signatures.len(), "manifest written");
  Ok(())
}

/// Differences between an output tree and its manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriftReport {
  /// Recorded but absent.
  pub missing: Vec<String>,
  /// Present with a different hash.
  pub modified: Vec<String>,
  /// Present but not recorded.
  pub untracked: Vec<String>,
}

impl DriftReport {
  pub fn is_clean(&self) -> bool {
    self.missing.is_empty() && self.modified.is_empty() && self.untracked.is_empty()
  }
}

/// Compare `output` against its manifest.
pub fn verify(output: &Path) -> Result<DriftReport, ManifestError> {
  let manifest = read(output)?.ok_or_else(|| ManifestError::Missing(output.to_path_buf()))?;
  let mut report = DriftReport::default();

  for (rel, entry) in manifest.files() {
    let path = output.join(rel);
    if !path.is_file() {
      report.missing.push(rel.to_string());
      continue;
    }
    let Some(expected) = &entry.hash else {
      continue;
    };
    let actual = hash_file(&path).map_err(|source| ManifestError::Hash { path, source })?;
    if &actual != expected {
      report.modified.push(rel.to_string());
    }
  }

  for entry in WalkDir::new(output).sort_by_file_name() {
    let entry = entry.map_err(|source| ManifestError::Walk {
      path: output.to_path_buf(),
      source,
    })?;
    if !entry.file_type().is_file() {
      continue;
    }
    let Ok(rel) = entry.path().strip_prefix(output) else {
      continue;
    };
    let rel = to_slash(rel);
    if manifest.get(&rel).is_none() {
      report.untracked.push(rel);
    }
  }

  Ok(report)
}
