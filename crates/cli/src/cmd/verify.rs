//! Implementation of the `charm-build verify` command.
//!
//! Compares a built tree against its `.build.manifest`.

use std::path::Path;

use anyhow::{Context, Result, bail};

use charmbuild_lib::manifest;

use crate::output::{Drift, OutputFormat, Status, drift, emit_json, status};

/// Exits non-zero when the tree has drifted from its manifest.
pub fn cmd_verify(dir: &Path, output: OutputFormat) -> Result<()> {
  let report = manifest::verify(dir).with_context(|| format!("Failed to verify '{}'", dir.display()))?;

  if output.is_json() {
    emit_json(&serde_json::json!({
      "path": dir.display().to_string(),
      "clean": report.is_clean(),
      "missing": report.missing,
      "modified": report.modified,
      "untracked": report.untracked,
    }))?;
  } else if report.is_clean() {
    status(Status::Built, &format!("{} matches its manifest", dir.display()));
  } else {
    status(Status::Warning, &format!("{} differs from its manifest", dir.display()));
    for rel in &report.missing {
      drift(Drift::Missing, rel);
    }
    for rel in &report.modified {
      drift(Drift::Modified, rel);
    }
    for rel in &report.untracked {
      drift(Drift::Untracked, rel);
    }
  }

  if !report.is_clean() {
    bail!(
      "{} missing, {} modified, {} untracked",
      report.missing.len(),
      report.modified.len(),
      report.untracked.len()
    );
  }
  Ok(())
}
