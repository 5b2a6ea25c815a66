//! Verbatim copy, last writer wins.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{ComposeContext, ComposedFile, Tactic, TacticError};
use crate::layer::Layer;
use crate::manifest::EntryKind;

/// Copies the file from the last contributing layer.
///
/// `fs::copy` carries the source's permission bits, so executable hooks stay
/// executable.
#[derive(Debug)]
pub struct CopyTactic {
  rel: String,
  winner: Option<(String, PathBuf)>,
}

impl CopyTactic {
  pub fn new(rel: &str) -> Self {
    Self {
      rel: rel.to_string(),
      winner: None,
    }
  }
}

impl Tactic for CopyTactic {
  fn combine(&mut self, layer: &Layer, source: &Path) -> Result<(), TacticError> {
    if let Some((previous, _)) = &self.winner {
      debug!(path = %self.rel, from = %previous, to = %layer.name, "overriding");
    }
    self.winner = Some((layer.name.clone(), source.to_path_buf()));
    Ok(())
  }

  fn materialize(self: Box<Self>, _ctx: &ComposeContext, staging: &Path) -> Result<Vec<ComposedFile>, TacticError> {
    let Some((owner, source)) = self.winner else {
      return Ok(Vec::new());
    };

    let dest = staging.join(&self.rel);
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).map_err(|e| TacticError::Write {
        path: parent.to_path_buf(),
        source: e,
      })?;
    }
    fs::copy(&source, &dest).map_err(|e| TacticError::Read {
      path: source.clone(),
      layer: owner.clone(),
      source: e,
    })?;

    Ok(vec![ComposedFile::record(staging, &self.rel, &owner, EntryKind::Static)?])
  }
}
