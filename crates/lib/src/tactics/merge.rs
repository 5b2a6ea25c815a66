//! Structured-document merge for YAML files.

use std::path::Path;

use serde_yaml::{Mapping, Value};
use tracing::debug;

use super::{ComposeContext, ComposedFile, Tactic, TacticError, read_source, write_staged};
use crate::consts::{CONFIG_YAML, METADATA_YAML};
use crate::layer::Layer;
use crate::manifest::EntryKind;

/// Merge `overlay` into `base`.
///
/// Mappings merge key by key, sequences gain the overlay's items they do not
/// already contain, anything else is replaced by the overlay.
pub fn deep_merge(base: &mut Value, overlay: Value) {
  match (base, overlay) {
    (Value::Mapping(base), Value::Mapping(overlay)) => {
      for (key, value) in overlay {
        match base.get_mut(&key) {
          Some(existing) => deep_merge(existing, value),
          None => {
            base.insert(key, value);
          }
        }
      }
    }
    (Value::Sequence(base), Value::Sequence(overlay)) => {
      for item in overlay {
        if !base.contains(&item) {
          base.push(item);
        }
      }
    }
    (base, overlay) => *base = overlay,
  }
}

/// Remove the value at a dotted path such as `requires.db`.
fn delete_path(doc: &mut Value, dotted: &str) -> bool {
  let mut parts: Vec<&str> = dotted.split('.').collect();
  let Some(last) = parts.pop() else {
    return false;
  };

  let mut cursor = doc;
  for part in parts {
    match cursor.get_mut(part) {
      Some(next) => cursor = next,
      None => return false,
    }
  }
  cursor
    .as_mapping_mut()
    .and_then(|m| m.remove(last))
    .is_some()
}

/// Which `deletes` list of a layer applies to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Document {
  Metadata,
  Config,
  Other,
}

impl Document {
  /// Remove `layer`'s deletes from `doc`; true when anything was removed.
  fn apply_deletes(self, doc: &mut Value, layer: &Layer) -> bool {
    let mut removed = false;
    match self {
      Document::Config => {
        if let Some(options) = doc.get_mut("options").and_then(Value::as_mapping_mut) {
          for key in &layer.config.config.deletes {
            if options.remove(key.as_str()).is_some() {
              debug!(layer = %layer.name, option = %key, "deleted config option");
              removed = true;
            }
          }
        }
      }
      Document::Metadata => {
        for dotted in &layer.config.metadata.deletes {
          if delete_path(doc, dotted) {
            debug!(layer = %layer.name, key = %dotted, "deleted metadata key");
            removed = true;
          }
        }
      }
      Document::Other => {}
    }
    removed
  }
}

/// Fold `doc` into `merged`; true when the result changed.
fn fold(merged: &mut Option<Value>, doc: Value) -> bool {
  if doc.is_null() {
    return false;
  }
  match merged {
    Some(merged) => {
      let before = merged.clone();
      deep_merge(merged, doc);
      *merged != before
    }
    None => {
      *merged = Some(doc);
      true
    }
  }
}

/// Deep-merges every contributor's YAML document.
///
/// Documents are folded in stack order. After the contributions of each
/// layer, that layer's `metadata.deletes` or `config.deletes` are removed
/// from the result, whether or not the layer ships the document itself.
/// The output is owned by the last layer that changed it.
#[derive(Debug)]
pub struct MergeTactic {
  rel: String,
  document: Document,
  contributions: Vec<(String, Value)>,
}

impl MergeTactic {
  pub fn new(rel: &str) -> Self {
    let document = match rel {
      METADATA_YAML => Document::Metadata,
      CONFIG_YAML => Document::Config,
      _ => Document::Other,
    };
    Self {
      rel: rel.to_string(),
      document,
      contributions: Vec::new(),
    }
  }
}

impl Tactic for MergeTactic {
  fn combine(&mut self, layer: &Layer, source: &Path) -> Result<(), TacticError> {
    let content = read_source(layer, source)?;
    let doc: Value = if content.trim().is_empty() {
      Value::Null
    } else {
      serde_yaml::from_str(&content).map_err(|e| TacticError::Parse {
        path: self.rel.clone(),
        layer: layer.name.clone(),
        source: e,
      })?
    };
    self.contributions.push((layer.name.clone(), doc));
    Ok(())
  }

  fn materialize(self: Box<Self>, ctx: &ComposeContext, staging: &Path) -> Result<Vec<ComposedFile>, TacticError> {
    let Some((first, _)) = self.contributions.first() else {
      return Ok(Vec::new());
    };
    let mut owner = first.clone();
    let mut merged: Option<Value> = None;
    let mut pending = self.contributions.into_iter().peekable();

    for layer in ctx.layers.iter() {
      while let Some((_, doc)) = pending.next_if(|(name, _)| *name == layer.name) {
        if fold(&mut merged, doc) {
          owner = layer.name.clone();
        }
      }
      if let Some(doc) = merged.as_mut()
        && self.document.apply_deletes(doc, layer)
      {
        owner = layer.name.clone();
      }
    }
    for (name, doc) in pending {
      if fold(&mut merged, doc) {
        owner = name;
      }
    }

    let merged = merged.unwrap_or_else(|| Value::Mapping(Mapping::new()));
    let content = serde_yaml::to_string(&merged).map_err(|e| TacticError::Parse {
      path: self.rel.clone(),
      layer: owner.clone(),
      source: e,
    })?;
    write_staged(staging, &self.rel, content.as_bytes())?;

    Ok(vec![ComposedFile::record(staging, &self.rel, &owner, EntryKind::Dynamic)?])
  }
}
