//! Composition of `layer.yaml` itself.

use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::{Mapping, Value};

use super::merge::deep_merge;
use super::{ComposeContext, ComposedFile, Tactic, TacticError, write_staged};
use crate::layer::Layer;
use crate::manifest::EntryKind;

/// Produces the output tree's `layer.yaml`.
///
/// Non-reserved keys of every contributor are deep-merged. The reserved keys
/// are rewritten for the built charm: `includes` are the target's own,
/// `defines` are the build's own definitions, `is` names the build, and
/// `options` carry the merged option values.
/// Document deletes and tactic overrides are carried so that rebuilding the
/// output in place reproduces it.
#[derive(Debug)]
pub struct LayerYamlTactic {
  rel: String,
  extra: Value,
  tactics: BTreeMap<String, String>,
  metadata_deletes: Vec<String>,
  config_deletes: Vec<String>,
  seen: bool,
}

impl LayerYamlTactic {
  pub fn new(rel: &str) -> Self {
    Self {
      rel: rel.to_string(),
      extra: Value::Mapping(Mapping::new()),
      tactics: BTreeMap::new(),
      metadata_deletes: Vec::new(),
      config_deletes: Vec::new(),
      seen: false,
    }
  }
}

fn union_into(target: &mut Vec<String>, items: &[String]) {
  for item in items {
    if !target.contains(item) {
      target.push(item.clone());
    }
  }
}

fn deletes_block(deletes: &[String]) -> Value {
  let mut block = Mapping::new();
  block.insert(
    Value::from("deletes"),
    Value::Sequence(deletes.iter().map(|d| Value::from(d.as_str())).collect()),
  );
  Value::Mapping(block)
}

impl Tactic for LayerYamlTactic {
  /// Uses the layer's already parsed definition rather than re-reading it.
  fn combine(&mut self, layer: &Layer, _source: &Path) -> Result<(), TacticError> {
    let extra = serde_yaml::to_value(&layer.config.extra).map_err(|e| TacticError::Parse {
      path: self.rel.clone(),
      layer: layer.name.clone(),
      source: e,
    })?;
    deep_merge(&mut self.extra, extra);

    for (pattern, tactic) in &layer.config.tactics {
      self.tactics.insert(pattern.clone(), tactic.clone());
    }
    union_into(&mut self.metadata_deletes, &layer.config.metadata.deletes);
    union_into(&mut self.config_deletes, &layer.config.config.deletes);
    self.seen = true;
    Ok(())
  }

  fn materialize(self: Box<Self>, ctx: &ComposeContext, staging: &Path) -> Result<Vec<ComposedFile>, TacticError> {
    if !self.seen {
      return Ok(Vec::new());
    }

    let mut doc = Mapping::new();
    doc.insert(
      Value::from("includes"),
      Value::Sequence(ctx.target_includes.iter().map(|i| Value::from(i.as_str())).collect()),
    );
    if let Value::Mapping(extra) = self.extra {
      for (key, value) in extra {
        doc.insert(key, value);
      }
    }
    if !self.tactics.is_empty() {
      let tactics: Mapping = self
        .tactics
        .into_iter()
        .map(|(k, v)| (Value::from(k), Value::from(v)))
        .collect();
      doc.insert(Value::from("tactics"), Value::Mapping(tactics));
    }
    if !self.metadata_deletes.is_empty() {
      doc.insert(Value::from("metadata"), deletes_block(&self.metadata_deletes));
    }
    if !self.config_deletes.is_empty() {
      doc.insert(Value::from("config"), deletes_block(&self.config_deletes));
    }
    if let Some(defines) = ctx.options.definitions.get(&ctx.build_name)
      && !defines.is_empty()
    {
      let defines = serde_yaml::to_value(defines).map_err(|e| TacticError::Parse {
        path: self.rel.clone(),
        layer: ctx.build_name.clone(),
        source: e,
      })?;
      doc.insert(Value::from("defines"), defines);
    }
    doc.insert(Value::from("is"), Value::from(ctx.build_name.as_str()));
    doc.insert(Value::from("options"), ctx.options.to_value());

    let content = serde_yaml::to_string(&Value::Mapping(doc)).map_err(|e| TacticError::Parse {
      path: self.rel.clone(),
      layer: ctx.build_name.clone(),
      source: e,
    })?;
    write_staged(staging, &self.rel, content.as_bytes())?;

    Ok(vec![ComposedFile::record(staging, &self.rel, &ctx.build_name, EntryKind::Dynamic)?])
  }
}
