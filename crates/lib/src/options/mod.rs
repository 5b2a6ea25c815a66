//! Layer option schema merging and validation.
//!
//! Every layer may declare option *definitions* in the `defines` block of its
//! `layer.yaml`. Definitions live in a namespace named after the declaring
//! layer. A layer may also set option *values* in its `options` block, for its
//! own namespace or for any namespace an earlier layer defined:
//!
//! ```yaml
//! # base/layer.yaml
//! defines:
//!   bar:
//!     enum: [yes, no]
//!
//! # top/layer.yaml
//! includes: [layer:base]
//! options:
//!   base:
//!     bar: yes
//! ```
//!
//! Merging walks the layers base-first; [`lint`] then validates every merged
//! value against its definition. A value for a namespace that only a later
//! layer defines is a lint failure too. Lint failures are reported, never
//! raised.

mod types;

use std::collections::BTreeMap;

use serde_yaml::Value;
use tracing::{debug, error};

use crate::layer::{Layer, LayerConfig};

pub use types::*;

/// Accumulates definitions and explicit values layer by layer.
#[derive(Debug, Clone, Default)]
pub struct OptionSchema {
  definitions: BTreeMap<String, Definitions>,
  explicit: NamespacedValues,
  /// `namespace.key` set before its namespace was defined, with the setter.
  premature: BTreeMap<String, String>,
}

impl OptionSchema {
  pub fn new() -> Self {
    Self::default()
  }

  /// Fold one layer's `defines` and `options` into the schema.
  ///
  /// Later calls override values set by earlier ones.
  pub fn apply_layer(&mut self, namespace: &str, config: &LayerConfig) {
    if !config.defines.is_empty() {
      debug!(namespace, count = config.defines.len(), "registering option definitions");
      let defs = self.definitions.entry(namespace.to_string()).or_default();
      for (key, def) in &config.defines {
        defs.insert(key.clone(), def.clone());
      }
    }

    for (target_ns, values) in &config.options {
      let defined = self.definitions.contains_key(target_ns);
      let slot = self.explicit.entry(target_ns.clone()).or_default();
      for (key, value) in values {
        slot.insert(key.clone(), value.clone());
        let qualified = format!("{}.{}", target_ns, key);
        if defined {
          self.premature.remove(&qualified);
        } else {
          self.premature.insert(qualified, namespace.to_string());
        }
      }
    }
  }

  /// Resolve the accumulated schema into concrete values.
  pub fn finish(&self) -> MergedOptions {
    let mut values: NamespacedValues = BTreeMap::new();

    for (ns, defs) in &self.definitions {
      let explicit = self.explicit.get(ns);
      for (key, def) in defs {
        let value = explicit
          .and_then(|e| e.get(key))
          .cloned()
          .or_else(|| def.default.clone());
        if let Some(value) = value {
          values.entry(ns.clone()).or_default().insert(key.clone(), value);
        }
      }
    }

    // Values for options nobody defined are kept so lint can report them.
    for (ns, explicit) in &self.explicit {
      for (key, value) in explicit {
        let defined = self.definitions.get(ns).is_some_and(|d| d.contains_key(key));
        if !defined {
          values.entry(ns.clone()).or_default().insert(key.clone(), value.clone());
        }
      }
    }

    // only namespaces defined later count; the rest are plain undefined
    let premature = self
      .premature
      .iter()
      .filter(|(qualified, _)| {
        qualified
          .split_once('.')
          .is_some_and(|(ns, _)| self.definitions.contains_key(ns))
      })
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();

    MergedOptions {
      definitions: self.definitions.clone(),
      values,
      premature,
    }
  }
}

/// Definitions and resolved values after merging a layer stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedOptions {
  pub definitions: BTreeMap<String, Definitions>,
  pub values: NamespacedValues,
  /// `namespace.key` set by a layer below the namespace's definer, with the
  /// setting layer.
  pub premature: BTreeMap<String, String>,
}

impl MergedOptions {
  /// Look up a resolved value by namespace and key.
  pub fn get(&self, namespace: &str, key: &str) -> Option<&Value> {
    self.values.get(namespace).and_then(|v| v.get(key))
  }

  /// Values as a YAML mapping, namespace first.
  pub fn to_value(&self) -> Value {
    serde_yaml::to_value(&self.values).unwrap_or(Value::Null)
  }
}

/// Merge option schemas across `layers`, base-first.
///
/// Each layer's definitions are namespaced by its own name.
pub fn merge<'a, I>(layers: I) -> MergedOptions
where
  I: IntoIterator<Item = &'a Layer>,
{
  let mut schema = OptionSchema::new();
  for layer in layers {
    schema.apply_layer(&layer.name, &layer.config);
  }
  schema.finish()
}

/// A single lint failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
  /// Fully-qualified `namespace.key`.
  pub key: String,
  pub value: Value,
  /// Human-readable cause.
  pub cause: String,
}

/// Result of linting merged options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LintReport {
  pub violations: Vec<Violation>,
}

impl LintReport {
  pub fn is_ok(&self) -> bool {
    self.violations.is_empty()
  }
}

/// Validate every merged value against its definition.
///
/// Each violation is logged at error level and collected in the report.
pub fn lint(merged: &MergedOptions) -> LintReport {
  let mut report = LintReport::default();

  for (ns, values) in &merged.values {
    for (key, value) in values {
      let qualified = format!("{}.{}", ns, key);
      let def = merged.definitions.get(ns).and_then(|d| d.get(key));
      let cause = match merged.premature.get(&qualified) {
        Some(layer) => Some(format!("set by layer '{}' before '{}' defines it", layer, ns)),
        None => check_value(key, value, def),
      };
      if let Some(cause) = cause {
        let key = qualified;
        error!("invalid value for option {}: {}", key, cause);
        report.violations.push(Violation {
          key,
          value: value.clone(),
          cause,
        });
      }
    }
  }

  report
}

fn check_value(key: &str, value: &Value, def: Option<&OptionDefinition>) -> Option<String> {
  let Some(def) = def else {
    return Some(format!("'{}' is not a defined option", key));
  };

  if let Some(choices) = &def.enum_
    && !choices.contains(value)
  {
    return Some(format!(
      "{} is not one of {}",
      render_value(value),
      render_value(&Value::Sequence(choices.clone()))
    ));
  }

  if let Some(type_) = def.type_
    && !type_.accepts(value)
  {
    return Some(format!("{} is not of type '{}'", render_value(value), type_));
  }

  None
}
