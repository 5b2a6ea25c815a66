//! Option schema types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Value types an option definition may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
  String,
  Boolean,
  #[serde(alias = "int")]
  Integer,
  #[serde(alias = "float")]
  Number,
  Array,
  Object,
  Null,
}

impl OptionType {
  pub fn as_str(self) -> &'static str {
    match self {
      OptionType::String => "string",
      OptionType::Boolean => "boolean",
      OptionType::Integer => "integer",
      OptionType::Number => "number",
      OptionType::Array => "array",
      OptionType::Object => "object",
      OptionType::Null => "null",
    }
  }

  /// Whether `value` is an instance of this type.
  pub fn accepts(self, value: &Value) -> bool {
    match self {
      OptionType::String => value.is_string(),
      OptionType::Boolean => value.is_bool(),
      OptionType::Integer => value.is_i64() || value.is_u64(),
      OptionType::Number => value.is_number(),
      OptionType::Array => value.is_sequence(),
      OptionType::Object => value.is_mapping(),
      OptionType::Null => value.is_null(),
    }
  }
}

impl fmt::Display for OptionType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A single option declared in a layer's `defines` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionDefinition {
  #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
  pub type_: Option<OptionType>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub default: Option<Value>,

  #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
  pub enum_: Option<Vec<Value>>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

/// Option definitions of one layer, keyed by option name.
pub type Definitions = BTreeMap<String, OptionDefinition>;

/// Option values of one namespace, keyed by option name.
pub type Values = BTreeMap<String, Value>;

/// Namespace (layer name) to option values.
pub type NamespacedValues = BTreeMap<String, Values>;

/// Render a YAML value the way lint messages quote it.
pub fn render_value(value: &Value) -> String {
  match value {
    Value::Null => "None".to_string(),
    Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
    Value::Number(n) => n.to_string(),
    Value::String(s) => format!("'{}'", s),
    Value::Sequence(items) => {
      let parts: Vec<String> = items.iter().map(render_value).collect();
      format!("[{}]", parts.join(", "))
    }
    Value::Mapping(map) => {
      let parts: Vec<String> = map
        .iter()
        .map(|(k, v)| format!("{}: {}", render_value(k), render_value(v)))
        .collect();
      format!("{{{}}}", parts.join(", "))
    }
    Value::Tagged(tagged) => render_value(&tagged.value),
  }
}
