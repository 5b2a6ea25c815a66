//! Tactic selection.
//!
//! A prioritized table of `(glob, tactic)` rules. Overrides declared in a
//! layer's `tactics:` block outrank the built-in rules; within a tier the
//! most specific pattern (most literal characters) wins, then the most
//! recently declared.

use std::fmt;
use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};

use super::TacticError;
use crate::consts::{CONFIG_YAML, LAYER_YAML, METADATA_YAML, WHEELHOUSE_TXT};
use crate::layer::Layer;

/// Built-in tactics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TacticKind {
  Copy,
  Merge,
  LayerYaml,
  Wheelhouse,
}

impl TacticKind {
  /// Parse a name usable in a layer's `tactics:` block.
  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "copy" => Some(Self::Copy),
      "merge" | "yaml" => Some(Self::Merge),
      "wheelhouse" => Some(Self::Wheelhouse),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Copy => "copy",
      Self::Merge => "merge",
      Self::LayerYaml => "layer-yaml",
      Self::Wheelhouse => "wheelhouse",
    }
  }

  /// Whether the tactic folds every contributor into its output.
  ///
  /// A merging tactic may re-read its own previous output without changing
  /// the result.
  pub fn is_merging(self) -> bool {
    !matches!(self, Self::Copy)
  }
}

impl fmt::Display for TacticKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone)]
struct Rule {
  pattern: String,
  matcher: GlobMatcher,
  kind: TacticKind,
  tier: u8,
  specificity: usize,
  seq: usize,
}

/// The rule table of one build.
#[derive(Debug, Clone)]
pub struct TacticRules {
  rules: Vec<Rule>,
}

const BUILTIN_TIER: u8 = 0;
const OVERRIDE_TIER: u8 = 1;

impl TacticRules {
  /// The built-in rules only.
  pub fn builtin() -> Self {
    let mut table = Self { rules: Vec::new() };
    for (pattern, kind) in [
      (METADATA_YAML, TacticKind::Merge),
      (CONFIG_YAML, TacticKind::Merge),
      (LAYER_YAML, TacticKind::LayerYaml),
      (WHEELHOUSE_TXT, TacticKind::Wheelhouse),
    ] {
      // built-in patterns are literal file names and always compile
      if let Ok(matcher) = compile(pattern) {
        table.push(pattern, matcher, kind, BUILTIN_TIER);
      }
    }
    table
  }

  /// Built-in rules plus the `tactics:` overrides of every layer.
  pub fn for_layers(layers: &[Arc<Layer>]) -> Result<Self, TacticError> {
    let mut table = Self::builtin();
    for layer in layers {
      for (pattern, name) in &layer.config.tactics {
        let kind = TacticKind::from_name(name).ok_or_else(|| TacticError::UnknownTactic {
          layer: layer.name.clone(),
          pattern: pattern.clone(),
          tactic: name.clone(),
        })?;
        let matcher = compile(pattern).map_err(|source| TacticError::Pattern {
          layer: layer.name.clone(),
          pattern: pattern.clone(),
          source,
        })?;
        table.push(pattern, matcher, kind, OVERRIDE_TIER);
      }
    }
    Ok(table)
  }

  fn push(&mut self, pattern: &str, matcher: GlobMatcher, kind: TacticKind, tier: u8) {
    let specificity = pattern.chars().filter(|c| !matches!(c, '*' | '?' | '[' | ']' | '{' | '}')).count();
    let seq = self.rules.len();
    self.rules.push(Rule {
      pattern: pattern.to_string(),
      matcher,
      kind,
      tier,
      specificity,
      seq,
    });
    self
      .rules
      .sort_by(|a, b| (b.tier, b.specificity, b.seq).cmp(&(a.tier, a.specificity, a.seq)));
  }

  /// The tactic for relative path `rel`; copy when no rule matches.
  pub fn select(&self, rel: &str) -> TacticKind {
    self
      .rules
      .iter()
      .find(|rule| rule.matcher.is_match(rel))
      .map(|rule| rule.kind)
      .unwrap_or(TacticKind::Copy)
  }

  /// Patterns in priority order.
  pub fn patterns(&self) -> impl Iterator<Item = (&str, TacticKind)> {
    self.rules.iter().map(|r| (r.pattern.as_str(), r.kind))
  }
}

impl Default for TacticRules {
  fn default() -> Self {
    Self::builtin()
  }
}

fn compile(pattern: &str) -> Result<GlobMatcher, globset::Error> {
  Ok(GlobBuilder::new(pattern).literal_separator(true).build()?.compile_matcher())
}
