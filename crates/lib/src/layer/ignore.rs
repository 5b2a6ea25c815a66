//! Ignore rules for source layer walks.
//!
//! Patterns follow gitignore conventions loosely: a pattern without a slash
//! matches a path component at any depth, a pattern with a slash is anchored
//! at the layer root. A directory that matches hides everything beneath it.

use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use thiserror::Error;

/// Errors for ignore rules.
#[derive(Debug, Error)]
pub enum IgnoreError {
  #[error("invalid ignore pattern '{pattern}': {source}")]
  Pattern {
    pattern: String,
    #[source]
    source: globset::Error,
  },
}

/// A compiled set of ignore patterns.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
  patterns: Vec<String>,
  glob_set: GlobSet,
}

impl IgnoreRules {
  /// Compile `patterns` into a rule set.
  pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, IgnoreError> {
    let mut builder = GlobSetBuilder::new();
    let mut kept = Vec::new();

    for pattern in patterns {
      let pattern = pattern.as_ref().trim().trim_end_matches('/');
      if pattern.is_empty() || pattern.starts_with('#') {
        continue;
      }
      let anchored = pattern.starts_with('/') || pattern.contains('/');
      let base = pattern.trim_start_matches('/');
      let globs = if anchored {
        vec![base.to_string()]
      } else {
        vec![base.to_string(), format!("**/{}", base)]
      };
      for glob in globs {
        let compiled = GlobBuilder::new(&glob)
          .literal_separator(true)
          .build()
          .map_err(|source| IgnoreError::Pattern {
            pattern: pattern.to_string(),
            source,
          })?;
        builder.add(compiled);
      }
      kept.push(pattern.to_string());
    }

    let glob_set = builder.build().map_err(|source| IgnoreError::Pattern {
      pattern: kept.join(", "),
      source,
    })?;

    Ok(Self {
      patterns: kept,
      glob_set,
    })
  }

  /// An empty rule set that ignores nothing.
  pub fn empty() -> Self {
    Self {
      patterns: Vec::new(),
      glob_set: GlobSet::empty(),
    }
  }

  /// Combine two rule sets.
  pub fn extend(&self, extra: &[String]) -> Result<Self, IgnoreError> {
    let mut patterns = self.patterns.clone();
    patterns.extend(extra.iter().cloned());
    Self::new(&patterns)
  }

  /// The source patterns, in declaration order.
  pub fn patterns(&self) -> &[String] {
    &self.patterns
  }

  /// Whether `rel` itself matches a pattern, without looking at its parents.
  ///
  /// Used while walking a tree, where ignored directories are pruned.
  pub fn matches(&self, rel: &Path) -> bool {
    self.glob_set.is_match(to_slash(rel))
  }

  /// Whether `rel` or any of its parent directories is ignored.
  pub fn is_ignored(&self, rel: &Path) -> bool {
    let mut prefix = PathBuf::new();
    for component in rel.components() {
      if let Component::Normal(part) = component {
        prefix.push(part);
        if self.matches(&prefix) {
          return true;
        }
      }
    }
    false
  }
}

/// Render a relative path with forward slashes on every platform.
pub fn to_slash(rel: &Path) -> String {
  rel
    .components()
    .filter_map(|c| match c {
      Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
      _ => None,
    })
    .collect::<Vec<_>>()
    .join("/")
}
