//! Tactic engine: composes a layer stack into an output tree.
//!
//! # Stages
//!
//! 1. Resolve paths: walk every layer, prune ignored paths and build the union
//!    of relative paths with their contributors in stack order.
//! 2. Compose: run one tactic per path on a bounded pool of blocking tasks,
//!    writing into a fresh staging tree next to the output directory.
//! 3. Generate: relation hooks per interface, storage hooks per endpoint.
//! 4. Promote: move every staged file into the output directory.
//!
//! A failing path stops new paths from starting; paths already running
//! finish, and everything composed so far is still promoted and reported so
//! the caller can record a partial manifest.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::hooks::{relation_hooks, storage_hooks};
use super::{ComposeContext, ComposedFile, TacticError, TacticKind, TacticRules, create};
use crate::flatten::LayerStack;
use crate::layer::ignore::to_slash;
use crate::layer::{IgnoreRules, Layer};
use crate::manifest::{BuildManifest, EntryKind, Signatures};
use crate::util::cancel::CancelToken;
use crate::util::hash::hash_file;

/// Knobs for one composition run.
#[derive(Debug, Clone)]
pub struct ComposeOptions {
  /// Patterns never taken from any layer.
  pub ignore: IgnoreRules,
  /// Maximum number of paths composed at once.
  pub parallelism: usize,
  pub cancel: CancelToken,
  /// Manifest found in the target layer's own tree, when the target is the
  /// output of an earlier build.
  pub target_manifest: Option<BuildManifest>,
}

impl Default for ComposeOptions {
  fn default() -> Self {
    Self {
      ignore: IgnoreRules::empty(),
      parallelism: 4,
      cancel: CancelToken::new(),
      target_manifest: None,
    }
  }
}

/// What a composition run produced.
#[derive(Debug, Default)]
pub struct ComposeOutcome {
  /// Entries for every file promoted into the output directory.
  pub signatures: Signatures,
  /// First tactic failure, if any.
  pub failure: Option<TacticError>,
  /// Whether the run stopped because of cancellation.
  pub cancelled: bool,
}

impl ComposeOutcome {
  pub fn is_complete(&self) -> bool {
    self.failure.is_none() && !self.cancelled
  }
}

type Contributors = Vec<(Arc<Layer>, PathBuf)>;

/// Files of `layer` that survive `ignore` plus the layer's own ignore list.
///
/// Returns `(relative path, absolute path)` pairs sorted by path.
pub fn layer_files(layer: &Layer, ignore: &IgnoreRules) -> Result<Vec<(String, PathBuf)>, TacticError> {
  let rules = ignore.extend(&layer.config.ignore)?;
  let root = layer.path.as_path();

  let walker = WalkDir::new(root).sort_by_file_name().into_iter().filter_entry(|entry| {
    match entry.path().strip_prefix(root) {
      Ok(rel) if !rel.as_os_str().is_empty() => !rules.matches(rel),
      _ => true,
    }
  });

  let mut files = Vec::new();
  for entry in walker {
    let entry = entry.map_err(|source| TacticError::Walk {
      layer: layer.name.clone(),
      source,
    })?;
    if entry.file_type().is_dir() || !entry.path().is_file() {
      continue;
    }
    if let Ok(rel) = entry.path().strip_prefix(root) {
      files.push((to_slash(rel), entry.path().to_path_buf()));
    }
  }
  Ok(files)
}

/// Whether a path the target carries from its previous build is an input.
///
/// Static files the target owned are its own sources; merged documents fold
/// back in unchanged. Everything else was produced from other layers and is
/// dropped so their current content wins, unless someone edited it.
fn keep_prior_output(rel: &str, source: &Path, prior: &BuildManifest, target: &str, rules: &TacticRules) -> bool {
  let Some(entry) = prior.get(rel) else {
    return true;
  };
  if rules.select(rel).is_merging() || (entry.owner == target && entry.kind == EntryKind::Static) {
    return true;
  }
  let modified = match (&entry.hash, hash_file(source)) {
    (Some(expected), Ok(actual)) => *expected != actual,
    _ => false,
  };
  if modified {
    warn!(path = %rel, owner = %entry.owner, "generated file was modified since the last build, keeping it");
  }
  modified
}

fn resolve_paths(
  layers: &[Arc<Layer>],
  output: &Path,
  options: &ComposeOptions,
  rules: &TacticRules,
) -> Result<BTreeMap<String, Contributors>, TacticError> {
  let mut union: BTreeMap<String, Contributors> = BTreeMap::new();
  let target_idx = layers.len().saturating_sub(1);

  for (idx, layer) in layers.iter().enumerate() {
    let is_target = idx == target_idx;
    for (rel, source) in layer_files(layer, &options.ignore)? {
      if layer.path != output && source.starts_with(output) {
        continue;
      }
      if is_target
        && let Some(prior) = &options.target_manifest
        && !keep_prior_output(&rel, &source, prior, &layer.name, rules)
      {
        debug!(path = %rel, "dropping output of previous build");
        continue;
      }
      union.entry(rel).or_default().push((layer.clone(), source));
    }
  }

  Ok(union)
}

fn compose_path(
  kind: TacticKind,
  rel: &str,
  contributors: &Contributors,
  ctx: &ComposeContext,
  staging: &Path,
) -> Result<Vec<ComposedFile>, TacticError> {
  debug!(path = %rel, tactic = %kind, layers = contributors.len(), "composing");
  let mut tactic = create(kind, rel);
  for (layer, source) in contributors {
    tactic.combine(layer, source)?;
  }
  tactic.materialize(ctx, staging)
}

/// Move a staged file into the output tree.
fn promote(staging: &Path, output: &Path, rel: &str) -> Result<(), TacticError> {
  let src = staging.join(rel);
  let dest = output.join(rel);
  let write_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source| TacticError::Write { path, source }
  };

  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).map_err(write_err(parent))?;
  }
  if dest.is_dir() {
    fs::remove_dir_all(&dest).map_err(write_err(&dest))?;
  }
  if fs::rename(&src, &dest).is_err() {
    fs::copy(&src, &dest).map_err(write_err(&dest))?;
  }
  Ok(())
}

/// Compose `stack` into `output`.
///
/// Returns `Err` when the run could not be set up or promoted; tactic
/// failures and cancellation are reported in the outcome together with the
/// files that were composed.
pub async fn compose(
  stack: &LayerStack,
  ctx: Arc<ComposeContext>,
  output: &Path,
  options: &ComposeOptions,
) -> Result<ComposeOutcome, TacticError> {
  let rules = Arc::new(TacticRules::for_layers(&stack.layers)?);

  fs::create_dir_all(output).map_err(|source| TacticError::Write {
    path: output.to_path_buf(),
    source,
  })?;
  let output_buf = dunce::canonicalize(output).unwrap_or_else(|_| output.to_path_buf());
  let output = output_buf.as_path();

  let union = {
    let layers = stack.layers.clone();
    let output = output.to_path_buf();
    let options = options.clone();
    let rules = rules.clone();
    tokio::task::spawn_blocking(move || resolve_paths(&layers, &output, &options, &rules))
      .await
      .map_err(|e| TacticError::Task(e.to_string()))??
  };
  info!(paths = union.len(), layers = stack.layers.len(), "resolved paths");

  let staging_parent = output.parent().unwrap_or(output);
  let staging_dir = tempfile::Builder::new()
    .prefix(".charmbuild-staging-")
    .tempdir_in(staging_parent)
    .map_err(|source| TacticError::Write {
      path: staging_parent.to_path_buf(),
      source,
    })?;
  let staging = Arc::new(staging_dir.path().to_path_buf());

  let provided: HashSet<String> = union.keys().cloned().collect();
  let mut outcome = ComposeOutcome::default();
  let mut composed: Vec<ComposedFile> = Vec::new();

  // Per-path stage
  let failed = Arc::new(AtomicBool::new(false));
  let semaphore = Arc::new(Semaphore::new(options.parallelism.max(1)));
  let mut join_set = JoinSet::new();

  for (rel, contributors) in union {
    let kind = rules.select(&rel);
    let ctx = ctx.clone();
    let staging = staging.clone();
    let failed = failed.clone();
    let cancel = options.cancel.clone();
    let semaphore = semaphore.clone();

    join_set.spawn(async move {
      let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|e| TacticError::Task(e.to_string()))?;
      if cancel.is_cancelled() || failed.load(Ordering::SeqCst) {
        return Ok(None);
      }
      tokio::task::spawn_blocking(move || {
        let result = compose_path(kind, &rel, &contributors, &ctx, &staging);
        if let Err(e) = &result {
          error!(path = %rel, error = %e, "failed to compose path");
          failed.store(true, Ordering::SeqCst);
        }
        result.map(Some)
      })
      .await
      .map_err(|e| TacticError::Task(e.to_string()))?
    });
  }

  while let Some(joined) = join_set.join_next().await {
    match joined.map_err(|e| TacticError::Task(e.to_string())) {
      Ok(Ok(Some(files))) => composed.extend(files),
      Ok(Ok(None)) => {}
      Ok(Err(e)) | Err(e) => {
        if outcome.failure.is_none() {
          outcome.failure = Some(e);
        }
      }
    }
  }

  // Generators
  if outcome.failure.is_none() && !options.cancel.is_cancelled() {
    let layers = stack.layers.clone();
    let interfaces = stack.interfaces.clone();
    let ignore = options.ignore.clone();
    let staging = staging.clone();
    let generated = tokio::task::spawn_blocking(move || {
      let mut files = Vec::new();
      for interface in interfaces.iter() {
        files.extend(relation_hooks(interface, &ignore, &provided, &staging)?);
      }
      files.extend(storage_hooks(&layers, &provided, &staging)?);
      Ok::<_, TacticError>(files)
    })
    .await
    .map_err(|e| TacticError::Task(e.to_string()))?;

    match generated {
      Ok(files) => composed.extend(files),
      Err(e) => {
        error!(error = %e, "failed to generate hooks");
        outcome.failure = Some(e);
      }
    }
  }
  outcome.cancelled = options.cancel.is_cancelled();

  // Promotion
  let dest = output_buf.clone();
  let staged = staging.clone();
  let composed = tokio::task::spawn_blocking(move || {
    for file in &composed {
      promote(&staged, &dest, &file.rel)?;
    }
    Ok::<_, TacticError>(composed)
  })
  .await
  .map_err(|e| TacticError::Task(e.to_string()))??;
  drop(staging_dir);

  for file in composed {
    outcome.signatures.insert(file.rel, file.entry);
  }

  info!(
    files = outcome.signatures.len(),
    failed = outcome.failure.is_some(),
    cancelled = outcome.cancelled,
    "composition finished"
  );
  Ok(outcome)
}
