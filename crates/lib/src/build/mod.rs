//! Build orchestration.
//!
//! A build runs the phases of [`Phase::ALL`] in order:
//!
//! ```text
//! fetch     resolve the target and everything it includes
//! flatten   order the include graph base-first
//! compose   run the tactic engine into the output tree
//! lint      validate merged layer options
//! manifest  write .build.manifest
//! finalize  remove files the previous build produced and this one did not
//! ```
//!
//! The phase list may stop early; the first fatal error ends the build and is
//! reported together with the phase it happened in.

mod types;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::entity::{EntityLocator, EntityRef, Fetcher, GitFetcher, HttpResolver, Resolver};
use crate::flatten::{FlattenError, IncludeGraph, LayerStack, fetch_entities};
use crate::layer::{IgnoreRules, Layer};
use crate::manifest::{self, BuildManifest};
use crate::options::{self, LintReport, MergedOptions};
use crate::tactics::{ComposeContext, ComposeOptions, ComposeOutcome, Installer, ProcessInstaller, TacticError, compose};
use crate::util::hash::hash_file;

pub use types::*;

/// What a build did.
#[derive(Debug, Default)]
pub struct BuildReport {
  /// Build name, once the target was resolved.
  pub name: Option<String>,
  /// Output directory, once known.
  pub output: Option<PathBuf>,
  /// Layer names base-first, then interface names.
  pub layers: Vec<String>,
  /// Phases that completed.
  pub completed: Vec<Phase>,
  pub lint: LintReport,
  /// Manifest written by this build.
  pub manifest: Option<BuildManifest>,
  /// Stale files removed by finalize.
  pub removed: Vec<String>,
}

/// Runs builds against a set of collaborators.
pub struct Builder {
  config: BuildConfig,
  resolver: Arc<dyn Resolver>,
  fetcher: Arc<dyn Fetcher>,
  installer: Arc<dyn Installer>,
}

impl Builder {
  /// Create a builder using the HTTP resolver, git fetcher and process
  /// installer.
  pub fn new(config: BuildConfig) -> Self {
    let resolver = Arc::new(HttpResolver::new(config.interface_service.clone()));
    Self {
      config,
      resolver,
      fetcher: Arc::new(GitFetcher),
      installer: Arc::new(ProcessInstaller),
    }
  }

  pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
    self.resolver = resolver;
    self
  }

  pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
    self.fetcher = fetcher;
    self
  }

  pub fn with_installer(mut self, installer: Arc<dyn Installer>) -> Self {
    self.installer = installer;
    self
  }

  pub fn config(&self) -> &BuildConfig {
    &self.config
  }

  /// Run the configured phases.
  pub async fn build(&self) -> Result<BuildReport, BuildError> {
    let config = &self.config;
    validate_phases(&config.phases)?;
    let mut report = BuildReport::default();

    // fetch
    self.check_cancel(Phase::Fetch)?;
    let graph = self.fetch().await?;
    report.completed.push(Phase::Fetch);
    if !config.runs(Phase::Flatten) {
      return Ok(report);
    }

    // flatten
    self.check_cancel(Phase::Flatten)?;
    let (name, stack) = self.flatten(&graph)?;
    info!(name = %name, layers = ?stack.names(), "flattened layer stack");
    report.name = Some(name.clone());
    report.layers = stack.names().into_iter().map(str::to_string).collect();
    report.completed.push(Phase::Flatten);
    if !config.runs(Phase::Compose) {
      return Ok(report);
    }

    let Some(target) = stack.target().cloned() else {
      return Err(BuildError::new(
        Phase::Flatten,
        FlattenError::Unresolved {
          reference: config.target.clone(),
        },
      ));
    };
    let output = self.output_dir(&target, &name);
    report.output = Some(output.clone());

    // compose
    self.check_cancel(Phase::Compose)?;
    let merged = options::merge(stack.layers.iter().map(|l| &**l));
    let prior = manifest::read(&output).map_err(|e| BuildError::new(Phase::Compose, e))?;
    let outcome = self.compose(&stack, &target, &name, &merged, &output, prior.as_ref()).await?;
    let outcome = finish_compose(outcome, &stack, &output, prior.as_ref())?;
    report.completed.push(Phase::Compose);
    if !config.runs(Phase::Lint) {
      return Ok(report);
    }

    // lint
    self.check_cancel(Phase::Lint)?;
    report.lint = options::lint(&merged);
    if !report.lint.is_ok() {
      let count = report.lint.violations.len();
      if config.strict_lint {
        return Err(BuildError::new(Phase::Lint, PhaseError::OptionLint { count }));
      }
      warn!(count, "option lint failed, continuing");
    }
    report.completed.push(Phase::Lint);
    if !config.runs(Phase::Manifest) {
      return Ok(report);
    }

    // manifest
    self.check_cancel(Phase::Manifest)?;
    let built = BuildManifest::new(stack.all().map(|l| &**l), outcome.signatures);
    manifest::write(&output, &built).map_err(|e| BuildError::new(Phase::Manifest, e))?;
    info!(output = %output.display(), files = built.signatures.len(), "manifest written");
    report.completed.push(Phase::Manifest);

    if config.runs(Phase::Finalize) {
      self.check_cancel(Phase::Finalize)?;
      if let Some(prior) = &prior {
        report.removed = remove_stale(&output, prior, &built).map_err(|e| BuildError::new(Phase::Finalize, e))?;
      }
      info!(
        name = %name,
        output = %output.display(),
        files = built.files().count(),
        removed = report.removed.len(),
        "build complete"
      );
      report.completed.push(Phase::Finalize);
    }
    report.manifest = Some(built);

    Ok(report)
  }

  fn check_cancel(&self, phase: Phase) -> Result<(), BuildError> {
    if self.config.cancel.is_cancelled() {
      return Err(BuildError::new(phase, PhaseError::Cancelled));
    }
    Ok(())
  }

  async fn fetch(&self) -> Result<IncludeGraph, BuildError> {
    let config = &self.config;
    let target = EntityRef::parse(&config.target).map_err(|e| BuildError::new(Phase::Fetch, e))?;
    let locator = Arc::new(
      EntityLocator::new(
        &config.working_dir,
        &config.cache_dir,
        self.resolver.clone(),
        self.fetcher.clone(),
      )
      .with_layer_path(config.layer_path.clone())
      .with_interface_path(config.interface_path.clone()),
    );

    info!(target = %target, "fetching layers");
    let graph = fetch_entities(&target, locator, config.parallelism)
      .await
      .map_err(|e| BuildError::new(Phase::Fetch, e))?;
    debug!(entities = graph.len(), "fetch finished");
    Ok(graph)
  }

  fn flatten(&self, graph: &IncludeGraph) -> Result<(String, LayerStack), BuildError> {
    let root_name = graph.root().map(|l| l.name.clone()).unwrap_or_default();
    let name = self.config.name.clone().unwrap_or(root_name);
    let stack = graph
      .flatten(Some(name.as_str()))
      .map_err(|e| BuildError::new(Phase::Flatten, e))?;
    Ok((name, stack))
  }

  /// `<output_dir>/<series>/<name>`, or the target's own directory when
  /// building in place.
  fn output_dir(&self, target: &Layer, name: &str) -> PathBuf {
    let config = &self.config;
    let root = if config.output_dir.is_absolute() {
      config.output_dir.clone()
    } else {
      config.working_dir.join(&config.output_dir)
    };
    let default = root.join(&config.series).join(name);

    let in_place = config.output_is_target
      || dunce::canonicalize(&default).is_ok_and(|d| d == target.path)
      || dunce::canonicalize(&root).is_ok_and(|d| d == target.path);
    if in_place {
      debug!(path = %target.path.display(), "regenerating in place");
      target.path.clone()
    } else {
      default
    }
  }

  async fn compose(
    &self,
    stack: &LayerStack,
    target: &Layer,
    name: &str,
    merged: &MergedOptions,
    output: &Path,
    prior: Option<&BuildManifest>,
  ) -> Result<ComposeOutcome, BuildError> {
    let config = &self.config;
    let ignore = IgnoreRules::new(config.ignore.as_slice())
      .map_err(|e| BuildError::new(Phase::Compose, TacticError::from(e)))?;

    // A target that is itself an earlier build output carries its manifest.
    let target_manifest = if target.path == output {
      prior.cloned()
    } else {
      manifest::read(&target.path).map_err(|e| BuildError::new(Phase::Compose, e))?
    };

    let ctx = Arc::new(ComposeContext {
      build_name: name.to_string(),
      target_includes: target.config.includes.clone(),
      options: merged.clone(),
      layers: stack.layers.clone(),
      installer: self.installer.clone(),
      install_mode: config.install_mode,
    });
    let options = ComposeOptions {
      ignore,
      parallelism: config.parallelism,
      cancel: config.cancel.clone(),
      target_manifest,
    };

    info!(output = %output.display(), "composing");
    compose(stack, ctx, output, &options)
      .await
      .map_err(|e| BuildError::new(Phase::Compose, e))
  }
}

/// Turn a failed or cancelled composition into an error, recording what
/// reached the output tree in a partial manifest first.
fn finish_compose(
  outcome: ComposeOutcome,
  stack: &LayerStack,
  output: &Path,
  prior: Option<&BuildManifest>,
) -> Result<ComposeOutcome, BuildError> {
  if outcome.is_complete() {
    return Ok(outcome);
  }

  let mut signatures = outcome.signatures;
  // Files of the previous build that were not rewritten are still on disk.
  if let Some(prior) = prior {
    for (rel, entry) in prior.files() {
      if !signatures.contains_key(rel) && output.join(rel).is_file() {
        signatures.insert(rel.to_string(), entry.clone());
      }
    }
  }
  let mut partial = BuildManifest::new(stack.all().map(|l| &**l), signatures);
  partial.partial = true;
  if let Err(e) = manifest::write(output, &partial) {
    warn!(error = %e, "failed to record partial manifest");
  } else {
    warn!(output = %output.display(), files = partial.files().count(), "recorded partial manifest");
  }

  match outcome.failure {
    Some(failure) => Err(BuildError::new(Phase::Compose, failure)),
    None => Err(BuildError::new(Phase::Compose, PhaseError::Cancelled)),
  }
}

/// Phases must be a non-empty leading run of [`Phase::ALL`].
fn validate_phases(phases: &[Phase]) -> Result<(), BuildError> {
  if !phases.is_empty() && phases.len() <= Phase::ALL.len() && *phases == Phase::ALL[..phases.len()] {
    return Ok(());
  }
  let listed: Vec<&str> = phases.iter().map(|p| p.as_str()).collect();
  Err(BuildError::new(
    phases.first().copied().unwrap_or(Phase::Fetch),
    PhaseError::Phases(listed.join(", ")),
  ))
}

/// Delete files `prior` recorded that `current` no longer produces.
///
/// Files whose content no longer matches the recorded hash were edited by
/// hand and are left alone.
fn remove_stale(output: &Path, prior: &BuildManifest, current: &BuildManifest) -> Result<Vec<String>, PhaseError> {
  let mut removed = Vec::new();

  for (rel, entry) in prior.files() {
    if current.get(rel).is_some() {
      continue;
    }
    let path = output.join(rel);
    if !path.is_file() {
      continue;
    }
    if let Some(expected) = &entry.hash
      && hash_file(&path).is_ok_and(|actual| actual != *expected)
    {
      warn!(path = %rel, "stale file was modified, keeping it");
      continue;
    }

    fs::remove_file(&path).map_err(|source| PhaseError::Remove {
      path: path.clone(),
      source,
    })?;
    debug!(path = %rel, owner = %entry.owner, "removed stale file");
    prune_empty_parents(output, &path);
    removed.push(rel.to_string());
  }

  Ok(removed)
}

fn prune_empty_parents(output: &Path, removed: &Path) {
  let mut dir = removed.parent();
  while let Some(current) = dir {
    if current == output || !current.starts_with(output) {
      break;
    }
    // Fails on non-empty directories, which ends the walk.
    if fs::remove_dir(current).is_err() {
      break;
    }
    dir = current.parent();
  }
}
