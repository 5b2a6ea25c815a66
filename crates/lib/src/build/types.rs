//! Builder configuration, phases and errors.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::consts::{DEFAULT_IGNORES, DEFAULT_INTERFACE_SERVICE, INTERFACE_PATH_ENV, INTERFACE_SERVICE_ENV, LAYER_PATH_ENV};
use crate::entity::EntityRefError;
use crate::flatten::FlattenError;
use crate::manifest::ManifestError;
use crate::platform::paths::{deps_dir, search_path_from_env};
use crate::tactics::{InstallMode, TacticError};
use crate::util::cancel::CancelToken;

/// Environment variable naming the default output directory.
pub const JUJU_REPOSITORY_ENV: &str = "JUJU_REPOSITORY";

/// Build phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
  Fetch,
  Flatten,
  Compose,
  Lint,
  Manifest,
  Finalize,
}

impl Phase {
  pub const ALL: [Phase; 6] = [
    Phase::Fetch,
    Phase::Flatten,
    Phase::Compose,
    Phase::Lint,
    Phase::Manifest,
    Phase::Finalize,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Phase::Fetch => "fetch",
      Phase::Flatten => "flatten",
      Phase::Compose => "compose",
      Phase::Lint => "lint",
      Phase::Manifest => "manifest",
      Phase::Finalize => "finalize",
    }
  }

  /// Every phase up to and including `last`.
  pub fn through(last: Phase) -> Vec<Phase> {
    Phase::ALL.into_iter().filter(|p| *p <= last).collect()
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Phase {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Phase::ALL
      .into_iter()
      .find(|p| p.as_str() == s.to_ascii_lowercase())
      .ok_or_else(|| {
        let names: Vec<&str> = Phase::ALL.iter().map(|p| p.as_str()).collect();
        format!("unknown phase '{}' (expected one of: {})", s, names.join(", "))
      })
  }
}

/// Configuration for one build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Reference to the target layer: a directory, `layer:NAME` or `SERIES/NAME`.
  pub target: String,

  /// Root under which `<series>/<name>` is created.
  pub output_dir: PathBuf,

  pub series: String,

  /// Build name; defaults to the target layer's name.
  pub name: Option<String>,

  /// Phases to run. Must be a leading run of [`Phase::ALL`].
  pub phases: Vec<Phase>,

  /// Patterns never copied from any layer.
  pub ignore: Vec<String>,

  /// Fail the build when option lint reports violations.
  pub strict_lint: bool,

  /// Maximum concurrent fetches and composed paths.
  pub parallelism: usize,

  pub layer_path: Vec<PathBuf>,
  pub interface_path: Vec<PathBuf>,

  /// Where remote layers and interfaces are checked out.
  pub cache_dir: PathBuf,

  /// Base URL of the name-resolution service.
  pub interface_service: String,

  /// Write into the target layer's own directory.
  pub output_is_target: bool,

  pub install_mode: InstallMode,

  /// Relative references resolve against this directory.
  pub working_dir: PathBuf,

  pub cancel: CancelToken,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      target: ".".to_string(),
      output_dir: PathBuf::from("."),
      series: "trusty".to_string(),
      name: None,
      phases: Phase::ALL.to_vec(),
      ignore: DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect(),
      strict_lint: false,
      parallelism: num_cpus(),
      layer_path: Vec::new(),
      interface_path: Vec::new(),
      cache_dir: deps_dir(),
      interface_service: DEFAULT_INTERFACE_SERVICE.to_string(),
      output_is_target: false,
      install_mode: InstallMode::default(),
      working_dir: PathBuf::from("."),
      cancel: CancelToken::new(),
    }
  }
}

impl BuildConfig {
  /// Defaults overlaid with `LAYER_PATH`, `INTERFACE_PATH`,
  /// `CHARMBUILD_INTERFACE_SERVICE` and `JUJU_REPOSITORY`.
  pub fn from_env() -> Self {
    let mut config = Self {
      layer_path: search_path_from_env(LAYER_PATH_ENV),
      interface_path: search_path_from_env(INTERFACE_PATH_ENV),
      ..Self::default()
    };
    if let Ok(service) = std::env::var(INTERFACE_SERVICE_ENV)
      && !service.is_empty()
    {
      config.interface_service = service;
    }
    if let Some(repo) = std::env::var_os(JUJU_REPOSITORY_ENV)
      && !repo.is_empty()
    {
      config.output_dir = PathBuf::from(repo);
    }
    if let Ok(cwd) = std::env::current_dir() {
      config.working_dir = cwd;
    }
    config
  }

  pub fn runs(&self, phase: Phase) -> bool {
    self.phases.contains(&phase)
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Why a phase failed.
#[derive(Debug, Error)]
pub enum PhaseError {
  #[error("invalid target reference: {0}")]
  Reference(#[from] EntityRefError),

  #[error(transparent)]
  Flatten(#[from] FlattenError),

  #[error(transparent)]
  Tactic(#[from] TacticError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error("{count} invalid option value(s)")]
  OptionLint { count: usize },

  #[error("failed to remove stale file '{path}': {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("phase list must be a leading run of fetch, flatten, compose, lint, manifest, finalize; got [{0}]")]
  Phases(String),

  #[error("build cancelled")]
  Cancelled,
}

/// The first fatal error of a build, with the phase it happened in.
#[derive(Debug, Error)]
#[error("{phase} failed: {source}")]
pub struct BuildError {
  pub phase: Phase,
  #[source]
  pub source: PhaseError,
}

impl BuildError {
  pub fn new(phase: Phase, source: impl Into<PhaseError>) -> Self {
    Self {
      phase,
      source: source.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  #[test]
  fn phases_parse_case_insensitively() {
    assert_eq!("lint".parse::<Phase>().unwrap(), Phase::Lint);
    assert_eq!("Manifest".parse::<Phase>().unwrap(), Phase::Manifest);
    assert!("sign".parse::<Phase>().unwrap_err().contains("unknown phase 'sign'"));
  }

  #[test]
  fn through_truncates_trailing_phases() {
    assert_eq!(Phase::through(Phase::Lint), vec![Phase::Fetch, Phase::Flatten, Phase::Compose, Phase::Lint]);
    assert_eq!(Phase::through(Phase::Finalize), Phase::ALL.to_vec());
  }

  #[test]
  fn default_config_runs_everything_permissively() {
    let config = BuildConfig::default();
    assert_eq!(config.phases, Phase::ALL.to_vec());
    assert!(!config.strict_lint);
    assert!(config.parallelism >= 1);
    assert!(config.ignore.iter().any(|p| p == ".git"));
    assert_eq!(config.interface_service, DEFAULT_INTERFACE_SERVICE);
  }

  #[test]
  #[serial]
  fn from_env_reads_paths_and_service() {
    temp_env::with_vars(
      [
        (LAYER_PATH_ENV, Some("/srv/layers")),
        (INTERFACE_PATH_ENV, Some("/srv/interfaces")),
        (INTERFACE_SERVICE_ENV, Some("http://localhost:9000")),
        (JUJU_REPOSITORY_ENV, Some("/srv/charms")),
      ],
      || {
        let config = BuildConfig::from_env();
        assert_eq!(config.layer_path, vec![PathBuf::from("/srv/layers")]);
        assert_eq!(config.interface_path, vec![PathBuf::from("/srv/interfaces")]);
        assert_eq!(config.interface_service, "http://localhost:9000");
        assert_eq!(config.output_dir, PathBuf::from("/srv/charms"));
      },
    );
  }

  #[test]
  fn build_error_names_phase() {
    let err = BuildError::new(Phase::Lint, PhaseError::OptionLint { count: 2 });
    assert_eq!(err.to_string(), "lint failed: 2 invalid option value(s)");
  }
}
