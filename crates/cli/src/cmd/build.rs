//! Implementation of the `charm-build` build command.
//!
//! Composes the target layer and everything it includes into
//! `<output-dir>/<series>/<name>` and records the result in
//! `.build.manifest`.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use tracing::{debug, info};

use charmbuild_lib::build::{BuildConfig, Builder, Phase};
use charmbuild_lib::consts::INTERFACE_SERVICE_ENV;
use charmbuild_lib::tactics::InstallMode;

use crate::output::{Status, detail, elapsed, status};

#[derive(Debug, Clone, Args)]
pub struct BuildArgs {
  /// Layer to build: a directory, `layer:NAME` or `SERIES/NAME`
  #[arg(default_value = ".")]
  pub target: String,

  /// Directory the `<series>/<name>` tree is created under
  #[arg(short, long, env = "JUJU_REPOSITORY")]
  pub output_dir: Option<PathBuf>,

  /// Series directory of the output
  #[arg(short, long, default_value = "trusty")]
  pub series: String,

  /// Build name (defaults to the target layer's name)
  #[arg(short, long)]
  pub name: Option<String>,

  /// Do not send usage metrics
  #[arg(long)]
  pub no_metrics: bool,

  /// Fail the build when option lint reports problems
  #[arg(long)]
  pub strict: bool,

  /// Stop after this phase
  #[arg(long, value_name = "PHASE")]
  pub until: Option<Phase>,

  /// Base URL of the layer and interface name service
  #[arg(long, env = INTERFACE_SERVICE_ENV)]
  pub interface_service: Option<String>,

  /// Maximum concurrent fetches and composed paths
  #[arg(short, long)]
  pub jobs: Option<usize>,

  /// How wheelhouse dependencies are obtained: source, prebuilt or user
  #[arg(long, value_parser = parse_install_mode, default_value = "source")]
  pub install_mode: InstallMode,

  /// Write into the target layer's own directory
  #[arg(long)]
  pub in_place: bool,
}

fn parse_install_mode(value: &str) -> Result<InstallMode, String> {
  InstallMode::from_name(value).ok_or_else(|| format!("unknown install mode '{}' (expected source, prebuilt or user)", value))
}

impl BuildArgs {
  /// Overlay the flags onto the environment-derived configuration.
  pub fn into_config(self) -> BuildConfig {
    let mut config = BuildConfig::from_env();
    config.target = self.target;
    config.series = self.series;
    config.name = self.name;
    config.strict_lint = self.strict;
    config.install_mode = self.install_mode;
    config.output_is_target = self.in_place;
    if let Some(dir) = self.output_dir {
      config.output_dir = dir;
    }
    if let Some(last) = self.until {
      config.phases = Phase::through(last);
    }
    if let Some(url) = self.interface_service {
      config.interface_service = url;
    }
    if let Some(jobs) = self.jobs {
      config.parallelism = jobs.max(1);
    }
    config
  }
}

/// Execute a build.
///
/// Ctrl-C cancels the build between paths; files already composed are kept
/// and recorded in a partial manifest.
pub fn cmd_build(args: BuildArgs) -> Result<()> {
  if args.no_metrics {
    debug!("metrics disabled");
  }
  let config = args.into_config();
  let cancel = config.cancel.clone();
  let target = config.target.clone();

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let started = Instant::now();
  let report = rt
    .block_on(async move {
      tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
          info!("interrupted, cancelling build");
          cancel.cancel();
        }
      });
      Builder::new(config).build().await
    })
    .with_context(|| format!("Build of '{}' failed", target))?;

  let Some(output) = &report.output else {
    let last = report.completed.last().map(|p| p.as_str()).unwrap_or("none");
    status(Status::Note, &format!("Stopped after {} phase", last));
    return Ok(());
  };

  if !report.lint.is_ok() {
    status(Status::Warning, &format!("{} option value(s) failed lint", report.lint.violations.len()));
    for violation in &report.lint.violations {
      detail(&violation.key, &violation.cause);
    }
  }

  status(Status::Built, &format!(
    "Built {} in {}",
    report.name.as_deref().unwrap_or(&target),
    elapsed(started.elapsed())
  ));
  detail("Output", &output.display().to_string());
  detail("Layers", &report.layers.join(", "));
  if let Some(manifest) = &report.manifest {
    detail("Files", &manifest.files().count().to_string());
  } else {
    detail("Manifest", "not written");
  }
  if !report.removed.is_empty() {
    detail("Removed", &report.removed.len().to_string());
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser)]
  struct TestCli {
    #[command(flatten)]
    args: BuildArgs,
  }

  fn parse(argv: &[&str]) -> BuildArgs {
    TestCli::try_parse_from(std::iter::once("charm-build").chain(argv.iter().copied()))
      .unwrap()
      .args
  }

  #[test]
  fn flags_map_onto_config() {
    let config = parse(&["trusty/tester", "-o", "/tmp/charms", "-s", "xenial", "-n", "foo", "--strict", "-j", "3"])
      .into_config();

    assert_eq!(config.target, "trusty/tester");
    assert_eq!(config.output_dir, PathBuf::from("/tmp/charms"));
    assert_eq!(config.series, "xenial");
    assert_eq!(config.name.as_deref(), Some("foo"));
    assert!(config.strict_lint);
    assert_eq!(config.parallelism, 3);
    assert_eq!(config.phases, Phase::ALL.to_vec());
  }

  #[test]
  fn until_truncates_phases() {
    let config = parse(&["--until", "lint"]).into_config();
    assert_eq!(config.phases.last(), Some(&Phase::Lint));
    assert_eq!(config.target, ".");
  }

  #[test]
  fn install_mode_is_parsed() {
    assert_eq!(parse(&["--install-mode", "user"]).install_mode, InstallMode::User);
    assert_eq!(parse(&[]).install_mode, InstallMode::SourceOnly);
  }

  #[test]
  fn bad_phase_is_rejected() {
    assert!(TestCli::try_parse_from(["charm-build", "--until", "sign"]).is_err());
  }
}
