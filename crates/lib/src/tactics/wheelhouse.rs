//! Python dependency bootstrap.
//!
//! Layers list requirements in `wheelhouse.txt`. The merged list is written
//! to the output tree and the packages are downloaded into
//! `wheelhouse/` with a pip from a throwaway virtualenv:
//!
//! ```text
//! python3 -m venv <tmp>
//! <tmp>/bin/pip3 download --no-binary :all: -d <staging>/wheelhouse -r <staging>/wheelhouse.txt
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{ComposeContext, ComposedFile, Tactic, TacticError, read_source, write_staged};
use crate::layer::Layer;
use crate::layer::ignore::to_slash;
use crate::manifest::EntryKind;

/// Directory archives are downloaded into, relative to the output root.
pub const WHEELHOUSE_DIR: &str = "wheelhouse";

/// How packages are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstallMode {
  /// Download source distributions only (`--no-binary :all:`).
  #[default]
  SourceOnly,
  /// Download whatever pip prefers, including prebuilt wheels.
  Prebuilt,
  /// Install into the user site (`pip3 install --user --ignore-installed`).
  User,
}

impl InstallMode {
  pub fn from_name(name: &str) -> Option<Self> {
    match name {
      "source" | "source-only" => Some(Self::SourceOnly),
      "prebuilt" | "binary" => Some(Self::Prebuilt),
      "user" => Some(Self::User),
      _ => None,
    }
  }
}

/// A process the installer collaborator should run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerCommand {
  pub program: String,
  pub args: Vec<String>,
  pub env: BTreeMap<String, String>,
  pub cwd: Option<PathBuf>,
}

impl InstallerCommand {
  pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
    Self {
      program: program.into(),
      args: args.into_iter().map(Into::into).collect(),
      env: BTreeMap::new(),
      cwd: None,
    }
  }
}

impl fmt::Display for InstallerCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program)?;
    for arg in &self.args {
      write!(f, " {}", arg)?;
    }
    Ok(())
  }
}

/// Errors from running an installer command.
#[derive(Debug, Error)]
pub enum InstallError {
  #[error("failed to spawn '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("'{command}' exited with code {code:?}")]
  Failed { command: String, code: Option<i32> },
}

/// Runs installer processes.
pub trait Installer: Send + Sync {
  fn run(&self, command: &InstallerCommand) -> Result<(), InstallError>;
}

/// [`Installer`] spawning real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessInstaller;

impl Installer for ProcessInstaller {
  fn run(&self, cmd: &InstallerCommand) -> Result<(), InstallError> {
    info!(cmd = %cmd, "running installer");

    let mut command = Command::new(&cmd.program);
    command.args(&cmd.args).envs(&cmd.env);
    if let Some(cwd) = &cmd.cwd {
      command.current_dir(cwd);
    }

    let output = command.output().map_err(|source| InstallError::Spawn {
      program: cmd.program.clone(),
      source,
    })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      if !stderr.is_empty() {
        debug!(stderr = %stderr, "installer stderr");
      }
      return Err(InstallError::Failed {
        command: cmd.to_string(),
        code: output.status.code(),
      });
    }

    Ok(())
  }
}

/// Project name of a requirement line, normalized for comparison.
fn project_name(requirement: &str) -> String {
  requirement
    .split(|c: char| matches!(c, '<' | '>' | '=' | '!' | '~' | ';' | '[' | '@' | ' '))
    .next()
    .unwrap_or(requirement)
    .trim()
    .to_ascii_lowercase()
    .replace('_', "-")
}

/// Merges requirement lists and downloads the packages.
#[derive(Debug)]
pub struct WheelhouseTactic {
  rel: String,
  /// Requirements in first-seen order; a later layer replaces the line of
  /// the same project in place.
  requirements: Vec<(String, String)>,
  owner: Option<String>,
}

impl WheelhouseTactic {
  pub fn new(rel: &str) -> Self {
    Self {
      rel: rel.to_string(),
      requirements: Vec::new(),
      owner: None,
    }
  }

  fn merged(&self) -> String {
    let mut out = String::new();
    for (_, line) in &self.requirements {
      out.push_str(line);
      out.push('\n');
    }
    out
  }

  fn commands(&self, mode: InstallMode, venv: &Path, staging: &Path) -> Vec<InstallerCommand> {
    let requirements = staging.join(&self.rel).to_string_lossy().into_owned();
    let dest = staging.join(WHEELHOUSE_DIR).to_string_lossy().into_owned();

    if mode == InstallMode::User {
      return vec![InstallerCommand::new(
        "pip3",
        ["install", "--user", "--ignore-installed", "-r", requirements.as_str()],
      )];
    }

    let venv_str = venv.to_string_lossy().into_owned();
    let pip = venv.join("bin").join("pip3").to_string_lossy().into_owned();
    let mut download = vec!["download".to_string()];
    if mode == InstallMode::SourceOnly {
      download.extend(["--no-binary".to_string(), ":all:".to_string()]);
    }
    download.extend(["-d".to_string(), dest, "-r".to_string(), requirements]);

    vec![
      InstallerCommand::new("python3", ["-m", "venv", venv_str.as_str()]),
      InstallerCommand::new(pip, download),
    ]
  }
}

impl Tactic for WheelhouseTactic {
  fn combine(&mut self, layer: &Layer, source: &Path) -> Result<(), TacticError> {
    let content = read_source(layer, source)?;
    for line in content.lines() {
      let line = line.trim();
      if line.is_empty() || line.starts_with('#') {
        continue;
      }
      let name = project_name(line);
      match self.requirements.iter_mut().find(|(n, _)| *n == name) {
        Some(existing) => {
          debug!(project = %name, layer = %layer.name, "requirement replaced");
          existing.1 = line.to_string();
        }
        None => self.requirements.push((name, line.to_string())),
      }
    }
    self.owner = Some(layer.name.clone());
    Ok(())
  }

  fn materialize(self: Box<Self>, ctx: &ComposeContext, staging: &Path) -> Result<Vec<ComposedFile>, TacticError> {
    let Some(owner) = self.owner.clone() else {
      return Ok(Vec::new());
    };

    write_staged(staging, &self.rel, self.merged().as_bytes())?;
    let mut files = vec![ComposedFile::record(staging, &self.rel, &owner, EntryKind::Dynamic)?];

    if self.requirements.is_empty() {
      return Ok(files);
    }

    let venv = tempfile::Builder::new()
      .prefix("charmbuild-venv-")
      .tempdir()
      .map_err(|source| TacticError::Write {
        path: std::env::temp_dir(),
        source,
      })?;

    for command in self.commands(ctx.install_mode, venv.path(), staging) {
      ctx
        .installer
        .run(&command)
        .map_err(|source| TacticError::DependencyBuild {
          path: self.rel.clone(),
          source,
        })?;
    }

    let downloads = staging.join(WHEELHOUSE_DIR);
    if downloads.is_dir() {
      for entry in WalkDir::new(&downloads).sort_by_file_name() {
        let entry = entry.map_err(|source| TacticError::Walk {
          layer: owner.clone(),
          source,
        })?;
        if !entry.file_type().is_file() {
          continue;
        }
        let Ok(rel) = entry.path().strip_prefix(staging) else {
          continue;
        };
        files.push(ComposedFile::record(staging, &to_slash(rel), &owner, EntryKind::Dynamic)?);
      }
    }

    info!(requirements = self.requirements.len(), archives = files.len() - 1, "wheelhouse ready");
    Ok(files)
  }
}
