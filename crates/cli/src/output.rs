//! Terminal reporting for build summaries and manifest drift.
//!
//! Status lines go to stdout, failures and warnings to stderr. Colors are
//! applied only when the stream supports them.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

/// How `verify` reports its result.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Outcome shown in front of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Built,
  Failed,
  Warning,
  Note,
}

impl Status {
  fn marker(self) -> &'static str {
    match self {
      Status::Built => "✓",
      Status::Failed => "✗",
      Status::Warning => "⚠",
      Status::Note => "•",
    }
  }
}

/// How a path in an output tree differs from its manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
  Missing,
  Modified,
  Untracked,
}

impl Drift {
  fn marker(self) -> &'static str {
    match self {
      Drift::Missing => "-",
      Drift::Modified => "~",
      Drift::Untracked => "+",
    }
  }
}

/// Print a status line, e.g. `✓ Built foo in 1.20s`.
pub fn status(status: Status, message: &str) {
  let marker = status.marker();
  match status {
    Status::Built => println!("{} {}", marker.if_supports_color(Stream::Stdout, |s| s.green()), message),
    Status::Note => println!("{} {}", marker.if_supports_color(Stream::Stdout, |s| s.blue()), message),
    Status::Failed => eprintln!(
      "{} {}",
      marker.if_supports_color(Stream::Stderr, |s| s.red()),
      message.if_supports_color(Stream::Stderr, |s| s.red())
    ),
    Status::Warning => eprintln!(
      "{} {}",
      marker.if_supports_color(Stream::Stderr, |s| s.yellow()),
      message.if_supports_color(Stream::Stderr, |s| s.yellow())
    ),
  }
}

/// Print an indented `label: value` line under a status line.
pub fn detail(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

/// Print one drifted path.
pub fn drift(kind: Drift, path: &str) {
  let marker = kind.marker();
  let marker = match kind {
    Drift::Untracked => marker.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    Drift::Missing => marker.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    Drift::Modified => marker.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
  };
  println!("  {} {}", marker, path);
}

/// Build time as `850ms`, `4.25s` or `2m07s`.
pub fn elapsed(duration: Duration) -> String {
  let secs = duration.as_secs();
  match secs {
    0 => format!("{}ms", duration.subsec_millis()),
    1..60 => format!("{:.2}s", duration.as_secs_f64()),
    _ => format!("{}m{:02}s", secs / 60, secs % 60),
  }
}

pub fn emit_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to encode report as JSON")?;
  println!("{}", json);
  Ok(())
}
