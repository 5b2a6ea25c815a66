mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::cmd::{BuildArgs, cmd_build, cmd_verify};
use crate::output::{OutputFormat, Status, status};

/// charm-build - compose charm layers into a deployable charm
#[derive(Parser)]
#[command(name = "charm-build")]
#[command(author, version, about, long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
  /// Log level (overrides RUST_LOG)
  #[arg(short, long, global = true)]
  log_level: Option<Level>,

  #[command(subcommand)]
  command: Option<Commands>,

  #[command(flatten)]
  build: BuildArgs,
}

#[derive(Subcommand)]
enum Commands {
  /// Check a built tree against its manifest
  Verify {
    /// Output directory of an earlier build
    #[arg(default_value = ".")]
    dir: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
  },
}

fn main() {
  let cli = Cli::parse();

  let filter = match cli.log_level {
    Some(level) => EnvFilter::new(level.as_str()),
    None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
  };
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(e) = run(cli) {
    status(Status::Failed, &format!("{:#}", e));
    std::process::exit(1);
  }
}

fn run(cli: Cli) -> Result<()> {
  match cli.command {
    Some(Commands::Verify { dir, output }) => cmd_verify(&dir, output),
    None => cmd_build(cli.build),
  }
}
