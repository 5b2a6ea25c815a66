//! Repository checkout for remote layers and interfaces.
//!
//! The locator never talks to git directly; it hands a repository URL, an
//! optional revision and an empty destination to a [`Fetcher`]. The default
//! [`GitFetcher`] clones with `gix`.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while checking out a repository.
#[derive(Debug, Error)]
pub enum FetchError {
  /// Failed to prepare the destination directory.
  #[error("failed to create checkout directory '{0}': {1}")]
  CreateDir(PathBuf, #[source] std::io::Error),

  /// Failed to clone a git repository.
  #[error("failed to clone repository '{url}': {source}")]
  Clone {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// The requested revision is not a valid reference name.
  #[error("invalid revision '{rev}': {source}")]
  InvalidRevision {
    rev: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// Failed to check out the working tree.
  #[error("failed to checkout '{rev}' of '{url}': {source}")]
  Checkout {
    url: String,
    rev: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

/// Checks out `(repo, rev)` into a local directory.
pub trait Fetcher: Send + Sync {
  /// Check out `repo` at `rev` (or its default branch) into `dest`.
  ///
  /// `dest` does not exist yet. Returns the root of the checkout.
  fn fetch(&self, repo: &str, rev: Option<&str>, dest: &Path) -> Result<PathBuf, FetchError>;
}

/// Clones repositories with `gix`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitFetcher;

impl Fetcher for GitFetcher {
  fn fetch(&self, repo: &str, rev: Option<&str>, dest: &Path) -> Result<PathBuf, FetchError> {
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).map_err(|e| FetchError::CreateDir(parent.to_path_buf(), e))?;
    }

    info!(url = repo, rev = rev.unwrap_or("HEAD"), path = %dest.display(), "cloning repository");

    let mut prepared = gix::prepare_clone(repo, dest).map_err(|e| FetchError::Clone {
      url: repo.to_string(),
      source: Box::new(e),
    })?;

    if let Some(rev) = rev {
      prepared = prepared
        .with_ref_name(Some(rev))
        .map_err(|e| FetchError::InvalidRevision {
          rev: rev.to_string(),
          source: Box::new(e),
        })?;
    }

    let (mut checkout, _outcome) = prepared
      .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
      .map_err(|e| FetchError::Clone {
        url: repo.to_string(),
        source: Box::new(e),
      })?;

    let (_repo, _outcome) = checkout
      .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
      .map_err(|e| FetchError::Checkout {
        url: repo.to_string(),
        rev: rev.unwrap_or("HEAD").to_string(),
        source: Box::new(e),
      })?;

    debug!(url = repo, path = %dest.display(), "checkout complete");
    Ok(dest.to_path_buf())
  }
}
