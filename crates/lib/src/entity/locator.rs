//! Reference to local directory resolution.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{debug, info};

use super::fetch::{FetchError, Fetcher};
use super::resolve::{ResolveError, Resolver};
use super::types::{EntityRef, ResolvedEntity};
use crate::layer::LayerKind;

/// Errors that can occur while locating an entity.
#[derive(Debug, Error)]
pub enum LocateError {
  #[error("no local directory, search-path entry or remote record for '{reference}'")]
  NotFound { reference: String },

  #[error("failed to fetch '{reference}': {source}")]
  Fetch {
    reference: String,
    #[source]
    source: FetchError,
  },

  #[error("failed to resolve '{reference}': {source}")]
  Resolver {
    reference: String,
    #[source]
    source: ResolveError,
  },

  #[error("failed to prepare cache directory '{path}': {source}")]
  Cache {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Cache key of a remote checkout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
  kind: LayerKind,
  name: String,
  version: String,
}

type Slot = Arc<Mutex<Option<PathBuf>>>;

/// Resolves references to local directories.
///
/// Lookup order: existing local directory, then the layer or interface
/// search path, then the remote resolver plus fetcher. Remote checkouts land
/// in `<cache>/<kind>s/<name>-<version>` and are reused across builds.
///
/// A locator is shared by every concurrent lookup of one build; each remote
/// `(kind, name, version)` is fetched at most once.
pub struct EntityLocator {
  base_dir: PathBuf,
  layer_path: Vec<PathBuf>,
  interface_path: Vec<PathBuf>,
  cache_dir: PathBuf,
  resolver: Arc<dyn Resolver>,
  fetcher: Arc<dyn Fetcher>,
  slots: Mutex<HashMap<CacheKey, Slot>>,
}

impl std::fmt::Debug for EntityLocator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EntityLocator")
      .field("base_dir", &self.base_dir)
      .field("layer_path", &self.layer_path)
      .field("interface_path", &self.interface_path)
      .field("cache_dir", &self.cache_dir)
      .finish_non_exhaustive()
  }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EntityLocator {
  /// Create a locator.
  ///
  /// Relative path references resolve against `base_dir`.
  pub fn new(
    base_dir: impl Into<PathBuf>,
    cache_dir: impl Into<PathBuf>,
    resolver: Arc<dyn Resolver>,
    fetcher: Arc<dyn Fetcher>,
  ) -> Self {
    Self {
      base_dir: base_dir.into(),
      layer_path: Vec::new(),
      interface_path: Vec::new(),
      cache_dir: cache_dir.into(),
      resolver,
      fetcher,
      slots: Mutex::new(HashMap::new()),
    }
  }

  pub fn with_layer_path(mut self, dirs: Vec<PathBuf>) -> Self {
    self.layer_path = dirs;
    self
  }

  pub fn with_interface_path(mut self, dirs: Vec<PathBuf>) -> Self {
    self.interface_path = dirs;
    self
  }

  /// Resolve `reference` to a local directory, fetching it if needed.
  ///
  /// Blocking: performs network and filesystem I/O.
  pub fn locate(&self, reference: &EntityRef) -> Result<ResolvedEntity, LocateError> {
    if let Some(found) = self.find_local(reference) {
      return Ok(found);
    }
    if let Some(found) = self.find_on_search_path(reference) {
      return Ok(found);
    }
    self.fetch_remote(reference)
  }

  fn find_local(&self, reference: &EntityRef) -> Option<ResolvedEntity> {
    if !reference.path_like {
      return None;
    }

    let candidate = self.base_dir.join(&reference.raw);
    if !candidate.is_dir() {
      return None;
    }

    let path = dunce::canonicalize(&candidate).unwrap_or(candidate);
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| reference.name.clone());

    debug!(reference = %reference, path = %path.display(), "using local directory");
    Some(ResolvedEntity {
      name,
      kind: reference.kind,
      path,
      source: "local".to_string(),
    })
  }

  fn find_on_search_path(&self, reference: &EntityRef) -> Option<ResolvedEntity> {
    let dirs = match reference.kind {
      LayerKind::Layer => &self.layer_path,
      LayerKind::Interface => &self.interface_path,
    };

    dirs.iter().map(|dir| dir.join(&reference.lookup)).find(|p| p.is_dir()).map(|path| {
      let path = dunce::canonicalize(&path).unwrap_or(path);
      debug!(reference = %reference, path = %path.display(), "found on search path");
      ResolvedEntity {
        name: reference.name.clone(),
        kind: reference.kind,
        path,
        source: "local".to_string(),
      }
    })
  }

  fn fetch_remote(&self, reference: &EntityRef) -> Result<ResolvedEntity, LocateError> {
    let record = self
      .resolver
      .resolve(reference.kind, &reference.name, reference.version.as_deref())
      .map_err(|source| LocateError::Resolver {
        reference: reference.raw.clone(),
        source,
      })?
      .ok_or_else(|| LocateError::NotFound {
        reference: reference.raw.clone(),
      })?;

    let key = CacheKey {
      kind: reference.kind,
      name: reference.name.clone(),
      version: record.version.clone(),
    };

    let slot = lock(&self.slots).entry(key.clone()).or_default().clone();
    let mut cached = lock(&slot);

    let path = match cached.as_ref() {
      Some(path) => path.clone(),
      None => {
        let path = self.checkout(&key, &record.repo, reference)?;
        *cached = Some(path.clone());
        path
      }
    };

    Ok(ResolvedEntity {
      name: reference.name.clone(),
      kind: reference.kind,
      path,
      source: format!("{}@{}", record.repo, record.version),
    })
  }

  /// Check out into a temporary sibling and rename it into place.
  fn checkout(&self, key: &CacheKey, repo: &str, reference: &EntityRef) -> Result<PathBuf, LocateError> {
    let kind_dir = self.cache_dir.join(format!("{}s", key.kind));
    let dest = kind_dir.join(format!("{}-{}", key.name, key.version));

    if dest.is_dir() {
      debug!(reference = %reference, path = %dest.display(), "reusing cached checkout");
      return Ok(dest);
    }

    let cache_err = |path: &Path| {
      let path = path.to_path_buf();
      move |source| LocateError::Cache { path, source }
    };

    fs::create_dir_all(&kind_dir).map_err(cache_err(&kind_dir))?;
    let staging = tempfile::Builder::new()
      .prefix(&format!(".{}-", key.name))
      .tempdir_in(&kind_dir)
      .map_err(cache_err(&kind_dir))?;

    info!(reference = %reference, repo, version = %key.version, "fetching");
    let checkout = self
      .fetcher
      .fetch(repo, reference.version.as_deref(), &staging.path().join("src"))
      .map_err(|source| LocateError::Fetch {
        reference: reference.raw.clone(),
        source,
      })?;

    fs::rename(&checkout, &dest).map_err(cache_err(&dest))?;
    Ok(dest)
  }
}
