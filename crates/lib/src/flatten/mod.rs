//! Dependency flattening.
//!
//! Resolves the include graph of a root layer and orders it base-first:
//!
//! ```text
//!         tester                 layers:     [basic, mysql, tester]
//!        /      \                interfaces: [mysql]
//!   trusty/mysql  interface:mysql
//!       |
//!   layer:basic
//! ```

mod graph;

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::entity::{EntityLocator, EntityRef, EntityRefError, LocateError};
use crate::layer::{Layer, LayerError};

pub use graph::IncludeGraph;
use graph::ref_key;

/// Errors that can occur while resolving or flattening the include graph.
#[derive(Debug, Error)]
pub enum FlattenError {
  #[error("invalid include in layer '{layer}': {source}")]
  Reference {
    layer: String,
    #[source]
    source: EntityRefError,
  },

  #[error(transparent)]
  Locate(#[from] LocateError),

  #[error(transparent)]
  Load(#[from] LayerError),

  #[error("cyclic dependency: {cycle}")]
  CyclicDependency { cycle: String },

  #[error("include '{reference}' was never resolved")]
  Unresolved { reference: String },

  #[error("fetch task failed: {0}")]
  Task(String),
}

/// The ordered layer list of a build.
///
/// `layers` runs from the most-base layer to the target; no name appears
/// twice. Interfaces are kept apart in first-seen order.
#[derive(Debug, Clone)]
pub struct LayerStack {
  pub layers: Arc<[Arc<Layer>]>,
  pub interfaces: Arc<[Arc<Layer>]>,
}

impl LayerStack {
  pub fn new(layers: Vec<Arc<Layer>>, interfaces: Vec<Arc<Layer>>) -> Self {
    Self {
      layers: layers.into(),
      interfaces: interfaces.into(),
    }
  }

  /// The most-derived layer.
  pub fn target(&self) -> Option<&Arc<Layer>> {
    self.layers.last()
  }

  /// Layer and interface names, layers first.
  pub fn names(&self) -> Vec<&str> {
    self.layers.iter().chain(self.interfaces.iter()).map(|l| l.name.as_str()).collect()
  }

  /// Layers followed by interfaces.
  pub fn all(&self) -> impl Iterator<Item = &Arc<Layer>> {
    self.layers.iter().chain(self.interfaces.iter())
  }
}

/// Resolve every reference reachable from `root`.
///
/// Includes are walked breadth-first. Each wave of unseen references is
/// located concurrently, at most `parallelism` at a time; the next wave
/// starts once the current one has finished.
pub async fn fetch_entities(
  root: &EntityRef,
  locator: Arc<EntityLocator>,
  parallelism: usize,
) -> Result<IncludeGraph, FlattenError> {
  let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
  let mut graph = IncludeGraph::new(root.clone());
  let mut queued: HashSet<_> = HashSet::from([ref_key(root)]);
  let mut wave = vec![root.clone()];
  let mut wave_idx = 0usize;

  while !wave.is_empty() {
    debug!(wave = wave_idx, entities = wave.len(), "resolving wave");

    let mut join_set = JoinSet::new();
    for reference in wave.drain(..) {
      let locator = locator.clone();
      let semaphore = semaphore.clone();
      join_set.spawn(async move {
        let _permit = semaphore
          .acquire_owned()
          .await
          .map_err(|e| FlattenError::Task(e.to_string()))?;
        let result = tokio::task::spawn_blocking(move || {
          let entity = locator.locate(&reference)?;
          let layer = entity.load()?;
          Ok::<_, FlattenError>((reference, layer))
        })
        .await
        .map_err(|e| FlattenError::Task(e.to_string()))?;
        result
      });
    }

    let mut next = Vec::new();
    while let Some(joined) = join_set.join_next().await {
      let (reference, layer) = joined.map_err(|e| FlattenError::Task(e.to_string()))??;
      info!(name = %layer.name, kind = %layer.kind, path = %layer.path.display(), "resolved");

      for include in &layer.config.includes {
        let include = EntityRef::parse(include).map_err(|source| FlattenError::Reference {
          layer: layer.name.clone(),
          source,
        })?;
        if queued.insert(ref_key(&include)) && !graph.contains(&include) {
          next.push(include);
        }
      }
      graph.insert(&reference, layer);
    }

    wave = next;
    wave_idx += 1;
  }

  Ok(graph)
}
