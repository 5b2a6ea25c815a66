//! Include graph and depth-first flattening.
//!
//! # Algorithm
//!
//! 1. [`super::fetch_entities`] resolves every distinct reference reachable
//!    from the root into an [`IncludeGraph`].
//! 2. [`IncludeGraph::flatten`] turns the references into a `petgraph`
//!    [`DiGraph`], rejects cycles with [`toposort`], and walks it post-order
//!    from the root so each layer follows all of its includes.
//! 3. Interfaces are leaves: their own includes are never followed.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use petgraph::algo::{astar, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::DfsPostOrder;
use tracing::{debug, warn};

use super::{FlattenError, LayerStack};
use crate::entity::EntityRef;
use crate::layer::{Layer, LayerKind};

/// Key of a reference as written, before resolution.
pub(crate) type RefKey = (LayerKind, String);

pub(crate) fn ref_key(reference: &EntityRef) -> RefKey {
  (reference.kind, reference.raw.trim().to_string())
}

/// Every layer and interface reachable from a root reference.
#[derive(Debug, Clone)]
pub struct IncludeGraph {
  root: EntityRef,
  nodes: HashMap<RefKey, Arc<Layer>>,
}

impl IncludeGraph {
  pub(crate) fn new(root: EntityRef) -> Self {
    Self {
      root,
      nodes: HashMap::new(),
    }
  }

  pub(crate) fn insert(&mut self, reference: &EntityRef, layer: Layer) {
    self.nodes.insert(ref_key(reference), Arc::new(layer));
  }

  pub(crate) fn contains(&self, reference: &EntityRef) -> bool {
    self.nodes.contains_key(&ref_key(reference))
  }

  /// The root layer, as loaded.
  pub fn root(&self) -> Option<&Arc<Layer>> {
    self.nodes.get(&ref_key(&self.root))
  }

  /// Number of distinct references resolved.
  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Order the graph base-first with the root last.
  ///
  /// The resolved references become a [`DiGraph`] with one node per distinct
  /// name and an edge from each layer to its includes, added in include
  /// order. A post-order depth-first walk from the root then places every
  /// layer after all of its includes. Interfaces are leaves and are returned
  /// apart, in the order the walk reaches them.
  ///
  /// When `target_name` is given the root layer is renamed to it, so files
  /// and options it contributes are attributed to the build.
  pub fn flatten(&self, target_name: Option<&str>) -> Result<LayerStack, FlattenError> {
    let (graph, root) = self.build_graph()?;

    if toposort(&graph, None).is_err() {
      return Err(FlattenError::CyclicDependency {
        cycle: describe_cycle(&graph),
      });
    }

    let mut layers = Vec::new();
    let mut interfaces = Vec::new();
    // neighbors are pushed newest edge first, so includes pop in declaration order
    let mut walk = DfsPostOrder::new(&graph, root);
    while let Some(idx) = walk.next(&graph) {
      let layer = graph[idx].clone();
      if layer.is_interface() {
        interfaces.push(layer);
      } else {
        layers.push(layer);
      }
    }

    if let (Some(name), Some(target)) = (target_name, layers.last_mut())
      && target.name != name
    {
      debug!(from = %target.name, to = name, "renaming target layer");
      let mut renamed = (**target).clone();
      renamed.name = name.to_string();
      *target = Arc::new(renamed);
    }

    Ok(LayerStack::new(layers, interfaces))
  }

  fn node(&self, reference: &EntityRef) -> Result<Arc<Layer>, FlattenError> {
    self
      .nodes
      .get(&ref_key(reference))
      .cloned()
      .ok_or_else(|| FlattenError::Unresolved {
        reference: reference.raw.clone(),
      })
  }

  /// Build the include graph breadth-first from the root.
  ///
  /// Two references resolving to the same name share the node of the first
  /// one; the second one's includes are never followed.
  fn build_graph(&self) -> Result<(DiGraph<Arc<Layer>, ()>, NodeIndex), FlattenError> {
    let mut graph = DiGraph::new();
    let mut by_name: HashMap<(LayerKind, String), NodeIndex> = HashMap::new();

    let mut intern = |graph: &mut DiGraph<Arc<Layer>, ()>, layer: Arc<Layer>| -> (NodeIndex, bool) {
      let key = (layer.kind, layer.name.clone());
      if let Some(&idx) = by_name.get(&key) {
        let existing: &Arc<Layer> = &graph[idx];
        if existing.path != layer.path {
          warn!(
            name = %layer.name,
            kept = %existing.path.display(),
            ignored = %layer.path.display(),
            "duplicate layer name, keeping first resolution"
          );
        }
        return (idx, false);
      }
      let idx = graph.add_node(layer);
      by_name.insert(key, idx);
      (idx, true)
    };

    let (root, _) = intern(&mut graph, self.node(&self.root)?);
    let mut queue = VecDeque::from([root]);

    while let Some(idx) = queue.pop_front() {
      let layer = graph[idx].clone();
      if layer.is_interface() {
        continue;
      }
      for include in &layer.config.includes {
        let include = EntityRef::parse(include).map_err(|source| FlattenError::Reference {
          layer: layer.name.clone(),
          source,
        })?;
        let (dep, fresh) = intern(&mut graph, self.node(&include)?);
        graph.add_edge(idx, dep, ());
        if fresh {
          queue.push_back(dep);
        }
      }
    }

    Ok((graph, root))
  }
}

/// Name one cycle of `graph` as `a -> b -> a`.
///
/// The cycle starts at the member of the first cyclic component that was
/// added to the graph earliest, and follows includes in declaration order.
fn describe_cycle(graph: &DiGraph<Arc<Layer>, ()>) -> String {
  let cyclic = tarjan_scc(graph).into_iter().find(|scc| {
    scc.len() > 1 || graph.contains_edge(scc[0], scc[0])
  });
  let Some(scc) = cyclic else {
    return String::new();
  };
  let Some(&start) = scc.iter().min() else {
    return String::new();
  };

  // neighbors() yields the newest edge first
  let successors: Vec<NodeIndex> = graph.neighbors(start).collect();
  let path = successors.into_iter().rev().filter(|n| scc.contains(n)).find_map(|next| {
    astar(graph, next, |n| n == start, |_| 1usize, |_| 0usize).map(|(_, path)| path)
  });

  let mut names = vec![graph[start].name.as_str()];
  names.extend(path.unwrap_or_default().into_iter().map(|idx| graph[idx].name.as_str()));
  names.join(" -> ")
}
