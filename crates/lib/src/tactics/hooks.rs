//! Generated hooks.
//!
//! Interfaces and storage endpoints need hook entry points that no layer
//! ships. For an interface `mysql`:
//!
//! ```text
//! hooks/mysql-relation-joined      generated, executable
//! hooks/mysql-relation-changed
//! hooks/mysql-relation-broken
//! hooks/mysql-relation-departed
//! hooks/relations/mysql/...        the interface's own files
//! hooks/relations/mysql/__init__.py  added when the interface lacks one
//! ```
//!
//! and for a storage endpoint `data`, `hooks/data-storage-attached` and
//! `hooks/data-storage-detaching`. A path some layer already provides is
//! left alone.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::engine::layer_files;
use super::{ComposedFile, TacticError, set_executable, write_staged};
use crate::layer::{IgnoreRules, Layer};
use crate::manifest::EntryKind;

/// Relation hook kinds generated per interface.
pub const RELATION_HOOKS: &[&str] = &["joined", "changed", "broken", "departed"];

/// Storage hook kinds generated per storage endpoint.
pub const STORAGE_HOOKS: &[&str] = &["attached", "detaching"];

/// Body of every generated hook.
fn hook_script(hook: &str, endpoint: &str) -> String {
  format!(
    r#"#!/usr/bin/env python3
# Hook: {endpoint}
# Generated for {hook}; rebuilding the charm overwrites this file.
import sys
sys.path.append('lib')

from charms.reactive import main
main('{endpoint}')
"#
  )
}

fn write_hook(staging: &Path, rel: &str, hook: &str, endpoint: &str, owner: &str) -> Result<ComposedFile, TacticError> {
  let dest = write_staged(staging, rel, hook_script(hook, endpoint).as_bytes())?;
  set_executable(&dest)?;
  ComposedFile::record(staging, rel, owner, EntryKind::Dynamic)
}

/// Emit relation hooks and the relation package of `interface`.
///
/// `provided` holds the relative paths some layer already produces.
pub fn relation_hooks(
  interface: &Layer,
  ignore: &IgnoreRules,
  provided: &HashSet<String>,
  staging: &Path,
) -> Result<Vec<ComposedFile>, TacticError> {
  let name = &interface.name;
  let mut files = Vec::new();

  for kind in RELATION_HOOKS {
    let hook = format!("{}-relation-{}", name, kind);
    let rel = format!("hooks/{}", hook);
    if provided.contains(&rel) {
      debug!(path = %rel, "hook provided by a layer");
      continue;
    }
    files.push(write_hook(staging, &rel, &hook, name, name)?);
  }

  let package = format!("hooks/relations/{}", name);
  let mut has_init = false;
  for (rel, source) in layer_files(interface, ignore)? {
    has_init |= rel == "__init__.py";
    let dest_rel = format!("{}/{}", package, rel);
    if provided.contains(&dest_rel) {
      continue;
    }
    let dest = staging.join(&dest_rel);
    if let Some(parent) = dest.parent() {
      fs::create_dir_all(parent).map_err(|e| TacticError::Write {
        path: parent.to_path_buf(),
        source: e,
      })?;
    }
    fs::copy(&source, &dest).map_err(|e| TacticError::Read {
      path: source.clone(),
      layer: name.clone(),
      source: e,
    })?;
    files.push(ComposedFile::record(staging, &dest_rel, name, EntryKind::Dynamic)?);
  }

  let init = format!("{}/__init__.py", package);
  if !has_init && !provided.contains(&init) {
    write_staged(staging, &init, b"")?;
    files.push(ComposedFile::record(staging, &init, name, EntryKind::Dynamic)?);
  }

  debug!(interface = %name, files = files.len(), "generated relation hooks");
  Ok(files)
}

/// Emit storage hooks for every storage endpoint declared in `layers`.
///
/// Each endpoint is owned by the last layer declaring it.
pub fn storage_hooks(
  layers: &[Arc<Layer>],
  provided: &HashSet<String>,
  staging: &Path,
) -> Result<Vec<ComposedFile>, TacticError> {
  let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
  for layer in layers {
    for endpoint in &layer.storage {
      owners.insert(endpoint, &layer.name);
    }
  }

  let mut files = Vec::new();
  for (endpoint, owner) in owners {
    for kind in STORAGE_HOOKS {
      let hook = format!("{}-storage-{}", endpoint, kind);
      let rel = format!("hooks/{}", hook);
      if provided.contains(&rel) {
        debug!(path = %rel, "hook provided by a layer");
        continue;
      }
      files.push(write_hook(staging, &rel, &hook, endpoint, owner)?);
    }
  }
  Ok(files)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::consts::DEFAULT_IGNORES;
  use crate::layer::LayerKind;
  use crate::util::testutil::{make_layer, read};
  use tempfile::TempDir;

  fn interface(temp: &TempDir, name: &str, files: &[(&str, &str)]) -> Layer {
    let path = make_layer(&temp.path().join("interfaces"), name, files);
    Layer::load(name, LayerKind::Interface, &path, "local").unwrap()
  }

  #[test]
  fn mysql_interface_generates_hooks_and_package() {
    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("staging");
    let mysql = interface(
      &temp,
      "mysql",
      &[
        ("provides.py", "class Provides: pass\n"),
        ("requires.py", "class Requires: pass\n"),
        ("interface.yaml", "name: mysql\n"),
        (".git/HEAD", "ref: refs/heads/master\n"),
      ],
    );
    let ignore = IgnoreRules::new(DEFAULT_IGNORES).unwrap();

    let files = relation_hooks(&mysql, &ignore, &HashSet::new(), &staging).unwrap();

    for kind in RELATION_HOOKS {
      let hook = format!("hooks/mysql-relation-{}", kind);
      assert!(read(&staging, &hook).contains("main('mysql')"));
    }
    assert!(staging.join("hooks/relations/mysql/provides.py").exists());
    assert!(staging.join("hooks/relations/mysql/requires.py").exists());
    assert_eq!(read(&staging, "hooks/relations/mysql/__init__.py"), "");
    assert!(!staging.join("hooks/relations/mysql/.git").exists());

    assert!(files.iter().all(|f| f.entry.owner == "mysql" && f.entry.kind == EntryKind::Dynamic));
    assert_eq!(files.len(), 4 + 3 + 1);
  }

  #[test]
  fn shipped_init_is_kept() {
    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("staging");
    let pgsql = interface(&temp, "pgsql", &[("__init__.py", "# pgsql\n")]);

    relation_hooks(&pgsql, &IgnoreRules::empty(), &HashSet::new(), &staging).unwrap();
    assert_eq!(read(&staging, "hooks/relations/pgsql/__init__.py"), "# pgsql\n");
  }

  #[test]
  fn provided_hook_is_left_to_the_layer() {
    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("staging");
    let mysql = interface(&temp, "mysql", &[]);
    let provided = HashSet::from(["hooks/mysql-relation-joined".to_string()]);

    let files = relation_hooks(&mysql, &IgnoreRules::empty(), &provided, &staging).unwrap();
    assert!(!staging.join("hooks/mysql-relation-joined").exists());
    assert!(files.iter().all(|f| f.rel != "hooks/mysql-relation-joined"));
  }

  #[cfg(unix)]
  #[test]
  fn hooks_are_executable() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("staging");
    let mysql = interface(&temp, "mysql", &[]);
    relation_hooks(&mysql, &IgnoreRules::empty(), &HashSet::new(), &staging).unwrap();

    let mode = fs::metadata(staging.join("hooks/mysql-relation-changed")).unwrap().permissions().mode();
    assert_eq!(mode & 0o111, 0o111);
  }

  #[test]
  fn data_storage_hooks_name_the_endpoint() {
    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("staging");
    let base = make_layer(
      temp.path(),
      "base",
      &[("metadata.yaml", "storage:\n  data:\n    type: filesystem\n")],
    );
    let top = make_layer(
      temp.path(),
      "top",
      &[("metadata.yaml", "storage:\n  data:\n    type: filesystem\n  logs:\n    type: filesystem\n")],
    );
    let layers = vec![
      Arc::new(Layer::load("base", LayerKind::Layer, &base, "local").unwrap()),
      Arc::new(Layer::load("top", LayerKind::Layer, &top, "local").unwrap()),
    ];

    let files = storage_hooks(&layers, &HashSet::new(), &staging).unwrap();

    assert!(read(&staging, "hooks/data-storage-attached").contains("Hook: data"));
    assert!(read(&staging, "hooks/data-storage-detaching").contains("Hook: data"));
    assert!(read(&staging, "hooks/logs-storage-attached").contains("Hook: logs"));
    assert_eq!(files.len(), 4);
    assert!(files.iter().all(|f| f.entry.owner == "top"));
  }
}
