//! Test utilities for charmbuild-lib.
//!
//! Helpers for laying out small layer trees on disk.

use std::fs;
use std::path::{Path, PathBuf};

/// Write `files` (relative path, content) under `root`, creating parents.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
  for (rel, content) in files {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
  }
}

/// Create a layer directory named `name` under `parent` containing `files`.
pub fn make_layer(parent: &Path, name: &str, files: &[(&str, &str)]) -> PathBuf {
  let root = parent.join(name);
  fs::create_dir_all(&root).unwrap();
  write_tree(&root, files);
  root
}

/// Read a file under `root` as a string.
pub fn read(root: &Path, rel: &str) -> String {
  fs::read_to_string(root.join(rel)).unwrap_or_else(|e| panic!("failed to read {}: {}", rel, e))
}
