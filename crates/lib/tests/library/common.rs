//! Shared helpers for library integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use charmbuild_lib::build::{BuildConfig, Builder};
use charmbuild_lib::entity::{FetchError, Fetcher, ResolveError, Resolver, ResolverRecord};
use charmbuild_lib::layer::LayerKind;
use charmbuild_lib::tactics::{InstallError, Installer, InstallerCommand};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Resolver that knows nothing.
pub struct OfflineResolver;

impl Resolver for OfflineResolver {
  fn resolve(&self, _: LayerKind, _: &str, _: Option<&str>) -> Result<Option<ResolverRecord>, ResolveError> {
    Ok(None)
  }
}

/// Fetcher that copies a local directory instead of cloning.
pub struct DirFetcher {
  pub source: PathBuf,
  pub revisions: Mutex<Vec<Option<String>>>,
}

impl DirFetcher {
  pub fn new(source: impl Into<PathBuf>) -> Self {
    Self {
      source: source.into(),
      revisions: Mutex::new(Vec::new()),
    }
  }
}

impl Fetcher for DirFetcher {
  fn fetch(&self, _repo: &str, rev: Option<&str>, dest: &Path) -> Result<PathBuf, FetchError> {
    self.revisions.lock().unwrap().push(rev.map(str::to_string));
    copy_tree(&self.source, dest);
    Ok(dest.to_path_buf())
  }
}

/// Fetcher that must never be called.
pub struct NoFetcher;

impl Fetcher for NoFetcher {
  fn fetch(&self, repo: &str, _: Option<&str>, _: &Path) -> Result<PathBuf, FetchError> {
    Err(FetchError::Clone {
      url: repo.to_string(),
      source: "offline".into(),
    })
  }
}

/// Installer that records commands and succeeds.
#[derive(Default)]
pub struct RecordingInstaller {
  pub commands: Mutex<Vec<InstallerCommand>>,
}

impl RecordingInstaller {
  pub fn commands(&self) -> Vec<InstallerCommand> {
    self.commands.lock().unwrap().clone()
  }
}

impl Installer for RecordingInstaller {
  fn run(&self, command: &InstallerCommand) -> Result<(), InstallError> {
    self.commands.lock().unwrap().push(command.clone());
    Ok(())
  }
}

/// Isolated layer search paths and output directory.
pub struct TestEnv {
  pub temp: TempDir,
  pub installer: Arc<RecordingInstaller>,
}

impl TestEnv {
  pub fn new() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
      installer: Arc::new(RecordingInstaller::default()),
    }
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  pub fn layers(&self) -> PathBuf {
    self.root().join("layers")
  }

  pub fn interfaces(&self) -> PathBuf {
    self.root().join("interfaces")
  }

  pub fn out(&self) -> PathBuf {
    self.root().join("out")
  }

  /// Write a file relative to the temp directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.root().join(relative_path);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
  }

  /// Config building `target` as `foo` for trusty into `out/`.
  pub fn config(&self, target: &str) -> BuildConfig {
    BuildConfig {
      target: target.to_string(),
      output_dir: self.out(),
      series: "trusty".to_string(),
      name: Some("foo".to_string()),
      layer_path: vec![self.layers()],
      interface_path: vec![self.interfaces()],
      cache_dir: self.root().join("cache"),
      working_dir: self.root().to_path_buf(),
      parallelism: 4,
      ..BuildConfig::default()
    }
  }

  pub fn builder(&self, config: BuildConfig) -> Builder {
    Builder::new(config)
      .with_resolver(Arc::new(OfflineResolver))
      .with_fetcher(Arc::new(NoFetcher))
      .with_installer(self.installer.clone())
  }

  /// The mysql base layer, the tester layer on top of it and the mysql
  /// interface.
  pub fn tester_fixture(&self) {
    self.write_file("layers/trusty/mysql/README.md", "mysql readme");
    self.write_file("layers/trusty/mysql/hooks/start", "#!/bin/sh\necho mysql start\n");
    self.write_file("layers/trusty/mysql/hooks/config-changed", "#!/bin/sh\necho changed\n");
    self.write_file(
      "layers/trusty/mysql/metadata.yaml",
      "name: mysql\nsummary: MySQL\nprovides:\n  shared-db:\n    interface: mysql-shared\n",
    );
    self.write_file(
      "layers/trusty/mysql/config.yaml",
      "options:\n  bind-address:\n    type: string\n    default: 0.0.0.0\n  vip:\n    type: string\n    default: ''\n",
    );
    self.write_file(
      "layers/trusty/mysql/layer.yaml",
      "defines:\n  qux:\n    type: string\n    default: zero\n",
    );

    self.write_file("layers/trusty/tester/README.md", "dynamic tactics");
    self.write_file("layers/trusty/tester/hooks/start", "#!/bin/sh\necho Overridden\n");
    self.write_file("layers/trusty/tester/.bzr/branch-format", "Bazaar-NG meta directory\n");
    self.write_file(
      "layers/trusty/tester/metadata.yaml",
      "name: tester\nprovides:\n  storage:\n    interface: storage\nstorage:\n  data:\n    type: filesystem\n",
    );
    self.write_file(
      "layers/trusty/tester/layer.yaml",
      "includes: ['trusty/mysql']\noptions:\n  mysql:\n    qux: one\nconfig:\n  deletes: [vip]\n",
    );
  }

  /// Layer `a`, layer `b` including it and the mysql interface.
  pub fn regenerate_fixture(&self) {
    self.write_file("layers/trusty/a/a", "from a");
    self.write_file("layers/trusty/a/README.md", "a readme");
    self.write_file("layers/trusty/a/metadata.yaml", "name: a\nsummary: A\n");
    self.write_file("layers/trusty/b/README.md", "b readme");
    self.write_file(
      "layers/trusty/b/metadata.yaml",
      "name: b\nrequires:\n  db:\n    interface: mysql\n",
    );
    self.write_file(
      "layers/trusty/b/layer.yaml",
      "includes: ['trusty/a', 'interface:mysql']\n",
    );
    self.mysql_interface();
  }

  pub fn mysql_interface(&self) {
    self.write_file("interfaces/mysql/interface.yaml", "name: mysql\nsummary: MySQL relation\n");
    self.write_file("interfaces/mysql/provides.py", "class MySQLProvides:\n    pass\n");
    self.write_file("interfaces/mysql/requires.py", "class MySQLRequires:\n    pass\n");
  }
}

/// Recursively copy `src` into `dest`.
pub fn copy_tree(src: &Path, dest: &Path) {
  for entry in WalkDir::new(src) {
    let entry = entry.unwrap();
    let rel = entry.path().strip_prefix(src).unwrap();
    let target = dest.join(rel);
    if entry.file_type().is_dir() {
      fs::create_dir_all(&target).unwrap();
    } else {
      fs::copy(entry.path(), &target).unwrap();
    }
  }
}

/// Read a YAML document from the output tree.
pub fn read_yaml(root: &Path, rel: &str) -> serde_yaml::Value {
  let content = fs::read_to_string(root.join(rel)).unwrap_or_else(|e| panic!("failed to read {}: {}", rel, e));
  serde_yaml::from_str(&content).unwrap()
}

pub fn read(root: &Path, rel: &str) -> String {
  fs::read_to_string(root.join(rel)).unwrap_or_else(|e| panic!("failed to read {}: {}", rel, e))
}
