//! Crate-wide constants.

/// Application name, used for cache and data directory names.
pub const APP_NAME: &str = "charmbuild";

/// File name of the persisted build manifest inside an output tree.
pub const MANIFEST_FILENAME: &str = ".build.manifest";

/// Layer definition document.
pub const LAYER_YAML: &str = "layer.yaml";

/// Charm metadata document.
pub const METADATA_YAML: &str = "metadata.yaml";

/// Charm config-options document.
pub const CONFIG_YAML: &str = "config.yaml";

/// Python dependency list consumed by the wheelhouse tactic.
pub const WHEELHOUSE_TXT: &str = "wheelhouse.txt";

/// Environment variable holding the layer search path.
pub const LAYER_PATH_ENV: &str = "LAYER_PATH";

/// Environment variable holding the interface search path.
pub const INTERFACE_PATH_ENV: &str = "INTERFACE_PATH";

/// Environment variable overriding the name-resolution service URL.
pub const INTERFACE_SERVICE_ENV: &str = "CHARMBUILD_INTERFACE_SERVICE";

/// Default name-resolution service.
pub const DEFAULT_INTERFACE_SERVICE: &str = "http://interfaces.juju.solutions";

/// Paths never copied from a source layer into the output tree.
pub const DEFAULT_IGNORES: &[&str] = &[
  ".git",
  ".bzr",
  ".hg",
  ".svn",
  ".tox",
  "__pycache__",
  "*.pyc",
  ".DS_Store",
  MANIFEST_FILENAME,
];
