use charmbuild_lib::build::BuildConfig;
use charmbuild_lib::manifest;
use serde_yaml::Value;

use super::common::{TestEnv, read, read_yaml};

fn includes(root: &std::path::Path) -> Value {
  read_yaml(root, "layer.yaml")["includes"].clone()
}

fn expected_includes() -> Value {
  Value::Sequence(vec![
    Value::String("trusty/a".into()),
    Value::String("interface:mysql".into()),
  ])
}

#[tokio::test]
async fn regenerate_inplace() {
  let env = TestEnv::new();
  env.regenerate_fixture();

  env.builder(env.config("trusty/b")).build().await.unwrap();
  let base = env.out().join("trusty/foo");
  assert!(base.join("a").exists());
  assert!(base.join("README.md").exists());

  // The generated tree is now both the target and the output.
  let inplace = BuildConfig {
    target: ".".into(),
    output_dir: base.clone(),
    working_dir: base.clone(),
    ..env.config(".")
  };

  let report = env.builder(inplace.clone()).build().await.unwrap();
  let canonical = std::fs::canonicalize(&base).unwrap();
  assert_eq!(report.output.as_deref(), Some(canonical.as_path()));
  assert_eq!(includes(&base), expected_includes());
  assert_eq!(read_yaml(&base, "layer.yaml")["is"], Value::String("foo".into()));

  let again = env.builder(inplace).build().await.unwrap();
  assert_eq!(includes(&base), expected_includes());
  assert_eq!(report.manifest, again.manifest);

  assert!(base.join("hooks/relations/mysql/provides.py").exists());
  assert!(base.join("hooks/relations/mysql/requires.py").exists());
  for kind in ["joined", "changed", "broken", "departed"] {
    assert!(base.join(format!("hooks/mysql-relation-{}", kind)).exists());
  }
  // the interface ships no package init, one is added
  assert!(base.join("hooks/relations/mysql/__init__.py").exists());
  assert!(manifest::verify(&base).unwrap().is_clean());
}

#[tokio::test]
async fn inplace_rebuild_picks_up_base_changes() {
  let env = TestEnv::new();
  env.regenerate_fixture();
  env.builder(env.config("trusty/b")).build().await.unwrap();
  let base = env.out().join("trusty/foo");

  env.write_file("layers/trusty/a/a", "from a, revised");
  let inplace = BuildConfig {
    target: ".".into(),
    output_is_target: true,
    working_dir: base.clone(),
    ..env.config(".")
  };
  env.builder(inplace).build().await.unwrap();

  assert_eq!(read(&base, "a"), "from a, revised");
  assert_eq!(read(&base, "README.md"), "b readme");
  let written = manifest::read(&base).unwrap().unwrap();
  assert_eq!(written.get("a").unwrap().owner, "a");
  assert_eq!(written.get("README.md").unwrap().owner, "foo");
}

#[tokio::test]
async fn inplace_rebuild_keeps_hand_edited_outputs() {
  let env = TestEnv::new();
  env.regenerate_fixture();
  env.builder(env.config("trusty/b")).build().await.unwrap();
  let base = env.out().join("trusty/foo");

  std::fs::write(base.join("a"), "patched locally").unwrap();
  let inplace = BuildConfig {
    target: ".".into(),
    output_is_target: true,
    working_dir: base.clone(),
    ..env.config(".")
  };
  env.builder(inplace).build().await.unwrap();

  assert_eq!(read(&base, "a"), "patched locally");
  assert_eq!(manifest::read(&base).unwrap().unwrap().get("a").unwrap().owner, "foo");
}

#[tokio::test]
async fn inplace_rebuild_reproduces_first_build() {
  let env = TestEnv::new();
  env.tester_fixture();

  let strict = |config: BuildConfig| BuildConfig {
    strict_lint: true,
    ..config
  };
  let first = env.builder(strict(env.config("trusty/tester"))).build().await.unwrap();
  let base = env.out().join("trusty/foo");

  let inplace = BuildConfig {
    target: ".".into(),
    output_is_target: true,
    working_dir: base.clone(),
    ..env.config(".")
  };
  let again = env.builder(strict(inplace)).build().await.unwrap();
  assert!(again.lint.is_ok());

  let first = first.manifest.unwrap();
  let again = again.manifest.unwrap();
  for (rel, entry) in first.files() {
    let rebuilt = again.get(rel).unwrap_or_else(|| panic!("{} missing after rebuild", rel));
    assert_eq!(rebuilt.hash, entry.hash, "{} changed", rel);
    assert_eq!(rebuilt.owner, entry.owner, "{} changed owner", rel);
  }
  assert_eq!(first.signatures.len(), again.signatures.len());

  let config = read_yaml(&base, "config.yaml");
  assert!(config["options"].get("vip").is_none());
  assert!(manifest::verify(&base).unwrap().is_clean());
}

#[tokio::test]
async fn target_definitions_survive_strict_inplace_rebuild() {
  let env = TestEnv::new();
  env.regenerate_fixture();
  env.write_file(
    "layers/trusty/b/layer.yaml",
    "includes: ['trusty/a', 'interface:mysql']\ndefines:\n  qux:\n    type: boolean\n    default: false\n",
  );

  let first = BuildConfig {
    strict_lint: true,
    ..env.config("trusty/b")
  };
  env.builder(first).build().await.unwrap();
  let base = env.out().join("trusty/foo");
  assert_eq!(read_yaml(&base, "layer.yaml")["defines"]["qux"]["type"], Value::String("boolean".into()));

  let inplace = BuildConfig {
    target: ".".into(),
    output_is_target: true,
    working_dir: base.clone(),
    strict_lint: true,
    ..env.config(".")
  };
  let report = env.builder(inplace).build().await.unwrap();
  assert!(report.lint.is_ok());
  assert_eq!(read_yaml(&base, "layer.yaml")["options"]["foo"]["qux"], Value::Bool(false));
}
