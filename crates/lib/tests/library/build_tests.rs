use charmbuild_lib::build::Phase;
use charmbuild_lib::manifest::{self, EntryKind};
use charmbuild_lib::util::hash::hash_bytes;
use serde_yaml::Value;

use super::common::{TestEnv, read, read_yaml};

fn key(s: &str) -> Value {
  Value::String(s.to_string())
}

#[tokio::test]
async fn tester_layer() {
  let env = TestEnv::new();
  env.tester_fixture();

  let report = env.builder(env.config("trusty/tester")).build().await.unwrap();
  let base = env.out().join("trusty/foo");
  assert!(base.is_dir());
  assert_eq!(report.layers, vec!["mysql", "foo"]);

  // ignore rules
  assert!(!base.join(".bzr").exists());

  // metadata combines provides
  let metadata = read_yaml(&base, "metadata.yaml");
  let provides = metadata["provides"].as_mapping().unwrap();
  assert!(provides.contains_key(key("shared-db")));
  assert!(provides.contains_key(key("storage")));

  // config keeps keys except deleted ones
  let config = read_yaml(&base, "config.yaml");
  let options = config["options"].as_mapping().unwrap();
  assert!(options.contains_key(key("bind-address")));
  assert!(!options.contains_key(key("vip")));

  let layer = read_yaml(&base, "layer.yaml");
  assert_eq!(layer["includes"], Value::Sequence(vec![key("trusty/mysql")]));
  assert_eq!(layer["is"], key("foo"));
  assert_eq!(layer["options"]["mysql"]["qux"], key("one"));

  assert!(base.join("hooks/config-changed").exists());
  assert!(read(&base, "hooks/start").contains("Overridden"));
  assert_eq!(read(&base, "README.md"), "dynamic tactics");

  let written = manifest::read(&base).unwrap().unwrap();
  let readme = written.get("README.md").unwrap();
  assert_eq!(readme.owner, "foo");
  assert_eq!(readme.kind, EntryKind::Static);
  assert_eq!(readme.hash, Some(hash_bytes(b"dynamic tactics")));

  let metadata_entry = written.get("metadata.yaml").unwrap();
  assert_eq!(metadata_entry.owner, "foo");
  assert_eq!(metadata_entry.kind, EntryKind::Dynamic);
  assert_eq!(
    metadata_entry.hash,
    Some(hash_bytes(read(&base, "metadata.yaml").as_bytes()))
  );

  for hook in ["data-storage-attached", "data-storage-detaching"] {
    assert!(read(&base, &format!("hooks/{}", hook)).contains("Hook: data"));
  }
}

#[tokio::test]
async fn manifest_serializes_signature_triples() {
  let env = TestEnv::new();
  env.tester_fixture();

  env.builder(env.config("trusty/tester")).build().await.unwrap();

  let raw = read(&env.out().join("trusty/foo"), ".build.manifest");
  let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
  assert_eq!(json["version"], 1);
  assert_eq!(
    json["signatures"]["README.md"],
    serde_json::json!(["foo", "static", hash_bytes(b"dynamic tactics").0])
  );
  assert_eq!(json["signatures"][".build.manifest"], serde_json::json!(["build", "dynamic", null]));
  assert!(json.get("partial").is_none());
}

#[tokio::test]
async fn rebuilding_is_idempotent() {
  let env = TestEnv::new();
  env.tester_fixture();

  let first = env.builder(env.config("trusty/tester")).build().await.unwrap();
  let second = env.builder(env.config("trusty/tester")).build().await.unwrap();

  assert_eq!(first.manifest, second.manifest);
  assert!(second.removed.is_empty());
  assert!(manifest::verify(&env.out().join("trusty/foo")).unwrap().is_clean());
}

#[tokio::test]
async fn truncated_phases_stop_before_manifest() {
  let env = TestEnv::new();
  env.tester_fixture();
  let config = charmbuild_lib::build::BuildConfig {
    phases: Phase::through(Phase::Lint),
    ..env.config("trusty/tester")
  };

  let report = env.builder(config).build().await.unwrap();

  let base = env.out().join("trusty/foo");
  assert!(base.join("metadata.yaml").is_file());
  assert!(!base.join(".build.manifest").exists());
  assert_eq!(report.completed, Phase::through(Phase::Lint));
}

#[tokio::test]
async fn edits_to_the_output_are_reported_as_drift() {
  let env = TestEnv::new();
  env.tester_fixture();
  env.builder(env.config("trusty/tester")).build().await.unwrap();
  let base = env.out().join("trusty/foo");

  std::fs::write(base.join("README.md"), "edited").unwrap();
  std::fs::remove_file(base.join("hooks/config-changed")).unwrap();
  std::fs::write(base.join("notes.txt"), "scratch").unwrap();

  let drift = manifest::verify(&base).unwrap();
  assert_eq!(drift.modified, vec!["README.md"]);
  assert_eq!(drift.missing, vec!["hooks/config-changed"]);
  assert_eq!(drift.untracked, vec!["notes.txt"]);
}
