use std::sync::Arc;

use charmbuild_lib::build::{Builder, Phase};
use charmbuild_lib::entity::HttpResolver;
use charmbuild_lib::manifest;

use super::common::{DirFetcher, TestEnv};

const PGSQL_RECORD: &str = r#"{
  "id": "pgsql",
  "name": "pgsql4",
  "repo": "https://github.com/bcsaller/juju-relation-pgsql.git",
  "_id": {"$oid": "55a471959c1d246feae487e5"},
  "version": 1
}"#;

fn c_reactive(env: &TestEnv) {
  env.write_file("layers/trusty/a/a", "from a");
  env.write_file("layers/trusty/a/README.md", "a readme");
  env.write_file("layers/trusty/c-reactive/hooks/reactive/main.py", "print('main')\n");
  env.write_file(
    "layers/trusty/c-reactive/layer.yaml",
    "includes: ['trusty/a', 'interface:pgsql']\n",
  );
  env.write_file(
    "layers/trusty/c-reactive/metadata.yaml",
    "name: c-reactive\nrequires:\n  db:\n    interface: pgsql\n",
  );
  // what the remote repository contains
  env.write_file("remote/pgsql/interface.yaml", "name: pgsql\n");
  env.write_file("remote/pgsql/requires.py", "class PostgreSQLClient:\n    pass\n");
}

#[tokio::test]
async fn remote_interface() {
  let env = TestEnv::new();
  c_reactive(&env);

  let mut server = mockito::Server::new_async().await;
  let mock = server
    .mock("GET", "/api/v1/interface/pgsql/")
    .with_status(200)
    .with_header("content-type", "application/json")
    .with_body(PGSQL_RECORD)
    .create_async()
    .await;

  let fetcher = Arc::new(DirFetcher::new(env.root().join("remote/pgsql")));
  let report = Builder::new(env.config("trusty/c-reactive"))
    .with_resolver(Arc::new(HttpResolver::new(server.url())))
    .with_fetcher(fetcher.clone())
    .with_installer(env.installer.clone())
    .build()
    .await
    .unwrap();

  mock.assert_async().await;
  assert_eq!(report.layers, vec!["a", "foo", "pgsql"]);

  let base = env.out().join("trusty/foo");
  assert!(base.join("a").exists());
  assert!(base.join("README.md").exists());
  assert!(base.join("hooks/relations/pgsql/__init__.py").exists());
  assert!(base.join("hooks/relations/pgsql/requires.py").exists());
  assert!(base.join("hooks/reactive/main.py").exists());
  assert!(base.join("hooks/pgsql-relation-joined").exists());

  // cached by kind, name and resolved version; no explicit revision
  assert!(env.root().join("cache/interfaces/pgsql-1/requires.py").is_file());
  assert_eq!(*fetcher.revisions.lock().unwrap(), vec![None]);

  let written = manifest::read(&base).unwrap().unwrap();
  let pgsql = written.layers.iter().find(|l| l.name == "pgsql").unwrap();
  assert_eq!(pgsql.source, "https://github.com/bcsaller/juju-relation-pgsql.git@1");
}

#[tokio::test]
async fn unknown_remote_layer_fails_in_fetch() {
  let env = TestEnv::new();
  env.write_file("layers/trusty/use-layers/layer.yaml", "includes: ['layer:basic']\n");

  let mut server = mockito::Server::new_async().await;
  server
    .mock("GET", "/api/v1/layer/basic/")
    .with_status(404)
    .create_async()
    .await;

  let err = Builder::new(env.config("trusty/use-layers"))
    .with_resolver(Arc::new(HttpResolver::new(server.url())))
    .with_fetcher(Arc::new(DirFetcher::new(env.root().join("nowhere"))))
    .build()
    .await
    .unwrap_err();

  assert_eq!(err.phase, Phase::Fetch);
  assert!(err.to_string().contains("layer:basic"));
}
