use charmbuild_lib::build::BuildConfig;
use charmbuild_lib::tactics::InstallMode;

use super::common::{TestEnv, read};

fn whlayer(env: &TestEnv) {
  env.write_file("layers/trusty/basic/wheelhouse.txt", "charmhelpers>=0.4\nPyYAML\n");
  env.write_file("layers/trusty/basic/README.md", "basic");
  env.write_file("layers/trusty/whlayer/wheelhouse.txt", "# pinned\ncharmhelpers==0.5.1\nrequests\n");
  env.write_file("layers/trusty/whlayer/layer.yaml", "includes: ['trusty/basic']\n");
}

#[tokio::test]
async fn wheelhouse_downloads_sources_only() {
  let env = TestEnv::new();
  whlayer(&env);

  env.builder(env.config("trusty/whlayer")).build().await.unwrap();

  let base = env.out().join("trusty/foo");
  assert_eq!(read(&base, "wheelhouse.txt"), "charmhelpers==0.5.1\nPyYAML\nrequests\n");

  let commands = env.installer.commands();
  assert_eq!(commands.len(), 2);
  assert_eq!(commands[0].program, "python3");
  assert_eq!(&commands[0].args[..2], ["-m", "venv"]);
  assert!(commands[1].program.ends_with("pip3"));
  assert_eq!(&commands[1].args[..3], ["download", "--no-binary", ":all:"]);
  assert!(commands[1].args.last().unwrap().ends_with("wheelhouse.txt"));
}

#[tokio::test]
async fn user_mode_installs_into_user_site() {
  let env = TestEnv::new();
  whlayer(&env);
  let config = BuildConfig {
    install_mode: InstallMode::User,
    ..env.config("trusty/whlayer")
  };

  env.builder(config).build().await.unwrap();

  let commands = env.installer.commands();
  assert_eq!(commands.len(), 1);
  assert_eq!(commands[0].program, "pip3");
  assert_eq!(&commands[0].args[..3], ["install", "--user", "--ignore-installed"]);
}
