//! Integration tests for buildgate

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn buildgate(config_dir: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("buildgate");
        cmd.env("BUILDGATE_CONFIG", config_dir.path().join("config.toml"));
        cmd
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        buildgate(&temp)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build service control plane"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        buildgate(&temp)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("buildgate"));
    }

    #[test]
    fn ref_normalizes_short_names() {
        let temp = TempDir::new().unwrap();
        buildgate(&temp)
            .args(["ref", "alpine", "user/app:1.2"])
            .assert()
            .success()
            .stdout(predicate::eq(
                "docker.io/library/alpine:latest\ndocker.io/user/app:1.2\n",
            ));
    }

    #[test]
    fn ref_rejects_uppercase() {
        let temp = TempDir::new().unwrap();
        buildgate(&temp)
            .args(["ref", "User/App"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("must be lowercase"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        buildgate(&temp)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        buildgate(&temp)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[status]"))
            .stdout(predicate::str::contains("channel_capacity = 8"));
    }

    #[test]
    fn config_init_then_refuses_overwrite() {
        let temp = TempDir::new().unwrap();
        buildgate(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(temp.path().join("config.toml").exists());

        buildgate(&temp)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_reports_hint() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("config.toml"), "[status\n").unwrap();
        buildgate(&temp)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("config init --force"));
    }
}
