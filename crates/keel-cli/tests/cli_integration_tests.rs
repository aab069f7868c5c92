//! End-to-end CLI tests
//!
//! Every test isolates its configuration through KEEL_HOME/KEEL_PATH so
//! nothing leaks from the host environment.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

struct Sandbox {
    home: TempDir,
    workspace: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            home: TempDir::new().unwrap(),
            workspace: TempDir::new().unwrap(),
        }
    }

    fn keel(&self) -> Command {
        let mut cmd = Command::cargo_bin("keel").unwrap();
        cmd.env("KEEL_HOME", self.home.path())
            .env("KEEL_PATH", self.workspace.path());
        cmd
    }

    fn write_pkg(&self, identifier: &str, files: &[(&str, &str)]) {
        let dir = self.workspace.path().join("src").join(identifier);
        fs::create_dir_all(&dir).unwrap();
        for (name, body) in files {
            fs::write(dir.join(name), body).unwrap();
        }
    }

    fn bin_dir(&self) -> std::path::PathBuf {
        self.workspace.path().join("bin")
    }
}

mod help_messages {
    use super::*;

    #[test]
    fn test_main_help_shows_all_commands() {
        Command::cargo_bin("keel")
            .unwrap()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build"))
            .stdout(predicate::str::contains("get"))
            .stdout(predicate::str::contains("list"))
            .stdout(predicate::str::contains("env"));
    }

    #[test]
    fn test_main_help_shows_environment_variables() {
        Command::cargo_bin("keel")
            .unwrap()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("KEEL_HOME"))
            .stdout(predicate::str::contains("KEEL_PATH"));
    }
}

mod env_command {
    use super::*;

    #[test]
    fn test_env_prints_effective_configuration() {
        let sandbox = Sandbox::new();
        let home = sandbox.home.path().display().to_string();
        let workspace = sandbox.workspace.path().display().to_string();

        sandbox
            .keel()
            .arg("env")
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("KEEL_HOME=\"{home}\"")))
            .stdout(predicate::str::contains(format!("KEEL_PATH=\"{workspace}\"")))
            .stdout(predicate::str::contains("KEEL_OS="))
            .stdout(predicate::str::contains("KEEL_ARCH="));
    }

    #[test]
    fn test_env_respects_platform_overrides() {
        let sandbox = Sandbox::new();
        sandbox
            .keel()
            .env("KEEL_OS", "plan9")
            .env("KEEL_ARCH", "mips")
            .arg("env")
            .assert()
            .success()
            .stdout(predicate::str::contains("KEEL_OS=\"plan9\""))
            .stdout(predicate::str::contains("KEEL_ARCH=\"mips\""));
    }
}

mod build_command {
    use super::*;

    fn write_chain(sandbox: &Sandbox) {
        sandbox.write_pkg(
            "example.org/app",
            &[("app.kl", "package main\nimport \"example.org/lib\"\npub fn main() {\n")],
        );
        sandbox.write_pkg(
            "example.org/lib",
            &[("lib.kl", "package lib\npub fn Greet() {\n")],
        );
    }

    #[test]
    fn test_build_links_command_into_bin() {
        let sandbox = Sandbox::new();
        write_chain(&sandbox);

        sandbox
            .keel()
            .args(["build", "-v", "example.org/app"])
            .assert()
            .success()
            .stdout(predicate::str::contains("compiled"))
            .stdout(predicate::str::contains("example.org/app ->"));

        assert!(sandbox.bin_dir().join("app").is_file());
    }

    #[test]
    fn test_second_build_is_fully_cached() {
        let sandbox = Sandbox::new();
        write_chain(&sandbox);

        sandbox
            .keel()
            .args(["build", "example.org/app"])
            .assert()
            .success();
        sandbox
            .keel()
            .args(["build", "-v", "example.org/app"])
            .assert()
            .success()
            .stdout(predicate::str::contains("2 cached"))
            .stdout(predicate::str::contains("0 failed"));
    }

    #[test]
    fn test_json_summary_reports_stats_and_executables() {
        let sandbox = Sandbox::new();
        write_chain(&sandbox);

        let output = sandbox
            .keel()
            .args(["build", "--json", "example.org/app"])
            .assert()
            .success()
            .get_output()
            .clone();

        let stdout = String::from_utf8(output.stdout).unwrap();
        let summary: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
        assert_eq!(summary["success"], true);
        assert_eq!(summary["compiled"], 2);
        assert_eq!(summary["cached"], 0);
        assert_eq!(summary["failed"], 0);
        assert!(summary["executables"]["example.org/app"]
            .as_str()
            .unwrap()
            .ends_with("app"));
    }

    #[test]
    fn test_json_summary_carries_failures_and_skips() {
        let sandbox = Sandbox::new();
        sandbox.write_pkg(
            "example.org/app",
            &[("app.kl", "package main\nimport \"example.org/lib\"\n")],
        );
        sandbox.write_pkg(
            "example.org/lib",
            &[("lib.kl", "package lib\nerror undefined name 'frob'\n")],
        );

        let output = sandbox
            .keel()
            .args(["build", "--json", "example.org/app"])
            .assert()
            .failure()
            .get_output()
            .clone();

        let stdout = String::from_utf8(output.stdout).unwrap();
        let summary: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
        assert_eq!(summary["success"], false);
        assert_eq!(summary["failed"], 1);
        assert_eq!(summary["skipped"], 1);
        assert_eq!(summary["failures"][0]["package"], "example.org/lib");
        assert_eq!(summary["skipped_packages"][0]["package"], "example.org/app");
        assert_eq!(
            summary["skipped_packages"][0]["failed_dependency"],
            "example.org/lib"
        );
    }

    #[test]
    fn test_compile_failure_sets_exit_code_and_lists_skips() {
        let sandbox = Sandbox::new();
        sandbox.write_pkg(
            "example.org/app",
            &[("app.kl", "package main\nimport \"example.org/lib\"\n")],
        );
        sandbox.write_pkg(
            "example.org/lib",
            &[("lib.kl", "package lib\nerror undefined name 'frob'\n")],
        );

        sandbox
            .keel()
            .args(["build", "example.org/app"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("undefined name 'frob'"))
            .stderr(predicate::str::contains("skipped because a dependency failed:"))
            .stderr(predicate::str::contains("example.org/app"));
    }

    #[test]
    fn test_cycle_reports_the_full_path() {
        let sandbox = Sandbox::new();
        sandbox.write_pkg(
            "example.org/a",
            &[("a.kl", "package a\nimport \"example.org/b\"\n")],
        );
        sandbox.write_pkg(
            "example.org/b",
            &[("b.kl", "package b\nimport \"example.org/a\"\n")],
        );

        sandbox
            .keel()
            .args(["build", "example.org/a"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cyclic dependency:"))
            .stderr(predicate::str::contains("example.org/a"))
            .stderr(predicate::str::contains("example.org/b"));
    }

    #[test]
    fn test_unresolved_import_names_the_identifier() {
        let sandbox = Sandbox::new();
        sandbox.write_pkg(
            "example.org/app",
            &[("app.kl", "package main\nimport \"example.org/ghost\"\n")],
        );

        sandbox
            .keel()
            .args(["build", "example.org/app"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("example.org/ghost"));
    }
}

mod list_command {
    use super::*;

    #[test]
    fn test_list_shows_closure_in_dependency_order() {
        let sandbox = Sandbox::new();
        sandbox.write_pkg(
            "example.org/app",
            &[("app.kl", "package main\nimport \"example.org/lib\"\n")],
        );
        sandbox.write_pkg("example.org/lib", &[("lib.kl", "package lib\n")]);

        let output = sandbox
            .keel()
            .args(["list", "example.org/app"])
            .assert()
            .success()
            .stdout(predicate::str::contains("example.org/app (command)"))
            .stdout(predicate::str::contains("example.org/lib (library)"))
            .stdout(predicate::str::contains("deps: example.org/lib"))
            .get_output()
            .clone();

        let stdout = String::from_utf8(output.stdout).unwrap();
        let lib_pos = stdout.find("example.org/lib (").unwrap();
        let app_pos = stdout.find("example.org/app (").unwrap();
        assert!(lib_pos < app_pos, "dependencies listed first:\n{stdout}");
    }

    #[test]
    fn test_list_marks_vendored_packages() {
        let sandbox = Sandbox::new();
        sandbox.write_pkg(
            "example.org/app",
            &[("app.kl", "package main\nimport \"example.org/dep\"\n")],
        );
        // vendored copy shadows nothing else; it is the only candidate
        let vendor = sandbox
            .workspace
            .path()
            .join("src/example.org/app/vendor/example.org/dep");
        fs::create_dir_all(&vendor).unwrap();
        fs::write(vendor.join("dep.kl"), "package dep\n").unwrap();

        sandbox
            .keel()
            .args(["list", "example.org/app"])
            .assert()
            .success()
            .stdout(predicate::str::contains("example.org/dep (library) [vendored]"));
    }
}

mod get_command {
    use super::*;

    #[test]
    fn test_get_rejects_path_escaping_identifier() {
        let sandbox = Sandbox::new();
        sandbox
            .keel()
            .args(["get", "example.org/../escape"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid import identifier"));
    }

    #[test]
    fn test_get_requires_an_identifier() {
        let sandbox = Sandbox::new();
        sandbox.keel().arg("get").assert().failure();
    }
}
