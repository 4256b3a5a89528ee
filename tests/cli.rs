use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MANIFEST: &str = r#"
[package]
name = "demo"

[[plugin]]
name = "Formatter"
executable = "plugins/format.sh"

[plugin.capability.command]
verb = "format"

[[plugin.capability.command.permissions]]
type = "write_to_package_directory"
reason = "needs to reformat"

[[plugin]]
name = "Echo"
executable = "plugins/echo.sh"
capability = { command = { verb = "echo" } }

[[plugin]]
name = "Failing"
executable = "plugins/fail.sh"
capability = { command = { verb = "fail" } }

[[plugin]]
name = "Generator"
executable = "plugins/generate.sh"
capability = "build_tool"

[[dependency]]
name = "lint-kit"

[[dependency.plugin]]
name = "SwiftLint"
executable = "plugins/lint.sh"
capability = { command = { verb = "lint" } }

[[dependency.plugin]]
name = "ShellCheck"
executable = "plugins/lint.sh"
capability = { command = { verb = "lint" } }
"#;

struct Fixture {
    home: TempDir,
    package: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let fixture = Self {
            home: TempDir::new().unwrap(),
            package: TempDir::new().unwrap(),
        };
        fs::write(fixture.package.path().join("pkgplug.toml"), MANIFEST).unwrap();
        fs::create_dir_all(fixture.package.path().join("plugins")).unwrap();
        fixture
    }

    fn audit_log(&self) -> std::path::PathBuf {
        self.home.path().join("audit.log")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("pkgplug").unwrap();
        cmd.env("HOME", self.home.path())
            .env("PKGPLUG_AUDIT_LOG", self.audit_log())
            .env_remove("PKGPLUG_SCRATCH_DIR")
            .env_remove("PKGPLUG_COMPILER")
            .arg("--package-path")
            .arg(self.package.path())
            .arg("plugin");
        cmd
    }

    #[cfg(unix)]
    fn script(&self, name: &str, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = self.package.path().join("plugins").join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
}

fn output_dir(package: &Path, plugin: &str) -> std::path::PathBuf {
    package.join(".build/plugins").join(plugin).join("outputs")
}

#[test]
fn lists_command_plugins_sorted() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .arg("--list")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "'echo' (plugin 'Echo' in package 'demo')",
        ))
        .stdout(predicate::str::contains(
            "'lint' (plugin 'ShellCheck' in package 'lint-kit')",
        ))
        .stdout(predicate::str::contains("Generator").not());
}

#[test]
fn ambiguous_verb_fails() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .arg("lint")
        .assert()
        .failure()
        .stderr(predicate::str::contains("2 plugins found for verb 'lint'"));
}

#[test]
fn unknown_verb_fails() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .arg("deploy")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "No command plugin found for verb 'deploy'",
        ));
}

#[test]
fn missing_verb_fails() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing plugin command verb"));
}

#[test]
fn missing_manifest_fails() {
    let fixture = Fixture::new();
    fs::remove_file(fixture.package.path().join("pkgplug.toml")).unwrap();

    fixture
        .cmd()
        .arg("--list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Package graph error"));
}

#[test]
fn non_interactive_permission_names_remedy() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .arg("--non-interactive")
        .arg("format")
        .assert()
        .failure()
        .stderr(predicate::str::contains("needs to reformat"))
        .stderr(predicate::str::contains(
            "--allow-writing-to-package-directory",
        ));

    assert!(!output_dir(fixture.package.path(), "Formatter").exists());
}

#[test]
fn invalid_network_kind_rejected() {
    let fixture = Fixture::new();

    fixture
        .cmd()
        .args(["--allow-network-connections", "internet", "echo"])
        .assert()
        .failure();
}

#[cfg(unix)]
#[test]
fn runs_plugin_with_pass_through_arguments() {
    let fixture = Fixture::new();
    fixture.script(
        "echo.sh",
        r#"read descriptor
echo "args: $*"
echo "output: $PKGPLUG_PLUGIN_OUTPUT_DIR"
case "$descriptor" in *'"plugin":"Echo"'*) echo "descriptor ok" ;; esac"#,
    );

    fixture
        .cmd()
        .args(["echo", "--check", "-v", "Sources"])
        .assert()
        .success()
        .stdout(predicate::str::contains("args: --check -v Sources"))
        .stdout(predicate::str::contains("descriptor ok"))
        .stdout(predicate::str::contains(".build/plugins/Echo/outputs"));

    assert!(output_dir(fixture.package.path(), "Echo").is_dir());

    let audit = fs::read_to_string(fixture.audit_log()).unwrap();
    assert!(audit.contains("\"invocation_started\""));
    assert!(audit.contains("\"invocation_finished\""));
}

#[cfg(unix)]
#[test]
fn pre_approved_write_runs_without_prompt() {
    let fixture = Fixture::new();
    fixture.script("format.sh", "echo formatted");

    fixture
        .cmd()
        .args(["--allow-writing-to-package-directory", "format"])
        .assert()
        .success()
        .stdout(predicate::str::contains("formatted"));
}

#[cfg(unix)]
#[test]
fn plugin_failure_exits_non_zero() {
    let fixture = Fixture::new();
    fixture.script("fail.sh", "echo broken >&2\nexit 3");

    fixture
        .cmd()
        .arg("fail")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Plugin 'Failing' exited with code 3"));

    let audit = fs::read_to_string(fixture.audit_log()).unwrap();
    assert!(audit.contains("\"invocation_failed\""));
}
