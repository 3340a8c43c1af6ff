//! End-to-end tests that run the `keel` binary against a temporary home.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::process::{Command, Output};

use keel_core::io::{Sha256Verifier, Verifier};
use tempfile::TempDir;

/// A temporary keel home plus a directory of raw artifacts served over
/// `file://`.
struct TestContext {
    temp_dir: TempDir,
    home: PathBuf,
    registry: String,
}

struct Pkg<'a> {
    name: &'a str,
    version: &'a str,
    depends_on: &'a [&'a str],
    install: &'a [&'a str],
}

impl<'a> Pkg<'a> {
    fn new(name: &'a str, version: &'a str) -> Self {
        Self {
            name,
            version,
            depends_on: &[],
            install: &[],
        }
    }

    fn deps(mut self, deps: &'a [&'a str]) -> Self {
        self.depends_on = deps;
        self
    }

    fn install(mut self, steps: &'a [&'a str]) -> Self {
        self.install = steps;
        self
    }
}

fn toml_list(items: &[&str]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| format!("{s:?}")).collect();
    format!("[{}]", quoted.join(", "))
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let home = temp_dir.path().join(".keel");
        std::fs::create_dir_all(temp_dir.path().join("artifacts")).unwrap();
        Self {
            temp_dir,
            home,
            registry: String::new(),
        }
    }

    fn add(&mut self, pkg: &Pkg<'_>) -> &mut Self {
        let contents = format!("{} {}\n", pkg.name, pkg.version);
        let path = self
            .temp_dir
            .path()
            .join("artifacts")
            .join(format!("{}-{}.txt", pkg.name, pkg.version));
        std::fs::write(&path, &contents).unwrap();
        let sha = Sha256Verifier.digest(contents.as_bytes());

        writeln!(self.registry, "[[package]]").unwrap();
        writeln!(self.registry, "name = {:?}", pkg.name).unwrap();
        writeln!(self.registry, "version = {:?}", pkg.version).unwrap();
        writeln!(self.registry, "url = \"file://{}\"", path.display()).unwrap();
        writeln!(self.registry, "sha256 = \"{sha}\"").unwrap();
        writeln!(self.registry, "depends_on = {}", toml_list(pkg.depends_on)).unwrap();
        writeln!(self.registry, "install = {}\n", toml_list(pkg.install)).unwrap();
        self
    }

    fn registry_path(&self) -> PathBuf {
        self.temp_dir.path().join("registry.toml")
    }

    fn keel(&self, args: &[&str]) -> Output {
        std::fs::write(self.registry_path(), &self.registry).unwrap();
        Command::new(env!("CARGO_BIN_EXE_keel"))
            .env("KEEL_HOME", &self.home)
            .env("KEEL_REGISTRY", self.registry_path())
            .env_remove("KEEL_REGISTRY_URL")
            .env_remove("RUST_LOG")
            .env("NO_COLOR", "1")
            .args(args)
            .output()
            .expect("failed to run keel")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.keel(&["--help"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Usage:"));
}

#[test]
fn test_install_chain_in_dependency_order() {
    let mut ctx = TestContext::new();
    ctx.add(&Pkg::new("a", "1.0.0").deps(&["b"]))
        .add(&Pkg::new("b", "1.0.0").deps(&["c"]))
        .add(&Pkg::new("c", "1.0.0"));

    let plan = ctx.keel(&["resolve", "--dry-run", "a"]);
    assert_eq!(plan.status.code(), Some(0), "{}", stderr(&plan));
    let order: Vec<char> = stdout(&plan)
        .lines()
        .filter_map(|line| line.chars().find(|ch| matches!(ch, 'a' | 'b' | 'c')))
        .collect();
    assert_eq!(order, vec!['c', 'b', 'a']);

    let output = ctx.keel(&["install", "a"]);
    assert_eq!(output.status.code(), Some(0), "{}", stderr(&output));
    for name in ["a", "b", "c"] {
        let file = ctx
            .home
            .join("store")
            .join(name)
            .join("1.0.0")
            .join(format!("{name}-1.0.0.txt"));
        assert!(file.exists(), "missing {}", file.display());
    }

    let list = ctx.keel(&["list", "--json"]);
    assert!(list.status.success());
    let records: serde_json::Value = serde_json::from_str(&stdout(&list)).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 3);

    // second run has nothing to do
    let again = ctx.keel(&["install", "a"]);
    assert_eq!(again.status.code(), Some(0));
    assert!(stderr(&again).contains("already"), "{}", stderr(&again));
}

#[test]
fn test_conflict_exits_with_resolution_failure() {
    let mut ctx = TestContext::new();
    ctx.add(&Pkg::new("app", "1.0.0").deps(&["lib@>=2.0"]))
        .add(&Pkg::new("tool", "1.0.0").deps(&["lib@<1.5"]))
        .add(&Pkg::new("lib", "1.0.0"))
        .add(&Pkg::new("lib", "2.0.0"));

    let output = ctx.keel(&["install", "app", "tool"]);
    assert_eq!(output.status.code(), Some(2));
    let err = stderr(&output);
    assert!(err.contains(">=2.0") && err.contains("<1.5"), "{err}");
    assert!(!ctx.home.join("store").join("lib").exists());
}

#[test]
fn test_missing_package_exits_with_resolution_failure() {
    let mut ctx = TestContext::new();
    ctx.add(&Pkg::new("app", "1.0.0").deps(&["ghost"]));

    let output = ctx.keel(&["install", "app"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("ghost"));
}

#[test]
fn test_failed_install_exit_codes() {
    let mut ctx = TestContext::new();
    ctx.add(&Pkg::new("broken", "1.0.0").install(&["exit 1"]))
        .add(&Pkg::new("ok", "1.0.0"));

    let failed = ctx.keel(&["install", "broken"]);
    assert_eq!(failed.status.code(), Some(3), "{}", stderr(&failed));

    let partial = ctx.keel(&["install", "ok", "broken"]);
    assert_eq!(partial.status.code(), Some(4), "{}", stderr(&partial));

    let list = ctx.keel(&["list", "--json"]);
    let records: serde_json::Value = serde_json::from_str(&stdout(&list)).unwrap();
    let names: Vec<&str> = records
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["ok"]);

    let history = ctx.keel(&["history", "broken"]);
    assert!(stdout(&history).contains("(failed)"), "{}", stdout(&history));
}

#[test]
fn test_uninstall_respects_dependents() {
    let mut ctx = TestContext::new();
    ctx.add(&Pkg::new("app", "1.0.0").deps(&["lib"]))
        .add(&Pkg::new("lib", "1.0.0"));
    assert!(ctx.keel(&["install", "app"]).status.success());

    let refused = ctx.keel(&["uninstall", "lib"]);
    assert_eq!(refused.status.code(), Some(1));
    assert!(stderr(&refused).contains("app"));

    assert!(ctx.keel(&["uninstall", "app"]).status.success());
    assert!(ctx.keel(&["uninstall", "lib"]).status.success());
    assert!(!ctx.home.join("store").join("lib").join("1.0.0").exists());

    let list = ctx.keel(&["list"]);
    assert!(stdout(&list).contains("No packages installed"));
}
