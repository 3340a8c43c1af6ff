//! Package-specific install and test steps.
//!
//! Each step is a shell command run with `/bin/sh -c` from the unpacked
//! source directory. The environment carries:
//!
//! | Variable | Value |
//! |---|---|
//! | `PREFIX` / `KEEL_PREFIX` | Install prefix for this package version |
//! | `KEEL_PACKAGE` | Package name |
//! | `KEEL_VERSION` | Package version |
//!
//! Output of every step is appended to a per-package log under `logs/`.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use keel_schema::PackageSpec;
use thiserror::Error;
use tracing::{debug, info};
use wait_timeout::ChildExt;

use crate::paths::step_log_path;

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("step {index} '{step}' failed with {status} (log: {})", .log.display())]
    StepFailed {
        index: usize,
        step: String,
        status: String,
        log: PathBuf,
    },

    #[error("step {index} '{step}' timed out after {}s (log: {})", .timeout.as_secs(), .log.display())]
    Timeout {
        index: usize,
        step: String,
        timeout: Duration,
        log: PathBuf,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ActionError {
    /// Log file holding the failing step's output, if any.
    pub fn log(&self) -> Option<&Path> {
        match self {
            Self::StepFailed { log, .. } | Self::Timeout { log, .. } => Some(log),
            Self::Io(_) => None,
        }
    }
}

/// Runs package-specific steps. Swappable so the executor can be tested
/// without a shell.
#[async_trait]
pub trait InstallActions: Send + Sync {
    /// Install the unpacked `source` into `prefix`.
    async fn run_install_steps(
        &self,
        spec: &PackageSpec,
        source: &Path,
        prefix: &Path,
    ) -> Result<(), ActionError>;

    /// Run the package's test steps from `workdir` against an installed
    /// `prefix`.
    async fn run_test_steps(
        &self,
        spec: &PackageSpec,
        workdir: &Path,
        prefix: &Path,
    ) -> Result<(), ActionError>;
}

#[async_trait]
impl<T: InstallActions + ?Sized> InstallActions for std::sync::Arc<T> {
    async fn run_install_steps(
        &self,
        spec: &PackageSpec,
        source: &Path,
        prefix: &Path,
    ) -> Result<(), ActionError> {
        (**self).run_install_steps(spec, source, prefix).await
    }

    async fn run_test_steps(
        &self,
        spec: &PackageSpec,
        workdir: &Path,
        prefix: &Path,
    ) -> Result<(), ActionError> {
        (**self).run_test_steps(spec, workdir, prefix).await
    }
}

/// Runs steps through `/bin/sh` with a per-step timeout.
#[derive(Debug, Clone)]
pub struct ShellActions {
    pub timeout: Duration,
    pub log_dir: PathBuf,
}

impl ShellActions {
    pub fn new(log_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            timeout,
            log_dir: log_dir.into(),
        }
    }
}

#[async_trait]
impl InstallActions for ShellActions {
    async fn run_install_steps(
        &self,
        spec: &PackageSpec,
        source: &Path,
        prefix: &Path,
    ) -> Result<(), ActionError> {
        let this = self.clone();
        let spec = spec.clone();
        let source = source.to_path_buf();
        let prefix = prefix.to_path_buf();

        tokio::task::spawn_blocking(move || {
            if spec.install.is_empty() {
                return adopt_source(&source, &prefix);
            }
            fs::create_dir_all(&prefix)?;
            let log = step_log_path(&this.log_dir, "install", &spec.name, &spec.version);
            run_steps(&spec, &spec.install, &source, &prefix, &log, this.timeout)
        })
        .await
        .map_err(|e| io::Error::other(e.to_string()))?
    }

    async fn run_test_steps(
        &self,
        spec: &PackageSpec,
        workdir: &Path,
        prefix: &Path,
    ) -> Result<(), ActionError> {
        let this = self.clone();
        let spec = spec.clone();
        let workdir = workdir.to_path_buf();
        let prefix = prefix.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let log = step_log_path(&this.log_dir, "test", &spec.name, &spec.version);
            run_steps(&spec, &spec.test, &workdir, &prefix, &log, this.timeout)
        })
        .await
        .map_err(|e| io::Error::other(e.to_string()))?
    }
}

/// With no install steps the unpacked tree becomes the prefix.
fn adopt_source(source: &Path, prefix: &Path) -> Result<(), ActionError> {
    if let Some(parent) = prefix.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(source, prefix)?;
    debug!(from = %source.display(), to = %prefix.display(), "moved unpacked source into prefix");
    Ok(())
}

fn run_steps(
    spec: &PackageSpec,
    steps: &[String],
    cwd: &Path,
    prefix: &Path,
    log_path: &Path,
    timeout: Duration,
) -> Result<(), ActionError> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    for (index, step) in steps.iter().enumerate() {
        info!(package = %spec.name, index, step = %step, "running step");
        writeln!(log, "$ {step}")?;

        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(step)
            .current_dir(cwd)
            .env("PREFIX", prefix)
            .env("KEEL_PREFIX", prefix)
            .env("KEEL_PACKAGE", spec.name.as_str())
            .env("KEEL_VERSION", spec.version.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log.try_clone()?))
            .spawn()?;

        let Some(status) = child.wait_timeout(timeout)? else {
            child.kill().ok();
            child.wait().ok();
            writeln!(log, "# timed out after {}s", timeout.as_secs())?;
            return Err(ActionError::Timeout {
                index,
                step: step.clone(),
                timeout,
                log: log_path.to_path_buf(),
            });
        };

        if !status.success() {
            writeln!(log, "# {}", describe(status))?;
            return Err(ActionError::StepFailed {
                index,
                step: step.clone(),
                status: describe(status),
                log: log_path.to_path_buf(),
            });
        }
    }
    Ok(())
}

fn describe(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "signal".to_string(),
    }
}

/// Last `n` lines of a step log, for error display.
///
/// # Errors
///
/// Returns an error if the log cannot be read.
pub fn read_last_lines(path: &Path, n: usize) -> io::Result<String> {
    let content = fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_schema::{Sha256Digest, Version};

    fn spec(install: &[&str], test: &[&str]) -> PackageSpec {
        let mut spec = PackageSpec::new(
            "demo",
            Version::new(1, 2, 3),
            "file:///dev/null",
            Sha256Digest::from_bytes(&[0; 32]),
        )
        .with_install_steps(install.iter().copied());
        spec.test = test.iter().map(ToString::to_string).collect();
        spec
    }

    #[tokio::test]
    async fn test_steps_see_prefix_env() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src");
        let prefix = dir.path().join("store/demo/1.2.3");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("payload"), "").unwrap();

        let actions = ShellActions::new(dir.path().join("logs"), Duration::from_secs(10));
        let spec = spec(
            &[
                "mkdir -p \"$PREFIX/bin\"",
                "cp payload \"$PREFIX/bin/\"",
                "echo \"$KEEL_PACKAGE $KEEL_VERSION\" > \"$KEEL_PREFIX/id\"",
            ],
            &["test -f \"$PREFIX/bin/payload\""],
        );

        actions.run_install_steps(&spec, &source, &prefix).await.unwrap();
        assert!(prefix.join("bin/payload").is_file());
        assert_eq!(
            fs::read_to_string(prefix.join("id")).unwrap().trim(),
            "demo 1.2.3"
        );

        let work = tempfile::tempdir().unwrap();
        actions
            .run_test_steps(&spec, work.path(), &prefix)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failing_step_reports_index_and_log() {
        let dir = tempfile::tempdir().unwrap();
        let actions = ShellActions::new(dir.path().join("logs"), Duration::from_secs(10));
        let spec = spec(&["true", "echo boom >&2; exit 7", "true"], &[]);

        let err = actions
            .run_install_steps(&spec, dir.path(), &dir.path().join("prefix"))
            .await
            .unwrap_err();
        match &err {
            ActionError::StepFailed { index, status, .. } => {
                assert_eq!(*index, 1);
                assert_eq!(status, "exit code 7");
            }
            other => panic!("expected step failure, got {other}"),
        }
        let tail = read_last_lines(err.log().unwrap(), 5).unwrap();
        assert!(tail.contains("boom"));
    }

    #[tokio::test]
    async fn test_step_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let actions = ShellActions::new(dir.path().join("logs"), Duration::from_millis(200));
        let spec = spec(&["sleep 5"], &[]);

        let err = actions
            .run_install_steps(&spec, dir.path(), &dir.path().join("prefix"))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Timeout { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_no_steps_moves_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("unpacked");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("README"), "hi").unwrap();
        let prefix = dir.path().join("store/demo/1.2.3");

        let actions = ShellActions::new(dir.path().join("logs"), Duration::from_secs(10));
        actions
            .run_install_steps(&spec(&[], &[]), &source, &prefix)
            .await
            .unwrap();
        assert!(prefix.join("README").is_file());
        assert!(!source.exists());
    }
}
