//! Line-oriented progress output on stderr.
//!
//! Every event becomes exactly one line, so output from packages installed
//! concurrently interleaves by line rather than by character.

use crossterm::style::Stylize;
use keel_core::Reporter;
use keel_schema::{PackageName, Version};

use super::theme::{Theme, pad};

#[derive(Debug, Clone, Default)]
pub struct ConsoleReporter {
    theme: Theme,
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self {
            theme: Theme::default(),
            quiet,
        }
    }

    fn row(&self, icon: &str, name: &PackageName, version: &Version, status: &str) -> String {
        let colors = &self.theme.colors;
        format!(
            "  {} {} {} {}",
            icon,
            pad(name, self.theme.name_width).with(colors.package_name),
            pad(&version.to_string(), self.theme.version_width).with(colors.version),
            status
        )
    }

    fn progress(&self, line: String) {
        if !self.quiet {
            eprintln!("{line}");
        }
    }
}

impl Reporter for ConsoleReporter {
    fn section(&self, title: &str) {
        self.progress(format!("\n{} {}", title.bold(), "─".repeat(40).dark_grey()));
    }

    fn fetching(&self, name: &PackageName, version: &Version) {
        let icon = self.theme.icons.pending.with(self.theme.colors.secondary);
        self.progress(self.row(&icon.to_string(), name, version, "fetching"));
    }

    fn retrying(&self, name: &PackageName, version: &Version, attempt: u32, reason: &str) {
        let icon = self.theme.icons.warning.with(self.theme.colors.warning);
        let status = format!("retry {attempt}: {reason}").with(self.theme.colors.warning);
        self.progress(self.row(&icon.to_string(), name, version, &status.to_string()));
    }

    fn installing(&self, name: &PackageName, version: &Version) {
        let icon = self.theme.icons.active.with(self.theme.colors.active);
        self.progress(self.row(&icon.to_string(), name, version, "installing"));
    }

    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        let icon = self.theme.icons.success.with(self.theme.colors.success);
        let status = detail.with(self.theme.colors.success);
        self.progress(self.row(&icon.to_string(), name, version, &status.to_string()));
    }

    fn skipped(&self, name: &PackageName, version: &Version, reason: &str) {
        let icon = self.theme.icons.pending.with(self.theme.colors.secondary);
        let status = reason.with(self.theme.colors.secondary);
        self.progress(self.row(&icon.to_string(), name, version, &status.to_string()));
    }

    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        let icon = self.theme.icons.error.with(self.theme.colors.error);
        let status = reason.with(self.theme.colors.error);
        eprintln!("{}", self.row(&icon.to_string(), name, version, &status.to_string()));
    }

    fn removing(&self, name: &PackageName, version: &Version) {
        let icon = self.theme.icons.active.with(self.theme.colors.active);
        self.progress(self.row(&icon.to_string(), name, version, "removing"));
    }

    fn info(&self, msg: &str) {
        self.progress(format!("  {} {}", self.theme.icons.info, msg));
    }

    fn warning(&self, msg: &str) {
        let icon = self.theme.icons.warning.with(self.theme.colors.warning);
        eprintln!("  {icon} {msg}");
    }

    fn error(&self, msg: &str) {
        let icon = self.theme.icons.error.with(self.theme.colors.error);
        eprintln!("  {icon} {}", msg.with(self.theme.colors.error));
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        let msg = format!(
            "{} package{} {} in {:.1}s",
            count,
            if count == 1 { "" } else { "s" },
            action,
            elapsed_secs
        );
        let icon = self.theme.icons.success.with(self.theme.colors.success);
        self.progress(format!("\n  {icon} {msg}"));
    }
}
