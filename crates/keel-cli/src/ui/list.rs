//! Row formatting for `list`, `info`, `history` and `resolve`.
//!
//! Data goes to stdout; progress and diagnostics go through
//! [`ConsoleReporter`](super::ConsoleReporter) on stderr.

use chrono::{DateTime, Local};
use crossterm::style::Stylize;

use super::theme::{Theme, pad};
use crate::store::{HistoryEvent, InstallRecord, RecordStatus};

/// Format a timestamp as relative time.
pub fn format_relative_time(unix_secs: i64, now_secs: i64) -> String {
    let diff = (now_secs - unix_secs).max(0);
    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}

/// `2026-01-31 12:00:00` in local time.
pub fn format_timestamp_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .unwrap_or_default()
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

pub fn record_row(theme: &Theme, record: &InstallRecord, now_secs: i64) -> String {
    let status = match record.status {
        RecordStatus::Installed => {
            format!("installed {}", format_relative_time(record.installed_at, now_secs))
                .with(theme.colors.secondary)
        }
        RecordStatus::Failed => "failed".to_string().with(theme.colors.error),
        RecordStatus::RolledBack => "rolled back".to_string().with(theme.colors.warning),
    };
    format!(
        "  {} {} {}",
        pad(&record.name, theme.name_width).with(theme.colors.package_name),
        pad(&record.version.to_string(), theme.version_width).with(theme.colors.version),
        status
    )
}

pub fn print_records(records: &[InstallRecord]) {
    let theme = Theme::default();
    let now = chrono::Utc::now().timestamp();

    println!();
    println!("{}", "Installed packages".dark_grey());
    println!();
    for record in records {
        println!("{}", record_row(&theme, record, now));
    }
    println!();
    println!(
        "{}",
        format!(
            "{} package{} total",
            records.len(),
            if records.len() == 1 { "" } else { "s" }
        )
        .dark_grey()
    );
}

pub fn history_line(event: &HistoryEvent) -> String {
    let version = event.version.as_deref().unwrap_or("?");
    let mut desc = match event.action.as_str() {
        "install" => format!("Installed {version}"),
        "upgrade" => format!("Upgraded to {version}"),
        "uninstall" => format!("Removed {version}"),
        "rollback" => format!("Rolled back {version}"),
        other => format!("{other} {version}"),
    };
    if !event.success {
        desc.push_str(" (failed)");
    }
    if let Some(detail) = &event.detail {
        desc.push_str(": ");
        desc.push_str(detail);
    }
    format!("[{}] {}", format_timestamp_millis(event.timestamp), desc)
}

pub fn print_history(name: &str, events: &[HistoryEvent]) {
    println!("History for '{name}':");
    println!("{}", "-".repeat(60));
    for event in events {
        println!("{}", history_line(event));
    }
    println!();
}

/// One plan entry for `resolve`: position, name, version and a note.
pub fn plan_row(theme: &Theme, position: usize, name: &str, version: &str, note: &str) -> String {
    format!(
        "  {:>3}. {} {} {}",
        position,
        pad(name, theme.name_width).with(theme.colors.package_name),
        pad(version, theme.version_width).with(theme.colors.version),
        note.with(theme.colors.secondary)
    )
}

/// A `key: value` line for `info`.
pub fn field(label: &str, value: &str) -> String {
    format!("  {} {}", pad(&format!("{label}:"), 14).dark_grey(), value)
}
