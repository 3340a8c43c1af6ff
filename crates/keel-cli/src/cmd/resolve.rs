//! Resolve command
//!
//! Prints the plan `install` would execute. Without `--dry-run` each entry is
//! annotated with what the state database already holds for it.

use anyhow::Result;
use keel_core::{Reporter, ResolvedPlan, resolve as resolve_plan};
use keel_schema::{Sha256Digest, Version};

use super::{Session, parse_specs};
use crate::Exit;
use crate::store::{InstallRecord, RecordStatus};
use crate::ui::Theme;
use crate::ui::list::plan_row;

pub async fn resolve(session: &Session, packages: &[String], dry_run: bool) -> Result<Exit> {
    let requested = parse_specs(packages)?;
    let registry = session.load_registry()?;
    let reporter = session.reporter();

    let plan = match resolve_plan(&registry, &requested) {
        Ok(plan) => plan,
        Err(e) => {
            reporter.error(&e.to_string());
            return Ok(Exit::Resolution);
        }
    };

    let mut records = Vec::with_capacity(plan.len());
    if dry_run {
        records.resize(plan.len(), None);
    } else {
        let db = session.open_db()?;
        for entry in &plan {
            records.push(db.get(&entry.name).await?);
        }
        db.shutdown();
    }

    print_plan(&plan, &records);
    Ok(Exit::Success)
}

fn print_plan(plan: &ResolvedPlan, records: &[Option<InstallRecord>]) {
    let theme = Theme::default();
    for (i, (entry, record)) in plan.iter().zip(records).enumerate() {
        let mut note = annotate(&entry.spec.version, &entry.spec.sha256, record.as_ref());
        if plan.is_requested(&entry.name) {
            note = if note.is_empty() {
                "requested".to_string()
            } else {
                format!("requested, {note}")
            };
        }
        println!(
            "{}",
            plan_row(&theme, i + 1, &entry.name, &entry.version.to_string(), &note)
        );
    }
}

/// Describe what installing this entry would change.
fn annotate(version: &Version, sha256: &Sha256Digest, record: Option<&InstallRecord>) -> String {
    match record {
        None => String::new(),
        Some(r) if r.satisfies(version, sha256) => "already installed".to_string(),
        Some(r) if r.status == RecordStatus::Installed && &r.version != version => {
            format!("upgrade from {}", r.version)
        }
        Some(r) if r.status == RecordStatus::Installed => "reinstall (checksum changed)".to_string(),
        Some(r) => format!("retry ({})", r.status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_schema::PackageName;

    fn record(version: Version, sha: u8, status: RecordStatus) -> InstallRecord {
        InstallRecord {
            name: PackageName::new("zlib"),
            version,
            sha256: Sha256Digest::from_bytes(&[sha; 32]),
            installed_at: 0,
            status,
            dependencies: vec![],
        }
    }

    #[test]
    fn test_annotate() {
        let v2 = Version::new(2, 0, 0);
        let sha = Sha256Digest::from_bytes(&[1; 32]);

        assert_eq!(annotate(&v2, &sha, None), "");
        let same = record(v2.clone(), 1, RecordStatus::Installed);
        assert_eq!(annotate(&v2, &sha, Some(&same)), "already installed");
        let old = record(Version::new(1, 0, 0), 1, RecordStatus::Installed);
        assert_eq!(annotate(&v2, &sha, Some(&old)), "upgrade from 1.0.0");
        let changed = record(v2.clone(), 9, RecordStatus::Installed);
        assert_eq!(
            annotate(&v2, &sha, Some(&changed)),
            "reinstall (checksum changed)"
        );
        let failed = record(v2.clone(), 1, RecordStatus::Failed);
        assert_eq!(annotate(&v2, &sha, Some(&failed)), "retry (failed)");
    }
}
