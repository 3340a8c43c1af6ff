//! Package removal.

use keel_core::{Layout, Reporter};
use keel_schema::PackageName;
use tracing::info;

use super::error::RemoveError;
use super::install::remove_dir_if_exists;
use crate::store::{DbHandle, InstallRecord, NewHistory};

/// Remove an installed package's prefix and record.
///
/// Refuses while other installed packages depend on `name`, unless `force`.
pub async fn uninstall(
    db: &DbHandle,
    layout: &Layout,
    reporter: &dyn Reporter,
    name: &PackageName,
    force: bool,
) -> Result<InstallRecord, RemoveError> {
    let record = db
        .get(name)
        .await?
        .ok_or_else(|| RemoveError::NotInstalled(name.to_string()))?;

    if !force {
        let dependents = db.dependents(name).await?;
        if !dependents.is_empty() {
            return Err(RemoveError::HasDependents {
                name: name.to_string(),
                dependents: dependents.iter().map(ToString::to_string).collect(),
            });
        }
    }

    reporter.removing(&record.name, &record.version);
    let prefix = layout.prefix(&record.name, &record.version);
    remove_dir_if_exists(&prefix).await?;
    db.remove(name).await?;

    let mut event = NewHistory::new("uninstall", name, true)
        .version(&record.version)
        .sha256(&record.sha256);
    if force {
        event = event.detail("forced");
    }
    db.add_history(event).await?;

    info!(package = %name, version = %record.version, "uninstalled");
    reporter.done(&record.name, &record.version, "removed");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RecordStatus, StateDb};
    use keel_core::NullReporter;
    use keel_schema::{Sha256Digest, Version};

    async fn seed(db: &DbHandle, layout: &Layout, name: &str, deps: &[&str]) {
        let record = InstallRecord {
            name: PackageName::new(name),
            version: Version::new(1, 0, 0),
            sha256: Sha256Digest::from_bytes(&[3; 32]),
            installed_at: 0,
            status: RecordStatus::Installed,
            dependencies: deps.iter().map(|d| PackageName::new(d)).collect(),
        };
        std::fs::create_dir_all(layout.prefix(&record.name, &record.version)).unwrap();
        db.put(record).await.unwrap();
    }

    #[tokio::test]
    async fn test_uninstall_guards_dependents() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let db = DbHandle::from_db(StateDb::open_in_memory().unwrap());
        seed(&db, &layout, "zlib", &[]).await;
        seed(&db, &layout, "curl", &["zlib"]).await;

        let zlib = PackageName::new("zlib");
        let err = uninstall(&db, &layout, &NullReporter, &zlib, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoveError::HasDependents { .. }));
        assert!(err.to_string().contains("curl"));

        let curl = PackageName::new("curl");
        uninstall(&db, &layout, &NullReporter, &curl, false)
            .await
            .unwrap();
        uninstall(&db, &layout, &NullReporter, &zlib, false)
            .await
            .unwrap();

        assert!(db.list_all().await.unwrap().is_empty());
        assert!(!layout.prefix(&zlib, &Version::new(1, 0, 0)).exists());
        let history = db.history(&zlib).await.unwrap();
        assert_eq!(history.last().unwrap().action, "uninstall");
    }

    #[tokio::test]
    async fn test_force_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let db = DbHandle::from_db(StateDb::open_in_memory().unwrap());
        seed(&db, &layout, "zlib", &[]).await;
        seed(&db, &layout, "curl", &["zlib"]).await;

        let zlib = PackageName::new("zlib");
        uninstall(&db, &layout, &NullReporter, &zlib, true)
            .await
            .unwrap();

        let err = uninstall(&db, &layout, &NullReporter, &zlib, true)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoveError::NotInstalled(_)));
    }
}
