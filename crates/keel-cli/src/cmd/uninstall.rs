//! Uninstall command

use anyhow::Result;
use keel_core::Reporter;
use keel_schema::PackageName;

use super::Session;
use crate::Exit;
use crate::ops::{RemoveError, uninstall as remove_package};

pub async fn uninstall(session: &Session, package: &str, force: bool) -> Result<Exit> {
    let db = session.open_db()?;
    let reporter = session.reporter();
    let name = PackageName::new(package);

    reporter.section("Removing");
    let result = remove_package(&db, &session.layout, reporter.as_ref(), &name, force).await;
    db.shutdown();

    match result {
        Ok(_) => Ok(Exit::Success),
        Err(e @ (RemoveError::NotInstalled(_) | RemoveError::HasDependents { .. })) => {
            reporter.error(&e.to_string());
            if matches!(e, RemoveError::HasDependents { .. }) {
                reporter.info("Pass --force to remove it anyway.");
            }
            Ok(Exit::Error)
        }
        Err(e) => Err(e.into()),
    }
}
