//! List command

use anyhow::{Context, Result};

use super::Session;
use crate::Exit;
use crate::ui::list::print_records;

/// List all installed packages
pub async fn list(session: &Session, json: bool) -> Result<Exit> {
    let db = session.open_db()?;
    let records = db.list_all().await?;
    db.shutdown();

    if json {
        let out = serde_json::to_string_pretty(&records).context("failed to encode records")?;
        println!("{out}");
        return Ok(Exit::Success);
    }

    if records.is_empty() {
        println!("No packages installed.");
        println!("Run 'keel install <package>' to get started.");
        return Ok(Exit::Success);
    }

    print_records(&records);
    Ok(Exit::Success)
}
