//! History command

use anyhow::Result;
use keel_schema::PackageName;

use super::Session;
use crate::Exit;
use crate::ui::list::print_history;

pub async fn history(session: &Session, package: &str) -> Result<Exit> {
    let db = session.open_db()?;
    let events = db.history(&PackageName::new(package)).await?;
    db.shutdown();

    if events.is_empty() {
        println!("No history found for '{package}'");
        return Ok(Exit::Success);
    }

    print_history(package, &events);
    Ok(Exit::Success)
}
