//! Info command

use anyhow::{Result, bail};
use keel_schema::{PackageName, PackageSpec, Registry, RegistryError};

use super::Session;
use crate::Exit;
use crate::ui::list::field;

/// Show what the registry offers for a package and what is installed.
pub async fn info(session: &Session, package: &str) -> Result<Exit> {
    let name = PackageName::new(package);
    let registry = session.load_registry()?;
    let specs: &[PackageSpec] = match registry.lookup(&name) {
        Ok(specs) => specs,
        Err(RegistryError::NotFound(_)) => &[],
        Err(e) => return Err(e.into()),
    };

    let db = session.open_db()?;
    let record = db.get(&name).await?;
    db.shutdown();

    if specs.is_empty() && record.is_none() {
        bail!("package '{name}' not found in registry");
    }

    println!();
    println!("  {name}");
    if let Some(latest) = specs.first() {
        if let Some(homepage) = &latest.homepage {
            println!("{}", field("Homepage", homepage));
        }
        let versions: Vec<String> = specs.iter().map(|s| s.version.to_string()).collect();
        println!("{}", field("Versions", &versions.join(", ")));
        let deps: Vec<String> = latest.dependencies.iter().map(ToString::to_string).collect();
        let deps = if deps.is_empty() {
            "none".to_string()
        } else {
            deps.join(", ")
        };
        println!("{}", field("Depends on", &deps));
        println!("{}", field("Source", &latest.url));
    }

    match &record {
        Some(r) => {
            println!("{}", field("Installed", &format!("{} ({})", r.version, r.status)));
            println!("{}", field("Checksum", r.sha256.as_str()));
            println!(
                "{}",
                field("Prefix", &session.layout.prefix(&r.name, &r.version).display().to_string())
            );
        }
        None => println!("{}", field("Installed", "no")),
    }
    println!();

    Ok(Exit::Success)
}
