//! Install command

use anyhow::{Context as _, Result};
use keel_core::{Reporter, resolve};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{Session, parse_specs};
use crate::Exit;
use crate::ops::{self, Context, Outcome};

/// Resolve `packages` and install the plan.
pub async fn install(
    session: &Session,
    packages: &[String],
    parallel: bool,
    rollback_orphans: bool,
    cancel: &CancellationToken,
) -> Result<Exit> {
    let requested = parse_specs(packages)?;
    let registry = session.load_registry()?;
    let reporter = session.reporter();

    reporter.section("Resolving");
    let plan = match resolve(&registry, &requested) {
        Ok(plan) => plan,
        Err(e) => {
            reporter.error(&e.to_string());
            return Ok(Exit::Resolution);
        }
    };
    info!(packages = plan.len(), "resolved plan");

    let db = session.open_db()?;
    let ctx = Context::standard(
        db.clone(),
        session.layout.clone(),
        session.config.fetch_timeout(),
        session.config.install_timeout(),
        reporter.clone(),
    )
    .context("failed to initialize fetcher")?;

    let mut opts = session.config.install_options();
    opts.parallel |= parallel;
    opts.rollback_orphans |= rollback_orphans;

    let report = ops::apply(&ctx, &plan, &opts, cancel).await;
    db.shutdown();

    for entry in &report.entries {
        if let Outcome::Failed(reason) = &entry.outcome {
            reporter.error(&format!("{}@{}: {reason}", entry.name, entry.version));
        }
    }
    let unfinished = report.count(|o| matches!(o, Outcome::Skipped(_) | Outcome::RolledBack));
    if unfinished > 0 {
        reporter.warning(&format!(
            "{unfinished} package{} not installed",
            if unfinished == 1 { "" } else { "s" }
        ));
    }

    Ok(report.status().into())
}
