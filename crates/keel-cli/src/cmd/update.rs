//! Update command

use anyhow::{Context as _, Result, bail};
use keel_core::Reporter;
use keel_core::io::{DefaultFetcher, fetch_with_retry};
use keel_schema::PackageIndex;
use std::io::Write;
use std::path::Path;
use tracing::info;

use super::Session;
use crate::Exit;

/// Download the registry and replace the local copy once it parses.
pub async fn update(session: &Session, url: Option<&str>) -> Result<Exit> {
    let Some(url) = url.or(session.config.registry_url.as_deref()) else {
        bail!("no registry URL; pass --url or set registry_url in config.toml");
    };
    let reporter = session.reporter();
    reporter.section("Updating");
    reporter.info(&format!("Fetching registry from {url}"));

    let fetcher = DefaultFetcher::new(session.config.fetch_timeout())?;
    let policy = session.config.retry.policy();
    let bytes = fetch_with_retry(&fetcher, url, &policy, |attempt, _, e| {
        reporter.warning(&format!("retry {attempt}: {e}"));
    })
    .await
    .with_context(|| format!("failed to fetch registry from {url}"))?;

    let text = std::str::from_utf8(&bytes).context("registry is not valid UTF-8")?;
    let index = PackageIndex::from_toml_str(text).context("downloaded registry is invalid")?;

    let path = &session.registry_path;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    info!(path = %path.display(), packages = index.len(), "registry updated");
    reporter.info(&format!(
        "{} packages, {} versions",
        index.len(),
        index.version_count()
    ));
    Ok(Exit::Success)
}
