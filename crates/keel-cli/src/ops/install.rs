//! Package installation.
//!
//! [`apply`] walks a [`ResolvedPlan`] and drives every entry to a terminal
//! [`Outcome`]. Per package:
//!
//! 1. **Idempotence.** A record with the same version and checksum whose
//!    status is `installed` means nothing to do, and nothing is fetched.
//! 2. **Fetch + verify.** Reuse `cache/<sha256>` when it still verifies,
//!    otherwise fetch with retry. A checksum mismatch halts the whole plan.
//! 3. **Unpack + install.** Unpack into `tmp/` and run the install actions
//!    with `PREFIX` set to `store/<name>/<version>`.
//! 4. **Commit.** Write the install record in one transaction. On failure the
//!    partial prefix is removed, no record is written and every dependent
//!    still waiting is skipped.
//!
//! Cancellation is checked before each package starts; a package already
//! running finishes its unit of work.

use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::Path;
use std::time::Instant;

use bytes::Bytes;
use futures::future::join_all;
use keel_core::io::{extract, fetch_with_retry};
use keel_core::paths::filename_from_url;
use keel_core::{PlanEntry, ResolvedPlan};
use keel_schema::{PackageName, PackageSpec, Version};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::context::{Context, InstallOptions};
use super::error::InstallError;
use crate::store::{InstallRecord, NewHistory, RecordStatus};

/// Why an entry was never attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A dependency (direct or transitive) failed.
    DependencyFailed(PackageName),
    /// An integrity failure in this package stopped the plan.
    Halted(PackageName),
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DependencyFailed(dep) => write!(f, "dependency {dep} failed"),
            Self::Halted(by) => write!(f, "halted by integrity failure in {by}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Terminal state of one plan entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Installed,
    AlreadySatisfied,
    Failed(String),
    Skipped(SkipReason),
    /// Installed during this run, then removed because everything that
    /// needed it failed.
    RolledBack,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Installed | Self::AlreadySatisfied)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installed => f.write_str("installed"),
            Self::AlreadySatisfied => f.write_str("already satisfied"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
            Self::RolledBack => f.write_str("rolled back"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub name: PackageName,
    pub version: Version,
    pub outcome: Outcome,
}

/// Overall classification of a run, used for the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Something failed and nothing succeeded.
    Failed,
    /// Some entries succeeded, some did not.
    Partial,
}

/// Outcome of every plan entry, in plan order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub entries: Vec<ReportEntry>,
}

impl InstallReport {
    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| &e.outcome)
    }

    pub fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(&e.outcome)).count()
    }

    pub fn status(&self) -> RunStatus {
        let ok = self.count(Outcome::is_success);
        if ok == self.entries.len() {
            RunStatus::Success
        } else if ok == 0 {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        }
    }
}

enum Done {
    Installed,
    AlreadySatisfied,
}

/// Install every entry of `plan`, in dependency order.
pub async fn apply(
    ctx: &Context,
    plan: &ResolvedPlan,
    opts: &InstallOptions,
    cancel: &CancellationToken,
) -> InstallReport {
    let start = Instant::now();
    let mut outcomes: Vec<Option<Outcome>> = vec![None; plan.len()];
    let mut fresh: HashSet<usize> = HashSet::new();

    let layers: Vec<Vec<usize>> = if opts.parallel {
        plan.layers()
    } else {
        (0..plan.len()).map(|i| vec![i]).collect()
    };

    ctx.reporter.section("Installing");

    'layers: for layer in layers {
        let pending: Vec<usize> = layer
            .into_iter()
            .filter(|&i| outcomes[i].is_none())
            .collect();
        if pending.is_empty() {
            continue;
        }

        let concurrent = pending.len() > 1 && plan.disjoint_writes(&pending, &ctx.layout);
        if pending.len() > 1 && !concurrent {
            debug!(
                layer = ?pending,
                "write paths overlap, installing layer sequentially"
            );
        }

        if concurrent {
            if cancel.is_cancelled() {
                break 'layers;
            }
            let results = join_all(pending.iter().map(|&i| install_one(ctx, plan, i, opts))).await;
            let mut results: Vec<_> = pending.iter().copied().zip(results).collect();
            // Siblings that already finished keep their outcome when a
            // failure halts the rest of the plan.
            results.sort_by_key(|(_, result)| result.is_err());
            for (i, result) in results {
                settle(ctx, plan, i, result, &mut outcomes, &mut fresh).await;
            }
        } else {
            for i in pending {
                if cancel.is_cancelled() {
                    break 'layers;
                }
                if outcomes[i].is_some() {
                    continue;
                }
                let result = install_one(ctx, plan, i, opts).await;
                settle(ctx, plan, i, result, &mut outcomes, &mut fresh).await;
            }
        }
    }

    for (i, slot) in outcomes.iter_mut().enumerate() {
        if slot.is_none() {
            let entry = &plan.entries()[i];
            ctx.reporter
                .skipped(&entry.name, &entry.version, &SkipReason::Cancelled.to_string());
            *slot = Some(Outcome::Skipped(SkipReason::Cancelled));
        }
    }

    if opts.rollback_orphans {
        rollback_orphans(ctx, plan, &mut outcomes, &fresh).await;
    }

    let entries: Vec<ReportEntry> = plan
        .iter()
        .zip(outcomes)
        .map(|(entry, outcome)| ReportEntry {
            name: entry.name.clone(),
            version: entry.version.clone(),
            outcome: outcome.unwrap_or(Outcome::Skipped(SkipReason::Cancelled)),
        })
        .collect();

    let report = InstallReport { entries };
    ctx.reporter.summary(
        report.count(|o| matches!(o, Outcome::Installed)),
        "installed",
        start.elapsed().as_secs_f64(),
    );
    report
}

/// Record the result for entry `i` and propagate failure to what is waiting.
async fn settle(
    ctx: &Context,
    plan: &ResolvedPlan,
    i: usize,
    result: Result<Done, InstallError>,
    outcomes: &mut [Option<Outcome>],
    fresh: &mut HashSet<usize>,
) {
    let entry = &plan.entries()[i];
    match result {
        Ok(Done::Installed) => {
            fresh.insert(i);
            ctx.reporter.done(&entry.name, &entry.version, "installed");
            outcomes[i] = Some(Outcome::Installed);
        }
        Ok(Done::AlreadySatisfied) => {
            ctx.reporter
                .skipped(&entry.name, &entry.version, "already installed");
            outcomes[i] = Some(Outcome::AlreadySatisfied);
        }
        Err(err) => {
            let reason = err.to_string();
            warn!(package = %entry.name, version = %entry.version, error = %reason, "install failed");
            ctx.reporter.failed(&entry.name, &entry.version, &reason);
            record_history(
                ctx,
                NewHistory::new("install", &entry.name, false)
                    .version(&entry.version)
                    .detail(reason.clone()),
            )
            .await;
            outcomes[i] = Some(Outcome::Failed(reason));

            let (victims, skip) = if err.halts_plan() {
                let rest: Vec<usize> = (0..plan.len()).filter(|&j| outcomes[j].is_none()).collect();
                (rest, SkipReason::Halted(entry.name.clone()))
            } else {
                (
                    plan.dependents_of(i),
                    SkipReason::DependencyFailed(entry.name.clone()),
                )
            };
            for j in victims {
                if outcomes[j].is_none() {
                    let victim = &plan.entries()[j];
                    ctx.reporter
                        .skipped(&victim.name, &victim.version, &skip.to_string());
                    outcomes[j] = Some(Outcome::Skipped(skip.clone()));
                }
            }
        }
    }
}

async fn install_one(
    ctx: &Context,
    plan: &ResolvedPlan,
    i: usize,
    opts: &InstallOptions,
) -> Result<Done, InstallError> {
    let entry = &plan.entries()[i];
    let spec = &entry.spec;

    let previous = ctx.db.get(&entry.name).await?;
    if previous
        .as_ref()
        .is_some_and(|rec| rec.satisfies(&spec.version, &spec.sha256))
    {
        debug!(package = %spec.id(), "already satisfied");
        return Ok(Done::AlreadySatisfied);
    }

    let bytes = obtain_artifact(ctx, spec, opts).await?;

    let prefix = ctx.layout.prefix(&entry.name, &entry.version);
    // A record for this exact version describes the files about to be
    // replaced, so it goes first. Any other prefix here is debris from an
    // interrupted run.
    if previous
        .as_ref()
        .is_some_and(|rec| rec.version == entry.version)
    {
        ctx.db.remove(&entry.name).await?;
    }
    remove_dir_if_exists(&prefix).await?;

    ctx.reporter.installing(&entry.name, &entry.version);
    if let Err(e) = unpack_and_install(ctx, spec, bytes, &prefix).await {
        if let Err(cleanup) = remove_dir_if_exists(&prefix).await {
            warn!(prefix = %prefix.display(), error = %cleanup, "failed to remove partial prefix");
        }
        return Err(e);
    }

    let record = InstallRecord {
        name: entry.name.clone(),
        version: entry.version.clone(),
        sha256: spec.sha256.clone(),
        installed_at: chrono::Utc::now().timestamp(),
        status: RecordStatus::Installed,
        dependencies: entry.dependencies.clone(),
    };
    if let Err(e) = ctx.db.put(record).await {
        remove_dir_if_exists(&prefix).await.ok();
        return Err(e.into());
    }
    info!(package = %spec.id(), prefix = %prefix.display(), "installed");

    let action = match &previous {
        Some(old) if old.version != entry.version => {
            let old_prefix = ctx.layout.prefix(&old.name, &old.version);
            if let Err(e) = remove_dir_if_exists(&old_prefix).await {
                warn!(prefix = %old_prefix.display(), error = %e, "failed to remove previous version");
            }
            "upgrade"
        }
        _ => "install",
    };
    record_history(
        ctx,
        NewHistory::new(action, &entry.name, true)
            .version(&entry.version)
            .sha256(&spec.sha256),
    )
    .await;

    Ok(Done::Installed)
}

/// Cached artifact if it still verifies, otherwise a fresh verified fetch.
async fn obtain_artifact(
    ctx: &Context,
    spec: &PackageSpec,
    opts: &InstallOptions,
) -> Result<Bytes, InstallError> {
    let cached = ctx.layout.cached_artifact(&spec.sha256);
    if let Ok(data) = tokio::fs::read(&cached).await {
        if ctx.verifier.verify(&data, &spec.sha256) {
            debug!(package = %spec.id(), "using cached artifact");
            return Ok(Bytes::from(data));
        }
        warn!(path = %cached.display(), "cached artifact is corrupt, refetching");
        tokio::fs::remove_file(&cached).await.ok();
    }

    ctx.reporter.fetching(&spec.name, &spec.version);
    let bytes = fetch_with_retry(&*ctx.fetcher, &spec.url, &opts.retry, |attempt, _, err| {
        ctx.reporter
            .retrying(&spec.name, &spec.version, attempt, &err.to_string());
    })
    .await
    .map_err(|e| {
        if e.is_transient() {
            InstallError::FetchExhausted {
                attempts: opts.retry.max_retries + 1,
                source: e,
            }
        } else {
            InstallError::Fetch(e)
        }
    })?;

    if !ctx.verifier.verify(&bytes, &spec.sha256) {
        return Err(InstallError::Integrity {
            expected: spec.sha256.to_string(),
            actual: ctx.verifier.digest(&bytes).to_string(),
        });
    }

    if let Err(e) = write_cache(&cached, &bytes).await {
        warn!(path = %cached.display(), error = %e, "failed to cache artifact");
    }
    Ok(bytes)
}

async fn unpack_and_install(
    ctx: &Context,
    spec: &PackageSpec,
    bytes: Bytes,
    prefix: &Path,
) -> Result<(), InstallError> {
    let tmp_root = ctx.layout.tmp_path();
    tokio::fs::create_dir_all(&tmp_root).await?;
    let scratch = tempfile::Builder::new()
        .prefix(&format!("{}-", spec.name))
        .tempdir_in(&tmp_root)?;

    let dest = scratch.path().to_path_buf();
    let file_name = filename_from_url(&spec.url).to_string();
    let source = tokio::task::spawn_blocking(move || extract::unpack(&bytes, &file_name, &dest))
        .await
        .map_err(|e| io::Error::other(e.to_string()))??;

    ctx.actions
        .run_install_steps(spec, &source, prefix)
        .await?;
    Ok(())
}

async fn write_cache(path: &Path, bytes: &Bytes) -> io::Result<()> {
    let path = path.to_path_buf();
    let bytes = bytes.clone();
    tokio::task::spawn_blocking(move || {
        let dir = path
            .parent()
            .ok_or_else(|| io::Error::other("cache path has no parent"))?;
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        io::Write::write_all(&mut tmp, &bytes)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    })
    .await
    .map_err(|e| io::Error::other(e.to_string()))?
}

pub(crate) async fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

async fn record_history(ctx: &Context, event: NewHistory) {
    if let Err(e) = ctx.db.add_history(event).await {
        warn!(error = %e, "failed to write history");
    }
}

/// Undo dependencies installed in this run that no longer serve anything.
///
/// Walks the plan backwards so a rollback can cascade down a chain.
async fn rollback_orphans(
    ctx: &Context,
    plan: &ResolvedPlan,
    outcomes: &mut [Option<Outcome>],
    fresh: &HashSet<usize>,
) {
    let entries = plan.entries();
    for i in (0..entries.len()).rev() {
        let entry = &entries[i];
        if !fresh.contains(&i) || plan.is_requested(&entry.name) {
            continue;
        }
        let dependents: Vec<usize> = direct_dependents(entries, &entry.name);
        if dependents.is_empty() {
            continue;
        }
        let all_gone = dependents.iter().all(|&j| {
            matches!(
                outcomes[j],
                Some(Outcome::Failed(_) | Outcome::Skipped(_) | Outcome::RolledBack)
            )
        });
        if !all_gone {
            continue;
        }

        ctx.reporter.removing(&entry.name, &entry.version);
        let prefix = ctx.layout.prefix(&entry.name, &entry.version);
        if let Err(e) = remove_dir_if_exists(&prefix).await {
            warn!(package = %entry.name, error = %e, "rollback could not remove prefix");
            continue;
        }
        if let Err(e) = ctx.db.set_status(&entry.name, RecordStatus::RolledBack).await {
            warn!(package = %entry.name, error = %e, "rollback could not update record");
            continue;
        }
        info!(package = %entry.name, version = %entry.version, "rolled back orphaned dependency");
        record_history(
            ctx,
            NewHistory::new("rollback", &entry.name, true)
                .version(&entry.version)
                .detail("every dependent failed"),
        )
        .await;
        outcomes[i] = Some(Outcome::RolledBack);
    }
}

fn direct_dependents(entries: &[PlanEntry], name: &PackageName) -> Vec<usize> {
    entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.dependencies.contains(name))
        .map(|(j, _)| j)
        .collect()
}
