//! Age-based deletion of indices and snapshots.

use anyhow::Result;
use tracing::{info, warn};

use crate::alert::AlertSink;
use crate::classify::{snapshot_base, Owner};
use crate::date_cutoff::{cutoff_for_days, later_of};
use crate::grouping::UNKNOWN_JOB_BASE;
use crate::runner::{RunContext, RunReport};
use crate::types::SnapshotState;

/// Deletes indices past their owner's `retention_days`. A retention of 0
/// keeps indices forever. Owners with snapshots enabled only lose indices
/// that a `SUCCESS` snapshot covers.
pub async fn prune_indices<A: AlertSink>(ctx: &RunContext<'_, A>) -> Result<RunReport> {
    let classifier = &ctx.cfg.classifier;
    let fmt = &ctx.cfg.date_format;
    let indices = ctx.client.list_indices("*").await?;
    let coverage = ctx.snapshot_coverage().await?;

    let mut report = RunReport::default();
    let mut targets = Vec::new();
    for index in indices {
        let Some(owner) = classifier.owner(&index.name) else {
            continue;
        };
        let days = owner.retention_days();
        if days == 0 {
            continue;
        }
        let cutoff = cutoff_for_days(ctx.today, days);
        if !fmt.is_older_than_or_equal_cutoff(&index.name, cutoff) {
            continue;
        }
        if owner.snapshot_enabled() && !coverage.contains_key(&index.name) {
            warn!(
                index = %index.name,
                owner = %owner.label(),
                "prune: expired but not snapshotted, keeping"
            );
            report.skipped.push(index.name);
            continue;
        }
        targets.push(index.name);
    }

    if ctx.dry_run {
        for name in &targets {
            info!("dry-run: would delete index {}", name);
        }
        report.succeeded = targets;
        return Ok(report);
    }

    let deleted = ctx.client.delete_indices(&targets).await;
    report.succeeded = deleted.deleted;
    report.failed = deleted.failed;
    report.log_summary("prune-indices");
    Ok(report)
}

/// Deletes snapshots whose embedded date is past the owner's snapshot
/// retention. The cutoff never undercuts the local index retention, so an
/// archive outlives the index it protects. Snapshots no rule claims are
/// reported and left alone.
pub async fn prune_snapshots<A: AlertSink>(ctx: &RunContext<'_, A>) -> Result<RunReport> {
    let classifier = &ctx.cfg.classifier;
    let fmt = &ctx.cfg.date_format;
    let mut report = RunReport::default();

    for repo in ctx.cfg.repositories() {
        let snapshots = ctx.client.list_snapshots(&repo, "*").await?;
        for snap in snapshots {
            if snap.state == SnapshotState::InProgress {
                continue;
            }
            let owner = match classifier.find_snapshot_rule(&snap.name) {
                Some(rule) => Owner::Rule(rule),
                None if is_unknown_snapshot(&snap.name) => Owner::Unknown(classifier.unknown()),
                None => {
                    info!(
                        snapshot = %snap.name,
                        repo = %repo,
                        "prune: dangling snapshot, not deleting"
                    );
                    report.skipped.push(snap.name);
                    continue;
                }
            };

            let local_days = owner.retention_days();
            let archive_days = owner.snapshot_retention_days().unwrap_or(local_days);
            if archive_days == 0 {
                continue;
            }
            let cutoff = later_of(
                cutoff_for_days(ctx.today, archive_days),
                cutoff_for_days(ctx.today, local_days),
            );
            if !fmt.is_older_than_or_equal_cutoff(&snap.name, cutoff) {
                continue;
            }

            if ctx.dry_run {
                info!("dry-run: would delete snapshot {}/{}", repo, snap.name);
                report.succeeded.push(snap.name);
                continue;
            }
            match ctx.client.delete_snapshot(&repo, &snap.name).await {
                Ok(_) => {
                    info!(snapshot = %snap.name, repo = %repo, "prune: deleted snapshot");
                    report.succeeded.push(snap.name);
                }
                Err(err) => {
                    warn!(
                        snapshot = %snap.name,
                        repo = %repo,
                        "prune: snapshot delete failed: {err:#}"
                    );
                    report.failed.push(snap.name);
                }
            }
        }
    }
    report.log_summary("prune-snapshots");
    Ok(report)
}

fn is_unknown_snapshot(name: &str) -> bool {
    snapshot_base(name).is_some() && name.starts_with(&format!("{UNKNOWN_JOB_BASE}-"))
}
