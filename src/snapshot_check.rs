use anyhow::Result;
use tracing::{info, warn};

use crate::alert::AlertSink;
use crate::date_cutoff::settled_cutoff;
use crate::runner::{RunContext, RunReport};

/// Lists settled indices whose owner auto-snapshots them but that no
/// `SUCCESS` snapshot covers, and raises a single alert naming them.
pub async fn check_snapshots<A: AlertSink>(ctx: &RunContext<'_, A>) -> Result<RunReport> {
    let classifier = &ctx.cfg.classifier;
    let cutoff = settled_cutoff(ctx.today);
    let indices = ctx.client.list_indices("*").await?;
    let coverage = ctx.snapshot_coverage().await?;

    let mut report = RunReport::default();
    for index in indices {
        let Some(owner) = classifier.owner(&index.name) else {
            continue;
        };
        let settled = ctx
            .cfg
            .date_format
            .is_older_than_or_equal_cutoff(&index.name, cutoff);
        if !owner.auto_snapshot() || !settled {
            continue;
        }
        if coverage.contains_key(&index.name) {
            report.succeeded.push(index.name);
        } else {
            warn!(index = %index.name, owner = %owner.label(), "check: no valid snapshot");
            report.failed.push(index.name);
        }
    }

    if report.failed.is_empty() {
        info!(checked = report.succeeded.len(), "check: every eligible index has a valid snapshot");
    } else if let Err(err) = ctx.alerts.missing_snapshots(&report.failed).await {
        warn!("check: alert delivery failed: {err:#}");
    }
    report.log_summary("check-snapshots");
    Ok(report)
}
