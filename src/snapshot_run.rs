//! Snapshot workflows: daily, backfill and manual.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::alert::AlertSink;
use crate::date_cutoff::settled_cutoff;
use crate::grouping::{group_for_snapshots, SnapshotPlan};
use crate::runner::{RunContext, RunReport};
use crate::snapshot_lifecycle::SnapshotOutcome;
use crate::types::SnapshotJob;

/// Snapshots every index dated exactly `target`, one job per owning rule.
pub async fn run_daily_snapshots<A: AlertSink>(
    ctx: &RunContext<'_, A>,
    target: NaiveDate,
) -> Result<RunReport> {
    let fmt = &ctx.cfg.date_format;
    let indices = ctx.client.list_indices("*").await?;
    let candidates = indices
        .into_iter()
        .map(|i| i.name)
        .filter(|name| fmt.extract_date(name) == Some(target))
        .collect::<Vec<_>>();
    info!(target = %target, candidates = candidates.len(), "snapshot: daily run");

    let plan = group_for_snapshots(&candidates, &ctx.cfg.classifier, &fmt.format(target), None);
    execute_plan(ctx, plan).await
}

/// Snapshots every settled index that no `SUCCESS` snapshot covers yet,
/// grouped by the date in its name.
pub async fn run_backfill_snapshots<A: AlertSink>(ctx: &RunContext<'_, A>) -> Result<RunReport> {
    let fmt = &ctx.cfg.date_format;
    let cutoff = settled_cutoff(ctx.today);
    let coverage = ctx.snapshot_coverage().await?;
    let indices = ctx.client.list_indices("*").await?;

    let mut by_date = BTreeMap::<NaiveDate, Vec<String>>::new();
    for index in indices {
        if coverage.contains_key(&index.name) {
            continue;
        }
        let Some(date) = fmt.extract_date(&index.name) else {
            continue;
        };
        if date <= cutoff {
            by_date.entry(date).or_default().push(index.name);
        }
    }

    // Several unknown jobs share a run, so they get a common tag.
    let tag = (by_date.len() > 1).then(|| format!("{:x}", Utc::now().timestamp_millis()));

    let mut report = RunReport::default();
    for (date, candidates) in by_date {
        info!(date = %date, candidates = candidates.len(), "snapshot: backfill date group");
        let plan = group_for_snapshots(
            &candidates,
            &ctx.cfg.classifier,
            &fmt.format(date),
            tag.as_deref(),
        );
        let part = execute_plan(ctx, plan).await?;
        report.succeeded.extend(part.succeeded);
        report.failed.extend(part.failed);
        report.skipped.extend(part.skipped);
    }
    Ok(report)
}

/// Ensures `<index>-<today>` exists for one index.
pub async fn run_manual_snapshot<A: AlertSink>(
    ctx: &RunContext<'_, A>,
    index: &str,
) -> Result<RunReport> {
    let fmt = &ctx.cfg.date_format;
    let found = ctx.client.list_indices(index).await?;
    if !found.iter().any(|i| i.name == index) {
        anyhow::bail!("index {index} does not exist");
    }

    let rule = ctx.cfg.classifier.find_rule(index);
    let Some(repo) = ctx.cfg.repository_for(rule) else {
        anyhow::bail!("no snapshot repository configured for {index}");
    };
    let job = SnapshotJob {
        name: format!("{}-{}", index, fmt.format(ctx.today)),
        indices: vec![index.to_string()],
        source_rule: rule.map_or_else(|| "manual".to_string(), |r| r.describe()),
    };

    let mut report = RunReport::default();
    let outcome = ctx.snapshot_runner().ensure_snapshot(&job, repo).await?;
    record_outcome(&mut report, &job, &outcome);
    Ok(report)
}

async fn execute_plan<A: AlertSink>(
    ctx: &RunContext<'_, A>,
    plan: SnapshotPlan,
) -> Result<RunReport> {
    let mut report = RunReport::default();
    for (name, reason) in &plan.excluded {
        info!(index = %name, ?reason, "snapshot: excluded from plan");
        report.skipped.push(name.clone());
    }

    let runner = ctx.snapshot_runner();
    let total = plan.jobs.len();
    for (pos, job) in plan.jobs.iter().enumerate() {
        let rule = job
            .indices
            .first()
            .and_then(|name| ctx.cfg.classifier.find_rule(name));
        let Some(repo) = ctx.cfg.repository_for(rule) else {
            warn!(snapshot = %job.name, "snapshot: no repository for job, skipping");
            report.failed.push(job.name.clone());
            continue;
        };

        info!(
            snapshot = %job.name,
            repo,
            source = %job.source_rule,
            indices = job.indices.len(),
            "snapshot: processing job {}/{}",
            pos + 1,
            total
        );
        let outcome = runner.ensure_snapshot(job, repo).await?;
        let submitted = matches!(
            outcome,
            SnapshotOutcome::Created { .. } | SnapshotOutcome::Failed { .. }
        );
        record_outcome(&mut report, job, &outcome);

        if submitted && pos + 1 < total {
            info!(
                pause_secs = ctx.cfg.timings.bulk_pause.as_secs(),
                "snapshot: pausing before next job"
            );
            ctx.pause.wait(ctx.cfg.timings.bulk_pause).await?;
        }
    }
    report.log_summary("snapshot");
    Ok(report)
}

fn record_outcome(report: &mut RunReport, job: &SnapshotJob, outcome: &SnapshotOutcome) {
    match outcome {
        SnapshotOutcome::Failed { .. } => report.failed.push(job.name.clone()),
        SnapshotOutcome::AlreadyRunning => report.skipped.push(job.name.clone()),
        SnapshotOutcome::Created { .. }
        | SnapshotOutcome::AlreadyValid
        | SnapshotOutcome::Planned => report.succeeded.push(job.name.clone()),
    }
}
