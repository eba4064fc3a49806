//! Replica reduction and cold-tier routing for aging indices.

use anyhow::Result;
use tracing::{info, warn};

use crate::alert::AlertSink;
use crate::date_cutoff::cutoff_for_days;
use crate::runner::{RunContext, RunReport};

/// Lowers `number_of_replicas` on indices older than `dereplicate.after_days`.
/// Indices whose owner snapshots them keep their replicas until a
/// `SUCCESS` snapshot exists.
pub async fn dereplicate<A: AlertSink>(ctx: &RunContext<'_, A>) -> Result<RunReport> {
    let Some(settings) = ctx.cfg.dereplicate.as_ref() else {
        anyhow::bail!("dereplicate section missing from config");
    };
    let classifier = &ctx.cfg.classifier;
    let cutoff = cutoff_for_days(ctx.today, settings.after_days);
    let indices = ctx.client.list_indices("*").await?;
    let coverage = ctx.snapshot_coverage().await?;

    let mut report = RunReport::default();
    for index in indices {
        if index.replica_count <= settings.replicas {
            continue;
        }
        let Some(owner) = classifier.owner(&index.name) else {
            continue;
        };
        if !ctx.cfg.date_format.is_older_than_or_equal_cutoff(&index.name, cutoff) {
            continue;
        }
        if owner.snapshot_enabled() && !coverage.contains_key(&index.name) {
            info!(index = %index.name, "dereplicate: waiting for a valid snapshot");
            report.skipped.push(index.name);
            continue;
        }

        if ctx.dry_run {
            info!(
                "dry-run: would set replicas {} -> {} on {}",
                index.replica_count, settings.replicas, index.name
            );
            report.succeeded.push(index.name);
            continue;
        }
        match ctx.client.set_replicas(&index.name, settings.replicas).await {
            Ok(()) => {
                info!(
                    index = %index.name,
                    from = index.replica_count,
                    to = settings.replicas,
                    "dereplicate: replicas reduced"
                );
                report.succeeded.push(index.name);
            }
            Err(err) => {
                warn!(index = %index.name, "dereplicate: failed: {err:#}");
                report.failed.push(index.name);
            }
        }
    }
    report.log_summary("dereplicate");
    Ok(report)
}

/// Pins indices older than `cold_tier.after_days` to nodes carrying the cold
/// attribute. Indices already pinned are left untouched.
pub async fn cold_migrate<A: AlertSink>(ctx: &RunContext<'_, A>) -> Result<RunReport> {
    let Some(settings) = ctx.cfg.cold_tier.as_ref() else {
        anyhow::bail!("cold_tier section missing from config");
    };
    let classifier = &ctx.cfg.classifier;
    let cutoff = cutoff_for_days(ctx.today, settings.after_days);
    let indices = ctx.client.list_indices("*").await?;
    let current = ctx.client.routing_attribute_values(&settings.attribute).await?;

    let mut report = RunReport::default();
    for index in indices {
        if classifier.owner(&index.name).is_none() {
            continue;
        }
        if !ctx.cfg.date_format.is_older_than_or_equal_cutoff(&index.name, cutoff) {
            continue;
        }
        if current.get(&index.name) == Some(&settings.value) {
            continue;
        }

        if ctx.dry_run {
            info!(
                "dry-run: would route {} to {}={}",
                index.name, settings.attribute, settings.value
            );
            report.succeeded.push(index.name);
            continue;
        }
        match ctx
            .client
            .set_routing_attribute(&index.name, &settings.attribute, &settings.value)
            .await
        {
            Ok(()) => {
                info!(index = %index.name, "cold_migrate: routed to cold tier");
                report.succeeded.push(index.name);
            }
            Err(err) => {
                warn!(index = %index.name, "cold_migrate: failed: {err:#}");
                report.failed.push(index.name);
            }
        }
    }
    report.log_summary("cold-migrate");
    Ok(report)
}
