use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::alert::AlertSink;
use crate::classify::Classifier;
use crate::cluster::ClusterClient;
use crate::date_cutoff::{DateFormat, MIN_AGE_DAYS_FLOOR};
use crate::pause::Pause;
use crate::retention_logic::build_candidate_queue;
use crate::types::SnapshotRecord;

#[derive(Debug, Clone)]
pub struct RetentionSettings {
    pub threshold_percent: f64,
    pub min_age_days: u32,
    pub require_snapshot: bool,
    /// When set, the cycle aborts unless exactly this many data nodes are up.
    pub expected_data_nodes: Option<usize>,
    pub settle_interval: Duration,
    pub repositories: Vec<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetentionOutcome {
    BelowThreshold,
    ThresholdReached,
    QueueExhausted,
    NodeCountMismatch { expected: usize, observed: usize },
    UtilizationUnavailable(String),
    HealthCheckFailed(String),
    DryRun,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetentionReport {
    pub threshold_percent: f64,
    pub initial_utilization: f64,
    pub final_utilization: Option<f64>,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
    pub skipped_unsnapshotted: Vec<String>,
    pub planned: Vec<String>,
    pub outcome: RetentionOutcome,
}

impl RetentionReport {
    fn new(threshold_percent: f64, utilization: f64, outcome: RetentionOutcome) -> Self {
        Self {
            threshold_percent,
            initial_utilization: utilization,
            final_utilization: Some(utilization),
            deleted: Vec::new(),
            failed: Vec::new(),
            skipped_unsnapshotted: Vec::new(),
            planned: Vec::new(),
            outcome,
        }
    }
}

pub struct RetentionLoop<'a, A: AlertSink> {
    pub client: &'a ClusterClient,
    pub alerts: &'a A,
    pub pause: &'a Pause,
    pub classifier: &'a Classifier,
    pub date_format: &'a DateFormat,
}

impl<A: AlertSink> RetentionLoop<'_, A> {
    /// One utilization-driven deletion cycle. Deletes one index at a time and
    /// re-reads utilization (and node count) after each before continuing.
    pub async fn run_cycle(
        &self,
        settings: &RetentionSettings,
        today: NaiveDate,
    ) -> Result<RetentionReport> {
        let threshold = settings.threshold_percent;
        let utilization = self
            .client
            .disk_utilization()
            .await
            .context("retention: initial disk utilization")?;

        if let Some(mismatch) = self.node_mismatch(settings).await? {
            return Ok(RetentionReport::new(threshold, utilization, mismatch));
        }

        if utilization <= threshold {
            info!(utilization, threshold, "retention: utilization within threshold, nothing to do");
            return Ok(RetentionReport::new(
                threshold,
                utilization,
                RetentionOutcome::BelowThreshold,
            ));
        }

        info!(
            utilization,
            threshold,
            "retention: utilization above threshold, building candidates"
        );

        let indices = self.client.list_indices("*").await?;
        let snapshots = self.fetch_snapshots(&settings.repositories).await?;
        let queue = build_candidate_queue(
            &indices,
            &snapshots,
            self.classifier,
            self.date_format,
            today,
            settings.min_age_days.max(MIN_AGE_DAYS_FLOOR),
            settings.require_snapshot,
        );
        for name in &queue.skipped_unsnapshotted {
            warn!(index = %name, "retention: no valid snapshot, not deleting");
        }

        let mut report =
            RetentionReport::new(threshold, utilization, RetentionOutcome::QueueExhausted);
        report.skipped_unsnapshotted = queue.skipped_unsnapshotted;

        if settings.dry_run {
            for cand in &queue.queue {
                info!(
                    "dry-run: would delete {} size_bytes={} (until utilization <= {}%)",
                    cand.index.name, cand.index.size_bytes, threshold
                );
                report.planned.push(cand.index.name.clone());
            }
            report.outcome = RetentionOutcome::DryRun;
            return Ok(report);
        }

        let mut current = utilization;
        for cand in queue.queue {
            if current <= threshold {
                break;
            }
            info!(
                index = %cand.index.name,
                size_bytes = cand.index.size_bytes,
                utilization = current,
                "retention: deleting index"
            );
            match self.client.delete_index(&cand.index.name).await {
                Ok(_) => report.deleted.push(cand.index.name.clone()),
                Err(err) => {
                    warn!(index = %cand.index.name, "retention: delete failed: {err:#}");
                    report.failed.push(cand.index.name.clone());
                    continue;
                }
            }

            self.pause.wait(settings.settle_interval).await?;

            current = match self.client.disk_utilization().await {
                Ok(v) => v,
                Err(err) => {
                    error!("retention: utilization recheck failed, stopping: {err:#}");
                    report.final_utilization = None;
                    report.outcome = RetentionOutcome::UtilizationUnavailable(format!("{err:#}"));
                    return Ok(report);
                }
            };
            report.final_utilization = Some(current);

            match self.node_mismatch(settings).await {
                Ok(None) => {}
                Ok(Some(mismatch)) => {
                    report.outcome = mismatch;
                    return Ok(report);
                }
                Err(err) => {
                    error!("retention: node health recheck failed, stopping: {err:#}");
                    report.outcome = RetentionOutcome::HealthCheckFailed(format!("{err:#}"));
                    return Ok(report);
                }
            }
        }

        if current <= threshold {
            report.outcome = RetentionOutcome::ThresholdReached;
        } else {
            warn!(
                utilization = current,
                threshold,
                "retention: candidates exhausted above threshold"
            );
        }
        info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            utilization = current,
            "retention: cycle finished"
        );
        Ok(report)
    }

    async fn node_mismatch(
        &self,
        settings: &RetentionSettings,
    ) -> Result<Option<RetentionOutcome>> {
        let Some(expected) = settings.expected_data_nodes else {
            return Ok(None);
        };
        let observed = self.client.data_node_count().await?;
        if observed == expected {
            return Ok(None);
        }
        let reason = format!("data node count {observed} != expected {expected}");
        error!("retention: aborting, {reason}");
        if let Err(err) = self.alerts.retention_aborted(&reason).await {
            warn!("retention: alert delivery failed: {err:#}");
        }
        Ok(Some(RetentionOutcome::NodeCountMismatch { expected, observed }))
    }

    async fn fetch_snapshots(&self, repositories: &[String]) -> Result<Vec<SnapshotRecord>> {
        let mut out = Vec::new();
        for repo in repositories {
            out.extend(self.client.list_snapshots(repo, "*").await?);
        }
        Ok(out)
    }
}
