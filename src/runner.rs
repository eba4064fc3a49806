use std::collections::HashMap;

use anyhow::Result;
use chrono::NaiveDate;
use tracing::info;

use crate::alert::AlertSink;
use crate::cluster::ClusterClient;
use crate::config::Config;
use crate::pause::Pause;
use crate::retention::{RetentionLoop, RetentionReport, RetentionSettings};
use crate::retention_logic::latest_success_by_index;
use crate::snapshot_lifecycle::{SnapshotPolicy, SnapshotRunner};
use crate::types::SnapshotRecord;

/// Everything a workflow needs for one invocation.
pub struct RunContext<'a, A: AlertSink> {
    pub cfg: &'a Config,
    pub client: &'a ClusterClient,
    pub alerts: &'a A,
    pub pause: &'a Pause,
    pub dry_run: bool,
    pub today: NaiveDate,
}

/// Per-item tally returned by every workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn log_summary(&self, workflow: &str) {
        info!(
            succeeded = self.succeeded.len(),
            failed = self.failed.len(),
            skipped = self.skipped.len(),
            "{workflow}: finished"
        );
    }
}

impl<'a, A: AlertSink> RunContext<'a, A> {
    pub fn snapshot_runner(&self) -> SnapshotRunner<'a, A> {
        SnapshotRunner {
            client: self.client,
            alerts: self.alerts,
            pause: self.pause,
            policy: SnapshotPolicy {
                poll_interval: self.cfg.timings.poll_interval,
                backoff_unit: self.cfg.timings.backoff_unit,
                ..SnapshotPolicy::default()
            },
            dry_run: self.dry_run,
        }
    }

    pub async fn run_retention(&self) -> Result<RetentionReport> {
        let settings = RetentionSettings {
            threshold_percent: self.cfg.retention.threshold_percent,
            min_age_days: self.cfg.retention.min_age_days,
            require_snapshot: self.cfg.retention.require_snapshot,
            expected_data_nodes: self.cfg.retention.expected_data_nodes,
            settle_interval: self.cfg.timings.settle_interval,
            repositories: self.cfg.repositories(),
            dry_run: self.dry_run,
        };
        let retention = RetentionLoop {
            client: self.client,
            alerts: self.alerts,
            pause: self.pause,
            classifier: &self.cfg.classifier,
            date_format: &self.cfg.date_format,
        };
        retention.run_cycle(&settings, self.today).await
    }

    /// Every snapshot in every configured repository.
    pub async fn all_snapshots(&self) -> Result<Vec<SnapshotRecord>> {
        let mut out = Vec::new();
        for repo in self.cfg.repositories() {
            out.extend(self.client.list_snapshots(&repo, "*").await?);
        }
        Ok(out)
    }

    /// Index name -> newest successful snapshot start time.
    pub async fn snapshot_coverage(&self) -> Result<HashMap<String, i64>> {
        let snapshots = self.all_snapshots().await?;
        Ok(latest_success_by_index(&snapshots)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect())
    }
}
