//! Creating one named snapshot safely: idempotent pre-check, cleanup of stale
//! failures, drain barrier, submit, poll to a terminal state, bounded retry.

use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{error, info, warn};

use crate::alert::AlertSink;
use crate::cluster::ClusterClient;
use crate::pause::Pause;
use crate::types::{SnapshotJob, SnapshotState};

pub const MAX_SNAPSHOT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct SnapshotPolicy {
    pub poll_interval: Duration,
    pub backoff_unit: Duration,
    pub max_attempts: u32,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            backoff_unit: Duration::from_secs(1),
            max_attempts: MAX_SNAPSHOT_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Created { elapsed: Duration, attempts: u32 },
    AlreadyValid,
    AlreadyRunning,
    Failed { attempts: u32, last_error: String },
    /// Dry run: the job would have been submitted.
    Planned,
}

impl SnapshotOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SnapshotOutcome::Failed { .. })
    }
}

enum AttemptError {
    Retriable(String),
    Cancelled,
}

pub struct SnapshotRunner<'a, A: AlertSink> {
    pub client: &'a ClusterClient,
    pub alerts: &'a A,
    pub pause: &'a Pause,
    pub policy: SnapshotPolicy,
    pub dry_run: bool,
}

impl<A: AlertSink> SnapshotRunner<'_, A> {
    /// Ensures snapshot `job.name` exists in `repo` with `SUCCESS` state.
    ///
    /// Returns `Err` only when the wait was cancelled; every cluster-side
    /// failure is folded into [`SnapshotOutcome::Failed`] after alerting.
    pub async fn ensure_snapshot(&self, job: &SnapshotJob, repo: &str) -> Result<SnapshotOutcome> {
        match self.client.get_snapshot(repo, &job.name).await {
            Ok(Some(existing)) => match existing.state {
                SnapshotState::Success => {
                    info!(snapshot = %job.name, "snapshot: already valid, nothing to do");
                    return Ok(SnapshotOutcome::AlreadyValid);
                }
                SnapshotState::InProgress => {
                    info!(
                        snapshot = %job.name,
                        "snapshot: already running, not submitting a duplicate"
                    );
                    return Ok(SnapshotOutcome::AlreadyRunning);
                }
                state => {
                    if self.dry_run {
                        info!(
                            "dry-run: would delete stale snapshot {}/{} state={}",
                            repo, job.name, state
                        );
                    } else {
                        warn!(
                            snapshot = %job.name,
                            %state,
                            "snapshot: deleting stale snapshot before re-creating"
                        );
                        if let Err(err) = self.client.delete_snapshot(repo, &job.name).await {
                            let msg = format!("stale snapshot cleanup: {err:#}");
                            return self.give_up(job, 0, msg).await;
                        }
                    }
                }
            },
            Ok(None) => {}
            Err(err) => warn!(
                snapshot = %job.name,
                "snapshot: pre-check failed, proceeding: {err:#}"
            ),
        }

        if self.dry_run {
            info!(
                "dry-run: would create snapshot {}/{} indices={}",
                repo,
                job.name,
                job.indices_csv()
            );
            return Ok(SnapshotOutcome::Planned);
        }

        let started = Instant::now();
        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            match self.attempt(job, repo).await {
                Ok(()) => {
                    let elapsed = started.elapsed();
                    info!(
                        snapshot = %job.name,
                        attempt,
                        elapsed_secs = elapsed.as_secs(),
                        "snapshot: completed successfully"
                    );
                    return Ok(SnapshotOutcome::Created {
                        elapsed,
                        attempts: attempt,
                    });
                }
                Err(AttemptError::Cancelled) => anyhow::bail!("snapshot {} cancelled", job.name),
                Err(AttemptError::Retriable(msg)) => {
                    warn!(
                        snapshot = %job.name,
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        "snapshot: attempt failed: {msg}"
                    );
                    last_error = msg;
                }
            }
            if attempt < self.policy.max_attempts {
                self.pause.wait(self.policy.backoff_unit * attempt).await?;
            }
        }

        self.give_up(job, self.policy.max_attempts, last_error).await
    }

    async fn give_up(
        &self,
        job: &SnapshotJob,
        attempts: u32,
        last_error: String,
    ) -> Result<SnapshotOutcome> {
        error!(snapshot = %job.name, attempts, "snapshot: giving up: {last_error}");
        if let Err(err) = self
            .alerts
            .snapshot_failed(&job.name, &job.indices_csv())
            .await
        {
            warn!(snapshot = %job.name, "snapshot: alert delivery failed: {err:#}");
        }
        Ok(SnapshotOutcome::Failed {
            attempts,
            last_error,
        })
    }

    async fn attempt(&self, job: &SnapshotJob, repo: &str) -> Result<(), AttemptError> {
        self.wait_for_drain().await?;

        self.client
            .create_snapshot(repo, job)
            .await
            .map_err(|err| AttemptError::Retriable(format!("submit: {err:#}")))?;
        info!(snapshot = %job.name, indices = job.indices.len(), "snapshot: submitted");

        loop {
            self.sleep(self.policy.poll_interval).await?;
            let current = match self.client.get_snapshot(repo, &job.name).await {
                Ok(Some(s)) => s.state,
                Ok(None) => SnapshotState::Unknown,
                Err(err) => {
                    self.cleanup_failed(job, repo).await;
                    return Err(AttemptError::Retriable(format!("poll: {err:#}")));
                }
            };
            match current {
                SnapshotState::InProgress => continue,
                SnapshotState::Success => return Ok(()),
                state => {
                    self.cleanup_failed(job, repo).await;
                    return Err(AttemptError::Retriable(format!("terminal state {state}")));
                }
            }
        }
    }

    async fn cleanup_failed(&self, job: &SnapshotJob, repo: &str) {
        if let Err(err) = self.client.delete_snapshot(repo, &job.name).await {
            warn!(snapshot = %job.name, "snapshot: cleanup after failed attempt failed: {err:#}");
        }
    }

    /// Blocks until no snapshot operation or snapshot task is running anywhere
    /// in the cluster.
    async fn wait_for_drain(&self) -> Result<(), AttemptError> {
        loop {
            match self.client.snapshot_activity().await {
                Ok(activity) if activity.is_idle() => return Ok(()),
                Ok(activity) => info!(
                    running = activity.running_snapshots,
                    tasks = activity.snapshot_tasks,
                    "snapshot: waiting for cluster snapshot activity to drain"
                ),
                Err(err) => return Err(AttemptError::Retriable(format!("drain check: {err:#}"))),
            }
            self.sleep(self.policy.poll_interval).await?;
        }
    }

    async fn sleep(&self, dur: Duration) -> Result<(), AttemptError> {
        self.pause
            .wait(dur)
            .await
            .map_err(|_| AttemptError::Cancelled)
    }
}
