use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::json;
use tracing::{error, warn};

/// Outbound alert channel. One method per alert kind.
pub trait AlertSink {
    fn snapshot_failed(
        &self,
        snapshot: &str,
        indices: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn retention_aborted(&self, reason: &str) -> impl Future<Output = Result<()>> + Send;

    fn missing_snapshots(&self, indices: &[String]) -> impl Future<Output = Result<()>> + Send;
}

/// Logs alerts at error level only.
#[derive(Debug, Clone, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    async fn snapshot_failed(&self, snapshot: &str, indices: &str) -> Result<()> {
        error!(snapshot, indices, "alert: snapshot creation exhausted retries");
        Ok(())
    }

    async fn retention_aborted(&self, reason: &str) -> Result<()> {
        error!(reason, "alert: retention cycle aborted");
        Ok(())
    }

    async fn missing_snapshots(&self, indices: &[String]) -> Result<()> {
        error!(
            count = indices.len(),
            "alert: indices without a valid snapshot: {}",
            indices.join(",")
        );
        Ok(())
    }
}

/// Posts one JSON document per alert to a webhook.
#[derive(Clone)]
pub struct WebhookAlertSink {
    client: Client,
    url: Arc<str>,
    cluster: Arc<str>,
}

impl WebhookAlertSink {
    pub fn new(
        url: impl Into<Arc<str>>,
        cluster: impl Into<Arc<str>>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            cluster: cluster.into(),
        })
    }

    async fn post(&self, kind: &str, body: serde_json::Value) -> Result<()> {
        let payload = json!({
            "kind": kind,
            "cluster": &*self.cluster,
            "details": body,
        });
        let resp = self
            .client
            .post(&*self.url)
            .json(&payload)
            .send()
            .await
            .context("alert webhook request")?;
        if !resp.status().is_success() {
            warn!("alert: webhook kind={} status={}", kind, resp.status());
            anyhow::bail!("alert webhook status {}", resp.status());
        }
        Ok(())
    }
}

impl AlertSink for WebhookAlertSink {
    async fn snapshot_failed(&self, snapshot: &str, indices: &str) -> Result<()> {
        self.post(
            "snapshot_failed",
            json!({ "snapshot": snapshot, "indices": indices }),
        )
        .await
    }

    async fn retention_aborted(&self, reason: &str) -> Result<()> {
        self.post("retention_aborted", json!({ "reason": reason })).await
    }

    async fn missing_snapshots(&self, indices: &[String]) -> Result<()> {
        self.post("missing_snapshots", json!({ "indices": indices })).await
    }
}

/// Either concrete sink, chosen from config at startup.
#[derive(Clone)]
pub enum Alerts {
    Log(LogAlertSink),
    Webhook(WebhookAlertSink),
}

impl AlertSink for Alerts {
    async fn snapshot_failed(&self, snapshot: &str, indices: &str) -> Result<()> {
        match self {
            Alerts::Log(s) => s.snapshot_failed(snapshot, indices).await,
            Alerts::Webhook(s) => s.snapshot_failed(snapshot, indices).await,
        }
    }

    async fn retention_aborted(&self, reason: &str) -> Result<()> {
        match self {
            Alerts::Log(s) => s.retention_aborted(reason).await,
            Alerts::Webhook(s) => s.retention_aborted(reason).await,
        }
    }

    async fn missing_snapshots(&self, indices: &[String]) -> Result<()> {
        match self {
            Alerts::Log(s) => s.missing_snapshots(indices).await,
            Alerts::Webhook(s) => s.missing_snapshots(indices).await,
        }
    }
}
