//! Typed cluster control-plane operations (cat, snapshot, settings, delete).

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::es_http::EsHttp;
use crate::types::{IndexRecord, SnapshotJob, SnapshotRecord, SnapshotState};

pub const DELETE_BATCH_SIZE: usize = 10;

/// Node role letters that carry data in `_cat/nodes` output.
const DATA_ROLE_LETTERS: &[char] = &['d', 'h', 'w', 'c', 'f', 's'];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotActivity {
    pub running_snapshots: usize,
    pub snapshot_tasks: usize,
}

impl SnapshotActivity {
    pub fn is_idle(&self) -> bool {
        self.running_snapshots == 0 && self.snapshot_tasks == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct ClusterClient {
    http: EsHttp,
}

impl ClusterClient {
    pub fn new(http: EsHttp) -> Self {
        Self { http }
    }

    /// Indices matching `pattern`, sorted by creation date ascending.
    pub async fn list_indices(&self, pattern: &str) -> Result<Vec<IndexRecord>> {
        #[derive(Deserialize)]
        struct CatIndexRow {
            index: String,
            #[serde(default)]
            rep: Option<String>,
            #[serde(rename = "store.size", default)]
            store_size: Option<String>,
            #[serde(rename = "creation.date", default)]
            creation_date: Option<String>,
        }

        let path = format!(
            "_cat/indices/{pattern}?format=json&bytes=b&expand_wildcards=all\
             &h=index,rep,store.size,creation.date&s=creation.date:asc"
        );
        let rows = self
            .http
            .get_json_opt::<Vec<CatIndexRow>>(&path, "cat indices")
            .await?
            .unwrap_or_default();

        Ok(rows
            .into_iter()
            .filter(|row| !row.index.is_empty())
            .map(|row| IndexRecord {
                replica_count: parse_num(row.rep.as_deref()).unwrap_or(0),
                size_bytes: parse_num(row.store_size.as_deref()).unwrap_or(0),
                creation_ms: parse_num(row.creation_date.as_deref()).unwrap_or(0),
                name: row.index,
            })
            .collect())
    }

    pub async fn list_snapshots(&self, repo: &str, pattern: &str) -> Result<Vec<SnapshotRecord>> {
        let path = format!("_snapshot/{repo}/{pattern}?ignore_unavailable=true");
        let body = self
            .http
            .get_json_opt::<SnapshotsResponse>(&path, "get snapshots")
            .await?;
        Ok(body
            .map(|b| b.snapshots.into_iter().map(SnapshotRecord::from).collect())
            .unwrap_or_default())
    }

    pub async fn get_snapshot(&self, repo: &str, name: &str) -> Result<Option<SnapshotRecord>> {
        let found = self.list_snapshots(repo, name).await?;
        Ok(found.into_iter().find(|s| s.name == name))
    }

    pub async fn create_snapshot(&self, repo: &str, job: &SnapshotJob) -> Result<()> {
        let body = json!({
            "indices": job.indices_csv(),
            "ignore_unavailable": true,
            "include_global_state": false,
        });
        self.http
            .put_value(&format!("_snapshot/{repo}/{}", job.name), &body, "create snapshot")
            .await
            .with_context(|| format!("create snapshot {}/{}", repo, job.name))?;
        Ok(())
    }

    pub async fn delete_snapshot(&self, repo: &str, name: &str) -> Result<bool> {
        self.http
            .delete_allow_404(&format!("_snapshot/{repo}/{name}"), "delete snapshot")
            .await
            .with_context(|| format!("delete snapshot {repo}/{name}"))
    }

    /// Cluster-wide snapshot operations plus snapshot-related tasks.
    pub async fn snapshot_activity(&self) -> Result<SnapshotActivity> {
        #[derive(Deserialize)]
        struct StatusResponse {
            #[serde(default)]
            snapshots: Vec<serde_json::Value>,
        }
        #[derive(Deserialize)]
        struct CatTaskRow {
            #[serde(default)]
            action: String,
        }

        let status: StatusResponse = self
            .http
            .get_json("_snapshot/_status", "snapshot status")
            .await?;
        let tasks: Vec<CatTaskRow> = self
            .http
            .get_json("_cat/tasks?format=json&h=action", "cat tasks")
            .await?;

        Ok(SnapshotActivity {
            running_snapshots: status.snapshots.len(),
            snapshot_tasks: tasks
                .iter()
                .filter(|t| t.action.contains("snapshot"))
                .count(),
        })
    }

    pub async fn data_node_disk_percents(&self) -> Result<Vec<(String, f64)>> {
        #[derive(Deserialize)]
        struct CatNodeRow {
            #[serde(default)]
            name: String,
            #[serde(rename = "node.role", default)]
            role: String,
            #[serde(rename = "disk.used_percent", default)]
            disk_used_percent: Option<String>,
        }

        let rows: Vec<CatNodeRow> = self
            .http
            .get_json(
                "_cat/nodes?format=json&h=name,node.role,disk.used_percent",
                "cat nodes",
            )
            .await?;

        Ok(rows
            .into_iter()
            .filter(|row| row.role.chars().any(|c| DATA_ROLE_LETTERS.contains(&c)))
            .filter_map(|row| {
                let pct = row.disk_used_percent?.trim().parse::<f64>().ok()?;
                Some((row.name, pct))
            })
            .collect())
    }

    /// Mean disk-used percent across data nodes.
    pub async fn disk_utilization(&self) -> Result<f64> {
        let nodes = self.data_node_disk_percents().await?;
        if nodes.is_empty() {
            anyhow::bail!("no data nodes reported disk usage");
        }
        let total: f64 = nodes.iter().map(|(_, pct)| pct).sum();
        Ok(total / nodes.len() as f64)
    }

    pub async fn data_node_count(&self) -> Result<usize> {
        #[derive(Deserialize)]
        struct Health {
            number_of_data_nodes: usize,
        }
        let health: Health = self
            .http
            .get_json("_cluster/health", "cluster health")
            .await?;
        Ok(health.number_of_data_nodes)
    }

    pub async fn set_replicas(&self, index: &str, replicas: u32) -> Result<()> {
        let body = json!({ "index": { "number_of_replicas": replicas } });
        self.http
            .put_value(&format!("{index}/_settings"), &body, "update replicas")
            .await
            .with_context(|| format!("set replicas on {index}"))?;
        Ok(())
    }

    pub async fn set_routing_attribute(
        &self,
        index: &str,
        attribute: &str,
        value: &str,
    ) -> Result<()> {
        let key = format!("index.routing.allocation.require.{attribute}");
        let mut settings = serde_json::Map::new();
        settings.insert(key, json!(value));
        let body = serde_json::Value::Object(settings);
        self.http
            .put_value(&format!("{index}/_settings"), &body, "update routing")
            .await
            .with_context(|| format!("set routing {attribute}={value} on {index}"))?;
        Ok(())
    }

    /// Current `index.routing.allocation.require.<attribute>` per index.
    pub async fn routing_attribute_values(
        &self,
        attribute: &str,
    ) -> Result<HashMap<String, String>> {
        #[derive(Deserialize)]
        struct IndexSettings {
            #[serde(default)]
            settings: HashMap<String, serde_json::Value>,
        }

        let key = format!("index.routing.allocation.require.{attribute}");
        let body: HashMap<String, IndexSettings> = self
            .http
            .get_json(&format!("_all/_settings/{key}?flat_settings=true"), "get routing settings")
            .await?;
        Ok(body
            .into_iter()
            .filter_map(|(index, entry)| {
                let value = entry.settings.get(&key)?.as_str()?.to_string();
                Some((index, value))
            })
            .collect())
    }

    pub async fn delete_index(&self, index: &str) -> Result<bool> {
        self.http
            .delete_allow_404(index, "delete index")
            .await
            .with_context(|| format!("delete index {index}"))
    }

    /// Deletes in batches of [`DELETE_BATCH_SIZE`]; a failed batch marks all of
    /// its members failed and the remaining batches still run.
    pub async fn delete_indices(&self, names: &[String]) -> BatchDeleteReport {
        let mut report = BatchDeleteReport::default();
        for batch in names.chunks(DELETE_BATCH_SIZE) {
            let joined = batch.join(",");
            match self.http.delete_allow_404(&joined, "delete indices").await {
                Ok(_) => report.deleted.extend(batch.iter().cloned()),
                Err(err) => {
                    warn!("cluster: delete batch [{}] failed: {err:?}", joined);
                    report.failed.extend(batch.iter().cloned());
                }
            }
        }
        report
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotsResponse {
    #[serde(default)]
    snapshots: Vec<SnapshotInfo>,
}

#[derive(Debug, Deserialize)]
struct SnapshotInfo {
    snapshot: String,
    state: SnapshotState,
    #[serde(default)]
    indices: Vec<String>,
    #[serde(default)]
    start_time_in_millis: i64,
}

impl From<SnapshotInfo> for SnapshotRecord {
    fn from(info: SnapshotInfo) -> Self {
        Self {
            name: info.snapshot,
            state: info.state,
            indices: info.indices.into_iter().collect::<BTreeSet<_>>(),
            start_time_ms: info.start_time_in_millis,
        }
    }
}

fn parse_num<T: std::str::FromStr>(raw: Option<&str>) -> Option<T> {
    raw?.trim().parse().ok()
}
