use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Point-in-time view of one index as reported by `_cat/indices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub name: String,
    pub replica_count: u32,
    pub size_bytes: u64,
    pub creation_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotState {
    InProgress,
    Success,
    Partial,
    Failed,
    #[serde(other)]
    Unknown,
}

impl SnapshotState {
    /// PARTIAL, FAILED and anything unrecognised must be cleaned up before
    /// the same name can be used again.
    pub fn needs_cleanup(self) -> bool {
        !matches!(self, SnapshotState::InProgress | SnapshotState::Success)
    }
}

impl fmt::Display for SnapshotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SnapshotState::InProgress => "IN_PROGRESS",
            SnapshotState::Success => "SUCCESS",
            SnapshotState::Partial => "PARTIAL",
            SnapshotState::Failed => "FAILED",
            SnapshotState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub name: String,
    pub state: SnapshotState,
    pub indices: BTreeSet<String>,
    pub start_time_ms: i64,
}

impl SnapshotRecord {
    pub fn is_valid_for(&self, index: &str) -> bool {
        self.state == SnapshotState::Success && self.indices.contains(index)
    }
}

/// A named group of indices submitted together as one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotJob {
    pub name: String,
    pub indices: Vec<String>,
    pub source_rule: String,
}

impl SnapshotJob {
    pub fn indices_csv(&self) -> String {
        self.indices.join(",")
    }
}
