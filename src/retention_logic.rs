use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;

use crate::classify::Classifier;
use crate::date_cutoff::{cutoff_for_days, DateFormat};
use crate::types::{IndexRecord, SnapshotRecord, SnapshotState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionCandidate {
    pub index: IndexRecord,
    pub date: NaiveDate,
    /// Start time of the newest `SUCCESS` snapshot holding this index.
    pub snapshot_start_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateQueue {
    pub queue: Vec<RetentionCandidate>,
    pub skipped_unsnapshotted: Vec<String>,
}

/// Newest successful snapshot start time per index.
pub fn latest_success_by_index(snapshots: &[SnapshotRecord]) -> HashMap<&str, i64> {
    let mut out = HashMap::<&str, i64>::new();
    for snap in snapshots.iter().filter(|s| s.state == SnapshotState::Success) {
        for index in &snap.indices {
            let slot = out.entry(index.as_str()).or_insert(snap.start_time_ms);
            *slot = (*slot).max(snap.start_time_ms);
        }
    }
    out
}

/// Deletion order for the retention loop.
///
/// Eligible: not skipped, carries a date on or before
/// `today - max(min_age_days, 2)`, date not in the future. With
/// `require_snapshot`, indices lacking a `SUCCESS` snapshot are set aside.
pub fn build_candidate_queue(
    indices: &[IndexRecord],
    snapshots: &[SnapshotRecord],
    classifier: &Classifier,
    date_format: &DateFormat,
    today: NaiveDate,
    min_age_days: u32,
    require_snapshot: bool,
) -> CandidateQueue {
    let cutoff = cutoff_for_days(today, min_age_days);
    let covered = latest_success_by_index(snapshots);

    let mut out = CandidateQueue::default();
    for index in indices {
        if classifier.is_skipped(&index.name) {
            continue;
        }
        let Some(date) = date_format.extract_date(&index.name) else {
            continue;
        };
        if date > today || date > cutoff {
            continue;
        }
        let snapshot_start_ms = covered.get(index.name.as_str()).copied();
        if require_snapshot && snapshot_start_ms.is_none() {
            out.skipped_unsnapshotted.push(index.name.clone());
            continue;
        }
        out.queue.push(RetentionCandidate {
            index: index.clone(),
            date,
            snapshot_start_ms,
        });
    }

    out.queue.sort_by(compare_candidates);
    out
}

/// Descending snapshot start time; unsnapshotted last; then oldest date, then name.
fn compare_candidates(a: &RetentionCandidate, b: &RetentionCandidate) -> Ordering {
    let by_snapshot = match (a.snapshot_start_ms, b.snapshot_start_ms) {
        (Some(sa), Some(sb)) => sb.cmp(&sa),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_snapshot
        .then_with(|| a.date.cmp(&b.date))
        .then_with(|| a.index.name.cmp(&b.index.name))
}
