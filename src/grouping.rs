use std::collections::HashSet;

use tracing::debug;

use crate::classify::Classifier;
use crate::types::SnapshotJob;

pub const UNKNOWN_JOB_BASE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcludeReason {
    SnapshotDisabled,
    ManualOnly,
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotPlan {
    pub jobs: Vec<SnapshotJob>,
    pub excluded: Vec<(String, ExcludeReason)>,
}

impl SnapshotPlan {
    pub fn scheduled_count(&self) -> usize {
        self.jobs.iter().map(|j| j.indices.len()).sum()
    }
}

/// Partitions candidates into one job per owning rule plus a trailing
/// `unknown` job. Each candidate lands in exactly one job or in `excluded`.
///
/// `unknown_tag` disambiguates the unknown job when several date groups are
/// planned in one run (`unknown-<tag>-<date>`).
pub fn group_for_snapshots(
    candidates: &[String],
    classifier: &Classifier,
    date_suffix: &str,
    unknown_tag: Option<&str>,
) -> SnapshotPlan {
    let mut owner_of: Vec<Option<usize>> = Vec::with_capacity(candidates.len());
    for name in candidates {
        let owner = classifier
            .rules()
            .iter()
            .position(|rule| classifier.matches(name, rule));
        owner_of.push(owner);
    }

    // Repeated names are planned once.
    let mut taken = vec![false; candidates.len()];
    let mut seen = HashSet::new();
    for (i, name) in candidates.iter().enumerate() {
        if !seen.insert(name.as_str()) {
            taken[i] = true;
        }
    }

    let mut plan = SnapshotPlan::default();

    for (rule_idx, rule) in classifier.rules().iter().enumerate() {
        let mut members = Vec::new();
        for (i, name) in candidates.iter().enumerate() {
            if !taken[i] && owner_of[i] == Some(rule_idx) {
                taken[i] = true;
                members.push(name.clone());
            }
        }
        if members.is_empty() {
            continue;
        }

        if !rule.snapshot_enabled {
            debug!(
                "grouping: {} owns {} indices with snapshots disabled",
                rule.describe(),
                members.len()
            );
            plan.excluded
                .extend(members.into_iter().map(|n| (n, ExcludeReason::SnapshotDisabled)));
            continue;
        }
        if rule.manual_snapshot {
            debug!(
                "grouping: {} is manual-only, {} indices left out",
                rule.describe(),
                members.len()
            );
            plan.excluded
                .extend(members.into_iter().map(|n| (n, ExcludeReason::ManualOnly)));
            continue;
        }

        plan.jobs.push(SnapshotJob {
            name: format!("{}-{}", rule.job_base(), date_suffix),
            indices: members,
            source_rule: rule.describe(),
        });
    }

    let mut unknown_members = Vec::new();
    for (i, name) in candidates.iter().enumerate() {
        if taken[i] {
            continue;
        }
        if classifier.is_skipped(name) {
            plan.excluded.push((name.clone(), ExcludeReason::Skipped));
            continue;
        }
        unknown_members.push(name.clone());
    }

    if unknown_members.is_empty() {
        return plan;
    }

    let bucket = classifier.unknown();
    if !bucket.auto_snapshot() {
        let reason = if bucket.snapshot {
            ExcludeReason::ManualOnly
        } else {
            ExcludeReason::SnapshotDisabled
        };
        plan.excluded
            .extend(unknown_members.into_iter().map(|n| (n, reason)));
        return plan;
    }

    let name = match unknown_tag {
        Some(tag) => format!("{UNKNOWN_JOB_BASE}-{tag}-{date_suffix}"),
        None => format!("{UNKNOWN_JOB_BASE}-{date_suffix}"),
    };
    plan.jobs.push(SnapshotJob {
        name,
        indices: unknown_members,
        source_rule: UNKNOWN_JOB_BASE.to_string(),
    });
    plan
}
