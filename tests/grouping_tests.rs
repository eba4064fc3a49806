//! Tests for partitioning snapshot candidates into jobs.

use std::collections::HashSet;

use idxkeeper::config::Config;
use idxkeeper::grouping::{group_for_snapshots, ExcludeReason};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn config(body: &str) -> Config {
    let text = format!("snapshot_repository = \"repo\"\n{body}");
    Config::from_toml_str(&text).unwrap()
}

#[test]
fn rule_job_plus_unknown_job() {
    let cfg = config(
        r#"
[[rules]]
kind = "prefix"
value = "app-"
snapshot = true

[unknown]
snapshot = true
"#,
    );
    let plan = group_for_snapshots(
        &names(&["app-2024.01.01", "other-2024.01.01"]),
        &cfg.classifier,
        "2024.01.02",
        None,
    );

    assert_eq!(plan.jobs.len(), 2);
    assert_eq!(plan.jobs[0].name, "app-2024.01.02");
    assert_eq!(plan.jobs[0].indices, names(&["app-2024.01.01"]));
    assert_eq!(plan.jobs[1].name, "unknown-2024.01.02");
    assert_eq!(plan.jobs[1].indices, names(&["other-2024.01.01"]));
    assert!(plan.excluded.is_empty());
}

#[test]
fn every_candidate_lands_in_exactly_one_place() {
    let cfg = config(
        r#"
[[rules]]
kind = "prefix"
value = "app-"
snapshot = true

[[rules]]
kind = "prefix"
value = "app-web-"
snapshot = true

[[rules]]
kind = "prefix"
value = "audit-"
snapshot = false

[[rules]]
kind = "regex"
name = "svc"
value = "svc-[a-z]+-%Y.%m.%d"
snapshot = true

[unknown]
snapshot = true
"#,
    );
    let candidates = names(&[
        "app-2024.01.01",
        "app-web-2024.01.01",
        "audit-2024.01.01",
        "svc-orders-2024.01.01",
        "svc-billing-2024.01.01",
        "misc-2024.01.01",
        ".kibana-2024.01.01",
        "restored-app-2024.01.01",
        "app-2024.01.01",
    ]);
    let plan = group_for_snapshots(&candidates, &cfg.classifier, "2024.01.02", None);

    let mut placed = Vec::new();
    for job in &plan.jobs {
        placed.extend(job.indices.iter().cloned());
    }
    placed.extend(plan.excluded.iter().map(|(n, _)| n.clone()));

    let unique: HashSet<_> = candidates.iter().cloned().collect();
    assert_eq!(placed.len(), unique.len(), "duplicate or missing placement: {placed:?}");
    assert_eq!(placed.into_iter().collect::<HashSet<_>>(), unique);

    // Lexicographic rule order puts "app-" first, so it owns app-web too.
    let app = plan.jobs.iter().find(|j| j.name == "app-2024.01.02").unwrap();
    assert_eq!(app.indices, names(&["app-2024.01.01", "app-web-2024.01.01"]));
    assert!(plan.jobs.iter().all(|j| j.name != "app-web-2024.01.02"));

    let svc = plan.jobs.iter().find(|j| j.name == "svc-2024.01.02").unwrap();
    assert_eq!(svc.indices.len(), 2);

    assert!(plan
        .excluded
        .contains(&("audit-2024.01.01".to_string(), ExcludeReason::SnapshotDisabled)));
    assert!(plan
        .excluded
        .contains(&(".kibana-2024.01.01".to_string(), ExcludeReason::Skipped)));
    assert_eq!(plan.jobs.last().unwrap().name, "unknown-2024.01.02");
    assert_eq!(plan.scheduled_count(), 5);
}

#[test]
fn manual_only_rules_are_left_out() {
    let cfg = config(
        r#"
[[rules]]
kind = "prefix"
value = "big-"
snapshot = true
manual_snapshot = true
"#,
    );
    let plan =
        group_for_snapshots(&names(&["big-2024.01.01"]), &cfg.classifier, "2024.01.02", None);
    assert!(plan.jobs.is_empty());
    assert_eq!(
        plan.excluded,
        vec![("big-2024.01.01".to_string(), ExcludeReason::ManualOnly)]
    );
}

#[test]
fn unknown_bucket_disabled_produces_no_job() {
    let cfg = config("");
    let plan =
        group_for_snapshots(&names(&["misc-2024.01.01"]), &cfg.classifier, "2024.01.02", None);
    assert!(plan.jobs.is_empty());
    assert_eq!(plan.excluded.len(), 1);
}

#[test]
fn tagged_unknown_job_name() {
    let cfg = config("[unknown]\nsnapshot = true\n");
    let plan = group_for_snapshots(
        &names(&["misc-2024.01.01"]),
        &cfg.classifier,
        "2024.01.01",
        Some("18c2f"),
    );
    assert_eq!(plan.jobs[0].name, "unknown-18c2f-2024.01.01");
    assert_eq!(plan.jobs[0].indices_csv(), "misc-2024.01.01");
}
