//! Tests for config loading and validation.

use std::io::Write;
use std::time::Duration;

use idxkeeper::classify::{IndexRule, RawIndexRule, RuleKind};
use idxkeeper::config::{Config, Overrides};
use tempfile::NamedTempFile;

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

#[test]
fn empty_config_uses_defaults() {
    let cfg = Config::from_toml_str("").unwrap();
    assert_eq!(cfg.cluster.url, "http://localhost:9200");
    assert_eq!(cfg.date_format.layout(), "%Y.%m.%d");
    assert_eq!(cfg.retention.threshold_percent, 80.0);
    assert_eq!(cfg.retention.min_age_days, 7);
    assert_eq!(cfg.timings.poll_interval, Duration::from_secs(60));
    assert!(cfg.dereplicate.is_none());
    assert!(cfg.repositories().is_empty());
}

#[test]
fn loads_rules_from_file() {
    let file = write_config(
        r#"
date_format = "%Y-%m-%d"
snapshot_repository = "backups"

[cluster]
url = "http://es.internal:9200"
name = "prod"

[[rules]]
kind = "prefix"
value = "web-"
snapshot = true
retention_days = 14
repository = "web-backups"

[[rules]]
kind = "regex"
name = "svc"
value = "svc-[a-z]+-%Y-%m-%d"
retention_days = 30

[retention]
threshold_percent = 85
"#,
    );
    let cfg = Config::load(Some(file.path().to_path_buf()), &Overrides::default()).unwrap();
    assert_eq!(cfg.cluster.name, "prod");
    assert_eq!(cfg.classifier.rules().len(), 2);
    assert_eq!(cfg.retention.threshold_percent, 85.0);

    let web = cfg.classifier.find_rule("web-2024-01-01");
    assert_eq!(cfg.repository_for(web), Some("web-backups"));
    let svc = cfg.classifier.find_rule("svc-orders-2024-01-01");
    assert_eq!(cfg.repository_for(svc), Some("backups"));
    assert_eq!(cfg.repositories(), vec!["backups".to_string(), "web-backups".to_string()]);
}

#[test]
fn rule_repository_wins_over_global() {
    let cfg = Config::from_toml_str(r#"snapshot_repository = "backups""#).unwrap();
    let raw = RawIndexRule {
        kind: RuleKind::Prefix,
        value: "audit-".to_string(),
        name: None,
        system: false,
        snapshot: true,
        manual_snapshot: false,
        retention_days: 90,
        snapshot_retention_days: None,
        repository: Some("audit-vault".to_string()),
    };
    let rule = IndexRule::compile(raw, &cfg.date_format).unwrap();
    assert_eq!(cfg.repository_for(Some(&rule)), Some("audit-vault"));
    assert_eq!(cfg.repository_for(None), Some("backups"));
}

#[test]
fn overrides_win_over_file() {
    let file = write_config(
        r#"
[cluster]
url = "http://from-file:9200"

[retention]
threshold_percent = 85
"#,
    );
    let overrides = Overrides {
        url: Some("http://from-cli:9200".into()),
        repository: Some("cli-repo".into()),
        threshold_percent: Some(60.0),
    };
    let cfg = Config::load(Some(file.path().to_path_buf()), &overrides).unwrap();
    assert_eq!(cfg.cluster.url, "http://from-cli:9200");
    assert_eq!(cfg.snapshot_repository.as_deref(), Some("cli-repo"));
    assert_eq!(cfg.retention.threshold_percent, 60.0);
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");
    assert!(Config::load(Some(path), &Overrides::default()).is_err());
}

#[test]
fn regex_rule_without_name_is_rejected() {
    let err = Config::from_toml_str(
        r#"
[[rules]]
kind = "regex"
value = "svc-[a-z]+-%Y.%m.%d"
"#,
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("requires a name"));
}

#[test]
fn regex_rule_without_date_token_is_rejected() {
    let err = Config::from_toml_str(
        r#"
[[rules]]
kind = "regex"
name = "svc"
value = "svc-[a-z]+"
"#,
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("date format"));
}

#[test]
fn snapshot_rule_needs_a_repository() {
    let err = Config::from_toml_str(
        r#"
[[rules]]
kind = "prefix"
value = "app-"
snapshot = true
"#,
    )
    .unwrap_err();
    assert!(format!("{err:#}").contains("no repository"));

    let err = Config::from_toml_str("[unknown]\nsnapshot = true\n").unwrap_err();
    assert!(format!("{err:#}").contains("snapshot_repository"));

    let err = Config::from_toml_str("[retention]\nrequire_snapshot = true\n").unwrap_err();
    assert!(format!("{err:#}").contains("require_snapshot"));
}

#[test]
fn threshold_out_of_range_is_rejected() {
    assert!(Config::from_toml_str("[retention]\nthreshold_percent = 0\n").is_err());
    assert!(Config::from_toml_str("[retention]\nthreshold_percent = 101\n").is_err());
    assert!(Config::from_toml_str("[retention]\nthreshold_percent = 100\n").is_ok());
}

#[test]
fn min_age_is_raised_to_floor() {
    let cfg = Config::from_toml_str("[retention]\nmin_age_days = 0\n").unwrap();
    assert_eq!(cfg.retention.min_age_days, 2);
}

#[test]
fn unsupported_date_token_is_rejected() {
    assert!(Config::from_toml_str("date_format = \"%Y.%j\"\n").is_err());
}

#[test]
fn optional_tiering_sections() {
    let cfg = Config::from_toml_str(
        r#"
[dereplicate]
after_days = 3

[cold_tier]
after_days = 10
"#,
    )
    .unwrap();
    let derep = cfg.dereplicate.unwrap();
    assert_eq!((derep.after_days, derep.replicas), (3, 0));
    let cold = cfg.cold_tier.unwrap();
    assert_eq!(cold.attribute, "temp");
    assert_eq!(cold.value, "cold");
}
