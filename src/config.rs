use std::collections::BTreeSet;
use std::{env, fs, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use tracing::warn;

use crate::classify::{Classifier, IndexRule, RawIndexRule, UnknownBucket};
use crate::date_cutoff::{DateFormat, MIN_AGE_DAYS_FLOOR};

#[derive(Debug, Clone)]
pub struct ClusterSettings {
    pub url: String,
    pub user: String,
    pub pass: String,
    pub name: String,
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub poll_interval: Duration,
    pub settle_interval: Duration,
    pub backoff_unit: Duration,
    pub bulk_pause: Duration,
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub threshold_percent: f64,
    pub min_age_days: u32,
    pub require_snapshot: bool,
    pub expected_data_nodes: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct DereplicateConfig {
    pub after_days: u32,
    pub replicas: u32,
}

#[derive(Debug, Clone)]
pub struct ColdTierConfig {
    pub after_days: u32,
    pub attribute: String,
    pub value: String,
}

/// Fully resolved, validated configuration. Built once in `main`.
#[derive(Debug, Clone)]
pub struct Config {
    pub cluster: ClusterSettings,
    pub date_format: DateFormat,
    pub classifier: Classifier,
    pub snapshot_repository: Option<String>,
    pub alert_webhook_url: Option<String>,
    pub timings: Timings,
    pub retention: RetentionConfig,
    pub dereplicate: Option<DereplicateConfig>,
    pub cold_tier: Option<ColdTierConfig>,
}

/// Values given on the command line; they win over env and file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub repository: Option<String>,
    pub threshold_percent: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    cluster: RawCluster,
    #[serde(default = "default_date_format")]
    date_format: String,
    #[serde(default)]
    extracted_prefix: Option<String>,
    #[serde(default)]
    snapshot_repository: Option<String>,
    #[serde(default)]
    alert_webhook_url: Option<String>,
    #[serde(default)]
    rules: Vec<RawIndexRule>,
    #[serde(default)]
    unknown: UnknownBucket,
    #[serde(default)]
    timings: RawTimings,
    #[serde(default)]
    retention: RawRetention,
    #[serde(default)]
    dereplicate: Option<RawDereplicate>,
    #[serde(default)]
    cold_tier: Option<RawColdTier>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawCluster {
    url: String,
    user: String,
    pass: String,
    name: String,
    timeout_secs: u64,
    retry_attempts: u32,
    retry_backoff_secs: u64,
}

impl Default for RawCluster {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".into(),
            user: String::new(),
            pass: String::new(),
            name: "default".into(),
            timeout_secs: 30,
            retry_attempts: 3,
            retry_backoff_secs: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawTimings {
    poll_interval_secs: u64,
    settle_interval_secs: u64,
    backoff_unit_secs: u64,
    bulk_pause_secs: u64,
}

impl Default for RawTimings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            settle_interval_secs: 15,
            backoff_unit_secs: 1,
            bulk_pause_secs: 600,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawRetention {
    threshold_percent: f64,
    min_age_days: u32,
    require_snapshot: bool,
    expected_data_nodes: Option<usize>,
}

impl Default for RawRetention {
    fn default() -> Self {
        Self {
            threshold_percent: 80.0,
            min_age_days: 7,
            require_snapshot: false,
            expected_data_nodes: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDereplicate {
    after_days: u32,
    #[serde(default)]
    replicas: u32,
}

#[derive(Debug, Deserialize)]
struct RawColdTier {
    after_days: u32,
    #[serde(default = "default_cold_attribute")]
    attribute: String,
    #[serde(default = "default_cold_value")]
    value: String,
}

fn default_date_format() -> String {
    "%Y.%m.%d".into()
}

fn default_cold_attribute() -> String {
    "temp".into()
}

fn default_cold_value() -> String {
    "cold".into()
}

impl Config {
    /// Resolves config with precedence: overrides > env > file > defaults.
    pub fn load(path: Option<PathBuf>, overrides: &Overrides) -> Result<Self> {
        let path = path.or_else(|| Some(default_config_path()).filter(|p| p.exists()));
        let mut raw = match path {
            Some(path) => {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("read config {}", path.display()))?;
                parse_raw(&text)?
            }
            None => parse_raw("")?,
        };
        apply_env(&mut raw);
        apply_overrides(&mut raw, overrides);
        Self::from_raw(raw)
    }

    /// File contents only; no env or overrides.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::from_raw(parse_raw(text)?)
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let date_format = DateFormat::parse(&raw.date_format)?;
        let rules = raw
            .rules
            .into_iter()
            .map(|r| IndexRule::compile(r, &date_format))
            .collect::<Result<Vec<_>>>()?;
        let classifier = Classifier::sorted(rules, raw.unknown, raw.extracted_prefix)
            .with_date_format(date_format.clone());

        let mut min_age_days = raw.retention.min_age_days;
        if min_age_days < MIN_AGE_DAYS_FLOOR {
            warn!(
                "config: retention.min_age_days={} raised to floor {}",
                min_age_days, MIN_AGE_DAYS_FLOOR
            );
            min_age_days = MIN_AGE_DAYS_FLOOR;
        }

        let cfg = Self {
            cluster: ClusterSettings {
                url: raw.cluster.url,
                user: raw.cluster.user,
                pass: raw.cluster.pass,
                name: raw.cluster.name,
                timeout: Duration::from_secs(raw.cluster.timeout_secs),
                retry_attempts: raw.cluster.retry_attempts.max(1),
                retry_backoff: Duration::from_secs(raw.cluster.retry_backoff_secs),
            },
            date_format,
            classifier,
            snapshot_repository: raw.snapshot_repository.filter(|r| !r.trim().is_empty()),
            alert_webhook_url: raw.alert_webhook_url.filter(|u| !u.trim().is_empty()),
            timings: Timings {
                poll_interval: Duration::from_secs(raw.timings.poll_interval_secs),
                settle_interval: Duration::from_secs(raw.timings.settle_interval_secs),
                backoff_unit: Duration::from_secs(raw.timings.backoff_unit_secs),
                bulk_pause: Duration::from_secs(raw.timings.bulk_pause_secs),
            },
            retention: RetentionConfig {
                threshold_percent: raw.retention.threshold_percent,
                min_age_days,
                require_snapshot: raw.retention.require_snapshot,
                expected_data_nodes: raw.retention.expected_data_nodes,
            },
            dereplicate: raw.dereplicate.map(|d| DereplicateConfig {
                after_days: d.after_days,
                replicas: d.replicas,
            }),
            cold_tier: raw.cold_tier.map(|c| ColdTierConfig {
                after_days: c.after_days,
                attribute: c.attribute,
                value: c.value,
            }),
        };
        validate(&cfg)?;
        Ok(cfg)
    }

    /// Repository for a rule, falling back to the global one.
    pub fn repository_for<'a>(&'a self, rule: Option<&'a IndexRule>) -> Option<&'a str> {
        rule.and_then(|r| r.repository.as_deref())
            .or(self.snapshot_repository.as_deref())
    }

    /// Every repository a snapshot may live in.
    pub fn repositories(&self) -> Vec<String> {
        let mut set = BTreeSet::new();
        if let Some(repo) = &self.snapshot_repository {
            set.insert(repo.clone());
        }
        for rule in self.classifier.rules() {
            if let Some(repo) = &rule.repository {
                set.insert(repo.clone());
            }
        }
        set.into_iter().collect()
    }
}

fn parse_raw(text: &str) -> Result<RawConfig> {
    toml::from_str::<RawConfig>(text).context("parse config")
}

fn default_config_path() -> PathBuf {
    ProjectDirs::from("io", "idxkeeper", "idxkeeper")
        .map(|p| p.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from(".idxkeeper/config.toml"))
}

fn validate(cfg: &Config) -> Result<()> {
    if cfg.cluster.url.trim().is_empty() {
        anyhow::bail!("cluster.url is required (set via IDXKEEPER_URL or config)");
    }
    if !(cfg.retention.threshold_percent > 0.0 && cfg.retention.threshold_percent <= 100.0) {
        anyhow::bail!(
            "retention.threshold_percent must be in (0, 100], got {}",
            cfg.retention.threshold_percent
        );
    }
    for rule in cfg.classifier.rules() {
        if rule.snapshot_enabled && cfg.repository_for(Some(rule)).is_none() {
            anyhow::bail!(
                "rule {} enables snapshots but no repository is configured",
                rule.describe()
            );
        }
    }
    if cfg.classifier.unknown().snapshot && cfg.snapshot_repository.is_none() {
        anyhow::bail!("unknown bucket enables snapshots but snapshot_repository is not set");
    }
    if cfg.retention.require_snapshot && cfg.repositories().is_empty() {
        anyhow::bail!("retention.require_snapshot needs at least one snapshot repository");
    }
    Ok(())
}

fn apply_env(raw: &mut RawConfig) {
    maybe_env_string(&mut raw.cluster.url, "IDXKEEPER_URL");
    maybe_env_string(&mut raw.cluster.user, "IDXKEEPER_USER");
    maybe_env_string(&mut raw.cluster.pass, "IDXKEEPER_PASS");
    maybe_env_string(&mut raw.cluster.name, "IDXKEEPER_CLUSTER_NAME");
    maybe_env_u64(&mut raw.cluster.timeout_secs, "IDXKEEPER_TIMEOUT_SECS");
    if let Ok(v) = env::var("IDXKEEPER_REPOSITORY") {
        raw.snapshot_repository = Some(v);
    }
    if let Ok(v) = env::var("IDXKEEPER_ALERT_WEBHOOK_URL") {
        raw.alert_webhook_url = Some(v);
    }
    if let Ok(v) = env::var("IDXKEEPER_THRESHOLD_PERCENT") {
        if let Ok(n) = v.parse::<f64>() {
            raw.retention.threshold_percent = n;
        }
    }
    maybe_env_u64(&mut raw.timings.poll_interval_secs, "IDXKEEPER_POLL_INTERVAL_SECS");
    maybe_env_u64(&mut raw.timings.settle_interval_secs, "IDXKEEPER_SETTLE_INTERVAL_SECS");
    maybe_env_u64(&mut raw.timings.bulk_pause_secs, "IDXKEEPER_BULK_PAUSE_SECS");
}

fn apply_overrides(raw: &mut RawConfig, overrides: &Overrides) {
    if let Some(url) = &overrides.url {
        raw.cluster.url = url.clone();
    }
    if let Some(repo) = &overrides.repository {
        raw.snapshot_repository = Some(repo.clone());
    }
    if let Some(pct) = overrides.threshold_percent {
        raw.retention.threshold_percent = pct;
    }
}

fn maybe_env_string(val: &mut String, key: &str) {
    if let Ok(v) = env::var(key) {
        if !v.trim().is_empty() {
            *val = v;
        }
    }
}

fn maybe_env_u64(val: &mut u64, key: &str) {
    if let Ok(v) = env::var(key) {
        if let Ok(n) = v.parse::<u64>() {
            *val = n;
        }
    }
}
