//! Mapping index and snapshot names onto configured lifecycle rules.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::date_cutoff::DateFormat;

pub const RESTORED_PREFIX: &str = "restored-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Prefix,
    Regex,
}

/// Rule as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct RawIndexRule {
    pub kind: RuleKind,
    pub value: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub system: bool,
    #[serde(default)]
    pub snapshot: bool,
    #[serde(default)]
    pub manual_snapshot: bool,
    #[serde(default)]
    pub retention_days: u32,
    #[serde(default)]
    pub snapshot_retention_days: Option<u32>,
    #[serde(default)]
    pub repository: Option<String>,
}

#[derive(Debug, Clone)]
enum Matcher {
    Prefix(String),
    Regex(Regex),
}

#[derive(Debug, Clone)]
pub struct IndexRule {
    pub kind: RuleKind,
    pub value: String,
    pub name: Option<String>,
    pub system: bool,
    pub snapshot_enabled: bool,
    pub manual_snapshot: bool,
    pub retention_days: u32,
    pub snapshot_retention_days: Option<u32>,
    pub repository: Option<String>,
    matcher: Matcher,
}

impl IndexRule {
    /// Validates and compiles a rule. Regex rules must be named and must embed
    /// the date layout, which is replaced by its digit pattern.
    pub fn compile(raw: RawIndexRule, date_format: &DateFormat) -> Result<Self> {
        let matcher = match raw.kind {
            RuleKind::Prefix => {
                if raw.value.is_empty() {
                    anyhow::bail!("prefix rule has an empty value");
                }
                Matcher::Prefix(raw.value.clone())
            }
            RuleKind::Regex => {
                if raw.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
                    anyhow::bail!("regex rule {:?} requires a name", raw.value);
                }
                if !raw.value.contains(date_format.layout()) {
                    anyhow::bail!(
                        "regex rule {:?} must contain the date format {:?}",
                        raw.value,
                        date_format.layout()
                    );
                }
                let source = raw
                    .value
                    .replace(date_format.layout(), date_format.regex_source());
                let anchored = format!("^(?:{source})$");
                let re = Regex::new(&anchored)
                    .with_context(|| format!("regex rule {:?} does not compile", raw.value))?;
                Matcher::Regex(re)
            }
        };

        Ok(Self {
            kind: raw.kind,
            value: raw.value,
            name: raw.name.filter(|n| !n.trim().is_empty()),
            system: raw.system,
            snapshot_enabled: raw.snapshot,
            manual_snapshot: raw.manual_snapshot,
            retention_days: raw.retention_days,
            snapshot_retention_days: raw.snapshot_retention_days,
            repository: raw.repository.filter(|r| !r.trim().is_empty()),
            matcher,
        })
    }

    /// Identifier used as the stem of snapshot names for this rule.
    pub fn job_base(&self) -> &str {
        match &self.name {
            Some(name) => name,
            None => self.value.trim_end_matches(['-', '_', '.']),
        }
    }

    pub fn describe(&self) -> String {
        match self.kind {
            RuleKind::Prefix => format!("prefix:{}", self.value),
            RuleKind::Regex => format!("regex:{}", self.value),
        }
    }

    /// Auto snapshots run for this rule (manual-only rules are excluded).
    pub fn auto_snapshot(&self) -> bool {
        self.snapshot_enabled && !self.manual_snapshot
    }
}

/// Fallback policy for names no rule claims.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnknownBucket {
    #[serde(default)]
    pub retention_days: u32,
    #[serde(default)]
    pub snapshot: bool,
    #[serde(default)]
    pub manual_snapshot: bool,
}

impl UnknownBucket {
    pub fn auto_snapshot(&self) -> bool {
        self.snapshot && !self.manual_snapshot
    }
}

/// The policy that owns a name: a configured rule or the unknown bucket.
#[derive(Debug, Clone, Copy)]
pub enum Owner<'a> {
    Rule(&'a IndexRule),
    Unknown(&'a UnknownBucket),
}

impl Owner<'_> {
    pub fn retention_days(&self) -> u32 {
        match self {
            Owner::Rule(rule) => rule.retention_days,
            Owner::Unknown(bucket) => bucket.retention_days,
        }
    }

    pub fn snapshot_enabled(&self) -> bool {
        match self {
            Owner::Rule(rule) => rule.snapshot_enabled,
            Owner::Unknown(bucket) => bucket.snapshot,
        }
    }

    pub fn auto_snapshot(&self) -> bool {
        match self {
            Owner::Rule(rule) => rule.auto_snapshot(),
            Owner::Unknown(bucket) => bucket.auto_snapshot(),
        }
    }

    pub fn snapshot_retention_days(&self) -> Option<u32> {
        match self {
            Owner::Rule(rule) => rule.snapshot_retention_days,
            Owner::Unknown(_) => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            Owner::Rule(rule) => rule.describe(),
            Owner::Unknown(_) => "unknown".to_string(),
        }
    }
}

/// Rules plus the universal skip predicate.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<IndexRule>,
    unknown: UnknownBucket,
    extracted_prefix: Option<String>,
    date_format: Option<DateFormat>,
}

impl Classifier {
    /// Rules are kept in the order given; first match wins.
    pub fn new(
        rules: Vec<IndexRule>,
        unknown: UnknownBucket,
        extracted_prefix: Option<String>,
    ) -> Self {
        Self {
            rules,
            unknown,
            extracted_prefix: extracted_prefix.filter(|p| !p.is_empty()),
            date_format: None,
        }
    }

    /// Same as [`Classifier::new`] but with rules ordered lexicographically by
    /// `value`, which is how the workflows search them.
    pub fn sorted(
        mut rules: Vec<IndexRule>,
        unknown: UnknownBucket,
        extracted_prefix: Option<String>,
    ) -> Self {
        rules.sort_by(|a, b| a.value.cmp(&b.value));
        Self::new(rules, unknown, extracted_prefix)
    }

    /// Date layout used to cut the trailing date off snapshot names.
    pub fn with_date_format(mut self, date_format: DateFormat) -> Self {
        self.date_format = Some(date_format);
        self
    }

    pub fn rules(&self) -> &[IndexRule] {
        &self.rules
    }

    pub fn unknown(&self) -> &UnknownBucket {
        &self.unknown
    }

    /// Internal (`.`), restored and extracted indices are never claimed by
    /// regular rules and never fall into the unknown bucket.
    pub fn is_skipped(&self, name: &str) -> bool {
        name.starts_with('.')
            || name.starts_with(RESTORED_PREFIX)
            || self
                .extracted_prefix
                .as_deref()
                .is_some_and(|p| name.starts_with(p))
    }

    pub fn matches(&self, name: &str, rule: &IndexRule) -> bool {
        if !rule.system && self.is_skipped(name) {
            return false;
        }
        match &rule.matcher {
            Matcher::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Matcher::Regex(re) => re.is_match(name),
        }
    }

    pub fn find_rule(&self, name: &str) -> Option<&IndexRule> {
        self.rules.iter().find(|rule| self.matches(name, rule))
    }

    /// Owning policy of an index; `None` for skipped names no system rule claims.
    pub fn owner(&self, name: &str) -> Option<Owner<'_>> {
        if let Some(rule) = self.find_rule(name) {
            return Some(Owner::Rule(rule));
        }
        (!self.is_skipped(name)).then_some(Owner::Unknown(&self.unknown))
    }

    /// Snapshot names look like `<base>-<date>`. The trailing date is cut in
    /// the configured layout (falling back to the last `-` segment) and the
    /// remainder is compared with the rule's job stem or its index pattern.
    pub fn matches_snapshot_name(&self, snapshot: &str, rule: &IndexRule) -> bool {
        let dated = self
            .date_format
            .as_ref()
            .and_then(|fmt| fmt.strip_date_suffix(snapshot));
        let segment = snapshot_base(snapshot).map(|(base, _suffix)| base);
        [dated, segment]
            .into_iter()
            .flatten()
            .any(|base| base == rule.job_base() || self.matches(base, rule))
    }

    pub fn find_snapshot_rule(&self, snapshot: &str) -> Option<&IndexRule> {
        self.rules
            .iter()
            .find(|rule| self.matches_snapshot_name(snapshot, rule))
    }
}

/// Splits `<base>-<suffix>`; names with fewer than two segments are dangling.
pub fn snapshot_base(snapshot: &str) -> Option<(&str, &str)> {
    snapshot
        .rsplit_once('-')
        .filter(|(base, suffix)| !base.is_empty() && !suffix.is_empty())
}
