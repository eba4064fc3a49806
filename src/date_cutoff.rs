//! Date tokens embedded in index and snapshot names.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate};
use regex::Regex;

/// Never act on data younger than this many days, whatever the config says.
pub const MIN_AGE_DAYS_FLOOR: u32 = 2;

/// A `strftime`-style date layout (`%Y.%m.%d`) together with the regex that
/// finds it inside a name.
#[derive(Debug, Clone)]
pub struct DateFormat {
    layout: String,
    regex_source: String,
    finder: Regex,
    trailing: Regex,
}

impl DateFormat {
    pub fn parse(layout: &str) -> Result<Self> {
        let regex_source = layout_to_regex(layout)?;
        let finder = Regex::new(&regex_source)
            .with_context(|| format!("date format {layout:?} does not compile"))?;
        let trailing = Regex::new(&format!("-(?:{regex_source})$"))
            .with_context(|| format!("date format {layout:?} does not compile"))?;
        Ok(Self {
            layout: layout.to_string(),
            regex_source,
            finder,
            trailing,
        })
    }

    pub fn layout(&self) -> &str {
        &self.layout
    }

    /// Regex fragment matching one date in this layout, unanchored.
    pub fn regex_source(&self) -> &str {
        &self.regex_source
    }

    pub fn extract<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.finder.find(name).map(|m| m.as_str())
    }

    /// Drops a trailing `-<date>` in this layout. `None` when the name does
    /// not end in one or nothing would remain.
    pub fn strip_date_suffix<'a>(&self, name: &'a str) -> Option<&'a str> {
        let m = self.trailing.find(name)?;
        Some(&name[..m.start()]).filter(|base| !base.is_empty())
    }

    pub fn extract_date(&self, name: &str) -> Option<NaiveDate> {
        let raw = self.extract(name)?;
        NaiveDate::parse_from_str(raw, &self.layout).ok()
    }

    pub fn format(&self, date: NaiveDate) -> String {
        date.format(&self.layout).to_string()
    }

    /// `true` iff the name carries a parseable date that is on or before the
    /// cutoff. Names without a date are never eligible.
    pub fn is_older_than_or_equal_cutoff(&self, name: &str, cutoff: NaiveDate) -> bool {
        self.extract_date(name).is_some_and(|date| date <= cutoff)
    }
}

fn layout_to_regex(layout: &str) -> Result<String> {
    let mut out = String::new();
    let mut chars = layout.chars();
    let mut saw_token = false;
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4])));
            continue;
        }
        match chars.next() {
            Some('Y') => out.push_str(r"\d{4}"),
            Some('m') | Some('d') => out.push_str(r"\d{2}"),
            other => anyhow::bail!(
                "date format {layout:?} uses unsupported token %{}",
                other.map(String::from).unwrap_or_default()
            ),
        }
        saw_token = true;
    }
    if !saw_token {
        anyhow::bail!("date format {layout:?} contains no date tokens");
    }
    Ok(out)
}

/// Cutoff day for a "keep N days" policy, with the global floor applied.
pub fn cutoff_for_days(today: NaiveDate, days: u32) -> NaiveDate {
    today - ChronoDuration::days(i64::from(days.max(MIN_AGE_DAYS_FLOOR)))
}

/// Combines two cutoffs so that deletion happens at the later of the two
/// moments: the earlier date wins, i.e. the policy that keeps data longer.
pub fn later_of(a: NaiveDate, b: NaiveDate) -> NaiveDate {
    a.min(b)
}

/// Snapshots only cover days that are over: anything dated on or before
/// this is settled.
pub fn settled_cutoff(today: NaiveDate) -> NaiveDate {
    cutoff_for_days(today, MIN_AGE_DAYS_FLOOR)
}
