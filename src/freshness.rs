//! Data freshness classification for the dashboard "last updated" widget.
//!
//! Two ordered tables drive the result. The label table picks the coarsest
//! unit that keeps the number small; the severity table looks at absolute age
//! only, so "5m ago" can already be DELAYED. First matching row wins in both.
use chrono::{DateTime, Utc};
use serde::Serialize;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Older than this is STALE.
pub const STALE_AFTER_SECS: u64 = 10 * MINUTE;
/// Older than this (and not stale) is DELAYED.
pub const DELAYED_AFTER_SECS: u64 = MINUTE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Live,
    Delayed,
    Stale,
    /// No data point was ever received. Not the same as old data.
    Unknown,
}

impl Severity {
    pub fn color(self) -> &'static str {
        match self {
            Severity::Live => "#0f0",
            Severity::Delayed => "#ff0",
            Severity::Stale => "#f00",
            Severity::Unknown => "#888",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Freshness {
    pub label: Option<String>,
    pub severity: Severity,
    pub color: &'static str,
    pub warning: Option<String>,
    pub age_secs: Option<u64>,
}

impl Freshness {
    pub fn unknown() -> Self {
        Self {
            label: None,
            severity: Severity::Unknown,
            color: Severity::Unknown.color(),
            warning: None,
            age_secs: None,
        }
    }
}

struct LabelTier {
    applies: fn(u64) -> bool,
    format: fn(u64) -> String,
}

struct SeverityTier {
    applies: fn(u64) -> bool,
    severity: Severity,
    warning: fn(u64) -> Option<String>,
}

const LABEL_TIERS: &[LabelTier] = &[
    LabelTier { applies: under_minute, format: seconds_label },
    LabelTier { applies: under_hour, format: minutes_label },
    LabelTier { applies: under_day, format: hours_label },
    LabelTier { applies: always, format: days_label },
];

const SEVERITY_TIERS: &[SeverityTier] = &[
    SeverityTier { applies: past_stale, severity: Severity::Stale, warning: stale_warning },
    SeverityTier { applies: past_delayed, severity: Severity::Delayed, warning: no_warning },
    SeverityTier { applies: always, severity: Severity::Live, warning: no_warning },
];

fn under_minute(age: u64) -> bool { age < MINUTE }
fn under_hour(age: u64) -> bool { age < HOUR }
fn under_day(age: u64) -> bool { age < DAY }
fn past_stale(age: u64) -> bool { age > STALE_AFTER_SECS }
fn past_delayed(age: u64) -> bool { age > DELAYED_AFTER_SECS }
fn always(_: u64) -> bool { true }

fn seconds_label(age: u64) -> String { format!("{}s ago", age) }
fn minutes_label(age: u64) -> String { format!("{}m ago", age / MINUTE) }
fn hours_label(age: u64) -> String { format!("{}h ago", age / HOUR) }
fn days_label(age: u64) -> String { format!("{}d ago", age / DAY) }

fn stale_warning(age: u64) -> Option<String> {
    let days = age / DAY;
    if days >= 1 {
        Some(format!("MARKET CLOSED - Last: {}d ago", days))
    } else {
        Some("STALE DATA".to_string())
    }
}

fn no_warning(_: u64) -> Option<String> {
    None
}

/// Whole seconds between `last` and `now`; clock skew clamps to zero.
pub fn age_secs(last: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - last).num_seconds().max(0) as u64
}

pub fn classify(last_observed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Freshness {
    let Some(last) = last_observed_at else {
        return Freshness::unknown();
    };
    let age = age_secs(last, now);

    // Both tables end in an `always` row, so `find` only misses if they are edited wrong.
    let label = LABEL_TIERS
        .iter()
        .find(|t| (t.applies)(age))
        .map(|t| (t.format)(age));
    let (severity, warning) = SEVERITY_TIERS
        .iter()
        .find(|t| (t.applies)(age))
        .map(|t| (t.severity, (t.warning)(age)))
        .unwrap_or((Severity::Live, None));

    Freshness {
        label,
        severity,
        color: severity.color(),
        warning,
        age_secs: Some(age),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at_age(secs: i64) -> Freshness {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 15, 0, 0).unwrap();
        classify(Some(now - Duration::seconds(secs)), now)
    }

    #[test]
    fn under_a_minute_is_live_with_seconds_label() {
        for secs in 0..60 {
            let f = at_age(secs);
            assert_eq!(f.severity, Severity::Live, "age {secs}");
            assert!(f.label.as_deref().unwrap().ends_with("s ago"), "age {secs}");
            assert_eq!(f.warning, None);
        }
        assert_eq!(at_age(42).label.as_deref(), Some("42s ago"));
    }

    #[test]
    fn minutes_label_uses_absolute_seconds_for_severity() {
        for secs in 60..3600 {
            let f = at_age(secs);
            assert!(f.label.as_deref().unwrap().ends_with("m ago"), "age {secs}");
            let expected = if secs <= 60 {
                Severity::Live
            } else if secs <= 600 {
                Severity::Delayed
            } else {
                Severity::Stale
            };
            assert_eq!(f.severity, expected, "age {secs}");
        }
        let f = at_age(300);
        assert_eq!(f.label.as_deref(), Some("5m ago"));
        assert_eq!(f.severity, Severity::Delayed);
        assert_eq!(f.color, "#ff0");
    }

    #[test]
    fn just_past_ten_minutes_is_stale_data() {
        let f = at_age(601);
        assert_eq!(f.severity, Severity::Stale);
        assert_eq!(f.warning.as_deref(), Some("STALE DATA"));
        assert_eq!(f.label.as_deref(), Some("10m ago"));

        let f = at_age(600);
        assert_eq!(f.severity, Severity::Delayed);
        assert_eq!(f.warning, None);
    }

    #[test]
    fn hours_label_before_a_day() {
        let f = at_age(7_200);
        assert_eq!(f.label.as_deref(), Some("2h ago"));
        assert_eq!(f.severity, Severity::Stale);
        assert_eq!(f.warning.as_deref(), Some("STALE DATA"));
    }

    #[test]
    fn over_a_day_reports_market_closed() {
        let f = at_age(90_000);
        assert_eq!(f.severity, Severity::Stale);
        assert_eq!(f.label.as_deref(), Some("1d ago"));
        let warning = f.warning.unwrap();
        assert!(warning.contains("MARKET CLOSED"));
        assert_eq!(warning, "MARKET CLOSED - Last: 1d ago");

        let f = at_age(3 * 86_400 + 5);
        assert_eq!(f.warning.as_deref(), Some("MARKET CLOSED - Last: 3d ago"));
    }

    #[test]
    fn future_timestamp_clamps_to_zero() {
        let f = at_age(-30);
        assert_eq!(f.age_secs, Some(0));
        assert_eq!(f.label.as_deref(), Some("0s ago"));
        assert_eq!(f.severity, Severity::Live);
    }

    #[test]
    fn missing_timestamp_is_unknown_not_stale() {
        let f = classify(None, Utc::now());
        assert_eq!(f.severity, Severity::Unknown);
        assert_ne!(f.severity, Severity::Stale);
        assert_eq!(f.label, None);
        assert_eq!(f.warning, None);
        assert_eq!(f.age_secs, None);
    }

    #[test]
    fn severity_serializes_upper_case() {
        let json = serde_json::to_value(at_age(5)).unwrap();
        assert_eq!(json["severity"], "LIVE");
        assert_eq!(json["color"], "#0f0");
    }
}
