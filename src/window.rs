use std::fmt;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::records::{MatchRecord, Side};

/// Which slice of a team's matches an aggregate covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Window {
    #[default]
    Season,
    /// The entity's own last `n` matches.
    RollingMatches { n: u32 },
    /// Matches within `days` days ending on the latest match date of the batch.
    RollingDays { days: u32 },
    /// Inclusive on both ends.
    DateRange { from: NaiveDate, to: NaiveDate },
    HomeOnly,
    AwayOnly,
}

impl Window {
    /// `season`, `last:5`, `days:30`, `from:2024-08-01..2024-12-31`, `home`, `away`.
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_ascii_lowercase();
        match s.as_str() {
            "season" | "all" => return Some(Window::Season),
            "home" => return Some(Window::HomeOnly),
            "away" => return Some(Window::AwayOnly),
            _ => {}
        }
        if let Some(n) = s.strip_prefix("last:") {
            let n = n.trim().parse::<u32>().ok().filter(|n| *n > 0)?;
            return Some(Window::RollingMatches { n });
        }
        if let Some(d) = s.strip_prefix("days:") {
            let days = d.trim().parse::<u32>().ok().filter(|d| *d > 0)?;
            return Some(Window::RollingDays { days });
        }
        if let Some(range) = s.strip_prefix("from:") {
            let (a, b) = range.split_once("..")?;
            let from = NaiveDate::parse_from_str(a.trim(), "%Y-%m-%d").ok()?;
            let to = NaiveDate::parse_from_str(b.trim(), "%Y-%m-%d").ok()?;
            return (from <= to).then_some(Window::DateRange { from, to });
        }
        None
    }

    pub fn label(&self) -> String {
        match self {
            Window::Season => "season".to_string(),
            Window::RollingMatches { n } => format!("last:{n}"),
            Window::RollingDays { days } => format!("days:{days}"),
            Window::DateRange { from, to } => format!("from:{from}..{to}"),
            Window::HomeOnly => "home".to_string(),
            Window::AwayOnly => "away".to_string(),
        }
    }

    /// Whether a team's appearance on `side` in `m` falls inside the window,
    /// before any per-entity count limit is applied.
    pub fn admits(&self, m: &MatchRecord, side: Side, anchor: Option<NaiveDate>) -> bool {
        match self {
            Window::Season | Window::RollingMatches { .. } => true,
            Window::RollingDays { days } => match anchor {
                Some(anchor) => {
                    let start = anchor - Duration::days(i64::from(days.saturating_sub(1)));
                    m.date >= start && m.date <= anchor
                }
                None => false,
            },
            Window::DateRange { from, to } => m.date >= *from && m.date <= *to,
            Window::HomeOnly => side == Side::Home,
            Window::AwayOnly => side == Side::Away,
        }
    }

    /// Per-entity cap on matches, taken from the most recent end.
    pub fn limit(&self) -> Option<usize> {
        match self {
            Window::RollingMatches { n } => Some(*n as usize),
            _ => None,
        }
    }

    pub fn is_season(&self) -> bool {
        matches!(self, Window::Season)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
