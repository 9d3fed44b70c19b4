//! Row-level schema checks.
//!
//! `validate` never fails: every raw row ends up either as a typed [`Row`] or
//! as a [`Rejection`] carrying the original cells and the reason.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::SchemaError;
use crate::records::{
    EventKind, EventRecord, MatchRecord, PlayerSeasonLine, Position, RawRow, Row, RowKind,
    SideStats,
};

const MATCH_ID: &[&str] = &["match_id", "id", "fixture_id"];
const DATE: &[&str] = &["date", "match_date", "utc_time", "kickoff"];
const HOME_TEAM: &[&str] = &["home_team", "home", "hometeam"];
const AWAY_TEAM: &[&str] = &["away_team", "away", "awayteam"];
const HOME_GOALS: &[&str] = &["home_goals", "home_score", "fthg"];
const AWAY_GOALS: &[&str] = &["away_goals", "away_score", "ftag"];
const ROUND: &[&str] = &["round", "matchweek", "gameweek"];
const VENUE: &[&str] = &["venue", "stadium"];
const HOME_SHOTS: &[&str] = &["home_shots", "hs"];
const AWAY_SHOTS: &[&str] = &["away_shots", "as"];
const HOME_SOT: &[&str] = &["home_shots_on_target", "hst"];
const AWAY_SOT: &[&str] = &["away_shots_on_target", "ast"];
const HOME_XG: &[&str] = &["home_xg"];
const AWAY_XG: &[&str] = &["away_xg"];

const MINUTE: &[&str] = &["minute", "min"];
const EVENT_KIND: &[&str] = &["kind", "event", "type", "event_type"];
const PLAYER: &[&str] = &["player", "player_name", "name"];
const TEAM: &[&str] = &["team", "club"];

const CLUB: &[&str] = &["club", "team"];
const POSITION: &[&str] = &["position", "pos"];
const APPEARANCES: &[&str] = &["appearances", "apps", "matches_played"];
const MINUTES: &[&str] = &["minutes", "minutes_played", "mins"];
const GOALS: &[&str] = &["goals"];
const ASSISTS: &[&str] = &["assists"];
const SHOTS: &[&str] = &["shots"];
const SHOTS_ON_TARGET: &[&str] = &["shots_on_target", "sot"];
const YELLOW_CARDS: &[&str] = &["yellow_cards", "yellows"];
const RED_CARDS: &[&str] = &["red_cards", "reds"];
const PASSES: &[&str] = &["passes", "passes_attempted"];
const PASS_ACCURACY: &[&str] = &["passes_pct", "pass_accuracy", "pass_pct"];

/// Tagged result of checking one raw row.
#[derive(Debug, Clone, PartialEq)]
pub enum Checked {
    Valid(Row),
    Rejected(RawRow, SchemaError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub row: RawRow,
    pub reason: SchemaError,
}

#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub valid: Vec<Row>,
    pub rejected: Vec<Rejection>,
}

impl Validation {
    pub fn from_checked(checked: Vec<Checked>) -> Self {
        let mut out = Validation::default();
        for c in checked {
            match c {
                Checked::Valid(row) => out.valid.push(row),
                Checked::Rejected(row, reason) => out.rejected.push(Rejection { row, reason }),
            }
        }
        out
    }
}

pub fn validate(rows: Vec<RawRow>, cfg: &EngineConfig) -> Validation {
    let checked = check_all(rows, cfg);
    let out = Validation::from_checked(checked);
    for r in &out.rejected {
        tracing::warn!(line = r.row.line, kind = ?r.row.kind, "row rejected: {}", r.reason);
    }
    tracing::debug!(
        valid = out.valid.len(),
        rejected = out.rejected.len(),
        "schema validation finished"
    );
    out
}

/// Checks every row, keeping input order.
///
/// Match rows are checked first so events can name a known match. Whether the
/// event's team plays in it is decided after name resolution.
pub fn check_all(rows: Vec<RawRow>, cfg: &EngineConfig) -> Vec<Checked> {
    let mut slots: Vec<Option<Checked>> = vec![None; rows.len()];
    let mut known: HashSet<String> = HashSet::new();
    let mut deferred = Vec::new();

    for (idx, row) in rows.into_iter().enumerate() {
        if row.kind != RowKind::Match {
            deferred.push((idx, row));
            continue;
        }
        let checked = match check_match(&row, cfg) {
            Ok(m) => {
                known.insert(m.match_id.clone());
                Checked::Valid(Row::Match(m))
            }
            Err(reason) => Checked::Rejected(row, reason),
        };
        slots[idx] = Some(checked);
    }

    for (idx, row) in deferred {
        let result = match row.kind {
            RowKind::Event => check_event(&row, cfg, &known).map(Row::Event),
            RowKind::PlayerSeason => check_player_line(&row).map(Row::PlayerSeason),
            RowKind::Match => unreachable!("match rows are checked in the first pass"),
        };
        slots[idx] = Some(match result {
            Ok(valid) => Checked::Valid(valid),
            Err(reason) => Checked::Rejected(row, reason),
        });
    }

    slots.into_iter().flatten().collect()
}

pub fn check_match(row: &RawRow, cfg: &EngineConfig) -> Result<MatchRecord, SchemaError> {
    let home = required_text(row, HOME_TEAM, "home_team")?;
    let away = required_text(row, AWAY_TEAM, "away_team")?;
    if home.trim().eq_ignore_ascii_case(away.trim()) {
        return Err(SchemaError::SameTeam { team: home });
    }

    let raw_date = required_text(row, DATE, "date")?;
    let date = parse_date(&raw_date).ok_or(SchemaError::BadDate { value: raw_date })?;
    if let Some(season) = cfg.season.as_ref() {
        if !season.contains(date) {
            return Err(SchemaError::OutsideSeason {
                date,
                start: season.start,
                end: season.end,
            });
        }
    }

    let home_goals = required_count(row, HOME_GOALS, "home_goals")?;
    let away_goals = required_count(row, AWAY_GOALS, "away_goals")?;

    let match_id = row
        .first(MATCH_ID)
        .map(|(_, v)| v.to_string())
        .unwrap_or_else(|| format!("{}:{}:{}", date, home.trim(), away.trim()));

    Ok(MatchRecord {
        match_id,
        line: row.line,
        date,
        home,
        away,
        home_goals,
        away_goals,
        round: optional_count(row, ROUND, "round")?,
        venue: row.first(VENUE).map(|(_, v)| v.to_string()),
        home_stats: SideStats {
            shots: optional_count(row, HOME_SHOTS, "home_shots")?,
            shots_on_target: optional_count(row, HOME_SOT, "home_shots_on_target")?,
            xg: optional_decimal(row, HOME_XG, "home_xg")?,
        },
        away_stats: SideStats {
            shots: optional_count(row, AWAY_SHOTS, "away_shots")?,
            shots_on_target: optional_count(row, AWAY_SOT, "away_shots_on_target")?,
            xg: optional_decimal(row, AWAY_XG, "away_xg")?,
        },
    })
}

pub fn check_event(
    row: &RawRow,
    cfg: &EngineConfig,
    known: &HashSet<String>,
) -> Result<EventRecord, SchemaError> {
    let match_id = required_text(row, MATCH_ID, "match_id")?;
    if !known.contains(&match_id) {
        return Err(SchemaError::UnknownMatch { match_id });
    }

    let raw_minute = required_text(row, MINUTE, "minute")?;
    let max = cfg.max_minute();
    let minute = parse_minute(&raw_minute)
        .filter(|m| *m <= max)
        .ok_or(SchemaError::MinuteOutOfRange {
            value: raw_minute,
            max,
        })?;

    let raw_kind = required_text(row, EVENT_KIND, "kind")?;
    let kind = EventKind::parse(&raw_kind).ok_or(SchemaError::UnknownEventKind { value: raw_kind })?;

    let player = required_text(row, PLAYER, "player")?;
    let team = required_text(row, TEAM, "team")?;

    Ok(EventRecord {
        match_id,
        line: row.line,
        minute,
        kind,
        player,
        team,
    })
}

pub fn check_player_line(row: &RawRow) -> Result<PlayerSeasonLine, SchemaError> {
    let player = required_text(row, PLAYER, "player")?;
    let club = required_text(row, CLUB, "club")?;

    let pass_accuracy = match row.first(PASS_ACCURACY) {
        None => None,
        Some((field, raw)) => Some(parse_percent(raw).ok_or(SchemaError::BadPercentage {
            field,
            value: raw.to_string(),
        })?),
    };

    Ok(PlayerSeasonLine {
        line: row.line,
        player,
        club,
        position: row.first(POSITION).and_then(|(_, v)| Position::parse(v)),
        appearances: optional_count(row, APPEARANCES, "appearances")?,
        minutes: optional_count(row, MINUTES, "minutes")?.unwrap_or(0),
        goals: optional_count(row, GOALS, "goals")?.unwrap_or(0),
        assists: optional_count(row, ASSISTS, "assists")?.unwrap_or(0),
        shots: optional_count(row, SHOTS, "shots")?.unwrap_or(0),
        shots_on_target: optional_count(row, SHOTS_ON_TARGET, "shots_on_target")?.unwrap_or(0),
        yellow_cards: optional_count(row, YELLOW_CARDS, "yellow_cards")?.unwrap_or(0),
        red_cards: optional_count(row, RED_CARDS, "red_cards")?.unwrap_or(0),
        passes: optional_count(row, PASSES, "passes")?.unwrap_or(0),
        pass_accuracy,
    })
}

fn required_text(row: &RawRow, columns: &[&'static str], field: &'static str) -> Result<String, SchemaError> {
    row.first(columns)
        .map(|(_, v)| v.to_string())
        .ok_or(SchemaError::MissingField { field })
}

fn required_count(row: &RawRow, columns: &[&'static str], field: &'static str) -> Result<u32, SchemaError> {
    optional_count(row, columns, field)?.ok_or(SchemaError::MissingField { field })
}

fn optional_count(
    row: &RawRow,
    columns: &[&'static str],
    field: &'static str,
) -> Result<Option<u32>, SchemaError> {
    let Some((_, raw)) = row.first(columns) else {
        return Ok(None);
    };
    let v = parse_number(raw).ok_or_else(|| SchemaError::BadNumber {
        field,
        value: raw.to_string(),
    })?;
    if v < 0.0 {
        return Err(SchemaError::Negative {
            field,
            value: raw.to_string(),
        });
    }
    if v.fract() != 0.0 || v > u32::MAX as f64 {
        return Err(SchemaError::BadNumber {
            field,
            value: raw.to_string(),
        });
    }
    Ok(Some(v as u32))
}

fn optional_decimal(
    row: &RawRow,
    columns: &[&'static str],
    field: &'static str,
) -> Result<Option<f64>, SchemaError> {
    let Some((_, raw)) = row.first(columns) else {
        return Ok(None);
    };
    let v = parse_number(raw).ok_or_else(|| SchemaError::BadNumber {
        field,
        value: raw.to_string(),
    })?;
    if v < 0.0 {
        return Err(SchemaError::Negative {
            field,
            value: raw.to_string(),
        });
    }
    Ok(Some(v))
}

pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() || s == "-" {
        return None;
    }
    let cleaned = s.replace(',', "");
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `"81.5%"` and `"81.5"` → 0.815; `"0.815"` is taken as already a fraction.
pub fn parse_percent(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let (body, explicit) = match s.strip_suffix('%') {
        Some(body) => (body, true),
        None => (s, false),
    };
    let v = parse_number(body)?;
    let fraction = if explicit || v > 1.0 { v / 100.0 } else { v };
    (0.0..=1.0).contains(&fraction).then_some(fraction)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    for fmt in ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%d/%m/%y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    // ISO timestamps: "2024-08-16T19:00:00Z", "2024-08-16 19:00"
    s.get(..10)
        .filter(|_| s.len() > 10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
}

/// `"67"`, `"67'"`, and stoppage notation `"90+4"` → 94.
pub fn parse_minute(raw: &str) -> Option<u32> {
    let s = raw.trim().trim_end_matches('\'');
    let mut total = 0u32;
    for part in s.split('+') {
        let part = part.trim();
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        total = total.checked_add(part.parse::<u32>().ok()?)?;
    }
    Some(total)
}
