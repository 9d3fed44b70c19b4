use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Match,
    Event,
    PlayerSeason,
}

/// Loosely-typed row as handed over by the ingestion boundary.
///
/// Column names are folded with [`column_key`] on insert, so `"Home Team"`,
/// `"home_team"` and `"HOME-TEAM"` address the same cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub kind: RowKind,
    pub line: usize,
    pub cells: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new(kind: RowKind, line: usize) -> Self {
        Self {
            kind,
            line,
            cells: BTreeMap::new(),
        }
    }

    pub fn from_pairs<K, V>(kind: RowKind, line: usize, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut row = Self::new(kind, line);
        for (k, v) in pairs {
            row.insert(k.as_ref(), v);
        }
        row
    }

    pub fn insert(&mut self, column: &str, value: impl Into<String>) {
        self.cells.insert(column_key(column), value.into());
    }

    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.insert(column, value);
        self
    }

    /// Trimmed cell value; empty cells and `-` count as missing.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .get(&column_key(column))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty() && *s != "-")
    }

    /// First present cell among `columns`, with the column it came from.
    pub fn first(&self, columns: &[&'static str]) -> Option<(&'static str, &str)> {
        columns
            .iter()
            .find_map(|c| self.get(c).map(|v| (*c, v)))
    }
}

/// `"Passes%"` → `passes_pct`, `"Player Name"` → `player_name`.
pub fn column_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 4);
    let mut pending_sep = false;
    for c in raw.trim().chars() {
        if c == '%' {
            if !out.is_empty() {
                out.push('_');
            }
            out.push_str("pct");
            pending_sep = false;
            continue;
        }
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            pending_sep = false;
        } else {
            pending_sep = true;
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Home,
    Away,
}

/// Result from one side's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Draw,
    Loss,
}

impl Outcome {
    pub fn from_goals(goals_for: u32, goals_against: u32) -> Self {
        match goals_for.cmp(&goals_against) {
            std::cmp::Ordering::Greater => Outcome::Win,
            std::cmp::Ordering::Less => Outcome::Loss,
            std::cmp::Ordering::Equal => Outcome::Draw,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Outcome::Win => 'W',
            Outcome::Draw => 'D',
            Outcome::Loss => 'L',
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SideStats {
    pub shots: Option<u32>,
    pub shots_on_target: Option<u32>,
    pub xg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: String,
    pub line: usize,
    pub date: NaiveDate,
    pub home: String,
    pub away: String,
    pub home_goals: u32,
    pub away_goals: u32,
    pub round: Option<u32>,
    pub venue: Option<String>,
    pub home_stats: SideStats,
    pub away_stats: SideStats,
}

impl MatchRecord {
    pub fn side_of(&self, team: &str) -> Option<Side> {
        if self.home == team {
            Some(Side::Home)
        } else if self.away == team {
            Some(Side::Away)
        } else {
            None
        }
    }

    pub fn team(&self, side: Side) -> &str {
        match side {
            Side::Home => &self.home,
            Side::Away => &self.away,
        }
    }

    /// `(goals_for, goals_against)` for `side`.
    pub fn goals(&self, side: Side) -> (u32, u32) {
        match side {
            Side::Home => (self.home_goals, self.away_goals),
            Side::Away => (self.away_goals, self.home_goals),
        }
    }

    /// `(own, opponent)` shot/xG stats for `side`.
    pub fn stats(&self, side: Side) -> (SideStats, SideStats) {
        match side {
            Side::Home => (self.home_stats, self.away_stats),
            Side::Away => (self.away_stats, self.home_stats),
        }
    }

    pub fn outcome(&self, side: Side) -> Outcome {
        let (gf, ga) = self.goals(side);
        Outcome::from_goals(gf, ga)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Goal,
    OwnGoal,
    Assist,
    ShotOnTarget,
    ShotOffTarget,
    YellowCard,
    RedCard,
    SubOn,
    SubOff,
}

impl EventKind {
    pub fn parse(raw: &str) -> Option<Self> {
        let key = column_key(raw);
        let kind = match key.as_str() {
            "goal" | "penalty_goal" | "scored_penalty" => EventKind::Goal,
            "own_goal" | "og" => EventKind::OwnGoal,
            "assist" => EventKind::Assist,
            "shot_on_target" | "sot" | "saved_shot" => EventKind::ShotOnTarget,
            "shot" | "shot_off_target" | "missed_shot" | "blocked_shot" => EventKind::ShotOffTarget,
            "yellow" | "yellow_card" | "yc" => EventKind::YellowCard,
            "red" | "red_card" | "rc" | "second_yellow" => EventKind::RedCard,
            // a bare "substitution" names the player coming on
            "sub_on" | "substitution" | "substitution_on" | "substitution_in" | "sub_in" | "sub" => {
                EventKind::SubOn
            }
            "sub_off" | "substitution_off" | "substitution_out" | "sub_out" => EventKind::SubOff,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub match_id: String,
    pub line: usize,
    pub minute: u32,
    pub kind: EventKind,
    pub player: String,
    pub team: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Position {
    Goalkeeper,
    Defender,
    Midfielder,
    Attacker,
}

impl Position {
    pub fn parse(raw: &str) -> Option<Self> {
        let s = raw.trim().to_lowercase();
        if s.contains("goalkeeper") || s.contains("keeper") || s == "gk" || s == "gkp" {
            return Some(Position::Goalkeeper);
        }
        if s.contains("defender") || s.contains("back") || s == "def" || s == "df" {
            return Some(Position::Defender);
        }
        if s.contains("midfield") || s == "mid" || s == "mf" {
            return Some(Position::Midfielder);
        }
        if s.contains("attacker")
            || s.contains("forward")
            || s.contains("striker")
            || s.contains("wing")
            || s == "fwd"
            || s == "fw"
        {
            return Some(Position::Attacker);
        }
        None
    }
}

/// One player's season totals, as published in per-player stat tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSeasonLine {
    pub line: usize,
    pub player: String,
    pub club: String,
    pub position: Option<Position>,
    pub appearances: Option<u32>,
    pub minutes: u32,
    pub goals: u32,
    pub assists: u32,
    pub shots: u32,
    pub shots_on_target: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    pub passes: u32,
    /// Completed share of `passes`, in `[0, 1]`.
    pub pass_accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Row {
    Match(MatchRecord),
    Event(EventRecord),
    PlayerSeason(PlayerSeasonLine),
}

impl Row {
    pub fn kind(&self) -> RowKind {
        match self {
            Row::Match(_) => RowKind::Match,
            Row::Event(_) => RowKind::Event,
            Row::PlayerSeason(_) => RowKind::PlayerSeason,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Competition,
    Team,
    Player,
}

/// Canonical identity of a team, player, or the competition baseline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    pub kind: EntityKind,
    pub name: String,
}

pub const COMPETITION_NAME: &str = "competition";

impl Identity {
    pub fn team(name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Team,
            name: name.into(),
        }
    }

    pub fn player(name: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Player,
            name: name.into(),
        }
    }

    pub fn competition() -> Self {
        Self {
            kind: EntityKind::Competition,
            name: COMPETITION_NAME.to_string(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EntityKind::Competition => write!(f, "competition"),
            EntityKind::Team => write!(f, "team:{}", self.name),
            EntityKind::Player => write!(f, "player:{}", self.name),
        }
    }
}
