//! Named metrics derived from aggregate rows.
//!
//! Every metric is a pure function of one row plus the competition baseline
//! of the same window.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateRow, Tally};
use crate::config::EngineConfig;
use crate::outcome::{self, Prob3};
use crate::records::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    PointsPerMatch,
    WinRate,
    EfficiencyRatio,
    ShotAccuracy,
    GoalsForPerMatch,
    GoalsAgainstPerMatch,
    CleanSheetRate,
    XgDifferential,
    XgOverperformance,
    DisciplineIndex,
    GoalsPer90,
    AssistsPer90,
    GoalContributionsPer90,
    PassAccuracy,
    OutcomeLikelihood,
    Strategy,
}

impl MetricName {
    pub const ALL: [MetricName; 16] = [
        MetricName::PointsPerMatch,
        MetricName::WinRate,
        MetricName::EfficiencyRatio,
        MetricName::ShotAccuracy,
        MetricName::GoalsForPerMatch,
        MetricName::GoalsAgainstPerMatch,
        MetricName::CleanSheetRate,
        MetricName::XgDifferential,
        MetricName::XgOverperformance,
        MetricName::DisciplineIndex,
        MetricName::GoalsPer90,
        MetricName::AssistsPer90,
        MetricName::GoalContributionsPer90,
        MetricName::PassAccuracy,
        MetricName::OutcomeLikelihood,
        MetricName::Strategy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricName::PointsPerMatch => "points_per_match",
            MetricName::WinRate => "win_rate",
            MetricName::EfficiencyRatio => "efficiency_ratio",
            MetricName::ShotAccuracy => "shot_accuracy",
            MetricName::GoalsForPerMatch => "goals_for_per_match",
            MetricName::GoalsAgainstPerMatch => "goals_against_per_match",
            MetricName::CleanSheetRate => "clean_sheet_rate",
            MetricName::XgDifferential => "xg_differential",
            MetricName::XgOverperformance => "xg_overperformance",
            MetricName::DisciplineIndex => "discipline_index",
            MetricName::GoalsPer90 => "goals_per_90",
            MetricName::AssistsPer90 => "assists_per_90",
            MetricName::GoalContributionsPer90 => "goal_contributions_per_90",
            MetricName::PassAccuracy => "pass_accuracy",
            MetricName::OutcomeLikelihood => "outcome_likelihood",
            MetricName::Strategy => "strategy",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|m| m.as_str() == key)
    }

    pub fn applies_to(self, kind: EntityKind) -> bool {
        use MetricName::*;
        match self {
            GoalsPer90 | AssistsPer90 | GoalContributionsPer90 | PassAccuracy => {
                kind == EntityKind::Player
            }
            XgDifferential | XgOverperformance | OutcomeLikelihood | Strategy => {
                kind == EntityKind::Team
            }
            _ => true,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Dominant,
    Expansive,
    AttackMinded,
    Fragile,
    Defensive,
    Balanced,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricValue {
    Number { value: f64 },
    Probabilities(Prob3),
    Label { label: Strategy },
    InsufficientData { reason: String },
}

impl MetricValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number { value } => Some(*value),
            _ => None,
        }
    }

    /// Sort key: numbers as-is, win probability for outcome triples.
    pub fn sort_value(&self) -> Option<f64> {
        match self {
            MetricValue::Number { value } => Some(*value),
            MetricValue::Probabilities(p) => Some(p.win),
            MetricValue::Label { .. } | MetricValue::InsufficientData { .. } => None,
        }
    }

    pub fn is_insufficient(&self) -> bool {
        matches!(self, MetricValue::InsufficientData { .. })
    }
}

fn insufficient(reason: &str) -> MetricValue {
    MetricValue::InsufficientData {
        reason: reason.to_string(),
    }
}

fn ratio(numer: f64, denom: u32, reason: &str) -> MetricValue {
    if denom == 0 {
        return insufficient(reason);
    }
    MetricValue::Number {
        value: numer / f64::from(denom),
    }
}

fn per_90(count: u32, minutes: u32) -> MetricValue {
    if minutes == 0 {
        return insufficient("no minutes played");
    }
    MetricValue::Number {
        value: f64::from(count) * 90.0 / f64::from(minutes),
    }
}

const NO_MATCHES: &str = "no matches in window";

pub fn compute(name: MetricName, row: &AggregateRow, competition: &Tally, cfg: &EngineConfig) -> MetricValue {
    let t = &row.tally;
    let n = t.matches_played;
    // Team goals only count from matches whose shots are known.
    let goals = if row.entity.kind == EntityKind::Player {
        t.scored
    } else {
        t.shots_goals_for
    };
    match name {
        MetricName::PointsPerMatch => ratio(f64::from(t.points()), n, NO_MATCHES),
        MetricName::WinRate => ratio(f64::from(t.wins), n, NO_MATCHES),
        MetricName::EfficiencyRatio => ratio(f64::from(goals), t.shots_taken, "no shots recorded"),
        MetricName::ShotAccuracy => ratio(f64::from(t.shots_on_target), t.target_shots, "no shots on target recorded"),
        MetricName::GoalsForPerMatch => ratio(f64::from(t.goals_for), n, NO_MATCHES),
        MetricName::GoalsAgainstPerMatch => ratio(f64::from(t.goals_against), n, NO_MATCHES),
        MetricName::CleanSheetRate => ratio(f64::from(t.clean_sheets), n, NO_MATCHES),
        MetricName::XgDifferential => {
            if t.xg_matches == 0 {
                insufficient("no expected-goals data")
            } else {
                MetricValue::Number {
                    value: t.xg_for - t.xg_against,
                }
            }
        }
        MetricName::XgOverperformance => {
            if t.xg_matches == 0 {
                insufficient("no expected-goals data")
            } else {
                MetricValue::Number {
                    value: f64::from(t.xg_goals_for) - t.xg_for,
                }
            }
        }
        MetricName::DisciplineIndex => ratio(
            f64::from(t.yellow_cards) + 3.0 * f64::from(t.red_cards),
            t.appearances,
            NO_MATCHES,
        ),
        MetricName::GoalsPer90 => per_90(t.scored, t.minutes),
        MetricName::AssistsPer90 => per_90(t.assists, t.minutes),
        MetricName::GoalContributionsPer90 => per_90(t.scored + t.assists, t.minutes),
        MetricName::PassAccuracy => ratio(f64::from(t.passes_completed), t.passes, "no passes recorded"),
        MetricName::OutcomeLikelihood => match outcome::outcome_probs(t, competition, &cfg.outcome) {
            Some(p) => MetricValue::Probabilities(p),
            None => insufficient(NO_MATCHES),
        },
        MetricName::Strategy => classify_strategy(t, competition, cfg),
    }
}

/// Every metric that applies to the row's entity kind.
pub fn compute_all(row: &AggregateRow, competition: &Tally, cfg: &EngineConfig) -> BTreeMap<MetricName, MetricValue> {
    MetricName::ALL
        .into_iter()
        .filter(|m| m.applies_to(row.entity.kind))
        .map(|m| (m, compute(m, row, competition, cfg)))
        .collect()
}

fn classify_strategy(t: &Tally, competition: &Tally, cfg: &EngineConfig) -> MetricValue {
    let s = &cfg.strategy;
    if t.matches_played < s.min_matches.max(1) {
        return insufficient(&format!(
            "needs at least {} matches, has {}",
            s.min_matches, t.matches_played
        ));
    }
    let mu = outcome::baseline_goals(competition, &cfg.outcome);
    let n = f64::from(t.matches_played);
    let attack = f64::from(t.goals_for) / n / mu;
    let concede = f64::from(t.goals_against) / n / mu;

    let label = if attack >= s.strong && concede <= s.weak {
        Strategy::Dominant
    } else if attack >= s.strong && concede >= s.strong {
        Strategy::Expansive
    } else if attack >= s.strong {
        Strategy::AttackMinded
    } else if attack <= s.weak && concede >= s.strong {
        Strategy::Fragile
    } else if concede <= s.weak {
        Strategy::Defensive
    } else {
        Strategy::Balanced
    };
    MetricValue::Label { label }
}
