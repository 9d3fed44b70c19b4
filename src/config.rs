use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const ENV_PREFIX: &str = "SEASON_METRICS_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonBounds {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl SeasonBounds {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeConfig {
    /// Pseudo-matches of league-average form blended into every team rating.
    pub prior_matches: f64,
    // Dixon-Coles rho (typically negative to increase low-score draws).
    pub dc_rho: f64,
    pub max_goals: u32,
    /// Goals per team per match used when the window holds no matches.
    pub default_goals_per_match: f64,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            prior_matches: 6.0,
            dc_rho: -0.10,
            max_goals: 10,
            default_goals_per_match: 1.30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub min_matches: u32,
    pub strong: f64,
    pub weak: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_matches: 5,
            strong: 1.15,
            weak: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub season: Option<SeasonBounds>,
    pub match_minutes: u32,
    pub stoppage_bound: u32,
    pub outcome: OutcomeConfig,
    pub strategy: StrategyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            season: None,
            match_minutes: 90,
            stoppage_bound: 30,
            outcome: OutcomeConfig::default(),
            strategy: StrategyConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read engine config {}", path.display()))?;
        let cfg: EngineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parse engine config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Defaults overlaid with `SEASON_METRICS_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which receives the full variable name.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        fn parse<T: FromStr>(raw: Option<String>) -> Option<T> {
            raw.and_then(|v| v.parse::<T>().ok())
        }

        if let Some(v) = parse(get("MATCH_MINUTES")) {
            self.match_minutes = v;
        }
        if let Some(v) = parse(get("STOPPAGE_BOUND")) {
            self.stoppage_bound = v;
        }
        if let Some(v) = parse(get("PRIOR_MATCHES")) {
            self.outcome.prior_matches = v;
        }
        if let Some(v) = parse(get("DC_RHO")) {
            self.outcome.dc_rho = v;
        }
        if let Some(v) = parse(get("MAX_GOALS")) {
            self.outcome.max_goals = v;
        }
        if let Some(v) = parse(get("MIN_CLASSIFY_MATCHES")) {
            self.strategy.min_matches = v;
        }

        let start = parse::<NaiveDate>(get("SEASON_START"));
        let end = parse::<NaiveDate>(get("SEASON_END"));
        if let (Some(start), Some(end)) = (start, end) {
            let label = get("SEASON_LABEL").unwrap_or_else(|| {
                format!("{}/{}", start.format("%Y"), end.format("%y"))
            });
            self.season = Some(SeasonBounds { label, start, end });
        }

        self.sanitized()
    }

    pub fn max_minute(&self) -> u32 {
        self.match_minutes.saturating_add(self.stoppage_bound)
    }

    fn sanitized(mut self) -> Self {
        self.match_minutes = self.match_minutes.clamp(1, 200);
        self.stoppage_bound = self.stoppage_bound.min(60);
        self.outcome.prior_matches = self.outcome.prior_matches.clamp(0.0, 100.0);
        self.outcome.dc_rho = self.outcome.dc_rho.clamp(-0.25, 0.05);
        self.outcome.max_goals = self.outcome.max_goals.clamp(4, 15);
        self.outcome.default_goals_per_match =
            self.outcome.default_goals_per_match.clamp(0.20, 3.80);
        self.strategy.weak = self.strategy.weak.clamp(0.0, 1.0);
        self.strategy.strong = self.strategy.strong.max(1.0);
        if let Some(season) = self.season.as_ref() {
            if season.start > season.end {
                tracing::warn!(
                    "season {} starts after it ends; ignoring bounds",
                    season.label
                );
                self.season = None;
            }
        }
        self
    }
}
