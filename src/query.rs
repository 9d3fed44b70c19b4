//! Read-only access to computed rows, metrics, and standings.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::aggregate::{AggregateRow, Aggregation, Standing, aggregate};
use crate::aliases::{AliasKind, AliasTable, clean_name, fold_key};
use crate::config::EngineConfig;
use crate::error::QueryError;
use crate::metrics::{self, MetricName, MetricValue};
use crate::normalize::NormalizedBatch;
use crate::outcome::{self, Prob3};
use crate::records::{EntityKind, Identity, Position};
use crate::window::Window;

#[derive(Debug, Clone)]
struct WindowStore {
    aggregation: Aggregation,
    metrics: BTreeMap<Identity, BTreeMap<MetricName, MetricValue>>,
}

/// All windows of one analysis. Built once, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct MetricStore {
    aliases: Arc<AliasTable>,
    cfg: EngineConfig,
    windows: BTreeMap<Window, WindowStore>,
}

impl MetricStore {
    pub fn build(
        batch: &NormalizedBatch,
        windows: &[Window],
        aliases: Arc<AliasTable>,
        cfg: &EngineConfig,
    ) -> Self {
        let mut out = BTreeMap::new();
        for &window in windows {
            if out.contains_key(&window) {
                continue;
            }
            let aggregation = aggregate(batch, window, cfg);
            let baseline = aggregation
                .competition()
                .map(|r| r.tally.clone())
                .unwrap_or_default();
            let metrics = aggregation
                .rows
                .iter()
                .map(|(id, row)| (id.clone(), metrics::compute_all(row, &baseline, cfg)))
                .collect();
            out.insert(
                window,
                WindowStore {
                    aggregation,
                    metrics,
                },
            );
        }
        Self {
            aliases,
            cfg: cfg.clone(),
            windows: out,
        }
    }

    pub fn windows(&self) -> impl Iterator<Item = Window> + '_ {
        self.windows.keys().copied()
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    fn window(&self, window: Window) -> Result<&WindowStore, QueryError> {
        self.windows
            .get(&window)
            .ok_or_else(|| QueryError::WindowNotComputed {
                window: window.label(),
            })
    }

    pub fn row(&self, id: &Identity, window: Window) -> Option<&AggregateRow> {
        self.windows.get(&window)?.aggregation.row(id)
    }

    pub fn metric(&self, id: &Identity, window: Window, name: MetricName) -> Option<&MetricValue> {
        self.windows.get(&window)?.metrics.get(id)?.get(&name)
    }

    pub fn standings(&self, window: Window) -> Result<&[Standing], QueryError> {
        Ok(&self.window(window)?.aggregation.standings)
    }

    pub fn player_standings(&self, window: Window) -> Result<&[Standing], QueryError> {
        Ok(&self.window(window)?.aggregation.player_standings)
    }

    /// Canonical identity for a user-supplied name, if the window has it.
    pub fn resolve(&self, kind: EntityKind, raw: &str, window: Window) -> Option<Identity> {
        let store = self.windows.get(&window)?;
        let key = self.canonical_key(kind, raw);
        store
            .aggregation
            .rows
            .keys()
            .find(|id| id.kind == kind && fold_key(&id.name) == key)
            .cloned()
    }

    fn canonical_key(&self, kind: EntityKind, raw: &str) -> String {
        let alias_kind = match kind {
            EntityKind::Player => Some(AliasKind::Player),
            EntityKind::Team => Some(AliasKind::Team),
            EntityKind::Competition => None,
        };
        let resolved = alias_kind.and_then(|k| self.aliases.resolve(k, raw));
        fold_key(resolved.unwrap_or(&clean_name(raw)))
    }

    /// Home-perspective probabilities for `home` hosting `away`.
    pub fn matchup(&self, home: &str, away: &str, window: Window) -> Result<Matchup, QueryError> {
        let store = self.window(window)?;
        let find = |raw: &str| {
            self.resolve(EntityKind::Team, raw, window)
                .and_then(|id| store.aggregation.row(&id))
                .ok_or_else(|| QueryError::NotFound {
                    filter: format!("team {raw:?}"),
                })
        };
        let h = find(home)?;
        let a = find(away)?;
        let baseline = store
            .aggregation
            .competition()
            .map(|r| r.tally.clone())
            .unwrap_or_default();
        Ok(Matchup {
            home: h.entity.clone(),
            away: a.entity.clone(),
            window,
            probabilities: outcome::matchup_probs(&h.tally, &a.tally, &baseline, &self.cfg.outcome),
        })
    }

    pub fn query(&self, q: &Query) -> Result<QueryResult, QueryError> {
        let windows: Vec<Window> = if q.windows.is_empty() {
            self.windows.keys().copied().collect()
        } else {
            q.windows.clone()
        };

        let mut rows = Vec::new();
        let mut summaries = Vec::new();
        for window in windows {
            let store = self.window(window)?;
            let mut picked: Vec<QueryRow> = store
                .aggregation
                .rows
                .values()
                .filter(|r| self.admits(q, r))
                .map(|r| {
                    let standing = store.aggregation.standing(&r.entity).map(|s| s.position);
                    let metrics = store
                        .metrics
                        .get(&r.entity)
                        .map(|all| select_metrics(all, q.metrics.as_deref()))
                        .unwrap_or_default();
                    QueryRow {
                        entity: r.entity.clone(),
                        window,
                        standing,
                        aggregate: r.clone(),
                        metrics,
                    }
                })
                .collect();

            let sort_metric = match q.sort {
                SortKey::Metric(m) => Some(m),
                _ => None,
            };
            let sort_values: BTreeMap<Identity, Option<f64>> = picked
                .iter()
                .map(|r| {
                    let v = sort_metric
                        .and_then(|m| store.metrics.get(&r.entity)?.get(&m))
                        .and_then(MetricValue::sort_value);
                    (r.entity.clone(), v)
                })
                .collect();
            picked.sort_by(|a, b| compare(q, a, b, &sort_values));
            summaries.extend(PlayerSummary::over(window, &picked));
            if let Some(limit) = q.limit {
                picked.truncate(limit);
            }
            rows.extend(picked);
        }

        if rows.is_empty() {
            return Err(QueryError::NotFound {
                filter: q.describe(),
            });
        }
        Ok(QueryResult { rows, summaries })
    }

    fn admits(&self, q: &Query, r: &AggregateRow) -> bool {
        match q.kind {
            Some(kind) if r.entity.kind != kind => return false,
            None if r.entity.kind == EntityKind::Competition && q.names.is_empty() => return false,
            _ => {}
        }
        if !q.names.is_empty() {
            let hit = q.names.iter().any(|f| {
                let kinds: &[EntityKind] = match f.kind {
                    Some(ref k) => std::slice::from_ref(k),
                    None => &[EntityKind::Team, EntityKind::Player],
                };
                kinds.contains(&r.entity.kind)
                    && self.canonical_key(r.entity.kind, &f.name) == fold_key(&r.entity.name)
            });
            if !hit {
                return false;
            }
        }
        if let Some(club) = q.club.as_deref() {
            let key = self.canonical_key(EntityKind::Team, club);
            let own = match r.entity.kind {
                EntityKind::Team => Some(r.entity.name.as_str()),
                _ => r.club.as_deref(),
            };
            if own.map(fold_key).as_deref() != Some(key.as_str()) {
                return false;
            }
        }
        if q.position.is_some() && r.position != q.position {
            return false;
        }
        let minutes = r.tally.minutes;
        if q.min_minutes.is_some_and(|min| minutes < min) {
            return false;
        }
        if q.max_minutes.is_some_and(|max| minutes > max) {
            return false;
        }
        true
    }
}

fn select_metrics(
    all: &BTreeMap<MetricName, MetricValue>,
    wanted: Option<&[MetricName]>,
) -> BTreeMap<MetricName, MetricValue> {
    match wanted {
        None => all.clone(),
        Some(names) => all
            .iter()
            .filter(|(name, _)| names.contains(name))
            .map(|(name, value)| (*name, value.clone()))
            .collect(),
    }
}

fn compare(q: &Query, a: &QueryRow, b: &QueryRow, values: &BTreeMap<Identity, Option<f64>>) -> Ordering {
    let by_standing = |a: &QueryRow, b: &QueryRow| match (a.standing, b.standing) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    let by_name = |a: &QueryRow, b: &QueryRow| a.entity.name.cmp(&b.entity.name);

    let kind = a.entity.kind.cmp(&b.entity.kind);
    if kind != Ordering::Equal {
        return kind;
    }

    match q.sort {
        SortKey::Standing => {
            let ord = by_standing(a, b).then_with(|| by_name(a, b));
            if q.descending == Some(true) { ord.reverse() } else { ord }
        }
        SortKey::Name => {
            let ord = by_name(a, b);
            if q.descending == Some(true) { ord.reverse() } else { ord }
        }
        SortKey::Metric(_) => {
            let va = values.get(&a.entity).copied().flatten();
            let vb = values.get(&b.entity).copied().flatten();
            // rows without a value always sink
            match (va, vb) {
                (Some(x), Some(y)) => {
                    let ord = x.total_cmp(&y);
                    let ord = if q.descending == Some(false) { ord } else { ord.reverse() };
                    ord.then_with(|| by_standing(a, b)).then_with(|| by_name(a, b))
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => by_standing(a, b).then_with(|| by_name(a, b)),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Table order: points, goal difference, goals for, head-to-head, name.
    #[default]
    Standing,
    /// Highest first unless ascending; rows without a value last.
    Metric(MetricName),
    Name,
}

impl SortKey {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "standing" | "table" => Some(SortKey::Standing),
            "name" => Some(SortKey::Name),
            other => MetricName::parse(other).map(SortKey::Metric),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameFilter {
    pub kind: Option<EntityKind>,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub names: Vec<NameFilter>,
    pub kind: Option<EntityKind>,
    /// Empty means every computed window.
    pub windows: Vec<Window>,
    /// `None` means every metric that applies.
    pub metrics: Option<Vec<MetricName>>,
    pub club: Option<String>,
    pub position: Option<Position>,
    pub min_minutes: Option<u32>,
    pub max_minutes: Option<u32>,
    pub sort: SortKey,
    /// `None` keeps the key's natural direction.
    pub descending: Option<bool>,
    /// Applied per window.
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn teams() -> Self {
        Self::new().kind(EntityKind::Team)
    }

    pub fn players() -> Self {
        Self::new().kind(EntityKind::Player)
    }

    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn team(mut self, name: &str) -> Self {
        self.names.push(NameFilter {
            kind: Some(EntityKind::Team),
            name: name.to_string(),
        });
        self
    }

    pub fn player(mut self, name: &str) -> Self {
        self.names.push(NameFilter {
            kind: Some(EntityKind::Player),
            name: name.to_string(),
        });
        self
    }

    pub fn window(mut self, window: Window) -> Self {
        if !self.windows.contains(&window) {
            self.windows.push(window);
        }
        self
    }

    pub fn metric(mut self, name: MetricName) -> Self {
        let list = self.metrics.get_or_insert_with(Vec::new);
        if !list.contains(&name) {
            list.push(name);
        }
        self
    }

    pub fn club(mut self, club: &str) -> Self {
        self.club = Some(club.to_string());
        self
    }

    pub fn position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn minutes(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.min_minutes = min;
        self.max_minutes = max;
        self
    }

    pub fn sort_by(mut self, key: SortKey) -> Self {
        self.sort = key;
        self
    }

    pub fn descending(mut self, yes: bool) -> Self {
        self.descending = Some(yes);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        for f in &self.names {
            match f.kind {
                Some(EntityKind::Team) => parts.push(format!("team={}", f.name)),
                Some(EntityKind::Player) => parts.push(format!("player={}", f.name)),
                _ => parts.push(format!("name={}", f.name)),
            }
        }
        if let Some(k) = self.kind {
            parts.push(format!("kind={k:?}"));
        }
        if let Some(c) = &self.club {
            parts.push(format!("club={c}"));
        }
        if let Some(p) = self.position {
            parts.push(format!("position={p:?}"));
        }
        if let Some(m) = self.min_minutes {
            parts.push(format!("min_minutes={m}"));
        }
        if let Some(m) = self.max_minutes {
            parts.push(format!("max_minutes={m}"));
        }
        if parts.is_empty() {
            "any entity".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRow {
    pub entity: Identity,
    pub window: Window,
    /// Position in the window's table for the entity's kind.
    pub standing: Option<usize>,
    pub aggregate: AggregateRow,
    pub metrics: BTreeMap<MetricName, MetricValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub rows: Vec<QueryRow>,
    /// One per window with matched player rows.
    pub summaries: Vec<PlayerSummary>,
}

/// Totals over the player rows a query matched in one window, before `limit`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSummary {
    pub window: Window,
    pub players: usize,
    pub goals: u32,
    pub mean_assists: f64,
    pub mean_minutes: f64,
    /// Players without a known club are left out.
    pub goals_by_club: BTreeMap<String, u32>,
}

impl PlayerSummary {
    fn over(window: Window, rows: &[QueryRow]) -> Option<Self> {
        let players: Vec<&AggregateRow> = rows
            .iter()
            .map(|r| &r.aggregate)
            .filter(|a| a.entity.kind == EntityKind::Player)
            .collect();
        if players.is_empty() {
            return None;
        }
        let n = players.len() as f64;
        let mut goals_by_club: BTreeMap<String, u32> = BTreeMap::new();
        for p in &players {
            if let Some(club) = p.club.as_deref() {
                *goals_by_club.entry(club.to_string()).or_default() += p.tally.scored;
            }
        }
        Some(Self {
            window,
            players: players.len(),
            goals: players.iter().map(|p| p.tally.scored).sum(),
            mean_assists: players.iter().map(|p| f64::from(p.tally.assists)).sum::<f64>() / n,
            mean_minutes: players.iter().map(|p| f64::from(p.tally.minutes)).sum::<f64>() / n,
            goals_by_club,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Matchup {
    pub home: Identity,
    pub away: Identity,
    pub window: Window,
    pub probabilities: Prob3,
}
