//! Canonical names, duplicate matches, and deterministic ordering.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::aliases::{AliasKind, AliasTable, DiscoveredAlias, clean_name, fold_key};
use crate::error::{NameCollision, OrphanEvent, UnresolvedIdentity};
use crate::records::{EntityKind, EventRecord, MatchRecord, PlayerSeasonLine, Row};

/// Validated rows with canonical names, sorted and free of duplicate matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedBatch {
    /// Sorted by `(date, match_id)`.
    pub matches: Vec<MatchRecord>,
    /// Sorted by `(match_id, minute)`.
    pub events: Vec<EventRecord>,
    pub players: Vec<PlayerSeasonLine>,
    pub alias_version: u64,
}

impl NormalizedBatch {
    pub fn into_rows(self) -> Vec<Row> {
        let mut rows = Vec::with_capacity(self.matches.len() + self.events.len() + self.players.len());
        rows.extend(self.matches.into_iter().map(Row::Match));
        rows.extend(self.events.into_iter().map(Row::Event));
        rows.extend(self.players.into_iter().map(Row::PlayerSeason));
        rows
    }

    pub fn latest_date(&self) -> Option<chrono::NaiveDate> {
        self.matches.iter().map(|m| m.date).max()
    }

    pub fn teams(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        for m in &self.matches {
            out.insert(m.home.as_str());
            out.insert(m.away.as_str());
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalization {
    pub batch: NormalizedBatch,
    pub unresolved: Vec<UnresolvedIdentity>,
    pub discovered: Vec<DiscoveredAlias>,
    /// Match ids that appeared more than once; the last occurrence was kept.
    pub superseded: Vec<String>,
    pub collisions: Vec<NameCollision>,
    /// Events whose resolved team is not a side of their match.
    pub orphaned: Vec<OrphanEvent>,
}

/// Resolves every name through `aliases`, minting canonical names for the rest.
///
/// Unknown names are grouped by [`fold_key`]; the group's canonical name is its
/// lexicographically smallest cleaned spelling, so the result does not depend
/// on row order.
struct Resolver<'a> {
    aliases: &'a AliasTable,
    minted: HashMap<(AliasKind, String), String>,
}

impl<'a> Resolver<'a> {
    fn new(aliases: &'a AliasTable, rows: &[Row]) -> Self {
        let mut variants: BTreeMap<(AliasKind, String), BTreeSet<String>> = BTreeMap::new();
        let mut note = |kind: AliasKind, raw: &str| {
            if aliases.resolve(kind, raw).is_none() {
                variants
                    .entry((kind, fold_key(raw)))
                    .or_default()
                    .insert(clean_name(raw));
            }
        };
        for row in rows {
            match row {
                Row::Match(m) => {
                    note(AliasKind::Team, &m.home);
                    note(AliasKind::Team, &m.away);
                }
                Row::Event(e) => {
                    note(AliasKind::Team, &e.team);
                    note(AliasKind::Player, &e.player);
                }
                Row::PlayerSeason(p) => {
                    note(AliasKind::Team, &p.club);
                    note(AliasKind::Player, &p.player);
                }
            }
        }

        let minted = variants
            .into_iter()
            .filter_map(|(key, names)| names.into_iter().next().map(|first| (key, first)))
            .collect();
        Self { aliases, minted }
    }

    fn resolve(&self, kind: AliasKind, raw: &str) -> String {
        if let Some(c) = self.aliases.resolve(kind, raw) {
            return c.to_string();
        }
        self.minted
            .get(&(kind, fold_key(raw)))
            .cloned()
            .unwrap_or_else(|| clean_name(raw))
    }
}

pub fn normalize(rows: Vec<Row>, aliases: &AliasTable) -> Normalization {
    let resolver = Resolver::new(aliases, &rows);

    let mut unresolved_seen: BTreeSet<(AliasKind, String)> = BTreeSet::new();
    let mut track = |kind: AliasKind, raw: &str| {
        if aliases.resolve(kind, raw).is_none() {
            unresolved_seen.insert((kind, clean_name(raw)));
        }
    };

    let mut by_id: HashMap<String, MatchRecord> = HashMap::new();
    let mut id_counts: HashMap<String, usize> = HashMap::new();
    let mut events = Vec::new();
    let mut players = Vec::new();

    for row in rows {
        match row {
            Row::Match(mut m) => {
                track(AliasKind::Team, &m.home);
                track(AliasKind::Team, &m.away);
                m.home = resolver.resolve(AliasKind::Team, &m.home);
                m.away = resolver.resolve(AliasKind::Team, &m.away);
                *id_counts.entry(m.match_id.clone()).or_default() += 1;
                by_id.insert(m.match_id.clone(), m);
            }
            Row::Event(mut e) => {
                track(AliasKind::Team, &e.team);
                track(AliasKind::Player, &e.player);
                e.team = resolver.resolve(AliasKind::Team, &e.team);
                e.player = resolver.resolve(AliasKind::Player, &e.player);
                events.push(e);
            }
            Row::PlayerSeason(mut p) => {
                track(AliasKind::Team, &p.club);
                track(AliasKind::Player, &p.player);
                p.club = resolver.resolve(AliasKind::Team, &p.club);
                p.player = resolver.resolve(AliasKind::Player, &p.player);
                players.push(p);
            }
        }
    }

    let mut superseded: Vec<String> = id_counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(id, _)| id)
        .collect();
    superseded.sort();
    for id in &superseded {
        tracing::warn!(match_id = %id, "duplicate match id; keeping the last row");
    }

    let mut collided: HashMap<String, (usize, String)> = HashMap::new();
    by_id.retain(|id, m| {
        if m.home == m.away {
            collided.insert(id.clone(), (m.line, m.home.clone()));
            false
        } else {
            true
        }
    });

    let mut dropped_by_match: HashMap<String, usize> = HashMap::new();
    let mut orphaned = Vec::new();
    events.retain(|e| {
        if collided.contains_key(&e.match_id) {
            *dropped_by_match.entry(e.match_id.clone()).or_default() += 1;
            return false;
        }
        match by_id.get(&e.match_id) {
            Some(m) if m.side_of(&e.team).is_some() => true,
            _ => {
                orphaned.push(OrphanEvent {
                    match_id: e.match_id.clone(),
                    line: e.line,
                    team: e.team.clone(),
                    player: e.player.clone(),
                });
                false
            }
        }
    });
    orphaned.sort_by(|a, b| a.match_id.cmp(&b.match_id).then(a.line.cmp(&b.line)));
    for o in &orphaned {
        tracing::warn!(match_id = %o.match_id, line = o.line, team = %o.team, "event team does not play in its match; dropped");
    }

    let mut collisions: Vec<NameCollision> = collided
        .into_iter()
        .map(|(match_id, (line, team))| NameCollision {
            dropped_events: dropped_by_match.get(&match_id).copied().unwrap_or(0),
            match_id,
            line,
            team,
        })
        .collect();
    collisions.sort_by(|a, b| a.match_id.cmp(&b.match_id));
    for c in &collisions {
        tracing::warn!(match_id = %c.match_id, team = %c.team, "both sides resolve to one team; match dropped");
    }

    let mut matches: Vec<MatchRecord> = by_id.into_values().collect();
    matches.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.match_id.cmp(&b.match_id)));

    events.sort_by(|a, b| {
        a.match_id
            .cmp(&b.match_id)
            .then(a.minute.cmp(&b.minute))
            .then(a.kind.cmp(&b.kind))
            .then_with(|| a.team.cmp(&b.team))
            .then_with(|| a.player.cmp(&b.player))
            .then(a.line.cmp(&b.line))
    });

    players.sort_by(|a, b| {
        a.player
            .cmp(&b.player)
            .then_with(|| a.club.cmp(&b.club))
            .then(a.line.cmp(&b.line))
    });

    let mut unresolved = Vec::new();
    let mut discovered = Vec::new();
    for (kind, raw) in unresolved_seen {
        let assigned = resolver.resolve(kind, &raw);
        unresolved.push(UnresolvedIdentity {
            kind: match kind {
                AliasKind::Team => EntityKind::Team,
                AliasKind::Player => EntityKind::Player,
            },
            raw: raw.clone(),
            assigned: assigned.clone(),
        });
        discovered.push(DiscoveredAlias {
            kind,
            raw,
            canonical: assigned,
        });
    }

    tracing::debug!(
        matches = matches.len(),
        events = events.len(),
        players = players.len(),
        unresolved = unresolved.len(),
        "normalized batch"
    );

    Normalization {
        batch: NormalizedBatch {
            matches,
            events,
            players,
            alias_version: aliases.version(),
        },
        unresolved,
        discovered,
        superseded,
        collisions,
        orphaned,
    }
}
