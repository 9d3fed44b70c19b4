//! Per-window tallies and standings.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::config::EngineConfig;
use crate::normalize::NormalizedBatch;
use crate::records::{
    EntityKind, EventKind, EventRecord, Identity, MatchRecord, Outcome, PlayerSeasonLine, Position,
    Side,
};
use crate::window::Window;

const FORM_LEN: usize = 5;

/// Summed raw quantities for one entity over one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tally {
    pub matches_played: u32,
    /// Equals `matches_played` except for players with a season line.
    pub appearances: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub home_matches: u32,
    pub home_goals_for: u32,
    pub home_goals_against: u32,
    pub shots_taken: u32,
    pub shots_on_target: u32,
    /// Shots from matches that also report shots on target.
    pub target_shots: u32,
    pub shots_faced: u32,
    /// Matches with a shot count published for this side.
    pub shots_matches: u32,
    /// Goals for in the `shots_matches`.
    pub shots_goals_for: u32,
    pub xg_for: f64,
    pub xg_against: f64,
    /// Matches with xG published for both sides.
    pub xg_matches: u32,
    /// Goals for in the `xg_matches`.
    pub xg_goals_for: u32,
    pub clean_sheets: u32,
    pub failed_to_score: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
    pub scored: u32,
    pub assists: u32,
    pub own_goals: u32,
    pub minutes: u32,
    pub sub_appearances: u32,
    /// Pass attempts with a known completion rate.
    pub passes: u32,
    pub passes_completed: u32,
}

impl Tally {
    pub fn points(&self) -> u32 {
        3 * self.wins + self.draws
    }

    pub fn goal_difference(&self) -> i64 {
        i64::from(self.goals_for) - i64::from(self.goals_against)
    }

    /// Result-bearing fields from one match, seen from `side`.
    fn record_result(&mut self, m: &MatchRecord, side: Side) {
        let (gf, ga) = m.goals(side);
        self.matches_played += 1;
        self.appearances += 1;
        self.goals_for += gf;
        self.goals_against += ga;
        match m.outcome(side) {
            Outcome::Win => self.wins += 1,
            Outcome::Draw => self.draws += 1,
            Outcome::Loss => self.losses += 1,
        }
        if side == Side::Home {
            self.home_matches += 1;
            self.home_goals_for += gf;
            self.home_goals_against += ga;
        }
        if ga == 0 {
            self.clean_sheets += 1;
        }
        if gf == 0 {
            self.failed_to_score += 1;
        }
    }

    fn record_team_stats(&mut self, m: &MatchRecord, side: Side) {
        let (own, opp) = m.stats(side);
        if let Some(shots) = own.shots {
            self.shots_taken += shots;
            self.shots_matches += 1;
            self.shots_goals_for += m.goals(side).0;
            if let Some(on_target) = own.shots_on_target {
                self.shots_on_target += on_target;
                self.target_shots += shots;
            }
        }
        self.shots_faced += opp.shots.unwrap_or(0);
        if let (Some(xf), Some(xa)) = (own.xg, opp.xg) {
            self.xg_for += xf;
            self.xg_against += xa;
            self.xg_matches += 1;
            self.xg_goals_for += m.goals(side).0;
        }
    }

    fn record_team_event(&mut self, e: &EventRecord) {
        match e.kind {
            EventKind::YellowCard => self.yellow_cards += 1,
            EventKind::RedCard => self.red_cards += 1,
            EventKind::OwnGoal => self.own_goals += 1,
            _ => {}
        }
    }

    /// Personal counts from one player's events in one match.
    fn record_player_events(&mut self, events: &[&EventRecord], match_minutes: u32) {
        let mut start = 0;
        let mut end = match_minutes;
        for e in events {
            match e.kind {
                EventKind::Goal => {
                    self.scored += 1;
                    self.shots_taken += 1;
                    self.target_shots += 1;
                    self.shots_on_target += 1;
                }
                EventKind::ShotOnTarget => {
                    self.shots_taken += 1;
                    self.target_shots += 1;
                    self.shots_on_target += 1;
                }
                EventKind::ShotOffTarget => {
                    self.shots_taken += 1;
                    self.target_shots += 1;
                }
                EventKind::Assist => self.assists += 1,
                EventKind::OwnGoal => self.own_goals += 1,
                EventKind::YellowCard => self.yellow_cards += 1,
                EventKind::RedCard => {
                    self.red_cards += 1;
                    end = end.min(e.minute);
                }
                EventKind::SubOn => {
                    self.sub_appearances += 1;
                    start = e.minute;
                }
                EventKind::SubOff => end = end.min(e.minute),
            }
        }
        self.minutes += end.saturating_sub(start);
    }

    /// Season totals replace event-derived personal counts.
    fn apply_season_lines(&mut self, lines: &[&PlayerSeasonLine]) {
        let mut appearances = 0;
        let mut personal = Tally::default();
        for l in lines {
            appearances += l.appearances.unwrap_or(0);
            personal.scored += l.goals;
            personal.assists += l.assists;
            personal.shots_taken += l.shots;
            personal.shots_on_target += l.shots_on_target;
            personal.yellow_cards += l.yellow_cards;
            personal.red_cards += l.red_cards;
            personal.minutes += l.minutes;
            if let Some(acc) = l.pass_accuracy {
                personal.passes += l.passes;
                personal.passes_completed += (f64::from(l.passes) * acc).round() as u32;
            }
        }
        self.appearances = self.matches_played.max(appearances);
        self.scored = personal.scored;
        self.assists = personal.assists;
        self.shots_taken = personal.shots_taken;
        self.shots_on_target = personal.shots_on_target;
        self.target_shots = personal.shots_taken;
        self.yellow_cards = personal.yellow_cards;
        self.red_cards = personal.red_cards;
        self.minutes = personal.minutes;
        self.passes = personal.passes;
        self.passes_completed = personal.passes_completed;
    }

    pub fn absorb(&mut self, o: &Tally) {
        self.matches_played += o.matches_played;
        self.appearances += o.appearances;
        self.wins += o.wins;
        self.draws += o.draws;
        self.losses += o.losses;
        self.goals_for += o.goals_for;
        self.goals_against += o.goals_against;
        self.home_matches += o.home_matches;
        self.home_goals_for += o.home_goals_for;
        self.home_goals_against += o.home_goals_against;
        self.shots_taken += o.shots_taken;
        self.shots_on_target += o.shots_on_target;
        self.target_shots += o.target_shots;
        self.shots_faced += o.shots_faced;
        self.shots_matches += o.shots_matches;
        self.shots_goals_for += o.shots_goals_for;
        self.xg_for += o.xg_for;
        self.xg_against += o.xg_against;
        self.xg_matches += o.xg_matches;
        self.xg_goals_for += o.xg_goals_for;
        self.clean_sheets += o.clean_sheets;
        self.failed_to_score += o.failed_to_score;
        self.yellow_cards += o.yellow_cards;
        self.red_cards += o.red_cards;
        self.scored += o.scored;
        self.assists += o.assists;
        self.own_goals += o.own_goals;
        self.minutes += o.minutes;
        self.sub_appearances += o.sub_appearances;
        self.passes += o.passes;
        self.passes_completed += o.passes_completed;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub entity: Identity,
    pub window: Window,
    pub tally: Tally,
    /// Last five results, most recent first (`"WWDLW"`).
    pub form: String,
    pub club: Option<String>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Standing {
    pub position: usize,
    pub entity: Identity,
    pub points: u32,
    pub goal_difference: i64,
    pub goals_for: u32,
    /// Set only when the entity was level with others on the first three keys.
    pub head_to_head_points: Option<u32>,
    pub head_to_head_goal_difference: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct Aggregation {
    pub window: Window,
    pub rows: BTreeMap<Identity, AggregateRow>,
    pub standings: Vec<Standing>,
    pub player_standings: Vec<Standing>,
}

impl Aggregation {
    pub fn row(&self, id: &Identity) -> Option<&AggregateRow> {
        self.rows.get(id)
    }

    pub fn competition(&self) -> Option<&AggregateRow> {
        self.rows.get(&Identity::competition())
    }

    pub fn standing(&self, id: &Identity) -> Option<&Standing> {
        let table = match id.kind {
            EntityKind::Team => &self.standings,
            EntityKind::Player => &self.player_standings,
            EntityKind::Competition => return None,
        };
        table.iter().find(|s| &s.entity == id)
    }
}

type Selection<'a> = Vec<(&'a MatchRecord, Side)>;

fn select<'a>(
    window: Window,
    candidates: impl Iterator<Item = (&'a MatchRecord, Side)>,
    anchor: Option<chrono::NaiveDate>,
) -> Selection<'a> {
    let mut picked: Selection<'a> = candidates
        .filter(|(m, side)| window.admits(m, *side, anchor))
        .collect();
    if let Some(n) = window.limit() {
        let skip = picked.len().saturating_sub(n);
        picked.drain(..skip);
    }
    picked
}

fn form_of(selection: &Selection<'_>) -> String {
    selection
        .iter()
        .rev()
        .take(FORM_LEN)
        .map(|(m, side)| m.outcome(*side).letter())
        .collect()
}

/// Builds every row for `window` plus the standings.
///
/// Matches are expected in `(date, match_id)` order, as the normalizer leaves
/// them; rolling windows count from the end of that order.
pub fn aggregate(batch: &NormalizedBatch, window: Window, cfg: &EngineConfig) -> Aggregation {
    let anchor = batch.latest_date();

    let mut events_by_match: HashMap<&str, Vec<&EventRecord>> = HashMap::new();
    for e in &batch.events {
        events_by_match.entry(e.match_id.as_str()).or_default().push(e);
    }

    let mut team_matches: BTreeMap<&str, Vec<(&MatchRecord, Side)>> = BTreeMap::new();
    // player -> [(match, side, that player's events)]
    let mut player_matches: BTreeMap<&str, Vec<(&MatchRecord, Side, Vec<&EventRecord>)>> =
        BTreeMap::new();
    for m in &batch.matches {
        team_matches.entry(m.home.as_str()).or_default().push((m, Side::Home));
        team_matches.entry(m.away.as_str()).or_default().push((m, Side::Away));

        let Some(events) = events_by_match.get(m.match_id.as_str()) else {
            continue;
        };
        let mut per_player: BTreeMap<&str, (Side, Vec<&EventRecord>)> = BTreeMap::new();
        for e in events {
            let Some(side) = m.side_of(&e.team) else {
                continue;
            };
            per_player
                .entry(e.player.as_str())
                .or_insert_with(|| (side, Vec::new()))
                .1
                .push(*e);
        }
        for (player, (side, evs)) in per_player {
            player_matches.entry(player).or_default().push((m, side, evs));
        }
    }

    let mut lines_by_player: BTreeMap<&str, Vec<&PlayerSeasonLine>> = BTreeMap::new();
    for l in &batch.players {
        lines_by_player.entry(l.player.as_str()).or_default().push(l);
    }

    let mut rows = BTreeMap::new();
    let mut competition = Tally::default();
    let mut selections: BTreeMap<&str, Selection<'_>> = BTreeMap::new();

    for (team, matches) in &team_matches {
        let selection = select(window, matches.iter().copied(), anchor);
        let mut tally = Tally::default();
        for (m, side) in &selection {
            tally.record_result(m, *side);
            tally.record_team_stats(m, *side);
            for e in events_by_match.get(m.match_id.as_str()).into_iter().flatten() {
                if e.team == *team {
                    tally.record_team_event(e);
                }
            }
        }
        competition.absorb(&tally);
        let id = Identity::team(*team);
        rows.insert(
            id.clone(),
            AggregateRow {
                entity: id,
                window,
                tally,
                form: form_of(&selection),
                club: None,
                position: None,
            },
        );
        selections.insert(*team, selection);
    }

    let players: BTreeSet<&str> = player_matches
        .keys()
        .chain(lines_by_player.keys())
        .copied()
        .collect();
    for player in players {
        let appearances = player_matches.get(player).map(Vec::as_slice).unwrap_or(&[]);
        let by_match: HashMap<&str, &Vec<&EventRecord>> = appearances
            .iter()
            .map(|(m, _, evs)| (m.match_id.as_str(), evs))
            .collect();
        let selection = select(window, appearances.iter().map(|(m, s, _)| (*m, *s)), anchor);

        let mut tally = Tally::default();
        for (m, side) in &selection {
            tally.record_result(m, *side);
            if let Some(evs) = by_match.get(m.match_id.as_str()) {
                tally.record_player_events(evs, cfg.match_minutes);
            }
        }

        let lines = lines_by_player.get(player).map(Vec::as_slice).unwrap_or(&[]);
        if window.is_season() && !lines.is_empty() {
            tally.apply_season_lines(lines);
        }

        let main_line = lines
            .iter()
            .copied()
            .reduce(|best, l| if l.minutes > best.minutes { l } else { best });
        let club = main_line.map(|l| l.club.clone()).or_else(|| {
            appearances
                .last()
                .map(|(m, side, _)| m.team(*side).to_string())
        });

        let id = Identity::player(player);
        rows.insert(
            id.clone(),
            AggregateRow {
                entity: id,
                window,
                tally,
                form: form_of(&selection),
                club,
                position: main_line.and_then(|l| l.position),
            },
        );
    }

    let competition_id = Identity::competition();
    rows.insert(
        competition_id.clone(),
        AggregateRow {
            entity: competition_id,
            window,
            tally: competition,
            form: String::new(),
            club: None,
            position: None,
        },
    );

    let standings = team_standings(&rows, &selections);
    let player_standings = rank(
        rows.values()
            .filter(|r| r.entity.kind == EntityKind::Player)
            .collect(),
        |_| None,
    );

    tracing::debug!(
        window = %window,
        teams = standings.len(),
        players = player_standings.len(),
        "aggregated window"
    );

    Aggregation {
        window,
        rows,
        standings,
        player_standings,
    }
}

fn primary_order(a: &AggregateRow, b: &AggregateRow) -> Ordering {
    b.tally
        .points()
        .cmp(&a.tally.points())
        .then(b.tally.goal_difference().cmp(&a.tally.goal_difference()))
        .then(b.tally.goals_for.cmp(&a.tally.goals_for))
}

#[derive(Debug, Clone, Copy, Default)]
struct MiniLeague {
    points: u32,
    goal_difference: i64,
}

/// Sorts by the primary keys, then lets `tiebreak` order each level group.
fn rank<'a>(
    mut rows: Vec<&'a AggregateRow>,
    tiebreak: impl Fn(&[&'a AggregateRow]) -> Option<HashMap<Identity, MiniLeague>>,
) -> Vec<Standing> {
    rows.sort_by(|a, b| primary_order(a, b).then_with(|| a.entity.name.cmp(&b.entity.name)));

    let mut out = Vec::with_capacity(rows.len());
    let mut i = 0;
    while i < rows.len() {
        let mut j = i + 1;
        while j < rows.len() && primary_order(rows[i], rows[j]) == Ordering::Equal {
            j += 1;
        }
        let group = &mut rows[i..j];
        let mini = if group.len() > 1 { tiebreak(group) } else { None };
        if let Some(mini) = mini.as_ref() {
            group.sort_by(|a, b| {
                let ma = mini.get(&a.entity).copied().unwrap_or_default();
                let mb = mini.get(&b.entity).copied().unwrap_or_default();
                mb.points
                    .cmp(&ma.points)
                    .then(mb.goal_difference.cmp(&ma.goal_difference))
                    .then_with(|| a.entity.name.cmp(&b.entity.name))
            });
        }
        for r in group.iter() {
            let m = mini.as_ref().and_then(|mini| mini.get(&r.entity).copied());
            out.push(Standing {
                position: out.len() + 1,
                entity: r.entity.clone(),
                points: r.tally.points(),
                goal_difference: r.tally.goal_difference(),
                goals_for: r.tally.goals_for,
                head_to_head_points: m.map(|m| m.points),
                head_to_head_goal_difference: m.map(|m| m.goal_difference),
            });
        }
        i = j;
    }
    out
}

fn team_standings(
    rows: &BTreeMap<Identity, AggregateRow>,
    selections: &BTreeMap<&str, Selection<'_>>,
) -> Vec<Standing> {
    let teams: Vec<&AggregateRow> = rows
        .values()
        .filter(|r| r.entity.kind == EntityKind::Team)
        .collect();
    rank(teams, |group| Some(head_to_head(group, selections)))
}

/// Mini-league among `group` over every match any member's window selected.
fn head_to_head(
    group: &[&AggregateRow],
    selections: &BTreeMap<&str, Selection<'_>>,
) -> HashMap<Identity, MiniLeague> {
    let members: BTreeSet<&str> = group.iter().map(|r| r.entity.name.as_str()).collect();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut table: HashMap<Identity, MiniLeague> = group
        .iter()
        .map(|r| (r.entity.clone(), MiniLeague::default()))
        .collect();

    for team in &members {
        for (m, _) in selections.get(team).into_iter().flatten() {
            if !members.contains(m.home.as_str()) || !members.contains(m.away.as_str()) {
                continue;
            }
            if !seen.insert(m.match_id.as_str()) {
                continue;
            }
            for side in [Side::Home, Side::Away] {
                let (gf, ga) = m.goals(side);
                let entry = table.entry(Identity::team(m.team(side))).or_default();
                entry.points += match m.outcome(side) {
                    Outcome::Win => 3,
                    Outcome::Draw => 1,
                    Outcome::Loss => 0,
                };
                entry.goal_difference += i64::from(gf) - i64::from(ga);
            }
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::records::SideStats;

    fn m(id: &str, day: u32, home: &str, away: &str, hg: u32, ag: u32) -> MatchRecord {
        MatchRecord {
            match_id: id.to_string(),
            line: day as usize,
            date: NaiveDate::from_ymd_opt(2024, 9, day).unwrap(),
            home: home.to_string(),
            away: away.to_string(),
            home_goals: hg,
            away_goals: ag,
            round: None,
            venue: None,
            home_stats: SideStats::default(),
            away_stats: SideStats::default(),
        }
    }

    fn ev(id: &str, minute: u32, kind: EventKind, player: &str, team: &str) -> EventRecord {
        EventRecord {
            match_id: id.to_string(),
            line: 0,
            minute,
            kind,
            player: player.to_string(),
            team: team.to_string(),
        }
    }

    fn batch(matches: Vec<MatchRecord>, events: Vec<EventRecord>) -> NormalizedBatch {
        NormalizedBatch {
            matches,
            events,
            players: Vec::new(),
            alias_version: 0,
        }
    }

    #[test]
    fn season_tally_counts_results() {
        let b = batch(
            vec![m("1", 1, "A", "B", 2, 1), m("2", 2, "B", "C", 3, 3), m("3", 3, "A", "C", 0, 0)],
            vec![],
        );
        let agg = aggregate(&b, Window::Season, &EngineConfig::default());
        let a = &agg.row(&Identity::team("A")).unwrap().tally;
        assert_eq!((a.matches_played, a.wins, a.draws, a.losses), (2, 1, 1, 0));
        assert_eq!((a.goals_for, a.goals_against), (2, 1));
        assert_eq!(a.clean_sheets, 1);
        assert_eq!(agg.row(&Identity::team("A")).unwrap().form, "DW");

        let comp = &agg.competition().unwrap().tally;
        assert_eq!(comp.matches_played, 6);
        assert_eq!(comp.goals_for, 9);
        assert_eq!(comp.home_matches, 3);
    }

    #[test]
    fn windows_without_matches_give_zero_rows() {
        let b = batch(vec![m("1", 1, "A", "B", 2, 1)], vec![]);
        let agg = aggregate(&b, Window::AwayOnly, &EngineConfig::default());
        let a = agg.row(&Identity::team("A")).unwrap();
        assert_eq!(a.tally, Tally::default());
        assert_eq!(a.form, "");
    }

    #[test]
    fn rolling_matches_keeps_most_recent() {
        let b = batch(
            vec![m("1", 1, "A", "B", 0, 1), m("2", 2, "A", "C", 1, 0), m("3", 3, "B", "A", 1, 1)],
            vec![],
        );
        let agg = aggregate(&b, Window::RollingMatches { n: 2 }, &EngineConfig::default());
        let a = agg.row(&Identity::team("A")).unwrap();
        assert_eq!((a.tally.wins, a.tally.draws, a.tally.losses), (1, 1, 0));
        assert_eq!(a.form, "DW");
    }

    #[test]
    fn player_minutes_follow_substitutions() {
        let b = batch(
            vec![m("1", 1, "A", "B", 1, 0)],
            vec![
                ev("1", 60, EventKind::SubOn, "Sub", "A"),
                ev("1", 80, EventKind::Goal, "Sub", "A"),
                ev("1", 60, EventKind::SubOff, "Starter", "A"),
                ev("1", 30, EventKind::YellowCard, "Starter", "A"),
            ],
        );
        let agg = aggregate(&b, Window::Season, &EngineConfig::default());
        let sub = &agg.row(&Identity::player("Sub")).unwrap().tally;
        assert_eq!((sub.minutes, sub.scored, sub.sub_appearances, sub.wins), (30, 1, 1, 1));
        let starter = agg.row(&Identity::player("Starter")).unwrap();
        assert_eq!(starter.tally.minutes, 60);
        assert_eq!(starter.tally.yellow_cards, 1);
        assert_eq!(starter.club.as_deref(), Some("A"));
        let team = &agg.row(&Identity::team("A")).unwrap().tally;
        assert_eq!(team.yellow_cards, 1);
    }

    #[test]
    fn shot_totals_only_pair_with_matches_that_report_them() {
        let mut with_shots = m("1", 1, "A", "B", 1, 0);
        with_shots.home_stats = SideStats {
            shots: Some(10),
            shots_on_target: Some(4),
            xg: None,
        };
        let mut on_target_only = m("2", 2, "A", "C", 3, 0);
        on_target_only.home_stats = SideStats {
            shots: None,
            shots_on_target: Some(6),
            xg: None,
        };
        let mut no_target = m("3", 3, "A", "D", 0, 0);
        no_target.home_stats = SideStats {
            shots: Some(5),
            shots_on_target: None,
            xg: None,
        };
        let b = batch(vec![with_shots, on_target_only, no_target], vec![]);
        let agg = aggregate(&b, Window::Season, &EngineConfig::default());
        let a = &agg.row(&Identity::team("A")).unwrap().tally;
        assert_eq!(a.goals_for, 4);
        assert_eq!((a.shots_taken, a.shots_matches, a.shots_goals_for), (15, 2, 1));
        assert_eq!((a.shots_on_target, a.target_shots), (4, 10));
    }

    #[test]
    fn head_to_head_breaks_full_ties() {
        // A and B finish level on points, goal difference and goals scored;
        // B won the meeting between them.
        let b = batch(
            vec![
                m("1", 1, "A", "B", 0, 1),
                m("2", 2, "A", "C", 3, 1),
                m("3", 3, "D", "A", 1, 0),
                m("4", 4, "C", "B", 3, 2),
            ],
            vec![],
        );
        let agg = aggregate(&b, Window::Season, &EngineConfig::default());
        let order: Vec<&str> = agg.standings.iter().map(|s| s.entity.name.as_str()).collect();
        assert_eq!(order, vec!["D", "B", "A", "C"]);
        assert_eq!(agg.standings[0].head_to_head_points, None);
        assert_eq!(agg.standings[1].head_to_head_points, Some(3));
        assert_eq!(agg.standings[2].head_to_head_points, Some(0));
        assert_eq!(agg.standings[3].position, 4);
    }
}
