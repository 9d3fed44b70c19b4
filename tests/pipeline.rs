use std::path::PathBuf;
use std::sync::Arc;

use approx::assert_relative_eq;

use season_metrics::aliases::AliasTable;
use season_metrics::config::EngineConfig;
use season_metrics::engine::{Analysis, AnalysisRequest, analyze};
use season_metrics::error::SchemaError;
use season_metrics::metrics::{MetricName, MetricValue};
use season_metrics::query::Query;
use season_metrics::records::{Identity, RawRow, RowKind};
use season_metrics::source::read_csv;
use season_metrics::window::Window;

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path
}

fn fixture_rows() -> Vec<RawRow> {
    let mut rows = read_csv(&fixture_path("matches.csv"), RowKind::Match).expect("matches fixture");
    rows.extend(read_csv(&fixture_path("events.csv"), RowKind::Event).expect("events fixture"));
    rows.extend(read_csv(&fixture_path("players.csv"), RowKind::PlayerSeason).expect("players fixture"));
    rows
}

fn fixture_analysis(windows: &[Window]) -> Analysis {
    let aliases = AliasTable::load(&fixture_path("aliases.json")).expect("alias fixture");
    let mut req = AnalysisRequest::new("fixture", fixture_rows());
    for w in windows {
        req = req.with_window(*w);
    }
    analyze(req, Arc::new(aliases), &EngineConfig::default())
}

fn match_row(line: usize, home: &str, away: &str, hg: u32, ag: u32) -> RawRow {
    RawRow::new(RowKind::Match, line)
        .with("date", format!("2024-09-{:02}", line))
        .with("home_team", home)
        .with("away_team", away)
        .with("home_goals", hg.to_string())
        .with("away_goals", ag.to_string())
}

#[test]
fn three_match_season_for_a() {
    let rows = vec![
        match_row(1, "A", "B", 2, 1),
        match_row(2, "B", "C", 3, 3),
        match_row(3, "A", "C", 0, 0),
    ];
    let out = analyze(
        AnalysisRequest::new("abc", rows),
        Arc::new(AliasTable::new()),
        &EngineConfig::default(),
    );
    let a = out
        .store
        .row(&Identity::team("A"), Window::Season)
        .expect("row for A");
    assert_eq!(a.tally.matches_played, 2);
    assert_eq!((a.tally.wins, a.tally.draws, a.tally.losses), (1, 1, 0));
    assert_eq!((a.tally.goals_for, a.tally.goals_against), (2, 1));

    let ppm = out
        .store
        .metric(&Identity::team("A"), Window::Season, MetricName::PointsPerMatch)
        .and_then(MetricValue::as_number)
        .expect("ppm");
    assert_relative_eq!(ppm, 2.0);

    // no shot columns at all
    assert!(matches!(
        out.store
            .metric(&Identity::team("A"), Window::Season, MetricName::EfficiencyRatio),
        Some(MetricValue::InsufficientData { .. })
    ));
}

#[test]
fn fixture_report_lists_every_set_aside_row() {
    let out = fixture_analysis(&[]);
    let r = &out.report;
    assert_eq!(r.rows_in, 9 + 18 + 6);
    assert_eq!(r.rejected.len(), 5);
    assert_eq!(r.rows_valid + r.rejected.len(), r.rows_in);
    assert_eq!(r.superseded, vec!["m06".to_string()]);
    assert_eq!(r.alias_version, 3);
    assert!(r.collisions.is_empty());

    let reasons: Vec<&SchemaError> = r.rejected.iter().map(|x| &x.reason).collect();
    assert!(reasons.iter().any(|e| matches!(e, SchemaError::SameTeam { .. })));
    assert!(reasons.iter().any(|e| matches!(e, SchemaError::BadNumber { field: "home_goals", .. })));
    assert!(reasons.iter().any(|e| matches!(e, SchemaError::MinuteOutOfRange { .. })));
    assert!(reasons.iter().any(|e| matches!(e, SchemaError::UnknownMatch { .. })));
    assert!(reasons.iter().any(|e| matches!(e, SchemaError::BadNumber { field: "minutes", .. })));

    // alias spellings resolve; other names are minted and reported
    assert!(!r.unresolved.iter().any(|u| u.raw == "Man Utd" || u.raw == "B. Saka"));
    assert!(r.unresolved.iter().any(|u| u.raw == "Arsenal" && u.assigned == "Arsenal"));
}

#[test]
fn fixture_team_rows_after_supersession() {
    let out = fixture_analysis(&[Window::Season, Window::HomeOnly]);
    let store = &out.store;

    let arsenal = store.row(&Identity::team("Arsenal"), Window::Season).expect("Arsenal");
    let t = &arsenal.tally;
    assert_eq!((t.wins, t.draws, t.losses), (1, 1, 1));
    assert_eq!((t.goals_for, t.goals_against), (3, 3));
    assert_eq!((t.shots_taken, t.shots_on_target), (37, 13));
    assert_eq!(t.red_cards, 1);
    assert_eq!(arsenal.form, "LDW");
    assert_relative_eq!(t.xg_for, 4.4, epsilon = 1e-9);

    let xg_diff = store
        .metric(&Identity::team("Arsenal"), Window::Season, MetricName::XgDifferential)
        .and_then(MetricValue::as_number)
        .expect("xg");
    assert_relative_eq!(xg_diff, 0.8, epsilon = 1e-9);

    // the corrected m06 row counts: United won 3-2 at Chelsea
    let united = store
        .row(&Identity::team("Manchester United"), Window::Season)
        .expect("United");
    assert_eq!((united.tally.wins, united.tally.draws, united.tally.losses), (1, 1, 1));

    let home = store.row(&Identity::team("Arsenal"), Window::HomeOnly).expect("home row");
    assert_eq!(home.tally.matches_played, 2);
    assert_eq!(home.tally.home_matches, 2);
}

#[test]
fn results_always_sum_to_matches_played() {
    let windows = [
        Window::Season,
        Window::RollingMatches { n: 2 },
        Window::RollingDays { days: 7 },
        Window::HomeOnly,
        Window::AwayOnly,
    ];
    let out = fixture_analysis(&windows);
    for w in windows {
        let res = out
            .store
            .query(&Query::new().window(w))
            .expect("rows in every window");
        for row in res.rows {
            let t = &row.aggregate.tally;
            assert_eq!(
                t.wins + t.draws + t.losses,
                t.matches_played,
                "{} in {}",
                row.entity,
                w
            );
        }
    }
}

#[test]
fn repeated_runs_are_identical() {
    let windows = [Window::Season, Window::RollingMatches { n: 2 }];
    let a = fixture_analysis(&windows);
    let b = fixture_analysis(&windows);
    let q = Query::new();
    let ja = serde_json::to_string(&a.store.query(&q).expect("rows")).expect("json");
    let jb = serde_json::to_string(&b.store.query(&q).expect("rows")).expect("json");
    assert_eq!(ja, jb);
    assert_eq!(
        serde_json::to_string(&a.report).expect("json"),
        serde_json::to_string(&b.report).expect("json")
    );
}

#[test]
fn rolling_windows_slice_recent_matches() {
    let out = fixture_analysis(&[Window::RollingMatches { n: 2 }, Window::RollingDays { days: 7 }]);
    let last_two = out
        .store
        .row(&Identity::team("Arsenal"), Window::RollingMatches { n: 2 })
        .expect("row");
    assert_eq!(last_two.form, "LD");
    assert_eq!(last_two.tally.points(), 1);

    let week = out
        .store
        .row(&Identity::team("Arsenal"), Window::RollingDays { days: 7 })
        .expect("row");
    assert_eq!(week.tally.matches_played, 1);
    assert_eq!(week.tally.losses, 1);
}

fn event_row(line: usize, match_id: &str, minute: u32, kind: &str, player: &str, team: &str) -> RawRow {
    RawRow::new(RowKind::Event, line)
        .with("match_id", match_id)
        .with("minute", minute.to_string())
        .with("kind", kind)
        .with("player", player)
        .with("team", team)
}

#[test]
fn event_teams_are_resolved_before_membership_is_checked() {
    let aliases = AliasTable::load(&fixture_path("aliases.json")).expect("alias fixture");
    let rows = vec![
        match_row(1, "Manchester United", "Fulham", 1, 0).with("match_id", "u1"),
        event_row(2, "u1", 30, "goal", "Marcus Rashford", "Man Utd"),
        event_row(3, "u1", 55, "yellow card", "Andreas Pereira", "fulham"),
        event_row(4, "u1", 70, "goal", "Son Heung-min", "Spurs"),
    ];
    let out = analyze(
        AnalysisRequest::new("aliased events", rows),
        Arc::new(aliases),
        &EngineConfig::default(),
    );
    assert!(out.report.rejected.is_empty());

    let rashford = out
        .store
        .row(&Identity::player("Marcus Rashford"), Window::Season)
        .expect("aliased team keeps the event");
    assert_eq!(rashford.tally.scored, 1);
    assert_eq!(rashford.club.as_deref(), Some("Manchester United"));

    let pereira = out
        .store
        .row(&Identity::player("Andreas Pereira"), Window::Season)
        .expect("case-folded team keeps the event");
    assert_eq!(pereira.club.as_deref(), Some("Fulham"));
    let fulham = out.store.row(&Identity::team("Fulham"), Window::Season).expect("Fulham");
    assert_eq!(fulham.tally.yellow_cards, 1);

    assert_eq!(out.report.orphaned.len(), 1);
    assert_eq!(out.report.orphaned[0].team, "Spurs");
    assert_eq!(out.report.orphaned[0].line, 4);
    assert!(out.store.row(&Identity::player("Son Heung-min"), Window::Season).is_none());
}

#[test]
fn shot_metrics_skip_matches_without_shot_counts() {
    let rows = vec![
        match_row(1, "Arsenal", "Brentford", 2, 1)
            .with("home_shots", "12")
            .with("away_shots", "10")
            .with("home_shots_on_target", "5"),
        match_row(2, "Brentford", "Chelsea", 3, 3),
        match_row(3, "Chelsea", "Arsenal", 0, 1).with("away_shots_on_target", "4"),
    ];
    let out = analyze(
        AnalysisRequest::new("partial shots", rows),
        Arc::new(AliasTable::new()),
        &EngineConfig::default(),
    );
    let metric = |team: &str, name| {
        out.store
            .metric(&Identity::team(team), Window::Season, name)
            .cloned()
            .expect("metric computed")
    };

    // Brentford scored 4 but only 1 came in a match with a shot count
    let brentford = metric("Brentford", MetricName::EfficiencyRatio);
    assert_relative_eq!(brentford.as_number().expect("number"), 0.1, epsilon = 1e-12);
    assert!(metric("Brentford", MetricName::ShotAccuracy).is_insufficient());

    let arsenal = metric("Arsenal", MetricName::EfficiencyRatio);
    assert_relative_eq!(arsenal.as_number().expect("number"), 2.0 / 12.0, epsilon = 1e-12);
    // on-target count without a shot count stays out of the ratio
    let accuracy = metric("Arsenal", MetricName::ShotAccuracy);
    assert_relative_eq!(accuracy.as_number().expect("number"), 5.0 / 12.0, epsilon = 1e-12);

    assert!(metric("Chelsea", MetricName::EfficiencyRatio).is_insufficient());
}
