use std::path::Path;

use rusqlite::{Connection, params};

use season_metrics::config::EngineConfig;
use season_metrics::records::Row;
use season_metrics::schema::validate;
use season_metrics::source::{load_sqlite_matches, open_sqlite};

fn seed_db(path: &Path) {
    let conn = Connection::open(path).expect("create db");
    conn.execute_batch(
        r#"
        CREATE TABLE matches (
            match_id INTEGER PRIMARY KEY,
            season TEXT NOT NULL,
            league_id INTEGER NOT NULL,
            round INTEGER NULL,
            utc_time TEXT NOT NULL,
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_goals INTEGER NULL,
            away_goals INTEGER NULL,
            started INTEGER NOT NULL,
            finished INTEGER NOT NULL,
            cancelled INTEGER NOT NULL,
            awarded INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .expect("schema");

    let rows: [(i64, i64, Option<i64>, &str, &str, &str, Option<i64>, Option<i64>, i64, i64, i64); 5] = [
        (1, 47, Some(1), "2024-08-17T14:00:00Z", "Arsenal", "Wolves", Some(2), Some(0), 1, 0, 0),
        (2, 47, Some(1), "2024-08-16T19:00:00Z", "Man United", "Fulham", Some(1), Some(0), 1, 0, 0),
        (3, 47, Some(2), "2024-08-24T14:00:00Z", "Arsenal", "Aston Villa", None, None, 0, 0, 0),
        (4, 47, Some(2), "2024-08-24T16:30:00Z", "Brentford", "Liverpool", Some(0), Some(3), 1, 1, 0),
        (5, 87, None, "2024-08-18T18:00:00Z", "Girona", "Real Madrid", Some(1), Some(1), 1, 0, 0),
    ];
    for (id, league, round, time, home, away, hg, ag, finished, cancelled, awarded) in rows {
        conn.execute(
            "INSERT INTO matches (match_id, season, league_id, round, utc_time, home_team_id, away_team_id,
                home_team, away_team, home_goals, away_goals, started, finished, cancelled, awarded, updated_at)
             VALUES (?1, '2024/2025', ?2, ?3, ?4, 0, 0, ?5, ?6, ?7, ?8, 1, ?9, ?10, ?11, '2024-09-01')",
            params![id, league, round, time, home, away, hg, ag, finished, cancelled, awarded],
        )
        .expect("insert");
    }
}

#[test]
fn sqlite_keeps_only_finished_matches_of_the_league() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("history.db");
    seed_db(&path);
    let conn = open_sqlite(&path).expect("open");

    let league = load_sqlite_matches(&conn, Some(47)).expect("league rows");
    let ids: Vec<&str> = league.iter().filter_map(|r| r.get("match_id")).collect();
    // oldest kick-off first
    assert_eq!(ids, vec!["2", "1"]);
    assert_eq!(league[1].get("round"), Some("1"));

    let all = load_sqlite_matches(&conn, None).expect("all rows");
    assert_eq!(all.len(), 3);
    assert_eq!(all.last().and_then(|r| r.get("home_team")), Some("Girona"));
    assert_eq!(all.last().and_then(|r| r.get("round")), None);
}

#[test]
fn sqlite_rows_pass_validation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("history.db");
    seed_db(&path);
    let conn = open_sqlite(&path).expect("open");

    let rows = load_sqlite_matches(&conn, None).expect("rows");
    let checked = validate(rows, &EngineConfig::default());
    assert!(checked.rejected.is_empty());
    let dates: Vec<String> = checked
        .valid
        .iter()
        .filter_map(|r| match r {
            Row::Match(m) => Some(m.date.to_string()),
            _ => None,
        })
        .collect();
    assert_eq!(dates, vec!["2024-08-16", "2024-08-17", "2024-08-18"]);
}

#[test]
fn missing_database_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    assert!(open_sqlite(&dir.path().join("nope.db")).is_err());
}
