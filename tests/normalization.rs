use std::path::PathBuf;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use season_metrics::aliases::{AliasKind, AliasTable};
use season_metrics::config::EngineConfig;
use season_metrics::normalize::normalize;
use season_metrics::records::{RawRow, RowKind};
use season_metrics::schema::validate;
use season_metrics::source::read_csv;

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

fn aliases() -> AliasTable {
    AliasTable::load(&fixture_path("aliases.json")).expect("alias fixture")
}

#[test]
fn normalizing_twice_changes_nothing() {
    let cfg = EngineConfig::default();
    let table = aliases();
    let once = normalize(validate(fixture_rows(), &cfg).valid, &table);
    let twice = normalize(once.batch.clone().into_rows(), &table);
    assert_eq!(once.batch, twice.batch);
    assert!(twice.superseded.is_empty());
    assert!(twice.collisions.is_empty());
}

#[test]
fn canonical_names_ignore_row_order() {
    let cfg = EngineConfig::default();
    let table = AliasTable::new();
    let variants = vec![
        RawRow::new(RowKind::Match, 2)
            .with("match_id", "x1")
            .with("date", "2024-08-17")
            .with("home_team", "spurs")
            .with("away_team", "Everton")
            .with("home_goals", "1")
            .with("away_goals", "0"),
        RawRow::new(RowKind::Match, 3)
            .with("match_id", "x2")
            .with("date", "2024-08-24")
            .with("home_team", "EVERTON")
            .with("away_team", "Spurs")
            .with("home_goals", "2")
            .with("away_goals", "2"),
        RawRow::new(RowKind::Match, 4)
            .with("match_id", "x3")
            .with("date", "2024-08-31")
            .with("home_team", "Spurs ")
            .with("away_team", "everton")
            .with("home_goals", "0")
            .with("away_goals", "3"),
    ];
    let base = normalize(validate(variants.clone(), &cfg).valid, &table);

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..5 {
        let mut shuffled = variants.clone();
        shuffled.shuffle(&mut rng);
        let out = normalize(validate(shuffled, &cfg).valid, &table);
        assert_eq!(out.batch, base.batch);
        assert_eq!(out.unresolved, base.unresolved);
    }

    let teams: Vec<&str> = base.batch.teams().into_iter().collect();
    assert_eq!(teams, vec!["EVERTON", "Spurs"]);
}

#[test]
fn shuffled_fixture_normalizes_the_same() {
    let cfg = EngineConfig::default();
    let table = aliases();
    // supersession keeps the later of two m06 rows, so only shuffle within kinds
    // that have no duplicates.
    let rows = fixture_rows();
    let (matches, mut rest): (Vec<RawRow>, Vec<RawRow>) =
        rows.into_iter().partition(|r| r.kind == RowKind::Match);
    let base = normalize(
        validate(matches.iter().cloned().chain(rest.iter().cloned()).collect(), &cfg).valid,
        &table,
    );
    let mut rng = StdRng::seed_from_u64(11);
    rest.shuffle(&mut rng);
    let out = normalize(
        validate(rest.into_iter().chain(matches).collect(), &cfg).valid,
        &table,
    );
    assert_eq!(out.batch, base.batch);
}

#[test]
fn discovered_aliases_persist_between_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("aliases.json");
    let cfg = EngineConfig::default();

    let first = aliases();
    let run = normalize(validate(fixture_rows(), &cfg).valid, &first);
    let next = first.extended(&run.discovered);
    assert_eq!(next.version(), first.version() + 1);
    next.save(&path).expect("save");

    let reloaded = AliasTable::load(&path).expect("load");
    assert_eq!(reloaded.fingerprint(), next.fingerprint());
    assert_eq!(reloaded.resolve(AliasKind::Team, "arsenal"), Some("Arsenal"));

    // nothing left to discover on the second run
    let again = normalize(validate(fixture_rows(), &cfg).valid, &reloaded);
    assert!(again.unresolved.is_empty());
    assert_eq!(reloaded.extended(&again.discovered).version(), reloaded.version());
}
