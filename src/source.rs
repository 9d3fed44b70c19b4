//! Ingestion adapters that turn files into [`RawRow`]s.

use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, params};

use crate::records::{RawRow, RowKind};

pub fn read_csv(path: &Path, kind: RowKind) -> Result<Vec<RawRow>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_csv_from(file, kind).with_context(|| format!("read {}", path.display()))
}

/// Header row required; `line` is the 1-based line of each record in the input.
pub fn read_csv_from<R: io::Read>(reader: R, kind: RowKind) -> Result<Vec<RawRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("read csv header")?.clone();
    let mut out = Vec::new();
    for record in rdr.records() {
        let record = record.context("read csv record")?;
        let line = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(out.len() + 2);
        // short rows leave trailing columns missing; extra cells are ignored
        let row = RawRow::from_pairs(
            kind,
            line,
            headers.iter().zip(record.iter()).map(|(h, v)| (h, v.to_string())),
        );
        out.push(row);
    }
    tracing::debug!(kind = ?kind, rows = out.len(), "read csv");
    Ok(out)
}

pub fn open_sqlite(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("open sqlite db {}", path.display()))
}

/// Finished, non-cancelled, non-awarded matches from a historical `matches` table.
pub fn load_sqlite_matches(conn: &Connection, league_id: Option<u32>) -> Result<Vec<RawRow>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT match_id, round, utc_time, home_team, away_team, home_goals, away_goals
            FROM matches
            WHERE (?1 IS NULL OR league_id = ?1)
              AND finished = 1
              AND cancelled = 0
              AND awarded = 0
              AND home_goals IS NOT NULL
              AND away_goals IS NOT NULL
            ORDER BY utc_time ASC, match_id ASC
            "#,
        )
        .context("prepare load matches query")?;

    let rows = stmt
        .query_map(params![league_id.map(i64::from)], |row| {
            let match_id: i64 = row.get(0)?;
            let round: Option<i64> = row.get(1)?;
            let utc_time: String = row.get(2)?;
            let home: String = row.get(3)?;
            let away: String = row.get(4)?;
            let home_goals: i64 = row.get(5)?;
            let away_goals: i64 = row.get(6)?;
            Ok((match_id, round, utc_time, home, away, home_goals, away_goals))
        })
        .context("query load matches")?;

    let mut out = Vec::new();
    for (idx, row) in rows.enumerate() {
        let (match_id, round, utc_time, home, away, hg, ag) = row.context("decode match row")?;
        let mut raw = RawRow::new(RowKind::Match, idx + 1)
            .with("match_id", match_id.to_string())
            .with("date", utc_time)
            .with("home_team", home)
            .with("away_team", away)
            .with("home_goals", hg.to_string())
            .with("away_goals", ag.to_string());
        if let Some(r) = round {
            raw.insert("round", r.to_string());
        }
        out.push(raw);
    }
    tracing::debug!(rows = out.len(), ?league_id, "loaded sqlite matches");
    Ok(out)
}
