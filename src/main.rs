use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde_json::json;

use season_metrics::aliases::AliasTable;
use season_metrics::cli::{
    arg_path, arg_value, arg_values, has_flag, init_tracing, load_config, load_env, parse_u32_arg,
    parse_usize_arg,
};
use season_metrics::engine::{AnalysisRequest, analyze};
use season_metrics::metrics::MetricName;
use season_metrics::query::{Query, SortKey};
use season_metrics::records::{EntityKind, Position, RawRow, RowKind};
use season_metrics::source;
use season_metrics::window::Window;

const USAGE: &str = "usage: season_metrics [--matches <csv>] [--events <csv>] [--players <csv>] \
[--sqlite <db> [--league <id>]] [--aliases <json> [--write-aliases]] [--config <json>] \
[--window season|last:N|days:N|from:A..B|home|away]... [--team <name>]... [--player <name>]... \
[--kind team|player|competition] [--metric <name>]... [--sort standing|name|<metric>] [--asc|--desc] \
[--limit N] [--club <name>] [--position <pos>] [--min-minutes N] [--max-minutes N] \
[--home <team> --away <team>]";

fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    let cfg = load_config(arg_path(&args, "--config").as_deref())?;

    let alias_path = arg_path(&args, "--aliases");
    let aliases = match alias_path.as_deref() {
        Some(p) => AliasTable::load(p)?,
        None => AliasTable::new(),
    };
    let aliases = Arc::new(aliases);

    let rows = collect_rows(&args)?;
    if rows.is_empty() {
        bail!("no input rows; pass --matches, --events, --players or --sqlite\n{USAGE}");
    }

    let mut windows = Vec::new();
    for raw in arg_values(&args, "--window") {
        let Some(w) = Window::parse(&raw) else {
            bail!("unrecognized window {raw:?}");
        };
        if !windows.contains(&w) {
            windows.push(w);
        }
    }

    let label = cfg
        .season
        .as_ref()
        .map(|s| s.label.clone())
        .unwrap_or_else(|| "season".to_string());
    let mut request = AnalysisRequest::new(label, rows);
    for w in &windows {
        request = request.with_window(*w);
    }
    let analysis = analyze(request, Arc::clone(&aliases), &cfg);

    let query = build_query(&args, &windows)?;
    let result = match analysis.store.query(&query) {
        Ok(r) => serde_json::to_value(r).context("serialize query result")?,
        Err(err) => serde_json::to_value(err).context("serialize query error")?,
    };

    let matchup = match (arg_value(&args, "--home"), arg_value(&args, "--away")) {
        (Some(home), Some(away)) => {
            let window = windows.first().copied().unwrap_or_default();
            match analysis.store.matchup(&home, &away, window) {
                Ok(m) => Some(serde_json::to_value(m).context("serialize matchup")?),
                Err(err) => Some(serde_json::to_value(err).context("serialize matchup error")?),
            }
        }
        _ => None,
    };

    let out = json!({
        "label": &analysis.label,
        "alias_version": analysis.report.alias_version,
        "result": result,
        "matchup": matchup,
        "report": &analysis.report,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&out).context("serialize output")?
    );

    if has_flag(&args, "--write-aliases") {
        let Some(path) = alias_path else {
            bail!("--write-aliases needs --aliases <json>");
        };
        let next = aliases.extended(&analysis.report.discovered);
        if next.version() != aliases.version() {
            next.save(&path)?;
            eprintln!(
                "alias table {} -> v{} ({} entries)",
                path.display(),
                next.version(),
                next.len()
            );
        } else {
            eprintln!("alias table unchanged (v{})", aliases.version());
        }
    }

    Ok(())
}

fn collect_rows(args: &[String]) -> Result<Vec<RawRow>> {
    let mut rows = Vec::new();
    for (flag, kind) in [
        ("--matches", RowKind::Match),
        ("--events", RowKind::Event),
        ("--players", RowKind::PlayerSeason),
    ] {
        for path in arg_values(args, flag) {
            rows.extend(source::read_csv(Path::new(&path), kind)?);
        }
    }
    if let Some(db) = arg_path(args, "--sqlite") {
        let conn = source::open_sqlite(&db)?;
        rows.extend(source::load_sqlite_matches(&conn, parse_u32_arg(args, "--league"))?);
    }
    Ok(rows)
}

fn build_query(args: &[String], windows: &[Window]) -> Result<Query> {
    let mut q = Query::new();
    for name in arg_values(args, "--team") {
        q = q.team(&name);
    }
    for name in arg_values(args, "--player") {
        q = q.player(&name);
    }
    if let Some(kind) = arg_value(args, "--kind") {
        q = q.kind(match kind.to_ascii_lowercase().as_str() {
            "team" | "teams" => EntityKind::Team,
            "player" | "players" => EntityKind::Player,
            "competition" => EntityKind::Competition,
            other => bail!("unknown kind {other:?}"),
        });
    }
    for w in windows {
        q = q.window(*w);
    }
    for raw in arg_values(args, "--metric") {
        let Some(m) = MetricName::parse(&raw) else {
            bail!("unknown metric {raw:?}");
        };
        q = q.metric(m);
    }
    if let Some(raw) = arg_value(args, "--sort") {
        let Some(key) = SortKey::parse(&raw) else {
            bail!("unknown sort key {raw:?}");
        };
        q = q.sort_by(key);
    }
    if has_flag(args, "--asc") {
        q = q.descending(false);
    } else if has_flag(args, "--desc") {
        q = q.descending(true);
    }
    if let Some(n) = parse_usize_arg(args, "--limit") {
        q = q.limit(n);
    }
    if let Some(club) = arg_value(args, "--club") {
        q = q.club(&club);
    }
    if let Some(raw) = arg_value(args, "--position") {
        let Some(p) = Position::parse(&raw) else {
            bail!("unknown position {raw:?}");
        };
        q = q.position(p);
    }
    let min = parse_u32_arg(args, "--min-minutes");
    let max = parse_u32_arg(args, "--max-minutes");
    if min.is_some() || max.is_some() {
        q = q.minutes(min, max);
    }
    Ok(q)
}
