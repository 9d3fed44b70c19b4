use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Result, bail};
use chrono::{Duration, NaiveDate};
use rayon::prelude::*;

use season_metrics::aggregate::{Aggregation, aggregate};
use season_metrics::aliases::AliasTable;
use season_metrics::cli::{
    arg_path, arg_values, init_tracing, load_config, load_env, parse_u32_arg,
};
use season_metrics::normalize::normalize;
use season_metrics::outcome::{self, Evaluation, Prob3};
use season_metrics::records::{Identity, Outcome, RowKind};
use season_metrics::schema::validate;
use season_metrics::source;
use season_metrics::window::Window;

const DEFAULT_MIN_PRIOR_MATCHES: u32 = 3;

fn main() -> Result<()> {
    load_env();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cfg = load_config(arg_path(&args, "--config").as_deref())?;
    let aliases = match arg_path(&args, "--aliases") {
        Some(p) => AliasTable::load(&p)?,
        None => AliasTable::new(),
    };
    let min_prior = parse_u32_arg(&args, "--min-prior-matches").unwrap_or(DEFAULT_MIN_PRIOR_MATCHES);

    let mut rows = Vec::new();
    for path in arg_values(&args, "--matches") {
        rows.extend(source::read_csv(Path::new(&path), RowKind::Match)?);
    }
    if let Some(db) = arg_path(&args, "--sqlite") {
        let conn = source::open_sqlite(&db)?;
        rows.extend(source::load_sqlite_matches(&conn, parse_u32_arg(&args, "--league"))?);
    }
    if rows.is_empty() {
        bail!("usage: outcome_backtest (--matches <csv> | --sqlite <db> [--league <id>]) [--aliases <json>] [--config <json>] [--min-prior-matches N]");
    }

    let validation = validate(rows, &cfg);
    let batch = normalize(validation.valid, &aliases).batch;
    let Some(first_date) = batch.matches.first().map(|m| m.date) else {
        bail!("no valid matches to backtest");
    };

    // one aggregation per match day, over everything strictly before it
    let mut dates: Vec<NaiveDate> = batch.matches.iter().map(|m| m.date).collect();
    dates.dedup();
    let history: BTreeMap<NaiveDate, Aggregation> = dates
        .par_iter()
        .filter(|d| **d > first_date)
        .map(|d| {
            let window = Window::DateRange {
                from: first_date,
                to: *d - Duration::days(1),
            };
            (*d, aggregate(&batch, window, &cfg))
        })
        .collect();

    let results: Vec<(NaiveDate, Outcome)> = batch
        .matches
        .iter()
        .map(|m| (m.date, Outcome::from_goals(m.home_goals, m.away_goals)))
        .collect();
    let baseline = outcome::prior_day_empirical(&results);

    let mut preds = Vec::new();
    let mut uniform = Vec::new();
    let mut empirical = Vec::new();
    let mut outcomes = Vec::new();
    let mut skipped = 0usize;

    for ((m, (_, actual)), base) in batch.matches.iter().zip(&results).zip(&baseline) {
        let actual = *actual;
        let prior = history.get(&m.date).and_then(|agg| {
            let home = agg.row(&Identity::team(m.home.as_str()))?;
            let away = agg.row(&Identity::team(m.away.as_str()))?;
            let comp = agg.competition()?;
            (home.tally.matches_played >= min_prior && away.tally.matches_played >= min_prior)
                .then(|| outcome::matchup_probs(&home.tally, &away.tally, &comp.tally, &cfg.outcome))
        });
        match prior {
            Some(p) => {
                preds.push(p);
                uniform.push(Prob3::uniform());
                empirical.push(*base);
                outcomes.push(actual);
            }
            None => skipped += 1,
        }
    }

    println!("Walk-forward matchup backtest");
    println!("Matches: {} (skipped {} with < {} prior matches per side)", batch.matches.len(), skipped, min_prior);
    if let (Some(first), Some(last)) = (batch.matches.first(), batch.matches.last()) {
        println!("Range: {} -> {}", first.date, last.date);
    }
    println!();

    print_metrics("Matchup model", outcome::evaluate_probs(&preds, &outcomes));
    print_metrics("Uniform baseline", outcome::evaluate_probs(&uniform, &outcomes));
    print_metrics("Empirical baseline", outcome::evaluate_probs(&empirical, &outcomes));

    let all: Vec<Outcome> = results.iter().map(|(_, o)| *o).collect();
    let overall = outcome::empirical_outcome_probs(&all);
    println!();
    println!(
        "Empirical outcome probs: H={:.3} D={:.3} A={:.3}",
        overall.win, overall.draw, overall.loss
    );

    Ok(())
}

fn print_metrics(label: &str, metrics: Evaluation) {
    println!("{label}:");
    println!(
        "  samples={} brier={:.4} log_loss={:.4} accuracy={:.3}",
        metrics.samples, metrics.brier, metrics.log_loss, metrics.accuracy
    );
}
