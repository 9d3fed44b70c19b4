use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::Tally;
use crate::config::OutcomeConfig;
use crate::records::Outcome;

const LAMBDA_MIN: f64 = 0.20;
const LAMBDA_MAX: f64 = 3.80;
// Home advantage is trusted fully only after this many home matches.
const HOME_ADV_MIN_N: f64 = 200.0;

/// Win/draw/loss probabilities from one side's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prob3 {
    pub win: f64,
    pub draw: f64,
    pub loss: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            win: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            loss: 1.0 / 3.0,
        }
    }

    pub fn of(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Win => self.win,
            Outcome::Draw => self.draw,
            Outcome::Loss => self.loss,
        }
    }

    pub fn argmax(&self) -> Outcome {
        if self.win >= self.draw && self.win >= self.loss {
            Outcome::Win
        } else if self.draw >= self.loss {
            Outcome::Draw
        } else {
            Outcome::Loss
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub samples: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub accuracy: f64,
}

pub fn empirical_outcome_probs(outcomes: &[Outcome]) -> Prob3 {
    if outcomes.is_empty() {
        return Prob3::uniform();
    }

    let mut win = 0usize;
    let mut draw = 0usize;
    let mut loss = 0usize;
    for outcome in outcomes {
        match outcome {
            Outcome::Win => win += 1,
            Outcome::Draw => draw += 1,
            Outcome::Loss => loss += 1,
        }
    }
    let n = outcomes.len() as f64;
    Prob3 {
        win: win as f64 / n,
        draw: draw as f64 / n,
        loss: loss as f64 / n,
    }
}

/// Empirical baseline for each result, built only from earlier match days.
///
/// `results` must be sorted by date; matches sharing a date see the same baseline.
pub fn prior_day_empirical(results: &[(NaiveDate, Outcome)]) -> Vec<Prob3> {
    let mut out = Vec::with_capacity(results.len());
    let mut seen: Vec<Outcome> = Vec::with_capacity(results.len());
    for day in results.chunk_by(|a, b| a.0 == b.0) {
        let probs = empirical_outcome_probs(&seen);
        out.extend(std::iter::repeat_n(probs, day.len()));
        seen.extend(day.iter().map(|(_, o)| *o));
    }
    out
}

pub fn evaluate_probs(predictions: &[Prob3], outcomes: &[Outcome]) -> Evaluation {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return Evaluation {
            samples: 0,
            brier: 0.0,
            log_loss: 0.0,
            accuracy: 0.0,
        };
    }

    let mut brier_sum = 0.0_f64;
    let mut log_loss_sum = 0.0_f64;
    let mut correct = 0usize;

    for (p, outcome) in predictions.iter().zip(outcomes) {
        for candidate in [Outcome::Win, Outcome::Draw, Outcome::Loss] {
            let y = if candidate == *outcome { 1.0 } else { 0.0 };
            brier_sum += (p.of(candidate) - y).powi(2);
        }
        log_loss_sum += -p.of(*outcome).clamp(1e-12, 1.0).ln();
        if p.argmax() == *outcome {
            correct += 1;
        }
    }

    let n = predictions.len() as f64;
    Evaluation {
        samples: predictions.len(),
        brier: brier_sum / n,
        log_loss: log_loss_sum / n,
        accuracy: correct as f64 / n,
    }
}

/// Goals per team per match across the competition row.
pub fn baseline_goals(competition: &Tally, cfg: &OutcomeConfig) -> f64 {
    if competition.matches_played == 0 || competition.goals_for == 0 {
        return cfg.default_goals_per_match;
    }
    f64::from(competition.goals_for) / f64::from(competition.matches_played)
}

/// Attack and defence multipliers relative to the baseline; 1.0 is average.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ratings {
    pub attack: f64,
    pub defence: f64,
}

/// Shrinks the entity's scoring rates toward the baseline by `n / (n + prior)`.
pub fn ratings(t: &Tally, mu: f64, cfg: &OutcomeConfig) -> Ratings {
    let n = f64::from(t.matches_played);
    if n == 0.0 || mu <= 0.0 {
        return Ratings {
            attack: 1.0,
            defence: 1.0,
        };
    }
    let w = n / (n + cfg.prior_matches);
    let gf = f64::from(t.goals_for) / n;
    let ga = f64::from(t.goals_against) / n;
    Ratings {
        attack: w * gf / mu + (1.0 - w),
        defence: w * ga / mu + (1.0 - w),
    }
}

/// Competition home goal edge per home match, shrunk toward zero on small samples.
pub fn home_advantage(competition: &Tally) -> f64 {
    let m = f64::from(competition.home_matches);
    if m == 0.0 {
        return 0.0;
    }
    let raw = (f64::from(competition.home_goals_for) - f64::from(competition.home_goals_against)) / m;
    raw * m / (m + HOME_ADV_MIN_N)
}

/// Against a competition-average opponent at a neutral venue; `None` without matches.
pub fn outcome_probs(t: &Tally, competition: &Tally, cfg: &OutcomeConfig) -> Option<Prob3> {
    if t.matches_played == 0 {
        return None;
    }
    let mu = baseline_goals(competition, cfg);
    let r = ratings(t, mu, cfg);
    Some(poisson_dc(mu * r.attack, mu * r.defence, cfg))
}

/// Probabilities from the home side's perspective.
pub fn matchup_probs(home: &Tally, away: &Tally, competition: &Tally, cfg: &OutcomeConfig) -> Prob3 {
    let mu = baseline_goals(competition, cfg);
    let h = ratings(home, mu, cfg);
    let a = ratings(away, mu, cfg);
    let adv = home_advantage(competition);
    let lambda_home = mu * h.attack * a.defence + adv / 2.0;
    let lambda_away = mu * a.attack * h.defence - adv / 2.0;
    poisson_dc(lambda_home, lambda_away, cfg)
}

fn poisson_dc(lambda_for: f64, lambda_against: f64, cfg: &OutcomeConfig) -> Prob3 {
    let lf = lambda_for.clamp(LAMBDA_MIN, LAMBDA_MAX);
    let la = lambda_against.clamp(LAMBDA_MIN, LAMBDA_MAX);
    let scored = goal_distribution(lf, cfg.max_goals);
    let conceded = goal_distribution(la, cfg.max_goals);

    let mut p = Prob3 {
        win: 0.0,
        draw: 0.0,
        loss: 0.0,
    };
    for (gf, p_for) in scored.iter().enumerate() {
        for (ga, p_against) in conceded.iter().enumerate() {
            let cell = (p_for * p_against * low_score_adjustment(gf, ga, lf, la, cfg.dc_rho)).max(0.0);
            match gf.cmp(&ga) {
                Ordering::Greater => p.win += cell,
                Ordering::Equal => p.draw += cell,
                Ordering::Less => p.loss += cell,
            }
        }
    }

    let total = (p.win + p.draw + p.loss).max(1e-12);
    Prob3 {
        win: p.win / total,
        draw: p.draw / total,
        loss: p.loss / total,
    }
}

/// P(goals = k) for k in `0..=max_goals`, built by the ratio `p(k) = p(k-1) * lambda / k`.
fn goal_distribution(lambda: f64, max_goals: u32) -> Vec<f64> {
    let mut out = Vec::with_capacity(max_goals as usize + 1);
    let mut p = (-lambda).exp();
    out.push(p);
    for k in 1..=max_goals {
        p *= lambda / f64::from(k);
        out.push(p);
    }
    out
}

/// Dixon-Coles correction; only scorelines with both sides on at most one goal move.
fn low_score_adjustment(scored: usize, conceded: usize, lambda_for: f64, lambda_against: f64, rho: f64) -> f64 {
    match (scored, conceded) {
        (0, 0) => 1.0 - rho * lambda_for * lambda_against,
        (1, 0) => 1.0 + rho * lambda_against,
        (0, 1) => 1.0 + rho * lambda_for,
        (1, 1) => 1.0 - rho,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn tally(played: u32, gf: u32, ga: u32) -> Tally {
        Tally {
            matches_played: played,
            goals_for: gf,
            goals_against: ga,
            ..Tally::default()
        }
    }

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let preds = vec![
            Prob3 { win: 1.0, draw: 0.0, loss: 0.0 },
            Prob3 { win: 0.0, draw: 1.0, loss: 0.0 },
            Prob3 { win: 0.0, draw: 0.0, loss: 1.0 },
        ];
        let outcomes = vec![Outcome::Win, Outcome::Draw, Outcome::Loss];
        let e = evaluate_probs(&preds, &outcomes);
        assert_eq!(e.samples, 3);
        assert!(e.brier < 1e-12);
        assert_relative_eq!(e.accuracy, 1.0);
    }

    #[test]
    fn average_team_is_symmetric() {
        let comp = tally(40, 52, 52);
        let p = outcome_probs(&tally(10, 13, 13), &comp, &OutcomeConfig::default()).unwrap();
        assert_relative_eq!(p.win + p.draw + p.loss, 1.0, epsilon = 1e-9);
        assert_relative_eq!(p.win, p.loss, epsilon = 1e-9);
        assert!(p.draw > 0.2);
    }

    #[test]
    fn stronger_attack_raises_win_share() {
        let comp = tally(40, 52, 52);
        let cfg = OutcomeConfig::default();
        let strong = outcome_probs(&tally(10, 25, 8), &comp, &cfg).unwrap();
        let weak = outcome_probs(&tally(10, 6, 22), &comp, &cfg).unwrap();
        assert!(strong.win > weak.win);
        assert!(strong.loss < weak.loss);
        assert!(outcome_probs(&tally(0, 0, 0), &comp, &cfg).is_none());
    }

    #[test]
    fn shrinkage_pulls_small_samples_to_average() {
        let cfg = OutcomeConfig::default();
        let r = ratings(&tally(1, 5, 0), 1.3, &cfg);
        // w = 1/7
        assert_relative_eq!(r.attack, (1.0 / 7.0) * (5.0 / 1.3) + 6.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(r.defence, 6.0 / 7.0, epsilon = 1e-12);
    }

    #[test]
    fn home_advantage_favours_hosts_in_even_matchup() {
        let comp = Tally {
            matches_played: 400,
            goals_for: 520,
            goals_against: 520,
            home_matches: 200,
            home_goals_for: 300,
            home_goals_against: 220,
            ..Tally::default()
        };
        let even = tally(10, 13, 13);
        let p = matchup_probs(&even, &even, &comp, &OutcomeConfig::default());
        assert!(p.win > p.loss);
        assert_relative_eq!(home_advantage(&comp), 0.4 * 0.5, epsilon = 1e-12);
    }

    #[test]
    fn goal_distribution_matches_closed_form() {
        let d = goal_distribution(1.4, 12);
        assert_eq!(d.len(), 13);
        assert_relative_eq!(d[3], 1.4_f64.powi(3) * (-1.4_f64).exp() / 6.0, epsilon = 1e-12);
        assert_relative_eq!(d.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(low_score_adjustment(2, 0, 1.4, 1.1, -0.1), 1.0);
        assert_relative_eq!(low_score_adjustment(0, 0, 1.4, 1.1, 0.0), 1.0);
    }

    #[test]
    fn same_day_results_do_not_feed_the_baseline() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 8, d).unwrap();
        let results = vec![
            (day(10), Outcome::Win),
            (day(10), Outcome::Win),
            (day(17), Outcome::Draw),
            (day(17), Outcome::Loss),
            (day(24), Outcome::Win),
        ];
        let base = prior_day_empirical(&results);
        assert_eq!(base.len(), 5);
        assert_eq!(base[0], Prob3::uniform());
        assert_eq!(base[1], Prob3::uniform());
        assert_relative_eq!(base[2].win, 1.0);
        assert_eq!(base[2], base[3]);
        assert_relative_eq!(base[4].win, 0.5);
        assert_relative_eq!(base[4].draw, 0.25);
    }
}
