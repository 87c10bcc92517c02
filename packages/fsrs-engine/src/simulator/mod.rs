//! Day-stepped Monte Carlo simulation of a learner working through a deck
//!
//! Each simulated day:
//! 1. Due cards are ordered by due day, then card index
//! 2. Every due card draws two uniforms: one decides recall against the
//!    card's retrievability, the other picks the rating from the recall or
//!    forget table
//! 3. Review outcomes are computed in parallel from those draws, then
//!    accepted one by one while the review limit and cost budget allow
//! 4. New cards are introduced up to the learn limit, each with one draw
//!    for its first rating
//! 5. Cards at or above the memorized threshold are counted
//!
//! All randomness comes from one seeded `ChaCha8Rng`, so a seed fully
//! determines the result.

pub mod config;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FSRSError, Result};
use crate::model::{initial_state, next_interval, next_state, retrievability, Parameters, State};
use crate::sanitize::validate_retention;
use crate::types::MIN_INTERVAL;

pub use config::{default_simulator_config, RatingTable, SimulatorConfig};

/// Seed used when the caller does not supply one
pub const DEFAULT_SEED: u64 = 42;

/// Desired retentions tried by [`optimal_retention`], in percent
const RETENTION_SEARCH_RANGE: std::ops::RangeInclusive<u32> = 70..=95;

// ==================== Data Structures ====================

/// Per-day aggregates, one entry per simulated day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Introduced cards at or above the memorized threshold at day end
    pub memorized_cnt_per_day: Vec<usize>,
    pub review_cnt_per_day: Vec<usize>,
    pub learn_cnt_per_day: Vec<usize>,
    /// Seconds spent
    pub cost_per_day: Vec<f64>,
    /// Reviews whose recall draw succeeded
    pub correct_cnt_per_day: Vec<usize>,
}

impl SimulationResult {
    fn with_capacity(days: usize) -> Self {
        Self {
            memorized_cnt_per_day: Vec::with_capacity(days),
            review_cnt_per_day: Vec::with_capacity(days),
            learn_cnt_per_day: Vec::with_capacity(days),
            cost_per_day: Vec::with_capacity(days),
            correct_cnt_per_day: Vec::with_capacity(days),
        }
    }

    /// Number of simulated days
    pub fn days(&self) -> usize {
        self.review_cnt_per_day.len()
    }

    pub fn total_cost(&self) -> f64 {
        self.cost_per_day.iter().sum()
    }

    pub fn total_reviews(&self) -> usize {
        self.review_cnt_per_day.iter().sum()
    }

    pub fn total_learned(&self) -> usize {
        self.learn_cnt_per_day.iter().sum()
    }
}

/// A card that has been introduced
#[derive(Debug, Clone, Copy)]
struct Card {
    state: State<f64>,
    last_review: usize,
    due: usize,
}

/// Result of reviewing one due card, pending acceptance
#[derive(Debug, Clone, Copy)]
struct ReviewOutcome {
    card: Card,
    recalled: bool,
    cost: f64,
}

// ==================== Simulation ====================

struct Simulation<'a> {
    w: &'a [f64],
    config: &'a SimulatorConfig,
    desired_retention: f64,
}

impl Simulation<'_> {
    fn schedule(&self, state: State<f64>, today: usize) -> usize {
        let interval = next_interval(state.stability, self.desired_retention)
            .round()
            .clamp(MIN_INTERVAL, self.config.max_interval);
        today + interval as usize
    }

    fn review(
        &self,
        card: &Card,
        today: usize,
        recall_draw: f64,
        rating_draw: f64,
    ) -> ReviewOutcome {
        let elapsed = (today - card.last_review) as f64;
        let r = retrievability(elapsed, card.state.stability);
        let recalled = recall_draw < r;
        let rating = if recalled {
            self.config.recall_rating_probabilities.sample(rating_draw)
        } else {
            self.config.forget_rating_probabilities.sample(rating_draw)
        };
        let state = next_state(self.w, Some(card.state), rating, elapsed);
        ReviewOutcome {
            card: Card {
                state,
                last_review: today,
                due: self.schedule(state, today),
            },
            recalled,
            cost: self.config.review_cost(rating),
        }
    }

    fn run(&self, rng: &mut ChaCha8Rng) -> SimulationResult {
        let config = self.config;
        let mut cards: Vec<Card> = Vec::with_capacity(config.deck_size);
        let mut result = SimulationResult::with_capacity(config.learn_span);

        for today in 0..config.learn_span {
            let mut due: Vec<usize> = (0..cards.len())
                .filter(|&i| cards[i].due <= today)
                .collect();
            due.sort_by_key(|&i| (cards[i].due, i));

            let review_draws: Vec<(f64, f64)> =
                due.iter().map(|_| (rng.gen(), rng.gen())).collect();
            let potential_new = config.learn_limit.min(config.deck_size - cards.len());
            let learn_draws: Vec<f64> = (0..potential_new).map(|_| rng.gen()).collect();

            let outcomes: Vec<ReviewOutcome> = due
                .par_iter()
                .zip(review_draws.par_iter())
                .map(|(&i, &(recall_draw, rating_draw))| {
                    self.review(&cards[i], today, recall_draw, rating_draw)
                })
                .collect();

            let mut cost = 0.0;
            let mut reviews = 0;
            let mut correct = 0;
            for (&i, outcome) in due.iter().zip(outcomes.iter()) {
                if reviews >= config.review_limit
                    || cost + outcome.cost > config.max_cost_per_day
                {
                    break;
                }
                cards[i] = outcome.card;
                cost += outcome.cost;
                reviews += 1;
                if outcome.recalled {
                    correct += 1;
                }
            }

            let mut learned = 0;
            for draw in learn_draws {
                if !config.new_cards_ignore_review_limit
                    && reviews + learned >= config.review_limit
                {
                    break;
                }
                let rating = config.first_rating_probabilities.sample(draw);
                let learn_cost = config.learn_cost(rating);
                if cost + learn_cost > config.max_cost_per_day {
                    break;
                }
                let state = initial_state(self.w, rating);
                cards.push(Card {
                    state,
                    last_review: today,
                    due: self.schedule(state, today),
                });
                cost += learn_cost;
                learned += 1;
            }

            let threshold = config.memorized_threshold;
            let memorized = cards
                .par_iter()
                .filter(|card| {
                    retrievability((today - card.last_review) as f64, card.state.stability)
                        >= threshold
                })
                .count();

            result.memorized_cnt_per_day.push(memorized);
            result.review_cnt_per_day.push(reviews);
            result.learn_cnt_per_day.push(learned);
            result.cost_per_day.push(cost);
            result.correct_cnt_per_day.push(correct);
        }

        result
    }
}

/// Simulate `config.learn_span` days of study with the given weights.
///
/// `config` defaults to [`default_simulator_config`] and `seed` to
/// [`DEFAULT_SEED`]. Everything is validated before the first day runs.
pub fn simulate(
    weights: &[f64],
    desired_retention: f64,
    config: Option<&SimulatorConfig>,
    seed: Option<u64>,
) -> Result<SimulationResult> {
    let parameters = Parameters::new(weights)?;
    validate_retention(desired_retention)?;
    let default_config;
    let config = match config {
        Some(config) => config,
        None => {
            default_config = default_simulator_config();
            &default_config
        }
    };
    config.validate()?;
    let seed = seed.unwrap_or(DEFAULT_SEED);

    info!(
        days = config.learn_span,
        deck_size = config.deck_size,
        desired_retention,
        seed,
        "Starting simulation"
    );

    let simulation = Simulation {
        w: parameters.as_slice(),
        config,
        desired_retention,
    };
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let result = simulation.run(&mut rng);

    info!(
        reviews = result.total_reviews(),
        learned = result.total_learned(),
        total_cost = result.total_cost(),
        memorized = result.memorized_cnt_per_day.last().copied().unwrap_or(0),
        "Simulation finished"
    );
    Ok(result)
}

/// Desired retention in [0.70, 0.95] that minimises total cost per
/// memorized card at the end of the simulation.
///
/// Candidates are simulated in parallel with the same seed; ties keep the
/// lower retention.
pub fn optimal_retention(
    weights: &[f64],
    config: Option<&SimulatorConfig>,
    seed: Option<u64>,
) -> Result<f64> {
    Parameters::new(weights)?;
    if let Some(config) = config {
        config.validate()?;
    }

    let candidates: Vec<f64> = RETENTION_SEARCH_RANGE.map(|p| p as f64 / 100.0).collect();
    let scores: Vec<(f64, f64)> = candidates
        .par_iter()
        .map(|&retention| -> Result<(f64, f64)> {
            let result = simulate(weights, retention, config, seed)?;
            let memorized = result.memorized_cnt_per_day.last().copied().unwrap_or(0);
            let cost_per_card = if memorized > 0 {
                result.total_cost() / memorized as f64
            } else {
                f64::INFINITY
            };
            Ok((retention, cost_per_card))
        })
        .collect::<Result<_>>()?;

    let mut best = (candidates[0], f64::INFINITY);
    for &(retention, cost) in &scores {
        debug!(retention, cost_per_memorized = cost, "Evaluated retention");
        if cost < best.1 {
            best = (retention, cost);
        }
    }
    if !best.1.is_finite() {
        return Err(FSRSError::InvalidSimulatorConfig(
            "no candidate retention memorized any card".to_string(),
        ));
    }

    info!(retention = best.0, cost_per_memorized = best.1, "Optimal retention found");
    Ok(best.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DEFAULT_PARAMETERS;

    fn small_config() -> SimulatorConfig {
        SimulatorConfig {
            deck_size: 200,
            learn_span: 60,
            learn_limit: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_same_seed_same_result() {
        let config = small_config();
        let a = simulate(&DEFAULT_PARAMETERS, 0.9, Some(&config), Some(7)).unwrap();
        let b = simulate(&DEFAULT_PARAMETERS, 0.9, Some(&config), Some(7)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.days(), 60);
        assert_eq!(a.memorized_cnt_per_day.len(), 60);
        assert_eq!(a.correct_cnt_per_day.len(), 60);
    }

    #[test]
    fn test_different_seed_differs() {
        let config = small_config();
        let a = simulate(&DEFAULT_PARAMETERS, 0.9, Some(&config), Some(1)).unwrap();
        let b = simulate(&DEFAULT_PARAMETERS, 0.9, Some(&config), Some(2)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_learn_limit_and_deck_size() {
        let config = small_config();
        let result = simulate(&DEFAULT_PARAMETERS, 0.9, Some(&config), None).unwrap();
        assert!(result.learn_cnt_per_day.iter().all(|&n| n <= 10));
        // 200 cards at 10 per day are all introduced within 20 days
        assert_eq!(result.total_learned(), 200);
        assert!(result.learn_cnt_per_day[20..].iter().all(|&n| n == 0));
        assert_eq!(result.review_cnt_per_day[0], 0);
    }

    #[test]
    fn test_correct_never_exceeds_reviews() {
        let result = simulate(&DEFAULT_PARAMETERS, 0.85, Some(&small_config()), Some(3)).unwrap();
        for (correct, reviews) in result
            .correct_cnt_per_day
            .iter()
            .zip(result.review_cnt_per_day.iter())
        {
            assert!(correct <= reviews);
        }
        assert!(result
            .memorized_cnt_per_day
            .iter()
            .zip(1..)
            .all(|(&m, day)| m <= (day * 10).min(200)));
    }

    #[test]
    fn test_correct_follows_recall_not_rating() {
        // Every review is graded Again, recalled or not
        let config = SimulatorConfig {
            recall_rating_probabilities: RatingTable::new(1.0, 0.0, 0.0, 0.0),
            ..small_config()
        };
        let result = simulate(&DEFAULT_PARAMETERS, 0.9, Some(&config), Some(3)).unwrap();
        let correct: usize = result.correct_cnt_per_day.iter().sum();
        assert!(result.total_reviews() > 0);
        assert!(correct > 0);
        assert!(correct <= result.total_reviews());
    }

    #[test]
    fn test_review_limit_respected() {
        let config = SimulatorConfig {
            review_limit: 5,
            ..small_config()
        };
        let result = simulate(&DEFAULT_PARAMETERS, 0.9, Some(&config), None).unwrap();
        assert!(result.review_cnt_per_day.iter().all(|&n| n <= 5));
    }

    #[test]
    fn test_cost_budget_respected() {
        let config = SimulatorConfig {
            max_cost_per_day: 200.0,
            ..small_config()
        };
        let result = simulate(&DEFAULT_PARAMETERS, 0.9, Some(&config), None).unwrap();
        assert!(result.cost_per_day.iter().all(|&c| c <= 200.0));
    }

    #[test]
    fn test_higher_retention_costs_more_reviews() {
        let config = small_config();
        let low = simulate(&DEFAULT_PARAMETERS, 0.7, Some(&config), Some(5)).unwrap();
        let high = simulate(&DEFAULT_PARAMETERS, 0.97, Some(&config), Some(5)).unwrap();
        assert!(high.total_reviews() > low.total_reviews());
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(matches!(
            simulate(&DEFAULT_PARAMETERS[..10], 0.9, None, None),
            Err(FSRSError::InvalidParameterVector(_))
        ));
        assert!(matches!(
            simulate(&DEFAULT_PARAMETERS, 1.2, None, None),
            Err(FSRSError::InvalidRetentionTarget(_))
        ));
        let config = SimulatorConfig {
            learn_span: 0,
            ..Default::default()
        };
        assert!(matches!(
            simulate(&DEFAULT_PARAMETERS, 0.9, Some(&config), None),
            Err(FSRSError::InvalidSimulatorConfig(_))
        ));
    }

    #[test]
    fn test_optimal_retention_in_range() {
        let config = SimulatorConfig {
            deck_size: 100,
            learn_span: 90,
            ..Default::default()
        };
        let retention = optimal_retention(&DEFAULT_PARAMETERS, Some(&config), Some(1)).unwrap();
        assert!((0.7..=0.95).contains(&retention));
    }
}
