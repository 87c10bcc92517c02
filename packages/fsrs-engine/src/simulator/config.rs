//! Simulator configuration

use serde::{Deserialize, Serialize};

use crate::error::{FSRSError, Result};
use crate::sanitize::{check_probability_table, has_invalid_values};
use crate::types::{Rating, MIN_INTERVAL};

// ==================== Rating table ====================

/// Relative weight of each rating, indexed Again..Easy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatingTable([f64; 4]);

impl RatingTable {
    pub fn new(again: f64, hard: f64, good: f64, easy: f64) -> Self {
        Self([again, hard, good, easy])
    }

    pub fn weights(&self) -> &[f64; 4] {
        &self.0
    }

    pub fn weight(&self, rating: Rating) -> f64 {
        self.0[rating.index()]
    }

    /// Normalized probability of `rating`
    pub fn probability(&self, rating: Rating) -> f64 {
        self.weight(rating) / self.0.iter().sum::<f64>()
    }

    fn validate(&self, name: &str) -> Result<()> {
        match check_probability_table(&self.0) {
            Some(problem) => Err(FSRSError::InvalidSimulatorConfig(format!(
                "{}: {}",
                name, problem
            ))),
            None => Ok(()),
        }
    }

    /// Map a uniform draw in [0, 1) to a rating by inverse CDF
    pub fn sample(&self, uniform: f64) -> Rating {
        let total: f64 = self.0.iter().sum();
        let target = uniform * total;
        let mut cumulative = 0.0;
        let mut last_positive = Rating::Again;
        for rating in Rating::ALL {
            let weight = self.weight(rating);
            if weight <= 0.0 {
                continue;
            }
            last_positive = rating;
            cumulative += weight;
            if target < cumulative {
                return rating;
            }
        }
        last_positive
    }
}

// ==================== Simulator config ====================

/// Synthetic learner and deck settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Number of cards available to learn
    pub deck_size: usize,
    /// Number of simulated days
    pub learn_span: usize,
    /// Daily time budget (seconds)
    pub max_cost_per_day: f64,
    /// Longest interval the simulated scheduler assigns (days)
    pub max_interval: f64,
    /// Seconds spent learning a new card, by first rating
    pub learn_costs: [f64; 4],
    /// Seconds spent on a review, by rating
    pub review_costs: [f64; 4],
    pub first_rating_probabilities: RatingTable,
    /// Rating distribution when the card is recalled
    pub recall_rating_probabilities: RatingTable,
    /// Rating distribution when the card is forgotten
    pub forget_rating_probabilities: RatingTable,
    /// Multiplier on the cost of a forgotten review
    pub loss_aversion: f64,
    /// New cards per day
    pub learn_limit: usize,
    /// Reviews per day
    pub review_limit: usize,
    /// New cards do not count toward the review limit
    pub new_cards_ignore_review_limit: bool,
    /// Retrievability at which a card counts as memorized
    pub memorized_threshold: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            deck_size: 10000,
            learn_span: 365,
            max_cost_per_day: 86400.0,
            max_interval: 36500.0,
            learn_costs: [33.79, 24.3, 13.68, 6.5],
            review_costs: [23.0, 11.68, 7.33, 5.6],
            first_rating_probabilities: RatingTable::new(0.24, 0.094, 0.495, 0.171),
            recall_rating_probabilities: RatingTable::new(0.0, 0.224, 0.631, 0.145),
            forget_rating_probabilities: RatingTable::new(1.0, 0.0, 0.0, 0.0),
            loss_aversion: 2.5,
            learn_limit: 10,
            review_limit: 9999,
            new_cards_ignore_review_limit: true,
            memorized_threshold: 0.5,
        }
    }
}

/// Engine default simulator settings
pub fn default_simulator_config() -> SimulatorConfig {
    SimulatorConfig::default()
}

impl SimulatorConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(FSRSError::InvalidSimulatorConfig(msg));

        if self.learn_span == 0 {
            return invalid("learn_span must be at least 1 day".to_string());
        }
        if !self.max_cost_per_day.is_finite() || self.max_cost_per_day < 0.0 {
            return invalid(format!(
                "max_cost_per_day must be non-negative, got {}",
                self.max_cost_per_day
            ));
        }
        if !self.max_interval.is_finite() || self.max_interval < MIN_INTERVAL {
            return invalid(format!(
                "max_interval must be at least {}, got {}",
                MIN_INTERVAL, self.max_interval
            ));
        }
        if has_invalid_values(&self.learn_costs) || self.learn_costs.iter().any(|c| *c < 0.0) {
            return invalid("learn_costs must be finite and non-negative".to_string());
        }
        if has_invalid_values(&self.review_costs) || self.review_costs.iter().any(|c| *c < 0.0) {
            return invalid("review_costs must be finite and non-negative".to_string());
        }
        self.first_rating_probabilities
            .validate("first_rating_probabilities")?;
        self.recall_rating_probabilities
            .validate("recall_rating_probabilities")?;
        self.forget_rating_probabilities
            .validate("forget_rating_probabilities")?;
        if !self.loss_aversion.is_finite() || self.loss_aversion <= 0.0 {
            return invalid(format!(
                "loss_aversion must be positive, got {}",
                self.loss_aversion
            ));
        }
        if !(0.0..=1.0).contains(&self.memorized_threshold) {
            return invalid(format!(
                "memorized_threshold must be in [0, 1], got {}",
                self.memorized_threshold
            ));
        }
        Ok(())
    }

    /// Cost of a review given its rating
    pub fn review_cost(&self, rating: Rating) -> f64 {
        let cost = self.review_costs[rating.index()];
        if rating == Rating::Again {
            cost * self.loss_aversion
        } else {
            cost
        }
    }

    /// Cost of learning a new card given its first rating
    pub fn learn_cost(&self, rating: Rating) -> f64 {
        self.learn_costs[rating.index()]
    }
}
