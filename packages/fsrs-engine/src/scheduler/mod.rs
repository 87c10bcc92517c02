//! FSRS scheduling engine
//!
//! Holds a validated weight vector and exposes the operations callers
//! schedule with: next-state prediction for every rating, history replay,
//! legacy SM-2 conversion, training and evaluation.
//!
//! The engine is immutable after construction and can be shared across
//! threads.

use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::benchmark::{self, Evaluation};
use crate::error::{FSRSError, Result};
use crate::model::{self, forward, next_state, Parameters, State};
use crate::optimizer::{self, OptimizerConfig};
use crate::sanitize::validate_retention;
use crate::types::{
    Item, ItemState, MemoryState, NextStates, Rating, DECAY, DEFAULT_MAX_INTERVAL, D_MAX, D_MIN,
    FACTOR, MIN_INTERVAL, S_MAX, S_MIN,
};

/// Scheduler bound to one weight vector
#[derive(Debug, Clone, PartialEq)]
pub struct FSRS {
    parameters: Parameters,
    maximum_interval: f64,
}

impl Default for FSRS {
    fn default() -> Self {
        Self::with_parameters(Parameters::default())
    }
}

impl FSRS {
    /// Validate `weights` once and build an engine around them
    pub fn new(weights: &[f64]) -> Result<Self> {
        Ok(Self::with_parameters(Parameters::new(weights)?))
    }

    pub fn with_parameters(parameters: Parameters) -> Self {
        Self {
            parameters,
            maximum_interval: DEFAULT_MAX_INTERVAL,
        }
    }

    /// Cap scheduled intervals at `maximum_interval` days (at least 1)
    pub fn with_maximum_interval(mut self, maximum_interval: f64) -> Result<Self> {
        if !maximum_interval.is_finite() || maximum_interval < MIN_INTERVAL {
            return Err(FSRSError::InvalidParameterVector(format!(
                "maximum interval must be at least {} day, got {}",
                MIN_INTERVAL, maximum_interval
            )));
        }
        self.maximum_interval = maximum_interval;
        Ok(self)
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn maximum_interval(&self) -> f64 {
        self.maximum_interval
    }

    fn w(&self) -> &[f64] {
        self.parameters.as_slice()
    }

    fn interval(&self, stability: f64, desired_retention: f64) -> f64 {
        model::next_interval(stability, desired_retention)
            .clamp(MIN_INTERVAL, self.maximum_interval)
    }

    // ==================== Scheduling ====================

    /// Predicted state and interval for each of the four ratings.
    ///
    /// `current` is `None` for an item that has never been reviewed, in which
    /// case `days_elapsed` must be 0. A supplied state is clamped into the
    /// model's stability and difficulty ranges.
    pub fn next_states(
        &self,
        current: Option<MemoryState>,
        desired_retention: f64,
        days_elapsed: u32,
    ) -> Result<NextStates> {
        validate_retention(desired_retention)?;
        let last = match current {
            None if days_elapsed != 0 => {
                return Err(FSRSError::InvalidElapsedTime(format!(
                    "a new item must be scheduled with 0 elapsed days, got {}",
                    days_elapsed
                )));
            }
            None => None,
            Some(state) => {
                state.validate()?;
                Some(clamp_state(state))
            }
        };

        let state_for = |rating: Rating| -> ItemState {
            let next = next_state(self.w(), last, rating, days_elapsed as f64);
            ItemState {
                memory: MemoryState::new(next.stability, next.difficulty),
                interval: self.interval(next.stability, desired_retention),
            }
        };

        Ok(NextStates {
            again: state_for(Rating::Again),
            hard: state_for(Rating::Hard),
            good: state_for(Rating::Good),
            easy: state_for(Rating::Easy),
        })
    }

    /// Days until recall falls to `desired_retention`, within the interval
    /// bounds
    pub fn next_interval(&self, stability: f64, desired_retention: f64) -> Result<f64> {
        validate_retention(desired_retention)?;
        MemoryState::new(stability, D_MIN).validate()?;
        Ok(self.interval(stability.min(S_MAX), desired_retention))
    }

    /// Recall probability `days_elapsed` days after the last review
    pub fn current_retrievability(&self, state: MemoryState, days_elapsed: f64) -> f64 {
        model::retrievability(days_elapsed, state.stability.clamp(S_MIN, S_MAX))
    }

    // ==================== Memory state ====================

    /// Replay an item's history, optionally on top of an earlier state
    pub fn memory_state(&self, item: &Item, starting: Option<MemoryState>) -> Result<MemoryState> {
        let start = match starting {
            Some(state) => {
                state.validate()?;
                Some(clamp_state(state))
            }
            None => None,
        };
        let end =
            forward(self.w(), item.reviews(), start, |_, _| {}).ok_or(FSRSError::EmptyItem)?;
        Ok(MemoryState::new(end.stability, end.difficulty))
    }

    /// Final memory state of every item, computed in parallel
    pub fn memory_states(&self, items: &[Item]) -> Result<Vec<MemoryState>> {
        items
            .par_iter()
            .map(|item| self.memory_state(item, None))
            .collect()
    }

    /// Convert an SM-2 ease factor and interval into a memory state.
    ///
    /// Stability is the value whose forgetting curve reaches `sm2_retention`
    /// after `interval` days. Difficulty is the value for which one successful
    /// review at that retrievability multiplies stability by `ease_factor`.
    pub fn memory_state_from_sm2(
        &self,
        ease_factor: f64,
        interval: f64,
        sm2_retention: f64,
    ) -> Result<MemoryState> {
        if !(sm2_retention > 0.0 && sm2_retention < 1.0) {
            return Err(FSRSError::InvalidLegacyState(format!(
                "retention must be in (0, 1), got {}",
                sm2_retention
            )));
        }
        if !ease_factor.is_finite() || ease_factor < 1.0 {
            return Err(FSRSError::InvalidLegacyState(format!(
                "ease factor must be at least 1, got {}",
                ease_factor
            )));
        }
        if !interval.is_finite() || interval <= 0.0 {
            return Err(FSRSError::InvalidLegacyState(format!(
                "interval must be positive, got {}",
                interval
            )));
        }

        let w = self.w();
        let stability = (interval.max(S_MIN) * FACTOR / (sm2_retention.powf(1.0 / DECAY) - 1.0))
            .clamp(S_MIN, S_MAX);
        let growth_per_difficulty = w[8].exp()
            * stability.powf(-w[9])
            * (((1.0 - sm2_retention) * w[10]).exp() - 1.0);
        let difficulty = if growth_per_difficulty > 0.0 {
            11.0 - (ease_factor - 1.0) / growth_per_difficulty
        } else {
            D_MAX
        };

        Ok(MemoryState::new(stability, difficulty.clamp(D_MIN, D_MAX)))
    }

    // ==================== Training & evaluation ====================

    /// Fit weights to `items` with the default optimizer settings, starting
    /// from this engine's weights
    pub fn compute_parameters(&self, items: &[Item]) -> Result<Parameters> {
        self.compute_parameters_with(items, &OptimizerConfig::default())
    }

    pub fn compute_parameters_with(
        &self,
        items: &[Item],
        config: &OptimizerConfig,
    ) -> Result<Parameters> {
        optimizer::compute_parameters(items, &self.parameters, config)
    }

    pub fn evaluate(&self, items: &[Item]) -> Result<Evaluation> {
        benchmark::evaluate(&self.parameters, items)
    }

    /// Metric name to value, see [`Evaluation::to_metrics`]
    pub fn benchmark(&self, items: &[Item]) -> Result<BTreeMap<String, f64>> {
        Ok(self.evaluate(items)?.to_metrics())
    }
}

fn clamp_state(state: MemoryState) -> State<f64> {
    State {
        stability: state.stability.clamp(S_MIN, S_MAX),
        difficulty: state.difficulty.clamp(D_MIN, D_MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{initial_difficulty, DEFAULT_PARAMETERS};
    use crate::types::{Review, EPSILON};

    fn item(reviews: &[(u8, u32)]) -> Item {
        Item::new(
            reviews
                .iter()
                .map(|&(r, t)| Review::new(r, t).unwrap())
                .collect(),
        )
        .unwrap()
    }

    fn assert_monotone(next: &NextStates) {
        let intervals: Vec<f64> = next.iter().map(|(_, s)| s.interval).collect();
        assert!(
            intervals.windows(2).all(|w| w[0] <= w[1]),
            "intervals not ordered: {:?}",
            intervals
        );
    }

    #[test]
    fn test_rejects_bad_weights() {
        assert!(FSRS::new(&DEFAULT_PARAMETERS).is_ok());
        assert!(matches!(
            FSRS::new(&DEFAULT_PARAMETERS[..17]),
            Err(FSRSError::InvalidParameterVector(_))
        ));
    }

    #[test]
    fn test_new_item_good() {
        let fsrs = FSRS::default();
        let next = fsrs.next_states(None, 0.9, 0).unwrap();
        let good = next.good;
        assert!((good.memory.stability - DEFAULT_PARAMETERS[2]).abs() < EPSILON);
        assert!(good.memory.stability > next.again.memory.stability);
        assert!(good.interval >= 1.0 && good.interval < 10.0);
        assert_monotone(&next);
    }

    #[test]
    fn test_new_item_requires_zero_elapsed() {
        let fsrs = FSRS::default();
        assert!(matches!(
            fsrs.next_states(None, 0.9, 3),
            Err(FSRSError::InvalidElapsedTime(_))
        ));
    }

    #[test]
    fn test_retention_validated() {
        let fsrs = FSRS::default();
        for bad in [0.0, 1.5, -0.2] {
            assert!(matches!(
                fsrs.next_states(None, bad, 0),
                Err(FSRSError::InvalidRetentionTarget(_))
            ));
        }
        assert!(fsrs.next_states(None, 1.0, 0).is_ok());
    }

    #[test]
    fn test_review_states_ordered() {
        let fsrs = FSRS::default();
        let state = MemoryState::new(12.0, 6.0);
        for days in [0, 1, 5, 12, 40] {
            let next = fsrs.next_states(Some(state), 0.9, days).unwrap();
            assert_monotone(&next);
            assert!(next.again.memory.stability <= state.stability);
        }
    }

    #[test]
    fn test_higher_retention_shortens_interval() {
        let fsrs = FSRS::default();
        let state = MemoryState::new(20.0, 5.0);
        let relaxed = fsrs.next_states(Some(state), 0.8, 20).unwrap();
        let strict = fsrs.next_states(Some(state), 0.95, 20).unwrap();
        assert!(strict.good.interval < relaxed.good.interval);
    }

    #[test]
    fn test_maximum_interval() {
        let fsrs = FSRS::default().with_maximum_interval(30.0).unwrap();
        let next = fsrs.next_states(Some(MemoryState::new(500.0, 3.0)), 0.9, 500).unwrap();
        assert_eq!(next.easy.interval, 30.0);
        assert!(FSRS::default().with_maximum_interval(0.5).is_err());
    }

    #[test]
    fn test_memory_state_single_review_matches_initial() {
        let fsrs = FSRS::default();
        let state = fsrs.memory_state(&item(&[(3, 0)]), None).unwrap();
        let w = DEFAULT_PARAMETERS;
        assert!((state.stability - w[2]).abs() < EPSILON);
        assert!((state.difficulty - initial_difficulty(&w[..], Rating::Good)).abs() < EPSILON);
    }

    #[test]
    fn test_memory_state_matches_next_states() {
        let fsrs = FSRS::default();
        let full = fsrs.memory_state(&item(&[(3, 0), (3, 4), (2, 9)]), None).unwrap();

        let first = fsrs.next_states(None, 0.9, 0).unwrap().good.memory;
        let second = fsrs.next_states(Some(first), 0.9, 4).unwrap().good.memory;
        let third = fsrs.next_states(Some(second), 0.9, 9).unwrap().hard.memory;
        assert!((full.stability - third.stability).abs() < 1e-9);
        assert!((full.difficulty - third.difficulty).abs() < 1e-9);

        let resumed = fsrs.memory_state(&item(&[(2, 9)]), Some(second)).unwrap();
        assert!((resumed.stability - third.stability).abs() < 1e-9);
    }

    #[test]
    fn test_memory_states_batch() {
        let fsrs = FSRS::default();
        let items = vec![item(&[(3, 0)]), item(&[(1, 0), (3, 2)])];
        let states = fsrs.memory_states(&items).unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0], fsrs.memory_state(&items[0], None).unwrap());
    }

    #[test]
    fn test_sm2_conversion() {
        let fsrs = FSRS::default();
        let state = fsrs.memory_state_from_sm2(2.5, 10.0, 0.9).unwrap();
        assert!((state.stability - 10.0).abs() < 1e-9);
        assert!((D_MIN..=D_MAX).contains(&state.difficulty));

        // A higher ease means an easier item
        let easy = fsrs.memory_state_from_sm2(3.0, 10.0, 0.9).unwrap();
        let hard = fsrs.memory_state_from_sm2(1.3, 10.0, 0.9).unwrap();
        assert!(easy.difficulty <= hard.difficulty);

        assert!(matches!(
            fsrs.memory_state_from_sm2(0.5, 10.0, 0.9),
            Err(FSRSError::InvalidLegacyState(_))
        ));
        assert!(fsrs.memory_state_from_sm2(2.5, 0.0, 0.9).is_err());
        assert!(fsrs.memory_state_from_sm2(2.5, 10.0, 1.0).is_err());
    }

    #[test]
    fn test_current_retrievability() {
        let fsrs = FSRS::default();
        let state = MemoryState::new(10.0, 5.0);
        assert!((fsrs.current_retrievability(state, 0.0) - 1.0).abs() < EPSILON);
        assert!((fsrs.current_retrievability(state, 10.0) - 0.9).abs() < 1e-9);
        assert!((fsrs.next_interval(10.0, 0.9).unwrap() - 10.0).abs() < 1e-9);
        assert!(fsrs.next_interval(0.0, 0.9).is_err());
    }

    #[test]
    fn test_benchmark_keys() {
        let fsrs = FSRS::default();
        let metrics = fsrs.benchmark(&[item(&[(3, 0), (3, 3), (3, 8)])]).unwrap();
        for key in ["log_loss", "rmse", "rmse_bins", "auc", "count"] {
            assert!(metrics.contains_key(key), "missing {}", key);
        }
    }
}
