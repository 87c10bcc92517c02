//! Parameter optimizer
//!
//! Fits the 19 model weights to observed review histories:
//! 1. Pre-train the initial stabilities w0..w3 from first long-term outcomes
//! 2. Run mini-batch Adam over shuffled items, with gradients obtained by
//!    replaying each item on a differentiation tape
//! 3. Clip weights to their bounds after every step and keep the weights
//!    with the lowest full-data loss seen at an epoch boundary
//!
//! Per-item losses and gradients are computed in parallel and summed in item
//! order, so a fixed seed reproduces the same weights.

pub mod adam;
pub mod loss;
pub mod pretrain;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FSRSError, Result};
use crate::model::{clip_weights, Parameters, PARAMETER_COUNT};
use crate::types::Item;

pub use adam::{cosine_annealing, Adam};
pub use loss::{binary_cross_entropy, count_steps, dataset_loss, item_loss, ItemLoss};
pub use pretrain::{pretrain, MIN_PRETRAIN_ITEMS};

// ==================== Configuration ====================

/// Optimizer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Initial Adam learning rate
    pub learning_rate: f64,
    /// Floor of the cosine schedule
    pub min_learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    /// Seed for batch shuffling
    pub seed: u64,
    /// Stop once an epoch improves the loss by less than this
    pub tolerance: f64,
    /// Strength of the pull toward the starting weights
    pub regularization: f64,
    /// Fit w0..w3 before gradient descent
    pub pretrain: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 4e-2,
            min_learning_rate: 1e-3,
            epochs: 5,
            batch_size: 512,
            seed: 2023,
            tolerance: 1e-5,
            regularization: 1.0,
            pretrain: true,
        }
    }
}

impl OptimizerConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(FSRSError::InvalidOptimizerConfig(msg));

        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return invalid(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            ));
        }
        if !self.min_learning_rate.is_finite()
            || self.min_learning_rate < 0.0
            || self.min_learning_rate > self.learning_rate
        {
            return invalid(format!(
                "min_learning_rate must be in [0, learning_rate], got {}",
                self.min_learning_rate
            ));
        }
        if self.epochs == 0 {
            return invalid("epochs must be at least 1".to_string());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1".to_string());
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return invalid(format!("tolerance must be non-negative, got {}", self.tolerance));
        }
        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return invalid(format!(
                "regularization must be non-negative, got {}",
                self.regularization
            ));
        }
        Ok(())
    }
}

// ==================== Training ====================

/// Mean cross-entropy over every predicted step, or `None` without steps
fn mean_loss(w: &[f64], items: &[Item]) -> Option<f64> {
    let (loss, steps) = dataset_loss(w, items);
    (steps > 0).then(|| loss / steps as f64)
}

/// Fit weights to `items`, starting from and regularizing toward `start`.
///
/// Returns `start` unchanged when no item contains a predictable step.
pub fn compute_parameters(
    items: &[Item],
    start: &Parameters,
    config: &OptimizerConfig,
) -> Result<Parameters> {
    config.validate()?;
    if items.is_empty() {
        return Err(FSRSError::EmptyTrainingSet);
    }

    let total_steps = count_steps(items);
    info!(
        items = items.len(),
        steps = total_steps,
        epochs = config.epochs,
        batch_size = config.batch_size,
        "Starting parameter optimization"
    );
    if total_steps == 0 {
        warn!(
            items = items.len(),
            "Training set has no long-term reviews to predict; keeping starting parameters"
        );
        return Ok(start.clone());
    }

    let mut weights = *start.as_array();
    if config.pretrain {
        let mut initial = [0.0; 4];
        initial.copy_from_slice(&weights[..4]);
        weights[..4].copy_from_slice(&pretrain(items, &initial));
    }
    clip_weights(&mut weights);
    let anchor = weights;

    let mut best_weights = weights;
    let mut best_loss = mean_loss(&weights, items).unwrap_or(f64::INFINITY);
    let mut previous_loss = best_loss;
    debug!(loss = best_loss, "Initial loss");

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut adam = Adam::new();
    let mut order: Vec<usize> = (0..items.len()).collect();
    let batches_per_epoch = items.len().div_ceil(config.batch_size);
    let total_iterations = batches_per_epoch * config.epochs;
    let mut iteration = 0;

    for epoch in 0..config.epochs {
        order.shuffle(&mut rng);

        for batch in order.chunks(config.batch_size) {
            let learning_rate = cosine_annealing(
                config.learning_rate,
                config.min_learning_rate,
                iteration,
                total_iterations,
            );
            iteration += 1;

            let results: Vec<ItemLoss> = batch
                .par_iter()
                .map(|&i| loss::item_loss_and_gradient(&weights, &items[i]))
                .collect();

            let batch_steps: usize = results.iter().map(|r| r.steps).sum();
            if batch_steps == 0 {
                continue;
            }

            let mut gradient = [0.0; PARAMETER_COUNT];
            for result in &results {
                for (g, rg) in gradient.iter_mut().zip(result.gradient.iter()) {
                    *g += rg;
                }
            }
            let (_, penalty_gradient) =
                loss::regularization(&weights, &anchor, config.regularization);
            let penalty_share = batch_steps as f64 / total_steps as f64;
            for (g, pg) in gradient.iter_mut().zip(penalty_gradient.iter()) {
                *g = *g / batch_steps as f64 + pg * penalty_share;
            }

            adam.step(&mut weights, &gradient, learning_rate);
            clip_weights(&mut weights);
        }

        let epoch_loss = mean_loss(&weights, items).unwrap_or(f64::INFINITY);
        debug!(
            epoch,
            loss = epoch_loss,
            learning_rate = cosine_annealing(
                config.learning_rate,
                config.min_learning_rate,
                iteration.saturating_sub(1),
                total_iterations,
            ),
            "Epoch complete"
        );

        if epoch_loss < best_loss {
            best_loss = epoch_loss;
            best_weights = weights;
        }
        if previous_loss - epoch_loss < config.tolerance {
            debug!(epoch, "Loss improvement below tolerance, stopping early");
            break;
        }
        previous_loss = epoch_loss;
    }

    info!(final_loss = best_loss, steps = adam.steps(), "Parameter optimization finished");
    Ok(Parameters::clipped(best_weights))
}
