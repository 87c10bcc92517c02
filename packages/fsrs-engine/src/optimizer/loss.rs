//! Recall-prediction loss and its gradient through the review recurrence

use rayon::prelude::*;

use crate::autodiff::{Real, Tape};
use crate::model::{forward, PARAMETER_COUNT, PARAMETER_SCALES};
use crate::sanitize::{MAX_PROBABILITY, MIN_PROBABILITY};
use crate::types::Item;

/// Approximate tape nodes recorded per review
const NODES_PER_REVIEW: usize = 96;

/// Summed loss and gradient of one item
#[derive(Debug, Clone)]
pub struct ItemLoss {
    /// Sum of per-step cross-entropies
    pub loss: f64,
    /// Number of predicted review outcomes
    pub steps: usize,
    pub gradient: [f64; PARAMETER_COUNT],
}

impl ItemLoss {
    fn empty() -> Self {
        Self {
            loss: 0.0,
            steps: 0,
            gradient: [0.0; PARAMETER_COUNT],
        }
    }
}

/// Binary cross-entropy of a recall prediction
pub fn binary_cross_entropy<T: Real>(prediction: T, recalled: bool) -> T {
    let p = prediction.clamp(MIN_PROBABILITY, MAX_PROBABILITY);
    if recalled {
        -p.ln()
    } else {
        -(-p + 1.0).ln()
    }
}

/// Loss of one item without gradient
pub fn item_loss(w: &[f64], item: &Item) -> (f64, usize) {
    let mut loss = 0.0;
    let mut steps = 0;
    forward(w, item.reviews(), None, |r, review| {
        loss += binary_cross_entropy(r, review.rating.is_recall());
        steps += 1;
    });
    (loss, steps)
}

/// Loss of one item and its gradient with respect to every weight
///
/// The item is replayed on a fresh tape; items without a long-term review
/// after the first one skip the backward pass.
pub fn item_loss_and_gradient(w: &[f64; PARAMETER_COUNT], item: &Item) -> ItemLoss {
    if item.reviews().iter().skip(1).all(|r| !r.is_long_term()) {
        return ItemLoss::empty();
    }

    let tape = Tape::with_capacity(PARAMETER_COUNT + item.len() * NODES_PER_REVIEW);
    let vars: Vec<_> = w.iter().map(|&x| tape.var(x)).collect();

    let mut total = tape.var(0.0);
    let mut steps = 0;
    forward(&vars, item.reviews(), None, |r, review| {
        total = total + binary_cross_entropy(r, review.rating.is_recall());
        steps += 1;
    });

    if steps == 0 {
        return ItemLoss::empty();
    }

    let grad = tape.gradient(total);
    let mut gradient = [0.0; PARAMETER_COUNT];
    for (g, var) in gradient.iter_mut().zip(vars.iter()) {
        *g = grad.wrt(*var);
    }

    ItemLoss {
        loss: total.value(),
        steps,
        gradient,
    }
}

/// Summed loss and step count over a data set
///
/// Items are evaluated in parallel and reduced in input order.
pub fn dataset_loss(w: &[f64], items: &[Item]) -> (f64, usize) {
    let per_item: Vec<(f64, usize)> = items.par_iter().map(|item| item_loss(w, item)).collect();
    per_item
        .into_iter()
        .fold((0.0, 0), |(loss, steps), (l, s)| (loss + l, steps + s))
}

/// Number of predicted review outcomes in a data set
pub fn count_steps(items: &[Item]) -> usize {
    items
        .iter()
        .map(|item| item.reviews().iter().skip(1).filter(|r| r.is_long_term()).count())
        .sum()
}

/// Penalty pulling weights toward `anchor`, with its gradient
pub fn regularization(
    w: &[f64; PARAMETER_COUNT],
    anchor: &[f64; PARAMETER_COUNT],
    strength: f64,
) -> (f64, [f64; PARAMETER_COUNT]) {
    let mut penalty = 0.0;
    let mut gradient = [0.0; PARAMETER_COUNT];
    for i in 0..PARAMETER_COUNT {
        let scale = PARAMETER_SCALES[i];
        let diff = (w[i] - anchor[i]) / scale;
        penalty += diff * diff;
        gradient[i] = 2.0 * strength * diff / scale;
    }
    (strength * penalty, gradient)
}
