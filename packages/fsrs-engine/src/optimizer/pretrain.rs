//! Initial-stability pre-training
//!
//! Before gradient descent, each first rating's initial stability w[G-1] is
//! fitted directly to the outcome of the first long-term review, which
//! depends on nothing else in the model. The fit is a one-dimensional search
//! over log-stability: a coarse grid followed by golden-section refinement.

use tracing::{debug, warn};

use crate::model::{retrievability, INIT_S_MAX};
use crate::optimizer::loss::binary_cross_entropy;
use crate::types::{Item, Rating, S_MIN};

/// Minimum observations before a rating's stability is fitted
pub const MIN_PRETRAIN_ITEMS: usize = 8;

const GRID_POINTS: usize = 64;
const GOLDEN_ITERATIONS: usize = 60;
const GOLDEN_RATIO: f64 = 0.618_033_988_749_895;

/// First long-term outcome: (elapsed days, recalled)
type Observation = (f64, bool);

/// Group first long-term outcomes by first rating.
///
/// Same-day reviews between the first review and the first long-term one are
/// skipped; items without a long-term review contribute nothing.
fn group_by_first_rating(items: &[Item]) -> [Vec<Observation>; 4] {
    let mut groups: [Vec<Observation>; 4] = Default::default();
    for item in items {
        let Some(outcome) = item.first_long_term_review() else {
            continue;
        };
        groups[item.reviews()[0].rating.index()]
            .push((outcome.delta_t as f64, outcome.rating.is_recall()));
    }
    groups
}

fn observation_loss(observations: &[Observation], stability: f64) -> f64 {
    observations
        .iter()
        .map(|&(t, recalled)| binary_cross_entropy(retrievability(t, stability), recalled))
        .sum()
}

/// Stability minimising the cross-entropy of `observations`
fn fit_stability(observations: &[Observation]) -> f64 {
    let lo = S_MIN.ln();
    let hi = INIT_S_MAX.ln();
    let loss_at = |x: f64| observation_loss(observations, x.exp());

    // Coarse grid to bracket the minimum
    let step = (hi - lo) / (GRID_POINTS - 1) as f64;
    let mut best = 0;
    let mut best_loss = f64::INFINITY;
    for i in 0..GRID_POINTS {
        let loss = loss_at(lo + step * i as f64);
        if loss < best_loss {
            best_loss = loss;
            best = i;
        }
    }

    // Golden-section refinement inside the neighbouring cells
    let mut a = lo + step * best.saturating_sub(1) as f64;
    let mut b = (lo + step * (best + 1) as f64).min(hi);
    let mut c = b - GOLDEN_RATIO * (b - a);
    let mut d = a + GOLDEN_RATIO * (b - a);
    let mut fc = loss_at(c);
    let mut fd = loss_at(d);
    for _ in 0..GOLDEN_ITERATIONS {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - GOLDEN_RATIO * (b - a);
            fc = loss_at(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + GOLDEN_RATIO * (b - a);
            fd = loss_at(d);
        }
    }

    ((a + b) / 2.0).exp().clamp(S_MIN, INIT_S_MAX)
}

/// Fit w0..w3 from first long-term outcomes.
///
/// Ratings with fewer than [`MIN_PRETRAIN_ITEMS`] observations keep the
/// value from `initial`. The result is non-decreasing from Again to Easy.
pub fn pretrain(items: &[Item], initial: &[f64; 4]) -> [f64; 4] {
    let groups = group_by_first_rating(items);
    let mut stabilities = *initial;
    let mut fitted = 0;

    for rating in Rating::ALL {
        let observations = &groups[rating.index()];
        if observations.len() < MIN_PRETRAIN_ITEMS {
            continue;
        }
        let stability = fit_stability(observations);
        debug!(
            rating = %rating,
            observations = observations.len(),
            stability,
            "Pre-trained initial stability"
        );
        stabilities[rating.index()] = stability;
        fitted += 1;
    }

    if fitted == 0 {
        warn!(
            min_items = MIN_PRETRAIN_ITEMS,
            "Not enough first-review outcomes to pre-train; keeping initial stabilities"
        );
    }

    for i in 1..stabilities.len() {
        if stabilities[i] < stabilities[i - 1] {
            stabilities[i] = stabilities[i - 1];
        }
    }
    stabilities
}
