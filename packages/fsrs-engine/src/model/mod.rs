//! FSRS-5 Memory Model
//!
//! Core theory:
//! - A memory trace is described by stability S (days until recall drops to
//!   90%) and difficulty D in [1, 10]
//! - Recall probability decays along a power-law forgetting curve
//! - Each review updates S and D depending on the rating and on how much the
//!   trace had decayed at review time
//!
//! Mathematical formulas:
//! - Retrievability: R(t, S) = (1 + FACTOR * t / S)^DECAY
//! - Interval: I(S, r) = S / FACTOR * (r^(1/DECAY) - 1)
//! - Initial state: S0(G) = w[G-1], D0(G) = w4 - e^(w5 * (G-1)) + 1
//! - Difficulty: D' = w7 * D0(Easy) + (1 - w7) * (D - w6 * (G-3) * (10 - D) / 9)
//! - Success: S' = S * (1 + e^w8 * (11 - D) * S^(-w9) * (e^((1-R) * w10) - 1) * h * b)
//! - Lapse: S' = min(w11 * D^(-w12) * ((S+1)^w13 - 1) * e^((1-R) * w14), S / e^(w17 * w18))
//! - Same day: S' = S * e^(w17 * (G - 3 + w18))
//!
//! Every function is generic over [`Real`] so the same code runs on plain
//! floats and on the differentiation tape.

pub mod parameters;

pub use parameters::{
    clip_weights, default_parameters, Parameters, DEFAULT_PARAMETERS, INIT_S_MAX,
    PARAMETER_BOUNDS, PARAMETER_COUNT, PARAMETER_SCALES,
};

use crate::autodiff::Real;
use crate::types::{Rating, Review, DECAY, D_MAX, D_MIN, FACTOR, S_MAX, S_MIN};

// ==================== Data Structures ====================

/// Stability/difficulty pair over any scalar type
#[derive(Clone, Copy, Debug)]
pub struct State<T> {
    pub stability: T,
    pub difficulty: T,
}

// ==================== Forgetting Curve ====================

/// Probability of recall after `elapsed_days` given `stability`
pub fn retrievability<T: Real>(elapsed_days: f64, stability: T) -> T {
    (stability.recip() * (FACTOR * elapsed_days.max(0.0)) + 1.0).powc(DECAY)
}

/// Inverse of [`retrievability`]: days until recall falls to `desired_retention`
///
/// No clamping; the scheduler applies interval bounds.
pub fn next_interval(stability: f64, desired_retention: f64) -> f64 {
    stability / FACTOR * (desired_retention.powf(1.0 / DECAY) - 1.0)
}

// ==================== Initial State ====================

pub fn initial_stability<T: Real>(w: &[T], rating: Rating) -> T {
    w[rating.index()]
}

/// Unclamped initial difficulty, also the mean-reversion target for Easy
fn raw_initial_difficulty<T: Real>(w: &[T], rating: Rating) -> T {
    let grade = rating.value() as f64;
    w[4] - (w[5] * (grade - 1.0)).exp() + 1.0
}

pub fn initial_difficulty<T: Real>(w: &[T], rating: Rating) -> T {
    raw_initial_difficulty(w, rating).clamp(D_MIN, D_MAX)
}

pub fn initial_state<T: Real>(w: &[T], rating: Rating) -> State<T> {
    State {
        stability: initial_stability(w, rating).clamp(S_MIN, S_MAX),
        difficulty: initial_difficulty(w, rating),
    }
}

// ==================== State Updates ====================

/// Linear damping toward 10, then mean reversion toward the Easy target
pub fn next_difficulty<T: Real>(w: &[T], difficulty: T, rating: Rating) -> T {
    let grade = rating.value() as f64;
    let delta = w[6] * (3.0 - grade);
    let damped = difficulty + delta * (-difficulty + 10.0) / 9.0;
    let target = raw_initial_difficulty(w, Rating::Easy);
    let reverted = w[7] * target + (-w[7] + 1.0) * damped;
    reverted.clamp(D_MIN, D_MAX)
}

/// Stability after a successful recall (Hard, Good or Easy)
pub fn stability_after_success<T: Real>(
    w: &[T],
    stability: T,
    difficulty: T,
    retrievability: T,
    rating: Rating,
) -> T {
    let growth = w[8].exp()
        * (-difficulty + 11.0)
        * stability.powf(-w[9])
        * (((-retrievability + 1.0) * w[10]).exp() - 1.0);
    let growth = match rating {
        Rating::Hard => growth * w[15],
        Rating::Easy => growth * w[16],
        Rating::Again | Rating::Good => growth,
    };
    stability * (growth + 1.0)
}

/// Stability after a lapse; never exceeds the pre-lapse stability
pub fn stability_after_failure<T: Real>(
    w: &[T],
    stability: T,
    difficulty: T,
    retrievability: T,
) -> T {
    let relearned = w[11]
        * difficulty.powf(-w[12])
        * ((stability + 1.0).powf(w[13]) - 1.0)
        * ((-retrievability + 1.0) * w[14]).exp();
    let ceiling = stability / (w[17] * w[18]).exp();
    relearned.min(ceiling)
}

/// Stability after a same-day re-review
pub fn stability_short_term<T: Real>(w: &[T], stability: T, rating: Rating) -> T {
    let grade = rating.value() as f64;
    stability * ((w[18] + (grade - 3.0)) * w[17]).exp()
}

/// Apply one review to an existing state, given the retrievability at
/// review time
pub fn update_state<T: Real>(
    w: &[T],
    last: State<T>,
    rating: Rating,
    delta_t: f64,
    retrievability: T,
) -> State<T> {
    let stability = if delta_t <= 0.0 {
        stability_short_term(w, last.stability, rating)
    } else if rating == Rating::Again {
        stability_after_failure(w, last.stability, last.difficulty, retrievability)
    } else {
        stability_after_success(w, last.stability, last.difficulty, retrievability, rating)
    };

    State {
        stability: stability.clamp(S_MIN, S_MAX),
        difficulty: next_difficulty(w, last.difficulty, rating),
    }
}

/// One step of the recurrence; `None` means the item has never been seen
pub fn next_state<T: Real>(
    w: &[T],
    state: Option<State<T>>,
    rating: Rating,
    delta_t: f64,
) -> State<T> {
    match state {
        None => initial_state(w, rating),
        Some(last) => {
            let r = retrievability(delta_t, last.stability);
            update_state(w, last, rating, delta_t, r)
        }
    }
}

/// Replay a review history.
///
/// Before every long-term review that follows an existing state, `observe`
/// receives the predicted retrievability and the review itself. Returns the
/// final state, or `start` when `reviews` is empty.
pub fn forward<T, F>(
    w: &[T],
    reviews: &[Review],
    start: Option<State<T>>,
    mut observe: F,
) -> Option<State<T>>
where
    T: Real,
    F: FnMut(T, &Review),
{
    let mut state = start;
    for review in reviews {
        let delta_t = review.delta_t as f64;
        state = Some(match state {
            None => initial_state(w, review.rating),
            Some(last) => {
                let r = retrievability(delta_t, last.stability);
                if review.is_long_term() {
                    observe(r, review);
                }
                update_state(w, last, review.rating, delta_t, r)
            }
        });
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::Tape;
    use crate::types::EPSILON;

    fn w() -> Vec<f64> {
        DEFAULT_PARAMETERS.to_vec()
    }

    fn review(rating: Rating, delta_t: u32) -> Review {
        Review { rating, delta_t }
    }

    #[test]
    fn test_retrievability_equals_one_at_zero() {
        assert!((retrievability(0.0, 5.0) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_retrievability_at_stability_is_ninety_percent() {
        for s in [0.5, 3.0, 42.0, 1000.0] {
            assert!((retrievability(s, s) - 0.9).abs() < 1e-9);
        }
    }

    #[test]
    fn test_retrievability_decay() {
        let r_0 = retrievability(0.0, 10.0);
        let r_5 = retrievability(5.0, 10.0);
        let r_10 = retrievability(10.0, 10.0);
        assert!(r_0 > r_5);
        assert!(r_5 > r_10);
        assert!(retrievability(5.0, 20.0) > r_5);
    }

    #[test]
    fn test_interval_round_trip() {
        for (t, s) in [(1.0, 1.0), (7.0, 3.2), (30.0, 100.0), (365.0, 12.0)] {
            let r = retrievability(t, s);
            assert!((next_interval(s, r) - t).abs() < 1e-6);
        }
    }

    #[test]
    fn test_interval_equals_stability_at_ninety_percent() {
        assert!((next_interval(7.5, 0.9) - 7.5).abs() < 1e-9);
        assert!(next_interval(7.5, 0.8) > next_interval(7.5, 0.9));
        assert!(next_interval(8.0, 0.9) > next_interval(7.5, 0.9));
    }

    #[test]
    fn test_initial_state() {
        let w = w();
        let state = initial_state(&w, Rating::Good);
        assert!((state.stability - DEFAULT_PARAMETERS[2]).abs() < EPSILON);
        let expected_d = DEFAULT_PARAMETERS[4] - (DEFAULT_PARAMETERS[5] * 2.0).exp() + 1.0;
        assert!((state.difficulty - expected_d).abs() < EPSILON);

        // Easier first ratings start easier
        let d_again = initial_difficulty(&w, Rating::Again);
        let d_easy = initial_difficulty(&w, Rating::Easy);
        assert!(d_again > d_easy);
        assert!((D_MIN..=D_MAX).contains(&d_again));
    }

    #[test]
    fn test_next_difficulty_direction_and_bounds() {
        let w = w();
        let d = 5.0;
        assert!(next_difficulty(&w, d, Rating::Again) > d);
        assert!(next_difficulty(&w, d, Rating::Easy) < d);
        assert!(next_difficulty(&w, 10.0, Rating::Again) <= D_MAX);
        assert!(next_difficulty(&w, 1.0, Rating::Easy) >= D_MIN);
    }

    #[test]
    fn test_success_grows_and_lapse_shrinks() {
        let w = w();
        let (s, d) = (10.0, 5.0);
        let r = retrievability(10.0, s);
        let hard = stability_after_success(&w, s, d, r, Rating::Hard);
        let good = stability_after_success(&w, s, d, r, Rating::Good);
        let easy = stability_after_success(&w, s, d, r, Rating::Easy);
        let lapse = stability_after_failure(&w, s, d, r);
        assert!(lapse <= s);
        assert!(s <= hard && hard <= good && good <= easy);
    }

    #[test]
    fn test_lower_retrievability_gives_larger_gain() {
        let w = w();
        let early = stability_after_success(&w, 10.0, 5.0, 0.95, Rating::Good);
        let late = stability_after_success(&w, 10.0, 5.0, 0.7, Rating::Good);
        assert!(late > early);
    }

    #[test]
    fn test_short_term_ordering() {
        let w = w();
        let s = 2.0;
        let again = stability_short_term(&w, s, Rating::Again);
        let good = stability_short_term(&w, s, Rating::Good);
        let easy = stability_short_term(&w, s, Rating::Easy);
        assert!(again < good && good < easy);
    }

    #[test]
    fn test_forward_matches_stepwise() {
        let w = w();
        let reviews = [
            review(Rating::Good, 0),
            review(Rating::Again, 0),
            review(Rating::Good, 2),
            review(Rating::Easy, 6),
        ];
        let mut observed = Vec::new();
        let last = forward(&w, &reviews, None, |r, rev| observed.push((r, rev.rating)))
            .unwrap();

        let mut state = None;
        for rev in &reviews {
            state = Some(next_state(&w, state, rev.rating, rev.delta_t as f64));
        }
        let state = state.unwrap();
        assert!((last.stability - state.stability).abs() < EPSILON);
        assert!((last.difficulty - state.difficulty).abs() < EPSILON);
        assert_eq!(observed.len(), 2);
        assert!(observed.iter().all(|(r, _)| *r > 0.0 && *r < 1.0));
    }

    #[test]
    fn test_tape_matches_plain_evaluation_and_gradient() {
        let weights = w();
        let reviews = [
            review(Rating::Hard, 0),
            review(Rating::Good, 3),
            review(Rating::Again, 9),
            review(Rating::Good, 1),
        ];

        let plain = |w: &[f64]| forward(w, &reviews, None, |_, _| {}).unwrap().stability;

        let tape = Tape::new();
        let vars: Vec<_> = weights.iter().map(|&x| tape.var(x)).collect();
        let result = forward(&vars, &reviews, None, |_, _| {}).unwrap();
        assert!((result.stability.value() - plain(&weights[..])).abs() < 1e-9);

        let grad = tape.gradient(result.stability);
        for i in [1, 8, 10, 11, 14] {
            let h = 1e-6;
            let mut up = weights.clone();
            up[i] += h;
            let mut down = weights.clone();
            down[i] -= h;
            let numeric = (plain(&up[..]) - plain(&down[..])) / (2.0 * h);
            let analytic = grad.wrt(vars[i]);
            assert!(
                (numeric - analytic).abs() < 1e-4 * (1.0 + numeric.abs()),
                "w[{}]: numeric {} vs analytic {}",
                i,
                numeric,
                analytic
            );
        }
    }
}
