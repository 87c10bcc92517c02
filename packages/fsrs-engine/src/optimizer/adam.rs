//! Adam update rule and cosine learning-rate schedule

use std::f64::consts::PI;

use crate::model::PARAMETER_COUNT;

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;

/// First and second moment estimates for every weight
#[derive(Debug, Clone)]
pub struct Adam {
    m: [f64; PARAMETER_COUNT],
    v: [f64; PARAMETER_COUNT],
    t: i32,
}

impl Default for Adam {
    fn default() -> Self {
        Self::new()
    }
}

impl Adam {
    pub fn new() -> Self {
        Self {
            m: [0.0; PARAMETER_COUNT],
            v: [0.0; PARAMETER_COUNT],
            t: 0,
        }
    }

    /// Number of updates applied so far
    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Move `weights` against `gradient` with bias-corrected moments
    pub fn step(
        &mut self,
        weights: &mut [f64; PARAMETER_COUNT],
        gradient: &[f64; PARAMETER_COUNT],
        learning_rate: f64,
    ) {
        self.t += 1;
        let correction1 = 1.0 - BETA1.powi(self.t);
        let correction2 = 1.0 - BETA2.powi(self.t);

        for i in 0..PARAMETER_COUNT {
            let g = gradient[i];
            if !g.is_finite() {
                continue;
            }
            self.m[i] = BETA1 * self.m[i] + (1.0 - BETA1) * g;
            self.v[i] = BETA2 * self.v[i] + (1.0 - BETA2) * g * g;
            let m_hat = self.m[i] / correction1;
            let v_hat = self.v[i] / correction2;
            weights[i] -= learning_rate * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
        }
    }
}

/// Learning rate at `step` out of `total_steps`, annealed from `initial`
/// down to `minimum` along half a cosine period
pub fn cosine_annealing(initial: f64, minimum: f64, step: usize, total_steps: usize) -> f64 {
    if total_steps <= 1 {
        return initial;
    }
    let progress = (step.min(total_steps - 1)) as f64 / (total_steps - 1) as f64;
    minimum + 0.5 * (initial - minimum) * (1.0 + (PI * progress).cos())
}
