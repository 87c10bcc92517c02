use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::{FSRSError, Result};
use crate::sanitize::has_invalid_values;
use crate::types::S_MIN;

/// Number of model weights
pub const PARAMETER_COUNT: usize = 19;

/// Largest initial stability the optimizer may assign
pub const INIT_S_MAX: f64 = 100.0;

/// Default weights
pub const DEFAULT_PARAMETERS: [f64; PARAMETER_COUNT] = [
    0.40255, 1.18385, 3.173, 15.69105, // w0-w3: initial stability per first rating
    7.1949, 0.5345, // w4-w5: initial difficulty
    1.4604, 0.0046, // w6-w7: difficulty step and mean reversion
    1.54575, 0.1192, 1.01925, // w8-w10: stability after success
    1.9395, 0.11, 0.29605, 2.2698, // w11-w14: stability after lapse
    0.2315, 2.9898, // w15-w16: hard penalty, easy bonus
    0.51655, 0.6621, // w17-w18: same-day review
];

/// Valid range for each weight, inclusive
pub const PARAMETER_BOUNDS: [(f64, f64); PARAMETER_COUNT] = [
    (S_MIN, INIT_S_MAX),
    (S_MIN, INIT_S_MAX),
    (S_MIN, INIT_S_MAX),
    (S_MIN, INIT_S_MAX),
    (1.0, 10.0),
    (0.001, 4.0),
    (0.001, 4.0),
    (0.001, 0.75),
    (0.0, 4.5),
    (0.0, 0.8),
    (0.001, 3.5),
    (0.001, 5.0),
    (0.001, 0.25),
    (0.001, 0.9),
    (0.0, 4.0),
    (0.0, 1.0),
    (1.0, 6.0),
    (0.0, 2.0),
    (0.0, 2.0),
];

/// Typical spread of fitted weights across learners; scales the
/// regularization penalty so every weight is pulled comparably
pub const PARAMETER_SCALES: [f64; PARAMETER_COUNT] = [
    6.61, 9.52, 17.69, 27.74, 0.55, 0.28, 0.67, 0.12, 0.4, 0.18, 0.34, 0.27, 0.08, 0.14, 0.57,
    0.25, 1.03, 0.27, 0.39,
];

/// Validated weight vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Parameters {
    weights: [f64; PARAMETER_COUNT],
}

impl Parameters {
    /// Validate length, finiteness and per-index bounds
    pub fn new(weights: &[f64]) -> Result<Self> {
        if weights.len() != PARAMETER_COUNT {
            return Err(FSRSError::InvalidParameterVector(format!(
                "expected {} weights, got {}",
                PARAMETER_COUNT,
                weights.len()
            )));
        }
        if has_invalid_values(weights) {
            return Err(FSRSError::InvalidParameterVector(
                "weights must be finite".to_string(),
            ));
        }
        for (i, (&w, &(lo, hi))) in weights.iter().zip(PARAMETER_BOUNDS.iter()).enumerate() {
            if w < lo || w > hi {
                return Err(FSRSError::InvalidParameterVector(format!(
                    "w[{}] = {} outside [{}, {}]",
                    i, w, lo, hi
                )));
            }
        }

        let mut array = [0.0; PARAMETER_COUNT];
        array.copy_from_slice(weights);
        Ok(Self { weights: array })
    }

    /// Project arbitrary finite weights into the feasible region
    pub(crate) fn clipped(mut weights: [f64; PARAMETER_COUNT]) -> Self {
        clip_weights(&mut weights);
        Self { weights }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.weights
    }

    pub fn as_array(&self) -> &[f64; PARAMETER_COUNT] {
        &self.weights
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.weights.to_vec()
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            weights: DEFAULT_PARAMETERS,
        }
    }
}

impl Index<usize> for Parameters {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.weights[index]
    }
}

impl TryFrom<Vec<f64>> for Parameters {
    type Error = FSRSError;

    fn try_from(weights: Vec<f64>) -> Result<Self> {
        Parameters::new(&weights)
    }
}

impl From<Parameters> for Vec<f64> {
    fn from(parameters: Parameters) -> Self {
        parameters.to_vec()
    }
}

/// Engine default weights
pub fn default_parameters() -> Parameters {
    Parameters::default()
}

/// Clamp every weight into its documented range; non-finite entries fall
/// back to the default weight
pub fn clip_weights(weights: &mut [f64; PARAMETER_COUNT]) {
    for (i, w) in weights.iter_mut().enumerate() {
        let (lo, hi) = PARAMETER_BOUNDS[i];
        if !w.is_finite() {
            *w = DEFAULT_PARAMETERS[i];
        }
        *w = w.clamp(lo, hi);
    }
}
