//! Evaluation of a weight vector against review histories
//!
//! Items are replayed exactly as during training, collecting the predicted
//! retrievability and the observed outcome of every long-term review after
//! the first. No gradients are recorded and the weights are never modified.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FSRSError, Result};
use crate::model::{forward, Parameters};
use crate::optimizer::binary_cross_entropy;
use crate::types::Item;

/// Number of equal-width prediction bins used for calibration
pub const CALIBRATION_BINS: usize = 20;

/// One prediction/outcome pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub retrievability: f64,
    pub recalled: bool,
}

/// Predictions falling into one bin of predicted probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub mean_prediction: f64,
    pub mean_observed: f64,
}

/// Accuracy metrics over a data set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Mean binary cross-entropy
    pub log_loss: f64,
    /// Root mean squared error between prediction and outcome
    pub rmse: f64,
    /// Count-weighted RMSE between mean prediction and recall rate per bin
    pub rmse_bins: f64,
    /// Area under the ROC curve, 0.5 when only one class is present
    pub auc: f64,
    pub mean_prediction: f64,
    pub mean_observed: f64,
    /// Number of predicted reviews
    pub count: usize,
    /// Non-empty calibration bins in ascending order
    pub calibration: Vec<CalibrationBin>,
}

impl Evaluation {
    /// Flatten the scalar metrics into a name/value mapping
    pub fn to_metrics(&self) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        metrics.insert("log_loss".to_string(), self.log_loss);
        metrics.insert("rmse".to_string(), self.rmse);
        metrics.insert("rmse_bins".to_string(), self.rmse_bins);
        metrics.insert("auc".to_string(), self.auc);
        metrics.insert("mean_prediction".to_string(), self.mean_prediction);
        metrics.insert("mean_observed".to_string(), self.mean_observed);
        metrics.insert("count".to_string(), self.count as f64);
        metrics
    }
}

/// Replay every item and collect its predictions, in item order
pub fn predictions(parameters: &Parameters, items: &[Item]) -> Vec<Prediction> {
    let w = parameters.as_slice();
    let per_item: Vec<Vec<Prediction>> = items
        .par_iter()
        .map(|item| {
            let mut out = Vec::new();
            forward(w, item.reviews(), None, |r, review| {
                out.push(Prediction {
                    retrievability: r,
                    recalled: review.rating.is_recall(),
                });
            });
            out
        })
        .collect();
    per_item.into_iter().flatten().collect()
}

/// Evaluate `parameters` on `items`
pub fn evaluate(parameters: &Parameters, items: &[Item]) -> Result<Evaluation> {
    if items.is_empty() {
        return Err(FSRSError::EmptyTrainingSet);
    }
    let predictions = predictions(parameters, items);
    if predictions.is_empty() {
        warn!(
            items = items.len(),
            "No long-term reviews to evaluate; metrics are zero"
        );
    }
    let evaluation = summarize(&predictions);
    debug!(
        count = evaluation.count,
        log_loss = evaluation.log_loss,
        rmse_bins = evaluation.rmse_bins,
        auc = evaluation.auc,
        "Evaluation complete"
    );
    Ok(evaluation)
}

/// Compute every metric from a list of predictions
pub fn summarize(predictions: &[Prediction]) -> Evaluation {
    let n = predictions.len();
    if n == 0 {
        return Evaluation {
            log_loss: 0.0,
            rmse: 0.0,
            rmse_bins: 0.0,
            auc: 0.5,
            mean_prediction: 0.0,
            mean_observed: 0.0,
            count: 0,
            calibration: Vec::new(),
        };
    }

    let count = n as f64;
    let mut log_loss = 0.0;
    let mut squared_error = 0.0;
    let mut prediction_sum = 0.0;
    let mut observed_sum = 0.0;
    for p in predictions {
        let y = if p.recalled { 1.0 } else { 0.0 };
        log_loss += binary_cross_entropy(p.retrievability, p.recalled);
        squared_error += (p.retrievability - y).powi(2);
        prediction_sum += p.retrievability;
        observed_sum += y;
    }

    let calibration = calibration_bins(predictions);
    let binned_error: f64 = calibration
        .iter()
        .map(|bin| bin.count as f64 * (bin.mean_prediction - bin.mean_observed).powi(2))
        .sum();

    Evaluation {
        log_loss: log_loss / count,
        rmse: (squared_error / count).sqrt(),
        rmse_bins: (binned_error / count).sqrt(),
        auc: auc(predictions),
        mean_prediction: prediction_sum / count,
        mean_observed: observed_sum / count,
        count: n,
        calibration,
    }
}

fn calibration_bins(predictions: &[Prediction]) -> Vec<CalibrationBin> {
    let mut counts = [0usize; CALIBRATION_BINS];
    let mut prediction_sums = [0.0; CALIBRATION_BINS];
    let mut observed_sums = [0.0; CALIBRATION_BINS];

    for p in predictions {
        let bin = ((p.retrievability * CALIBRATION_BINS as f64) as usize).min(CALIBRATION_BINS - 1);
        counts[bin] += 1;
        prediction_sums[bin] += p.retrievability;
        if p.recalled {
            observed_sums[bin] += 1.0;
        }
    }

    let width = 1.0 / CALIBRATION_BINS as f64;
    (0..CALIBRATION_BINS)
        .filter(|&i| counts[i] > 0)
        .map(|i| CalibrationBin {
            lower: i as f64 * width,
            upper: (i + 1) as f64 * width,
            count: counts[i],
            mean_prediction: prediction_sums[i] / counts[i] as f64,
            mean_observed: observed_sums[i] / counts[i] as f64,
        })
        .collect()
}

/// Rank-based AUC with averaged ranks for tied predictions
fn auc(predictions: &[Prediction]) -> f64 {
    let n_pos = predictions.iter().filter(|p| p.recalled).count();
    let n_neg = predictions.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return 0.5;
    }

    let mut sorted: Vec<&Prediction> = predictions.iter().collect();
    sorted.sort_by(|a, b| a.retrievability.total_cmp(&b.retrievability));

    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j + 1 < sorted.len() && sorted[j + 1].retrievability == sorted[i].retrievability {
            j += 1;
        }
        // Ranks are 1-based; ties share the mean of their ranks
        let rank = (i + j) as f64 / 2.0 + 1.0;
        let positives = sorted[i..=j].iter().filter(|p| p.recalled).count();
        positive_rank_sum += rank * positives as f64;
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    (positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Review;

    fn pred(retrievability: f64, recalled: bool) -> Prediction {
        Prediction {
            retrievability,
            recalled,
        }
    }

    #[test]
    fn test_auc_perfect_and_inverted() {
        let perfect = [pred(0.2, false), pred(0.3, false), pred(0.8, true), pred(0.9, true)];
        assert!((auc(&perfect) - 1.0).abs() < 1e-12);
        let inverted = [pred(0.2, true), pred(0.9, false)];
        assert!(auc(&inverted).abs() < 1e-12);
        let tied = [pred(0.5, true), pred(0.5, false)];
        assert!((auc(&tied) - 0.5).abs() < 1e-12);
        assert_eq!(auc(&[pred(0.7, true)]), 0.5);
    }

    #[test]
    fn test_perfectly_calibrated_bins() {
        // 80% predicted, 4 of 5 recalled
        let predictions: Vec<_> = (0..5).map(|i| pred(0.8, i != 0)).collect();
        let evaluation = summarize(&predictions);
        assert_eq!(evaluation.count, 5);
        assert_eq!(evaluation.calibration.len(), 1);
        assert!(evaluation.rmse_bins.abs() < 1e-12);
        assert!((evaluation.mean_prediction - 0.8).abs() < 1e-12);
        assert!((evaluation.mean_observed - 0.8).abs() < 1e-12);
        assert!((evaluation.rmse - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_top_bin_includes_one() {
        let evaluation = summarize(&[pred(1.0, true)]);
        assert_eq!(evaluation.calibration[0].upper, 1.0);
        assert!(evaluation.log_loss.is_finite());
    }

    #[test]
    fn test_evaluate_items() {
        let items = vec![
            Item::new(vec![
                Review::new(3, 0).unwrap(),
                Review::new(3, 3).unwrap(),
                Review::new(1, 10).unwrap(),
            ])
            .unwrap(),
            Item::new(vec![Review::new(1, 0).unwrap(), Review::new(1, 0).unwrap()]).unwrap(),
        ];
        let evaluation = evaluate(&Parameters::default(), &items).unwrap();
        assert_eq!(evaluation.count, 2);
        assert!(evaluation.log_loss > 0.0);

        let metrics = evaluation.to_metrics();
        assert_eq!(metrics["count"], 2.0);
        assert!(metrics.contains_key("rmse_bins"));
        assert!(metrics.contains_key("auc"));
    }

    #[test]
    fn test_evaluate_rejects_empty() {
        assert!(matches!(
            evaluate(&Parameters::default(), &[]),
            Err(FSRSError::EmptyTrainingSet)
        ));
    }
}
