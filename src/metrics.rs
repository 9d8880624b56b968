//! Multi-label evaluation metrics computed from raw logits.
//!
//! Logits go through the logistic sigmoid and are binarized with a fixed
//! decision threshold of 0.5 (a probability must be strictly greater than
//! the threshold to count as a positive). This threshold is unrelated to the
//! one callers pass to the prediction endpoint.
//!
//! F1 follows the usual zero-division convention: when a label has no true
//! positives, false positives or false negatives its F1 is 0.0.

use ndarray::{ArrayView2, Axis, Zip};
use serde::Serialize;

use crate::classifier::sigmoid;

pub const DECISION_THRESHOLD: f32 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Logits shape {logits:?} does not match labels shape {labels:?}")]
    ShapeMismatch {
        logits: (usize, usize),
        labels: (usize, usize),
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EvalMetrics {
    pub hamming_accuracy: f64,
    pub f1_macro: f64,
    pub f1_micro: f64,
    pub exact_match_accuracy: f64,
}

impl EvalMetrics {
    pub fn summary(&self) -> String {
        format!(
            "hamming={:.4} exact_match={:.4} f1_macro={:.4} f1_micro={:.4}",
            self.hamming_accuracy, self.exact_match_accuracy, self.f1_macro, self.f1_micro
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counts {
    tp: usize,
    fp: usize,
    fn_: usize,
}

impl Counts {
    fn f1(&self) -> f64 {
        let denominator = 2 * self.tp + self.fp + self.fn_;
        if denominator == 0 {
            0.0
        } else {
            (2 * self.tp) as f64 / denominator as f64
        }
    }
}

/// Computes all four metrics for `[examples, labels]` logits against
/// multi-hot ground truth of the same shape.
pub fn compute_metrics(
    logits: ArrayView2<f32>,
    labels: ArrayView2<f32>,
) -> Result<EvalMetrics, MetricsError> {
    if logits.dim() != labels.dim() {
        return Err(MetricsError::ShapeMismatch {
            logits: logits.dim(),
            labels: labels.dim(),
        });
    }

    let (rows, cols) = logits.dim();
    if rows == 0 || cols == 0 {
        return Ok(EvalMetrics::default());
    }

    let predictions = logits.mapv(|logit| sigmoid(logit) > DECISION_THRESHOLD);
    let truth = labels.mapv(|value| value > 0.5);

    let mut per_label = vec![Counts::default(); cols];
    let mut matching_cells = 0usize;
    let mut exact_rows = 0usize;

    for (pred_row, truth_row) in predictions.axis_iter(Axis(0)).zip(truth.axis_iter(Axis(0))) {
        let mut row_matches = true;
        Zip::from(&pred_row)
            .and(&truth_row)
            .and(&mut ndarray::ArrayViewMut1::from(per_label.as_mut_slice()))
            .for_each(|&pred, &actual, counts| {
                match (pred, actual) {
                    (true, true) => counts.tp += 1,
                    (true, false) => counts.fp += 1,
                    (false, true) => counts.fn_ += 1,
                    (false, false) => {}
                }
                if pred == actual {
                    matching_cells += 1;
                } else {
                    row_matches = false;
                }
            });
        if row_matches {
            exact_rows += 1;
        }
    }

    let pooled = per_label.iter().fold(Counts::default(), |acc, c| Counts {
        tp: acc.tp + c.tp,
        fp: acc.fp + c.fp,
        fn_: acc.fn_ + c.fn_,
    });

    Ok(EvalMetrics {
        hamming_accuracy: matching_cells as f64 / (rows * cols) as f64,
        f1_macro: per_label.iter().map(Counts::f1).sum::<f64>() / cols as f64,
        f1_micro: pooled.f1(),
        exact_match_accuracy: exact_rows as f64 / rows as f64,
    })
}
