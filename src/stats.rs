//! Summaries over a batch of predictions, as printed by `emotion predict --file`.

use std::collections::HashMap;

use serde::Serialize;

use crate::service::PredictResponse;

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Nearest-rank percentile: sorts the values and picks index
/// `floor(p / 100 * len)`, clamped to the last element.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let index = ((p / 100.0) * sorted.len() as f64).floor().max(0.0) as usize;
    Some(sorted[index.min(sorted.len() - 1)])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmotionCount {
    pub label: String,
    pub count: usize,
}

fn ranked_counts<'a>(labels: impl Iterator<Item = &'a str>, n: usize) -> Vec<EmotionCount> {
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for label in labels {
        let count = counts.entry(label).or_insert_with(|| {
            order.push(label);
            0
        });
        *count += 1;
    }

    // Stable over first appearance so equal counts print deterministically.
    let mut ranked: Vec<EmotionCount> = order
        .into_iter()
        .map(|label| EmotionCount {
            label: label.to_string(),
            count: counts[label],
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(n);
    ranked
}

/// How often each label cleared the threshold, most frequent first.
pub fn top_emotions(predictions: &[PredictResponse], n: usize) -> Vec<EmotionCount> {
    ranked_counts(
        predictions
            .iter()
            .flat_map(|p| p.labels_over_threshold.iter().map(|s| s.label.as_str())),
        n,
    )
}

/// How often each label appeared among the top-k entries.
pub fn emotion_distribution(predictions: &[PredictResponse]) -> Vec<EmotionCount> {
    ranked_counts(
        predictions.iter().flat_map(|p| p.top.iter().map(|s| s.label.as_str())),
        usize::MAX,
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

pub fn latency_summary(predictions: &[PredictResponse]) -> Option<LatencySummary> {
    let latencies: Vec<f64> = predictions.iter().map(|p| p.latency_ms).collect();
    Some(LatencySummary {
        mean_ms: mean(&latencies)?,
        p50_ms: percentile(&latencies, 50.0)?,
        p95_ms: percentile(&latencies, 95.0)?,
        p99_ms: percentile(&latencies, 99.0)?,
    })
}
