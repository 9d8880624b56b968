use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::loader::LoadedBundle;
use crate::classifier::{sigmoid_all, ClassifierError};
use crate::labels::LabelVocabulary;

pub const DEFAULT_THRESHOLD: f64 = 0.2;
pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 20;

/// Body of `POST /predict`.
///
/// `threshold` falls back to [`DEFAULT_THRESHOLD`] (0.2) both when the field
/// is absent and when it is an explicit `null`. `top_k` is any JSON number;
/// it is truncated toward zero and saturated into `[1, MAX_TOP_K]`, so huge
/// integers and floats such as `3.0` are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub text: String,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub top_k: Option<f64>,
}

impl PredictRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            threshold: None,
            top_k: None,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_top_k(mut self, top_k: i64) -> Self {
        self.top_k = Some(top_k as f64);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub text: String,
    pub threshold: f64,
    pub labels_over_threshold: Vec<LabelScore>,
    pub top: Vec<LabelScore>,
    pub latency_ms: f64,
}

/// Clamps a requested `top_k` into `[1, MAX_TOP_K]`; absent means
/// [`DEFAULT_TOP_K`].
pub fn clamp_top_k(top_k: Option<f64>) -> usize {
    match top_k {
        None => DEFAULT_TOP_K,
        // `as` saturates out-of-range floats and maps NaN to 0.
        Some(k) => (k as i64).clamp(1, MAX_TOP_K as i64) as usize,
    }
}

/// Pairs every probability with its label, highest first. Equal scores keep
/// vocabulary order.
pub fn rank_scores(labels: &LabelVocabulary, probabilities: &[f32]) -> Result<Vec<LabelScore>, ClassifierError> {
    if labels.len() != probabilities.len() {
        return Err(ClassifierError::PredictionError(format!(
            "Model produced {} scores for {} labels",
            probabilities.len(),
            labels.len()
        )));
    }

    let mut ranked: Vec<LabelScore> = labels
        .iter()
        .zip(probabilities)
        .map(|(label, &p)| LabelScore {
            label: label.to_string(),
            score: f64::from(p),
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(ranked)
}

fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// Scores one text against every label in the bundle.
pub fn predict(bundle: &LoadedBundle, request: &PredictRequest) -> Result<PredictResponse, ClassifierError> {
    let threshold = request.threshold.unwrap_or(DEFAULT_THRESHOLD);
    if !(0.0..=1.0).contains(&threshold) {
        log::warn!("Threshold {} is outside [0, 1]", threshold);
    }
    let top_k = clamp_top_k(request.top_k);

    let started = Instant::now();
    let logits = bundle.classifier.logits(&request.text)?;
    let probabilities = sigmoid_all(&logits);
    let latency_ms = round_ms(started.elapsed().as_secs_f64() * 1000.0);

    let ranked = rank_scores(&bundle.labels, &probabilities)?;
    let labels_over_threshold = ranked
        .iter()
        .filter(|s| s.score >= threshold)
        .cloned()
        .collect();
    let top = ranked.into_iter().take(top_k).collect();

    log::debug!("Scored {} chars in {} ms", request.text.len(), latency_ms);
    Ok(PredictResponse {
        text: request.text.clone(),
        threshold,
        labels_over_threshold,
        top,
        latency_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::SequenceClassifier;
    use std::path::PathBuf;

    struct Fixed(Vec<f32>);

    impl SequenceClassifier for Fixed {
        fn num_labels(&self) -> usize {
            self.0.len()
        }

        fn logits(&self, _text: &str) -> Result<Vec<f32>, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    fn bundle(logits: Vec<f32>) -> LoadedBundle {
        let labels = (0..logits.len()).map(|i| format!("label{}", i)).collect::<Vec<_>>();
        LoadedBundle {
            model_dir: PathBuf::from("/model"),
            labels: LabelVocabulary::new(labels),
            classifier: Box::new(Fixed(logits)),
        }
    }

    #[test]
    fn test_clamp_top_k() {
        assert_eq!(clamp_top_k(None), 5);
        assert_eq!(clamp_top_k(Some(0.0)), 1);
        assert_eq!(clamp_top_k(Some(-3.0)), 1);
        assert_eq!(clamp_top_k(Some(7.0)), 7);
        assert_eq!(clamp_top_k(Some(3.9)), 3);
        assert_eq!(clamp_top_k(Some(100.0)), 20);
        assert_eq!(clamp_top_k(Some(1e20)), 20);
        assert_eq!(clamp_top_k(Some(-1e20)), 1);
        assert_eq!(clamp_top_k(Some(f64::NAN)), 1);
    }

    #[test]
    fn test_top_k_accepts_any_json_number() {
        let huge: PredictRequest =
            serde_json::from_str(r#"{"text": "x", "top_k": 100000000000000000000}"#).unwrap();
        assert_eq!(clamp_top_k(huge.top_k), 20);

        let float: PredictRequest = serde_json::from_str(r#"{"text": "x", "top_k": 3.0}"#).unwrap();
        assert_eq!(clamp_top_k(float.top_k), 3);
    }

    #[test]
    fn test_ties_keep_vocabulary_order() {
        let labels = LabelVocabulary::new(vec!["a".into(), "b".into(), "c".into()]);
        let ranked = rank_scores(&labels, &[0.5, 0.9, 0.5]).unwrap();
        let order: Vec<&str> = ranked.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_rank_rejects_wrong_width() {
        let labels = LabelVocabulary::new(vec!["a".into(), "b".into()]);
        assert!(rank_scores(&labels, &[0.1]).is_err());
    }

    #[test]
    fn test_predict_threshold_and_top() {
        let bundle = bundle(vec![2.0, -2.0, 0.0, -1.0]);
        let response = predict(&bundle, &PredictRequest::new("hi").with_top_k(2)).unwrap();

        assert_eq!(response.threshold, 0.2);
        assert_eq!(response.top.len(), 2);
        assert_eq!(response.top[0].label, "label0");
        assert_eq!(response.top[1].label, "label2");
        // sigmoid(-1) is about 0.27, sigmoid(-2) about 0.12.
        let over: Vec<&str> = response.labels_over_threshold.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(over, vec!["label0", "label2", "label3"]);
        assert!(response.latency_ms >= 0.0);
    }

    #[test]
    fn test_out_of_range_threshold_is_used_as_given() {
        let bundle = bundle(vec![5.0, -5.0]);
        let high = predict(&bundle, &PredictRequest::new("x").with_threshold(1.5)).unwrap();
        assert!(high.labels_over_threshold.is_empty());
        assert_eq!(high.threshold, 1.5);

        let low = predict(&bundle, &PredictRequest::new("x").with_threshold(-1.0)).unwrap();
        assert_eq!(low.labels_over_threshold.len(), 2);
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: PredictRequest = serde_json::from_str(r#"{"text": "ok", "threshold": null}"#).unwrap();
        assert_eq!(request, PredictRequest::new("ok"));
    }
}
