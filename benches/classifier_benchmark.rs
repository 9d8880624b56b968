use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use emotion_classifier::classifier::{ClassifierError, SequenceClassifier};
use emotion_classifier::dataset::multi_hot_encode;
use emotion_classifier::labels::LabelVocabulary;
use emotion_classifier::metrics::compute_metrics;
use emotion_classifier::service::{predict, rank_scores, LoadedBundle, PredictRequest};

const NUM_LABELS: usize = 28;

struct RandomLogits(Vec<f32>);

impl SequenceClassifier for RandomLogits {
    fn num_labels(&self) -> usize {
        self.0.len()
    }

    fn logits(&self, _text: &str) -> Result<Vec<f32>, ClassifierError> {
        Ok(self.0.clone())
    }
}

fn vocabulary() -> LabelVocabulary {
    LabelVocabulary::new((0..NUM_LABELS).map(|i| format!("emotion_{}", i)).collect())
}

fn bench_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("Metrics");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    let mut rng = StdRng::seed_from_u64(7);
    for rows in [100usize, 1_000, 5_000] {
        let logits = Array2::from_shape_fn((rows, NUM_LABELS), |_| rng.gen_range(-6.0f32..6.0));
        let labels = Array2::from_shape_fn((rows, NUM_LABELS), |_| if rng.gen_bool(0.08) { 1.0f32 } else { 0.0 });

        group.bench_with_input(BenchmarkId::new("compute_metrics", rows), &rows, |b, _| {
            b.iter(|| compute_metrics(black_box(logits.view()), black_box(labels.view())).unwrap())
        });
    }

    group.finish();
}

fn bench_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("Targets");
    group.sample_size(50);

    group.bench_function("multi_hot_three_labels", |b| {
        b.iter(|| multi_hot_encode(black_box(&[3, 17, 27]), NUM_LABELS).unwrap())
    });

    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let mut group = c.benchmark_group("Prediction");
    group.sample_size(50);
    group.warm_up_time(std::time::Duration::from_secs(1));

    let mut rng = StdRng::seed_from_u64(11);
    let logits: Vec<f32> = (0..NUM_LABELS).map(|_| rng.gen_range(-6.0f32..6.0)).collect();
    let probabilities: Vec<f32> = logits.iter().map(|&l| emotion_classifier::classifier::sigmoid(l)).collect();
    let labels = vocabulary();

    group.bench_function("rank_scores", |b| {
        b.iter(|| rank_scores(black_box(&labels), black_box(&probabilities)).unwrap())
    });

    let bundle = LoadedBundle {
        model_dir: PathBuf::from("bench"),
        labels: vocabulary(),
        classifier: Box::new(RandomLogits(logits)),
    };
    for top_k in [1i64, 5, 20] {
        let request = PredictRequest::new("I am so happy today!").with_top_k(top_k);
        group.bench_with_input(BenchmarkId::new("predict_top_k", top_k), &request, |b, request| {
            b.iter(|| predict(black_box(&bundle), black_box(request)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_metrics, bench_encoding, bench_prediction);
criterion_main!(benches);
