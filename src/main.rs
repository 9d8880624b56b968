use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::info;

use emotion_classifier::assets::{AssetInfo, DEFAULT_BASE_MODEL};
use emotion_classifier::dataset::EmotionDataset;
use emotion_classifier::model_manager::ModelManager;
use emotion_classifier::runtime::RuntimeConfig;
use emotion_classifier::service::{self, PredictRequest, PredictResponse, ServiceContext};
use emotion_classifier::stats;
use emotion_classifier::training::{Trainer, TrainingConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fine-tune the encoder on GoEmotions and export a model bundle
    Train(TrainArgs),
    /// Serve /health and /predict over HTTP
    Serve(ServeArgs),
    /// Score texts from the command line or a file
    Predict(PredictArgs),
}

#[derive(Args)]
struct TrainArgs {
    #[arg(long, default_value_t = 1e-4)]
    learning_rate: f64,
    #[arg(long, default_value_t = 32)]
    batch_size: usize,
    #[arg(long, default_value_t = 2)]
    epochs: usize,
    #[arg(long, default_value = "./exported_emotion_model")]
    export_dir: PathBuf,
    /// Seed for shuffling and head initialization. Drawn at random when omitted
    #[arg(long)]
    seed: Option<u64>,
    /// Keep at most this many examples per split
    #[arg(long)]
    limit: Option<usize>,
    /// Local GoEmotions directory (emotions.txt, train.tsv, dev.tsv, test.tsv)
    #[arg(long)]
    dataset_dir: Option<PathBuf>,
    /// Hub repository of the pretrained encoder
    #[arg(long, default_value = DEFAULT_BASE_MODEL)]
    base_model: String,
    /// Local directory with config.json, tokenizer.json and model.safetensors
    #[arg(long)]
    base_model_dir: Option<PathBuf>,
    /// Discard cached downloads first
    #[arg(short, long)]
    fresh: bool,
}

#[derive(Args)]
struct ModelArgs {
    /// Bundle directory. Defaults to $MODEL_DIR, then ./model next to the binary
    #[arg(long)]
    model_dir: Option<PathBuf>,
    /// ONNX Runtime intra-op threads (0 lets the runtime decide)
    #[arg(long, default_value_t = 0)]
    intra_threads: usize,
}

impl ModelArgs {
    fn context(&self) -> ServiceContext {
        let model_dir = self.model_dir.clone().unwrap_or_else(service::default_model_dir);
        let runtime = RuntimeConfig {
            intra_threads: self.intra_threads,
            ..RuntimeConfig::default()
        };
        ServiceContext::with_artifacts(model_dir, runtime)
    }
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:8000")]
    addr: SocketAddr,
    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args)]
struct PredictArgs {
    /// Text to score
    text: Option<String>,
    /// Score every non-empty line of this file and print summary statistics
    #[arg(long, conflicts_with = "text")]
    file: Option<PathBuf>,
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    top_k: Option<i64>,
    /// Print responses as JSON lines
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    model: ModelArgs,
}

async fn fetch(manager: &ModelManager, asset: &AssetInfo, fresh: bool) -> anyhow::Result<PathBuf> {
    if fresh {
        info!("Fresh download requested - removing cached {}...", asset.name);
        manager.remove_download(asset)?;
    }
    manager
        .ensure_downloaded(asset)
        .await
        .with_context(|| format!("failed to fetch {}", asset.name))
}

async fn train(args: TrainArgs) -> anyhow::Result<()> {
    let dataset_dir = match args.dataset_dir {
        Some(dir) => dir,
        None => fetch(&ModelManager::new_default()?, &AssetInfo::goemotions(), args.fresh).await?,
    };
    let base_model_dir = match args.base_model_dir {
        Some(dir) => dir,
        None => {
            let asset = AssetInfo::hub_model(&args.base_model);
            fetch(&ModelManager::new_default()?, &asset, args.fresh).await?
        }
    };

    let dataset = EmotionDataset::from_dir(&dataset_dir, args.limit)
        .with_context(|| format!("failed to read dataset from {:?}", dataset_dir))?;
    info!(
        "Dataset: {} labels, {} train / {} validation / {} test examples",
        dataset.num_labels(),
        dataset.train.len(),
        dataset.validation.len(),
        dataset.test.len()
    );

    let mut config = TrainingConfig {
        learning_rate: args.learning_rate,
        batch_size: args.batch_size,
        epochs: args.epochs,
        export_dir: args.export_dir,
        ..TrainingConfig::default()
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let trainer = Trainer::new(config)?;
    let report = tokio::task::spawn_blocking(move || trainer.train(&dataset, &base_model_dir)).await??;

    for epoch in &report.epochs {
        println!(
            "epoch {}: loss={:.4} {}",
            epoch.epoch,
            epoch.mean_loss,
            epoch.validation.summary()
        );
    }
    println!("seed: {}", report.seed);
    println!("exported to {}", report.export_dir.display());
    Ok(())
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let context = Arc::new(args.model.context());
    service::serve(args.addr, context).await?;
    Ok(())
}

fn print_response(response: &PredictResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(response)?);
        return Ok(());
    }
    println!("{}", response.text);
    for score in &response.top {
        let marker = if score.score >= response.threshold { "*" } else { " " };
        println!("  {} {:<16} {:.4}", marker, score.label, score.score);
    }
    println!("  ({} ms)", response.latency_ms);
    Ok(())
}

fn print_summary(responses: &[PredictResponse]) {
    println!("\n=== {} texts ===", responses.len());
    if let Some(latency) = stats::latency_summary(responses) {
        println!(
            "latency: mean {:.2} ms, p50 {:.2} ms, p95 {:.2} ms, p99 {:.2} ms",
            latency.mean_ms, latency.p50_ms, latency.p95_ms, latency.p99_ms
        );
    }
    println!("top emotions over threshold:");
    for entry in stats::top_emotions(responses, 10) {
        println!("  {:<16} {}", entry.label, entry.count);
    }
    println!("distribution of top labels:");
    for entry in stats::emotion_distribution(responses) {
        println!("  {:<16} {}", entry.label, entry.count);
    }
}

async fn predict(args: PredictArgs) -> anyhow::Result<()> {
    let context = args.model.context();
    let texts: Vec<String> = match (&args.text, &args.file) {
        (Some(text), None) => vec![text.clone()],
        (None, Some(file)) => std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {:?}", file))?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect(),
        _ => bail!("pass either a text or --file"),
    };

    let mut responses = Vec::with_capacity(texts.len());
    for text in texts {
        let request = PredictRequest {
            text,
            threshold: args.threshold,
            top_k: args.top_k.map(|k| k as f64),
        };
        let response = context.predict(request).await?;
        print_response(&response, args.json)?;
        responses.push(response);
    }

    if args.file.is_some() && !args.json {
        print_summary(&responses);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Train(args) => train(args).await,
        Command::Serve(args) => serve(args).await,
        Command::Predict(args) => predict(args).await,
    }
}
