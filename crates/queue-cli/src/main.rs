mod config;
mod doctor;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

use queue_pipeline::stats::StatsRecorder;
use queue_pipeline::Pipeline;
use queue_video::ffmpeg::{FfmpegSink, FfmpegSource};
use queue_video::overlay::Annotator;
use queue_video::FrameSource;
use queue_vision::{DetectionFilter, Detector};
use queue_zones::{load_zones, ContainmentRule, ZoneRegistry};

use config::{load_config, FileConfig, RunArgs, Settings};

#[cfg(feature = "vision-tflite")]
use queue_vision::tflite::TfliteDetector;

const OUTPUT_VIDEO: &str = "output_video.mp4";
const STATS_FILE: &str = "stats.txt";

#[derive(Debug, Parser)]
#[command(name = "queuewatch", version, about = "Counts people standing in queue lanes of a video")]
struct Cli {
    /// Optional TOML file with [detector] and [run] tables; flags take precedence.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Annotate a video and write output_video.mp4 plus stats.txt.
    Run(RunArgs),
    /// Load the model and print its tensor layout.
    Inspect(RunArgs),
    /// Check model, zones, video and output directory without running inference.
    Doctor(RunArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => load_config(path)?,
        None => FileConfig::default(),
    };

    match cli.cmd {
        Command::Run(args) => run(&Settings::resolve(&args, &file)?).await?,
        Command::Inspect(args) => inspect(&Settings::resolve(&args, &file)?)?,
        Command::Doctor(args) => doctor::check(&Settings::resolve(&args, &file)?).await?,
    }
    Ok(())
}

async fn run(s: &Settings) -> Result<()> {
    let t0 = Instant::now();
    let detector = init_detector(s)?;
    let model_load = t0.elapsed();
    info!("run: model loaded in {:.3}s", model_load.as_secs_f64());

    let zones = match load_zones(s.queue_param.as_deref()) {
        Ok(z) => z,
        Err(e) => {
            warn!("zones: {}; continuing without queues", e);
            ZoneRegistry::new()
        }
    };
    if s.containment == ContainmentRule::Full {
        info!("run: containment=full, detections must also fit vertically inside a queue");
    }

    let video = s.video.as_deref().context("--video is required")?;
    let mut source = FfmpegSource::open(video).await.context("open input video")?;
    let mut sink = FfmpegSink::create(&s.output_path.join(OUTPUT_VIDEO), source.info())?;

    let filter = DetectionFilter::new(s.threshold).with_target_class(s.target_class);
    let annotator = Annotator::new(filter, s.max_people);
    let mut pipeline = Pipeline::new(detector, zones, annotator, s.containment);
    let mut stats = StatsRecorder::new(model_load);

    let res = pipeline.run(&mut source, &mut sink, &mut stats).await?;
    let stats_path = s.output_path.join(STATS_FILE);
    res.write_to(&stats_path).await?;

    info!(
        "run: {} frame(s) in {:.1}s ({:.2} fps); stats in {}",
        res.frames,
        res.inference_secs(),
        res.fps(),
        stats_path.display()
    );
    Ok(())
}

fn inspect(s: &Settings) -> Result<()> {
    #[cfg(not(feature = "vision-tflite"))]
    {
        let _ = s;
        anyhow::bail!("detector backend not available; build with --features vision-tflite");
    }

    #[cfg(feature = "vision-tflite")]
    {
        let mut det = TfliteDetector::new(s.detector.clone())?;
        print!("{}", det.inspect()?);
        Ok(())
    }
}

fn init_detector(s: &Settings) -> Result<Box<dyn Detector>> {
    #[cfg(not(feature = "vision-tflite"))]
    {
        let _ = s;
        anyhow::bail!("binary not built with --features vision-tflite");
    }

    #[cfg(feature = "vision-tflite")]
    {
        Ok(Box::new(TfliteDetector::new(s.detector.clone())?))
    }
}
