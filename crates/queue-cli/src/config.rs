use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use queue_vision::config::{Device, DetectorConfig, OutputLayout};
use queue_zones::ContainmentRule;

const DEFAULT_OUTPUT_PATH: &str = "/results";
const DEFAULT_MAX_PEOPLE: u32 = 2;
const DEFAULT_THRESHOLD: f32 = 0.60;
const DEFAULT_THREADS: i32 = 2;

/// Command-line options shared by `run`, `inspect` and `doctor`. Each overrides the config file.
#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Path to the detection model (.tflite).
    #[arg(long)]
    pub model: Option<String>,
    /// CPU or EDGETPU.
    #[arg(long)]
    pub device: Option<String>,
    /// Input video file.
    #[arg(long)]
    pub video: Option<PathBuf>,
    /// Zone file (.toml or .npy).
    #[arg(long = "queue-param")]
    pub queue_param: Option<PathBuf>,
    /// Directory for output_video.mp4 and stats.txt.
    #[arg(long = "output-path")]
    pub output_path: Option<PathBuf>,
    /// Occupancy at which a queue is reported full.
    #[arg(long = "max-people")]
    pub max_people: Option<u32>,
    /// Detection confidence threshold (exclusive).
    #[arg(long)]
    pub threshold: Option<f32>,
    /// Only count detections of this class id.
    #[arg(long = "target-class")]
    pub target_class: Option<i32>,
    /// horizontal (default) or full.
    #[arg(long)]
    pub containment: Option<String>,
    /// ssd (default) or tflite-postprocess.
    #[arg(long = "output-layout")]
    pub output_layout: Option<String>,
    /// Interpreter threads.
    #[arg(long)]
    pub threads: Option<i32>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub detector: DetectorCfg,
    pub run: RunCfg,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorCfg {
    pub model_path: Option<String>,
    pub device: Option<String>,
    pub output_layout: Option<String>,
    pub num_threads: Option<i32>,
    pub target_class: Option<i32>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunCfg {
    pub video: Option<PathBuf>,
    pub queue_param: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub max_people: Option<u32>,
    pub threshold: Option<f32>,
    pub containment: Option<String>,
}

pub fn load_config(path: &Path) -> Result<FileConfig> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&s).context("parse config toml")
}

/// Validated settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub detector: DetectorConfig,
    pub target_class: Option<i32>,
    pub video: Option<PathBuf>,
    pub queue_param: Option<PathBuf>,
    pub output_path: PathBuf,
    pub max_people: u32,
    pub threshold: f32,
    pub containment: ContainmentRule,
}

impl Settings {
    pub fn resolve(args: &RunArgs, file: &FileConfig) -> Result<Self> {
        let (d, r) = (&file.detector, &file.run);

        let model_path = args
            .model
            .clone()
            .or_else(|| d.model_path.clone())
            .context("--model is required (or detector.model_path in the config file)")?;
        let device: Device = match args.device.as_deref().or(d.device.as_deref()) {
            Some(s) => s.parse()?,
            None => Device::default(),
        };
        let output_layout: OutputLayout = match args.output_layout.as_deref().or(d.output_layout.as_deref()) {
            Some(s) => s.parse()?,
            None => OutputLayout::default(),
        };
        let containment: ContainmentRule = match args.containment.as_deref().or(r.containment.as_deref()) {
            Some(s) => s.parse()?,
            None => ContainmentRule::default(),
        };

        let threshold = args.threshold.or(r.threshold).unwrap_or(DEFAULT_THRESHOLD);
        anyhow::ensure!((0.0..=1.0).contains(&threshold), "threshold must be within 0..1, got {}", threshold);
        let max_people = args.max_people.or(r.max_people).unwrap_or(DEFAULT_MAX_PEOPLE);
        anyhow::ensure!(max_people >= 1, "max-people must be at least 1");
        let num_threads = args.threads.or(d.num_threads).unwrap_or(DEFAULT_THREADS);
        anyhow::ensure!(num_threads >= 1, "threads must be at least 1");

        Ok(Self {
            detector: DetectorConfig { model_path, device, output_layout, num_threads },
            target_class: args.target_class.or(d.target_class),
            video: args.video.clone().or_else(|| r.video.clone()),
            queue_param: args.queue_param.clone().or_else(|| r.queue_param.clone()),
            output_path: args
                .output_path
                .clone()
                .or_else(|| r.output_path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
            max_people,
            threshold,
            containment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(model: &str) -> RunArgs {
        RunArgs { model: Some(model.into()), ..Default::default() }
    }

    #[test]
    fn defaults_apply_without_config() {
        let s = Settings::resolve(&args("person.tflite"), &FileConfig::default()).unwrap();
        assert_eq!(s.detector.model_path, "person.tflite");
        assert_eq!(s.detector.device, Device::Cpu);
        assert_eq!(s.detector.output_layout, OutputLayout::Ssd);
        assert_eq!(s.output_path, PathBuf::from("/results"));
        assert_eq!(s.max_people, 2);
        assert_eq!(s.threshold, 0.60);
        assert_eq!(s.containment, ContainmentRule::Horizontal);
        assert_eq!(s.target_class, None);
    }

    #[test]
    fn flags_override_file() {
        let file: FileConfig = toml::from_str(
            r#"
            [detector]
            model_path = "from-file.tflite"
            device = "EDGETPU"
            target_class = 1

            [run]
            max_people = 4
            threshold = 0.5
            output_path = "/tmp/out"
            containment = "full"
            "#,
        )
        .unwrap();

        let from_file = Settings::resolve(&RunArgs::default(), &file).unwrap();
        assert_eq!(from_file.detector.model_path, "from-file.tflite");
        assert_eq!(from_file.detector.device, Device::EdgeTpu);
        assert_eq!(from_file.max_people, 4);
        assert_eq!(from_file.target_class, Some(1));
        assert_eq!(from_file.containment, ContainmentRule::Full);

        let mut a = args("cli.tflite");
        a.max_people = Some(3);
        a.device = Some("cpu".into());
        let s = Settings::resolve(&a, &file).unwrap();
        assert_eq!(s.detector.model_path, "cli.tflite");
        assert_eq!(s.detector.device, Device::Cpu);
        assert_eq!(s.max_people, 3);
        assert_eq!(s.threshold, 0.5);
        assert_eq!(s.output_path, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn model_is_required() {
        let err = Settings::resolve(&RunArgs::default(), &FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("--model"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut a = args("m.tflite");
        a.threshold = Some(1.5);
        assert!(Settings::resolve(&a, &FileConfig::default()).is_err());

        let mut a = args("m.tflite");
        a.max_people = Some(0);
        assert!(Settings::resolve(&a, &FileConfig::default()).is_err());

        let mut a = args("m.tflite");
        a.containment = Some("diagonal".into());
        assert!(Settings::resolve(&a, &FileConfig::default()).is_err());
    }

    #[test]
    fn sample_config_resolves() {
        let file: FileConfig = toml::from_str(include_str!("../../../demos/queuewatch.toml")).unwrap();
        let s = Settings::resolve(&RunArgs::default(), &file).unwrap();
        assert_eq!(s.detector.num_threads, 4);
        assert_eq!(s.max_people, 3);
        assert_eq!(s.queue_param, Some(PathBuf::from("demos/queues.toml")));
    }

    #[test]
    fn unknown_config_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("[run]\nmax_ppl = 3\n").is_err());
    }

    #[test]
    fn loads_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queuewatch.toml");
        std::fs::write(&path, "[run]\nvideo = \"in.mp4\"\nqueue_param = \"queues.npy\"\n").unwrap();
        let file = load_config(&path).unwrap();
        assert_eq!(file.run.video, Some(PathBuf::from("in.mp4")));
        assert_eq!(file.run.queue_param, Some(PathBuf::from("queues.npy")));
        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
