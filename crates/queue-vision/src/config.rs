use anyhow::Result;
use std::str::FromStr;

/// Compute device the model runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    EdgeTpu,
}

impl FromStr for Device {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CPU" => Ok(Self::Cpu),
            "EDGETPU" | "CORAL" => Ok(Self::EdgeTpu),
            other => anyhow::bail!("unknown device: {} (expected CPU or EDGETPU)", other),
        }
    }
}

/// How the model lays out its output tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputLayout {
    /// Single `[1, 1, N, 7]` tensor of `image_id, class_id, conf, xmin, ymin, xmax, ymax`.
    #[default]
    Ssd,
    /// TFLite_Detection_PostProcess: boxes `[1, N, 4]` (ymin, xmin, ymax, xmax), classes, scores, count.
    TflitePostprocess,
}

impl FromStr for OutputLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ssd" => Ok(Self::Ssd),
            "tflite-postprocess" => Ok(Self::TflitePostprocess),
            other => anyhow::bail!("unknown output_layout: {} (expected ssd or tflite-postprocess)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_path: String,
    pub device: Device,
    pub output_layout: OutputLayout,
    pub num_threads: i32,
}
