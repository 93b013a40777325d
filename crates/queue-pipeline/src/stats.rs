use anyhow::{Context, Result};
use std::path::Path;
use std::time::{Duration, Instant};

/// Accumulates timing for one run of the pipeline.
#[derive(Debug, Clone)]
pub struct StatsRecorder {
    model_load: Duration,
    started: Option<Instant>,
    frames: u64,
}

impl StatsRecorder {
    pub fn new(model_load: Duration) -> Self {
        Self { model_load, started: None, frames: 0 }
    }

    /// Marks the start of the frame loop.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn finish(&self) -> RunStats {
        RunStats {
            model_load: self.model_load,
            inference: self.started.map(|t| t.elapsed()).unwrap_or_default(),
            frames: self.frames,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunStats {
    pub model_load: Duration,
    /// Wall time across the whole frame loop.
    pub inference: Duration,
    pub frames: u64,
}

impl RunStats {
    /// Inference time rounded to one decimal place.
    pub fn inference_secs(&self) -> f64 {
        (self.inference.as_secs_f64() * 10.0).round() / 10.0
    }

    /// Frames per second over the rounded inference time; 0 when that rounds to zero.
    pub fn fps(&self) -> f64 {
        let t = self.inference_secs();
        if t > 0.0 { self.frames as f64 / t } else { 0.0 }
    }

    /// Inference seconds, FPS and model load seconds, one per line.
    pub fn render(&self) -> String {
        format!("{:.1}\n{}\n{}\n", self.inference_secs(), self.fps(), self.model_load.as_secs_f64())
    }

    pub async fn write_to(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, self.render())
            .await
            .with_context(|| format!("write stats {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_is_rounded_before_fps() {
        let s = RunStats { model_load: Duration::from_millis(500), inference: Duration::from_millis(9960), frames: 100 };
        assert_eq!(s.inference_secs(), 10.0);
        assert_eq!(s.fps(), 10.0);
        assert_eq!(s.render(), "10.0\n10\n0.5\n");
    }

    #[test]
    fn empty_stream_reports_zero_fps() {
        let s = RunStats { model_load: Duration::from_millis(1250), inference: Duration::from_millis(20), frames: 0 };
        assert_eq!(s.render(), "0.0\n0\n1.25\n");
    }

    #[test]
    fn sub_rounding_run_does_not_divide_by_zero() {
        let s = RunStats { model_load: Duration::ZERO, inference: Duration::from_millis(40), frames: 3 };
        assert_eq!(s.fps(), 0.0);
    }

    #[test]
    fn recorder_counts_frames() {
        let mut r = StatsRecorder::new(Duration::from_secs(2));
        assert_eq!(r.finish().inference, Duration::ZERO);
        r.start();
        r.record_frame();
        r.record_frame();
        let s = r.finish();
        assert_eq!(s.frames, 2);
        assert_eq!(s.model_load, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn writes_three_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.txt");
        let s = RunStats { model_load: Duration::from_millis(750), inference: Duration::from_millis(12340), frames: 370 };
        s.write_to(&path).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        let fps = (370.0 / 12.3f64).to_string();
        assert_eq!(lines, vec!["12.3", fps.as_str(), "0.75"]);
    }
}
