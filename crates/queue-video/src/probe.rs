use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Stream properties queried once before decoding starts.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Container frame count; unknown for some formats and live sources.
    pub frame_count: Option<u64>,
}

impl VideoInfo {
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    pub async fn probe(path: &Path) -> Result<Self> {
        let mut cmd = Command::new("ffprobe");
        cmd.args([
            "-v", "error",
            "-select_streams", "v:0",
            "-show_entries", "stream=width,height,r_frame_rate,nb_frames",
            "-of", "default=noprint_wrappers=1",
        ]);
        cmd.arg(path);

        debug!("video: ffprobe {}", path.display());
        let out = cmd.output().await.context("run ffprobe")?;
        anyhow::ensure!(
            out.status.success(),
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        );
        Self::parse(&String::from_utf8_lossy(&out.stdout))
            .with_context(|| format!("probe {}", path.display()))
    }

    /// Parses `key=value` lines as printed by `ffprobe -of default=noprint_wrappers=1`.
    pub fn parse(s: &str) -> Result<Self> {
        let (mut width, mut height, mut frame_rate, mut frame_count) = (None, None, None, None);
        for line in s.lines() {
            let Some((k, v)) = line.trim().split_once('=') else { continue };
            match k {
                "width" => width = Some(v.parse::<u32>().context("parse width")?),
                "height" => height = Some(v.parse::<u32>().context("parse height")?),
                "r_frame_rate" => frame_rate = Some(parse_rate(v)?),
                "nb_frames" => frame_count = v.parse::<u64>().ok(),
                _ => {}
            }
        }
        let width = width.context("no video stream (width missing)")?;
        let height = height.context("no video stream (height missing)")?;
        anyhow::ensure!(width > 0 && height > 0, "invalid frame size {}x{}", width, height);
        Ok(Self {
            width,
            height,
            frame_rate: frame_rate.context("frame rate missing")?,
            frame_count,
        })
    }
}

fn parse_rate(v: &str) -> Result<FrameRate> {
    let (num, den) = v.split_once('/').unwrap_or((v, "1"));
    let rate = FrameRate {
        num: num.trim().parse().with_context(|| format!("parse frame rate {}", v))?,
        den: den.trim().parse().with_context(|| format!("parse frame rate {}", v))?,
    };
    anyhow::ensure!(rate.num > 0 && rate.den > 0, "invalid frame rate {}", v);
    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ffprobe_output() {
        let info = VideoInfo::parse("width=1920\nheight=1080\nr_frame_rate=30000/1001\nnb_frames=4521\n").unwrap();
        assert_eq!((info.width, info.height), (1920, 1080));
        assert_eq!(info.frame_rate.to_string(), "30000/1001");
        assert_eq!(info.frame_rate, FrameRate { num: 30000, den: 1001 });
        assert_eq!(info.frame_count, Some(4521));
        assert_eq!(info.frame_bytes(), 1920 * 1080 * 3);
    }

    #[test]
    fn unknown_frame_count_is_none() {
        let info = VideoInfo::parse("width=640\nheight=480\nr_frame_rate=25/1\nnb_frames=N/A\n").unwrap();
        assert_eq!(info.frame_count, None);
        assert_eq!(info.frame_rate, FrameRate { num: 25, den: 1 });
    }

    #[test]
    fn rejects_streams_without_video() {
        assert!(VideoInfo::parse("").is_err());
        assert!(VideoInfo::parse("width=640\nheight=480\nr_frame_rate=0/0\n").is_err());
        assert!(VideoInfo::parse("width=0\nheight=480\nr_frame_rate=25/1\n").is_err());
    }
}
