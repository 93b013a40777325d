//! Video I/O through `ffmpeg` child processes exchanging raw `rgb24` frames over pipes.

use anyhow::{Context, Result};
use image::RgbImage;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::{FrameSink, FrameSource, VideoInfo};

pub struct FfmpegSource {
    path: PathBuf,
    info: VideoInfo,
    child: Child,
    stdout: Option<ChildStdout>,
}

impl FfmpegSource {
    pub async fn open(path: &Path) -> Result<Self> {
        anyhow::ensure!(path.is_file(), "video file not found: {}", path.display());
        let info = VideoInfo::probe(path).await?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(decode_args(path));
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).kill_on_drop(true);

        debug!("video: ffmpeg decode {}", path.display());
        let mut child = cmd.spawn().context("spawn ffmpeg decoder")?;
        let stdout = child.stdout.take().context("ffmpeg decoder stdout")?;

        info!(
            "video: opened {} ({}x{} @ {} fps, {} frames)",
            path.display(),
            info.width,
            info.height,
            info.frame_rate,
            info.frame_count.map(|n| n.to_string()).unwrap_or_else(|| "?".into())
        );
        Ok(Self { path: path.to_path_buf(), info, child, stdout: Some(stdout) })
    }

    async fn drain(&mut self) {
        self.stdout = None;
        match self.child.wait().await {
            Ok(st) if !st.success() => warn!("video: decoder for {} exited with {}", self.path.display(), st),
            Ok(_) => {}
            Err(e) => warn!("video: wait for decoder: {:#}", e),
        }
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    async fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(stdout) = self.stdout.as_mut() else { return Ok(None) };

        let mut buf = vec![0u8; self.info.frame_bytes()];
        let mut filled = 0;
        while filled < buf.len() {
            let n = stdout.read(&mut buf[filled..]).await.context("read decoded frame")?;
            if n == 0 { break; }
            filled += n;
        }

        if filled < buf.len() {
            if filled > 0 {
                warn!("video: dropping trailing partial frame ({} of {} bytes)", filled, buf.len());
            }
            self.drain().await;
            return Ok(None);
        }

        let frame = RgbImage::from_raw(self.info.width, self.info.height, buf)
            .context("decoded frame size mismatch")?;
        Ok(Some(frame))
    }
}

/// Frames come out in stored orientation so they match the probed width and height.
fn decode_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-nostdin", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.into());
    args.extend(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"].map(OsString::from));
    args
}

/// 4:2:0 chroma needs even dimensions; odd-sized sources keep their size with 4:4:4.
fn encode_args(path: &Path, info: &VideoInfo) -> Vec<OsString> {
    let pix_fmt = if info.width % 2 == 0 && info.height % 2 == 0 { "yuv420p" } else { "yuv444p" };
    let mut args: Vec<OsString> = [
        "-hide_banner", "-loglevel", "error", "-y",
        "-f", "rawvideo", "-pix_fmt", "rgb24",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push("-s".into());
    args.push(format!("{}x{}", info.width, info.height).into());
    args.push("-r".into());
    args.push(info.frame_rate.to_string().into());
    args.extend(["-i", "-", "-an", "-c:v", "libx264", "-pix_fmt", pix_fmt].map(OsString::from));
    args.push(path.into());
    args
}

pub struct FfmpegSink {
    path: PathBuf,
    width: u32,
    height: u32,
    child: Child,
    stdin: Option<ChildStdin>,
    frames: u64,
}

impl FfmpegSink {
    /// Starts an H.264 encoder writing `path` at the source's size and frame rate.
    pub fn create(path: &Path, info: &VideoInfo) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("create output dir {}", dir.display()))?;
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.args(encode_args(path, info));
        cmd.stdin(Stdio::piped()).stdout(Stdio::null()).kill_on_drop(true);

        debug!("video: ffmpeg encode {}", path.display());
        let mut child = cmd.spawn().context("spawn ffmpeg encoder")?;
        let stdin = child.stdin.take().context("ffmpeg encoder stdin")?;

        Ok(Self { path: path.to_path_buf(), width: info.width, height: info.height, child, stdin: Some(stdin), frames: 0 })
    }
}

impl FrameSink for FfmpegSink {
    async fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        anyhow::ensure!(
            frame.dimensions() == (self.width, self.height),
            "frame is {:?}, encoder expects {}x{}",
            frame.dimensions(), self.width, self.height
        );
        let stdin = self.stdin.as_mut().context("encoder already finished")?;
        stdin.write_all(frame.as_raw()).await.context("write frame to encoder")?;
        self.frames += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let Some(mut stdin) = self.stdin.take() else { return Ok(()) };
        let flushed = stdin.shutdown().await;
        drop(stdin);

        let st = self.child.wait().await.context("wait for ffmpeg encoder")?;
        flushed.context("flush encoder input")?;
        anyhow::ensure!(st.success(), "ffmpeg encoder exited with {}", st);
        info!("video: wrote {} frame(s) to {}", self.frames, self.path.display());
        Ok(())
    }
}
