pub mod ffmpeg;
pub mod overlay;
mod probe;

use anyhow::Result;
use image::RgbImage;

pub use probe::{FrameRate, VideoInfo};

/// Pull interface over a decoded video stream.
#[allow(async_fn_in_trait)]
pub trait FrameSource {
    fn info(&self) -> &VideoInfo;

    /// Next frame, or `None` once the stream is exhausted.
    async fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Push interface for annotated frames.
#[allow(async_fn_in_trait)]
pub trait FrameSink {
    async fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Flushes and closes the output. Safe to call more than once.
    async fn finish(&mut self) -> Result<()>;
}
