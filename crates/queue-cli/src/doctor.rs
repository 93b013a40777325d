use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

use queue_video::VideoInfo;
use queue_zones::{load_zones, ZoneRegistry, ZoneSourceError};

use crate::config::Settings;

pub async fn check(s: &Settings) -> Result<()> {
    info!("doctor: starting");

    check_model(Path::new(&s.detector.model_path))?;

    let zones = match load_zones(s.queue_param.as_deref()) {
        Ok(z) => z,
        Err(ZoneSourceError::Missing) => {
            warn!("doctor: no --queue-param; occupancy overlay will be empty");
            ZoneRegistry::new()
        }
        Err(e) => return Err(e).context("zone file"),
    };
    if zones.is_empty() && s.queue_param.is_some() {
        warn!("doctor: zone file defines no queues");
    }

    match s.video.as_deref() {
        Some(video) => {
            anyhow::ensure!(video.is_file(), "video file not found: {}", video.display());
            let info = VideoInfo::probe(video).await?;
            info!("doctor: video {}x{} @ {} fps", info.width, info.height, info.frame_rate);
            for p in zone_problems(&zones, &info) {
                warn!("doctor: {}", p);
            }
        }
        None => warn!("doctor: no --video configured"),
    }

    std::fs::create_dir_all(&s.output_path)
        .with_context(|| format!("create output dir {}", s.output_path.display()))?;

    info!("doctor: OK");
    Ok(())
}

fn check_model(path: &Path) -> Result<()> {
    anyhow::ensure!(path.is_file(), "model file not found: {} (check --model)", path.display());
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if ext != "tflite" {
        warn!("doctor: model {} does not have a .tflite extension", path.display());
    }
    Ok(())
}

/// Zones that can never hold a detection on frames of this size.
fn zone_problems(zones: &ZoneRegistry, info: &VideoInfo) -> Vec<String> {
    let (w, h) = (info.width as i32, info.height as i32);
    let mut out = Vec::new();
    for (id, z) in zones.iter() {
        if z.is_degenerate() {
            out.push(format!("queue {} has inverted bounds {:?}", id, z));
        } else if z.xmin >= w || z.xmax <= 0 || z.ymin >= h || z.ymax <= 0 {
            out.push(format!("queue {} lies outside the {}x{} frame", id, w, h));
        }
    }
    out
}
