pub mod stats;

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::{debug, info};

use queue_video::overlay::Annotator;
use queue_video::{FrameSink, FrameSource};
use queue_vision::Detector;
use queue_zones::{count_occupancy, ContainmentRule, OccupancyCount, ZoneRegistry};

use stats::{RunStats, StatsRecorder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Open,
    Running,
    Drained,
}

/// What one frame produced.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub person_count: usize,
    pub occupancy: OccupancyCount,
}

/// Everything a run needs, owned for the run's duration.
pub struct Pipeline<D> {
    detector: D,
    zones: ZoneRegistry,
    annotator: Annotator,
    containment: ContainmentRule,
    state: PipelineState,
}

impl<D: Detector> Pipeline<D> {
    pub fn new(detector: D, zones: ZoneRegistry, annotator: Annotator, containment: ContainmentRule) -> Self {
        Self { detector, zones, annotator, containment, state: PipelineState::Open }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Detect, draw boxes, count, draw overlay. The frame is annotated in place.
    pub fn process_frame(&mut self, frame: &mut RgbImage) -> Result<FrameReport> {
        let raw = self.detector.detect(frame).context("detect")?;
        let annotated = self.annotator.draw_detections(frame, &raw);
        debug!("pipeline: accepted {:?}", annotated.accepted);

        let occupancy = count_occupancy(&self.zones, &annotated.accepted, self.containment);
        self.annotator.draw_occupancy(frame, &occupancy);
        Ok(FrameReport { person_count: annotated.person_count, occupancy })
    }

    /// Drives the source to exhaustion. The sink is finished on every exit path.
    pub async fn run<S, K>(&mut self, source: &mut S, sink: &mut K, stats: &mut StatsRecorder) -> Result<RunStats>
    where
        S: FrameSource,
        K: FrameSink,
    {
        anyhow::ensure!(self.state == PipelineState::Open, "pipeline already ran");
        self.state = PipelineState::Running;
        stats.start();

        let res = self.drive(source, sink, stats).await;
        let run = stats.finish();
        let closed = sink.finish().await;
        self.state = PipelineState::Drained;

        res?;
        closed.context("close output video")?;
        info!("pipeline: drained after {} frame(s)", run.frames);
        Ok(run)
    }

    async fn drive<S, K>(&mut self, source: &mut S, sink: &mut K, stats: &mut StatsRecorder) -> Result<()>
    where
        S: FrameSource,
        K: FrameSink,
    {
        while let Some(mut frame) = source.read_frame().await? {
            let n = stats.frames() + 1;
            let report = self.process_frame(&mut frame).with_context(|| format!("frame {}", n))?;
            sink.write_frame(&frame).await.with_context(|| format!("frame {}", n))?;
            stats.record_frame();
            info!("frame {}: {} person(s) in frame, queues {}", n, report.person_count, report.occupancy);
        }
        Ok(())
    }
}
