pub mod annotate;
#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod estimator;
pub mod rgba_converter;

use anyhow::Result;
use thiserror::Error;

use crate::{
    alert::{AlertController, AlertSink},
    posture::{self, PostureError},
    types::{AlertDecision, Frame, FrameOutcome},
};

#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraDevice, CameraSource, available_cameras};
pub use estimator::{EstimatorConfig, OrtPoseEstimator, PoseEstimator};

/// Blocking, pull-based frame supply.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Where annotated frames go, and where the operator asks to stop.
pub trait DisplaySink {
    fn show(&mut self, frame: &Frame) -> Result<()>;
    fn quit_requested(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no person detected")]
    NoPersonDetected,
    #[error(transparent)]
    Posture(#[from] PostureError),
    #[error("pose estimation failed: {0:#}")]
    Estimator(anyhow::Error),
    #[error("alert playback failed: {0:#}")]
    Alert(anyhow::Error),
    #[error("frame capture failed {failures} times in a row: {cause:#}")]
    Capture { failures: u32, cause: anyhow::Error },
    #[error("display failed: {0:#}")]
    Display(anyhow::Error),
}

/// Geometry, classification, alerting and annotation for one frame at a time.
pub struct PosturePipeline<E: PoseEstimator, S: AlertSink> {
    estimator: E,
    alert: AlertController<S>,
}

impl<E: PoseEstimator, S: AlertSink> PosturePipeline<E, S> {
    pub fn new(estimator: E, alert: AlertController<S>) -> Self {
        Self { estimator, alert }
    }

    pub fn alert(&self) -> &AlertController<S> {
        &self.alert
    }

    /// Classify `frame` and annotate it in place.
    ///
    /// On error the frame is only touched when the alert sink failed, in which
    /// case it still carries the full annotation.
    pub fn process(&mut self, frame: &mut Frame) -> Result<FrameOutcome, PipelineError> {
        let landmarks = self
            .estimator
            .estimate(frame)
            .map_err(PipelineError::Estimator)?
            .ok_or(PipelineError::NoPersonDetected)?;

        let slope = posture::posture_slope(&landmarks, frame.width, frame.height)?;
        let posture = posture::classify(slope);
        annotate::draw_posture_label(frame, slope, posture);

        let alert = self.alert.handle(posture);
        annotate::draw_pose_overlay(frame, &landmarks);

        Ok(FrameOutcome {
            slope,
            posture,
            alert: alert.map_err(PipelineError::Alert)?,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SessionOptions {
    pub resize_factor: f32,
    pub max_consecutive_failures: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            resize_factor: 0.5,
            max_consecutive_failures: 30,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub classified: u64,
    pub alerts: u64,
    pub dropped: u64,
}

/// Capture, process and display frames until the operator quits.
///
/// Per-frame failures are logged and the frame is shown as it is. Only
/// repeated capture failures and display failures end the session early.
pub fn run_session<F, D, E, S>(
    source: &mut F,
    pipeline: &mut PosturePipeline<E, S>,
    display: &mut D,
    options: SessionOptions,
) -> Result<SessionStats, PipelineError>
where
    F: FrameSource + ?Sized,
    D: DisplaySink + ?Sized,
    E: PoseEstimator,
    S: AlertSink,
{
    let mut stats = SessionStats::default();
    let mut failures = 0u32;

    while !display.quit_requested() {
        let frame = match source.next_frame() {
            Ok(frame) => {
                failures = 0;
                frame
            }
            Err(err) => {
                failures += 1;
                if failures >= options.max_consecutive_failures.max(1) {
                    log::error!("giving up after {failures} failed captures: {err:#}");
                    return Err(PipelineError::Capture {
                        failures,
                        cause: err,
                    });
                }
                log::warn!("frame capture failed ({failures}): {err:#}");
                continue;
            }
        };

        let mut frame = match rgba_converter::resize_frame(frame, options.resize_factor) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("frame dropped, resize failed: {err:#}");
                stats.dropped += 1;
                continue;
            }
        };
        stats.frames += 1;

        match pipeline.process(&mut frame) {
            Ok(outcome) => {
                stats.classified += 1;
                if outcome.alert == AlertDecision::Played {
                    stats.alerts += 1;
                }
                log::debug!(
                    "slope {:.2} -> {} ({:?})",
                    outcome.slope,
                    outcome.posture.label(),
                    outcome.alert
                );
            }
            Err(err @ (PipelineError::NoPersonDetected
            | PipelineError::Posture(PostureError::DivisionUndefined))) => {
                log::debug!("frame skipped: {err}");
                stats.dropped += 1;
            }
            Err(err) => {
                log::warn!("frame dropped: {err}");
                stats.dropped += 1;
            }
        }

        display.show(&frame).map_err(PipelineError::Display)?;
    }

    log::info!(
        "session ended after {} frames ({} alerts)",
        stats.frames,
        stats.alerts
    );
    Ok(stats)
}
