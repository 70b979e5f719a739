pub mod common;
mod ort;

use anyhow::Result;

use crate::types::{Frame, PoseLandmarks};

pub use self::ort::OrtPoseEstimator;

/// Produces one set of body landmarks per frame.
pub trait PoseEstimator {
    /// `Ok(None)` means nobody was found in the frame.
    fn estimate(&mut self, frame: &Frame) -> Result<Option<PoseLandmarks>>;
}

impl<E: PoseEstimator + ?Sized> PoseEstimator for Box<E> {
    fn estimate(&mut self, frame: &Frame) -> Result<Option<PoseLandmarks>> {
        (**self).estimate(frame)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EstimatorConfig {
    /// Presence needed to accept a pose found on the whole frame.
    pub min_detection_confidence: f32,
    /// Presence needed to keep following the previous pose.
    pub min_tracking_confidence: f32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
        }
    }
}
