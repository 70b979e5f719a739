use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    EstimatorConfig, PoseEstimator,
    common::{self, InputTransform},
};
use crate::types::{Frame, PoseLandmarks};

/// BlazePose landmark model run through ONNX Runtime.
///
/// The first frame is letterboxed whole. While a person stays tracked the
/// next frame is cropped around the previous landmarks instead.
pub struct OrtPoseEstimator {
    session: Session,
    config: EstimatorConfig,
    tracked: Option<PoseLandmarks>,
}

impl OrtPoseEstimator {
    pub fn new(model_path: &Path, config: EstimatorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;

        log::info!("pose landmark model loaded from {}", model_path.display());

        Ok(Self {
            session,
            config,
            tracked: None,
        })
    }

    fn prepare(&self, frame: &Frame) -> Result<(ndarray::Array4<f32>, InputTransform, f32)> {
        let roi = self
            .tracked
            .as_ref()
            .and_then(|prev| common::roi_from_landmarks(prev, frame.width, frame.height));

        match roi {
            Some((center, side)) => {
                let (input, crop) = common::prepare_crop(frame, center, side, common::INPUT_SIZE)?;
                Ok((
                    input,
                    InputTransform::Crop(crop),
                    self.config.min_tracking_confidence,
                ))
            }
            None => {
                let (input, letterbox) =
                    common::prepare_frame_with_size(frame, common::INPUT_SIZE)?;
                Ok((
                    input,
                    InputTransform::Letterbox(letterbox),
                    self.config.min_detection_confidence,
                ))
            }
        }
    }
}

impl PoseEstimator for OrtPoseEstimator {
    fn estimate(&mut self, frame: &Frame) -> Result<Option<PoseLandmarks>> {
        let (input, transform, threshold) = self.prepare(frame)?;
        let tensor = Tensor::from_array(input)?;

        let (flat, presence) = {
            let outputs = self
                .session
                .run(ort::inputs![tensor])
                .context("failed to run pose landmark model")?;
            if outputs.len() < 2 {
                return Err(anyhow!("pose model returned {} outputs, need 2", outputs.len()));
            }

            let flat: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
            let presence = outputs[1]
                .try_extract_array::<f32>()?
                .iter()
                .next()
                .copied()
                .unwrap_or(0.0);
            (flat, presence)
        };

        if presence < threshold {
            if self.tracked.take().is_some() {
                log::debug!("pose lost (presence {presence:.2})");
            }
            return Ok(None);
        }

        let landmarks = common::decode_landmarks(&flat, &transform)?;
        self.tracked = Some(landmarks.clone());
        Ok(Some(landmarks))
    }
}
