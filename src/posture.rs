use thiserror::Error;

use crate::types::{BodyLandmark, PoseLandmarks, PostureState};

/// Inclusive slope band that counts as a slumped torso.
pub const INCORRECT_SLOPE_MIN: f32 = -5.0;
pub const INCORRECT_SLOPE_MAX: f32 = 5.0;

const SHOULDER: BodyLandmark = BodyLandmark::LeftShoulder;
const HIP: BodyLandmark = BodyLandmark::LeftHip;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum PostureError {
    #[error("shoulder and hip share an x coordinate, slope is undefined")]
    DivisionUndefined,
    #[error("landmark {index} missing from estimator output")]
    MissingLandmark { index: usize },
}

/// Slope of the hip→shoulder line in pixel space.
pub fn posture_slope(
    landmarks: &PoseLandmarks,
    width: u32,
    height: u32,
) -> Result<f32, PostureError> {
    let shoulder = landmarks
        .get(SHOULDER)
        .ok_or(PostureError::MissingLandmark {
            index: SHOULDER.index(),
        })?;
    let hip = landmarks.get(HIP).ok_or(PostureError::MissingLandmark {
        index: HIP.index(),
    })?;

    let (shoulder_x, shoulder_y) = shoulder.to_pixel(width, height);
    let (hip_x, hip_y) = hip.to_pixel(width, height);

    let run = shoulder_x - hip_x;
    if run == 0.0 {
        return Err(PostureError::DivisionUndefined);
    }
    let slope = (shoulder_y - hip_y) / run;
    // a subnormal run can still overflow
    if !slope.is_finite() {
        return Err(PostureError::DivisionUndefined);
    }
    Ok(slope)
}

pub fn classify(slope: f32) -> PostureState {
    if (INCORRECT_SLOPE_MIN..=INCORRECT_SLOPE_MAX).contains(&slope) {
        PostureState::Incorrect
    } else {
        PostureState::Correct
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Landmark;

    fn pose_with(hip: (f32, f32), shoulder: (f32, f32), w: u32, h: u32) -> PoseLandmarks {
        let mut points = vec![Landmark::default(); BodyLandmark::COUNT];
        points[HIP.index()] = Landmark::new(hip.0 / w as f32, hip.1 / h as f32, 1.0);
        points[SHOULDER.index()] =
            Landmark::new(shoulder.0 / w as f32, shoulder.1 / h as f32, 1.0);
        PoseLandmarks::new(points)
    }

    #[test]
    fn slope_uses_pixel_space() {
        let pose = pose_with((100.0, 200.0), (150.0, 202.0), 400, 400);
        let slope = posture_slope(&pose, 400, 400).unwrap();
        assert!((slope - 0.04).abs() < 1e-4);
    }

    #[test]
    fn slope_respects_aspect_ratio() {
        let pose = pose_with((100.0, 200.0), (105.0, 260.0), 640, 480);
        let slope = posture_slope(&pose, 640, 480).unwrap();
        assert!((slope - 12.0).abs() < 1e-3);
    }

    #[test]
    fn vertical_line_is_undefined() {
        for x in [0.0, 37.0, 319.0] {
            let pose = pose_with((x, 10.0), (x, 200.0), 320, 240);
            assert_eq!(
                posture_slope(&pose, 320, 240),
                Err(PostureError::DivisionUndefined)
            );
        }
    }

    #[test]
    fn zero_width_frame_is_undefined() {
        let pose = pose_with((1.0, 10.0), (2.0, 200.0), 320, 240);
        assert_eq!(
            posture_slope(&pose, 0, 240),
            Err(PostureError::DivisionUndefined)
        );
    }

    #[test]
    fn short_landmark_list_is_reported() {
        let pose = PoseLandmarks::new(vec![Landmark::default(); 12]);
        assert_eq!(
            posture_slope(&pose, 100, 100),
            Err(PostureError::MissingLandmark { index: 23 })
        );
    }

    #[test]
    fn band_is_inclusive() {
        assert_eq!(classify(5.0), PostureState::Incorrect);
        assert_eq!(classify(-5.0), PostureState::Incorrect);
        assert_eq!(classify(0.0), PostureState::Incorrect);
        assert_eq!(classify(0.04), PostureState::Incorrect);
    }

    #[test]
    fn outside_band_is_correct() {
        assert_eq!(classify(5.0001), PostureState::Correct);
        assert_eq!(classify(-5.0001), PostureState::Correct);
        assert_eq!(classify(12.0), PostureState::Correct);
        assert_eq!(classify(f32::INFINITY), PostureState::Correct);
    }
}
