use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{BodyLandmark, Frame, Landmark, PoseLandmarks};

pub const INPUT_SIZE: u32 = 256;
pub const NUM_LANDMARKS: usize = BodyLandmark::COUNT;
/// The landmark head also emits six auxiliary ROI points after the body.
pub const MODEL_LANDMARKS: usize = 39;
pub const VALUES_PER_LANDMARK: usize = 5;

const ROI_SCALE: f32 = 1.25;
const MIN_ROI_SIDE: f32 = 16.0;
const ROI_MIN_VISIBILITY: f32 = 0.5;

#[derive(Clone, Debug, PartialEq)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CropTransform {
    pub center: (f32, f32),
    pub side: f32,
    pub output_size: u32,
    pub orig_w: u32,
    pub orig_h: u32,
}

/// How model input pixels map back onto the source frame.
#[derive(Clone, Debug, PartialEq)]
pub enum InputTransform {
    Letterbox(LetterboxInfo),
    Crop(CropTransform),
}

impl InputTransform {
    /// Model pixel coordinates to frame-normalized coordinates.
    pub fn to_normalized(&self, x: f32, y: f32) -> (f32, f32) {
        let (px, py, w, h) = match self {
            InputTransform::Letterbox(lb) => (
                (x - lb.pad_x) / lb.scale,
                (y - lb.pad_y) / lb.scale,
                lb.orig_w,
                lb.orig_h,
            ),
            InputTransform::Crop(crop) => {
                let (px, py) = crop.project(x, y);
                (px, py, crop.orig_w, crop.orig_h)
            }
        };
        (px / w.max(1) as f32, py / h.max(1) as f32)
    }
}

impl CropTransform {
    pub fn project(&self, x: f32, y: f32) -> (f32, f32) {
        let half = self.output_size as f32 / 2.0;
        let scale = self.side / self.output_size as f32;
        (
            self.center.0 + (x - half) * scale,
            self.center.1 + (y - half) * scale,
        )
    }
}

fn check_frame(frame: &Frame) -> Result<()> {
    let expected_len = (frame.width as usize)
        .saturating_mul(frame.height as usize)
        .saturating_mul(4);
    if frame.rgba.len() != expected_len || expected_len == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            expected_len
        ));
    }
    Ok(())
}

/// Letterbox the whole frame into a `target_size` square NHWC tensor.
pub fn prepare_frame_with_size(
    frame: &Frame,
    target_size: u32,
) -> Result<(Array4<f32>, LetterboxInfo)> {
    check_frame(frame)?;

    let scale = target_size as f32 / (frame.width.max(frame.height) as f32);
    let new_w = ((frame.width as f32 * scale).round().max(1.0) as u32).min(target_size);
    let new_h = ((frame.height as f32 * scale).round().max(1.0) as u32).min(target_size);

    let src_image = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;
    let resized = dst_image.into_vec();

    let pad_x = ((target_size - new_w) / 2) as usize;
    let pad_y = ((target_size - new_h) / 2) as usize;
    let mut canvas = vec![0u8; (target_size as usize) * (target_size as usize) * 4];
    let dst_stride = target_size as usize * 4;
    let src_stride = new_w as usize * 4;
    for row in 0..(new_h as usize) {
        let dst_offset = (pad_y + row) * dst_stride + pad_x * 4;
        let src_offset = row * src_stride;
        canvas[dst_offset..dst_offset + src_stride]
            .copy_from_slice(&resized[src_offset..src_offset + src_stride]);
    }

    let normalized: Vec<f32> = canvas
        .par_chunks_exact(4)
        .flat_map_iter(|px| {
            [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
            ]
        })
        .collect();
    let input = Array4::<f32>::from_shape_vec(
        (1, target_size as usize, target_size as usize, 3),
        normalized,
    )
    .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    let letterbox = LetterboxInfo {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    Ok((input, letterbox))
}

/// Sample an axis-aligned square around `center` into an `output_size` tensor.
pub fn prepare_crop(
    frame: &Frame,
    center: (f32, f32),
    side: f32,
    output_size: u32,
) -> Result<(Array4<f32>, CropTransform)> {
    check_frame(frame)?;

    let transform = CropTransform {
        center,
        side,
        output_size,
        orig_w: frame.width,
        orig_h: frame.height,
    };

    let mut data =
        Vec::with_capacity((output_size as usize).saturating_mul(output_size as usize * 3));
    for y in 0..output_size {
        for x in 0..output_size {
            let (src_x, src_y) = transform.project(x as f32 + 0.5, y as f32 + 0.5);
            data.extend_from_slice(&sample_rgb(frame, src_x, src_y));
        }
    }

    let array =
        Array4::<f32>::from_shape_vec((1, output_size as usize, output_size as usize, 3), data)
            .map_err(|err| anyhow!("failed to build crop tensor: {err}"))?;

    Ok((array, transform))
}

/// Decode the flat landmark tensor into frame-normalized body landmarks.
pub fn decode_landmarks(flat: &[f32], transform: &InputTransform) -> Result<PoseLandmarks> {
    if flat.len() < NUM_LANDMARKS * VALUES_PER_LANDMARK {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_LANDMARKS * VALUES_PER_LANDMARK
        ));
    }

    let points = flat
        .chunks_exact(VALUES_PER_LANDMARK)
        .take(NUM_LANDMARKS)
        .map(|chunk| {
            let (x, y) = transform.to_normalized(chunk[0], chunk[1]);
            Landmark {
                x,
                y,
                z: chunk[2] / INPUT_SIZE as f32,
                visibility: sigmoid(chunk[3]),
            }
        })
        .collect();
    Ok(PoseLandmarks::new(points))
}

/// Square pixel ROI `(center, side)` around the confidently seen landmarks.
pub fn roi_from_landmarks(
    landmarks: &PoseLandmarks,
    width: u32,
    height: u32,
) -> Option<((f32, f32), f32)> {
    let visible: Vec<(f32, f32)> = landmarks
        .points()
        .iter()
        .filter(|lm| lm.visibility >= ROI_MIN_VISIBILITY)
        .map(|lm| lm.to_pixel(width, height))
        .collect();
    if visible.len() < 2 {
        return None;
    }

    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for &(x, y) in &visible {
        min_x = min_x.min(x);
        min_y = min_y.min(y);
        max_x = max_x.max(x);
        max_y = max_y.max(y);
    }

    let limit = 2.0 * width.max(height) as f32;
    let side = ((max_x - min_x).max(max_y - min_y) * ROI_SCALE).min(limit);
    if !side.is_finite() || side < MIN_ROI_SIDE {
        return None;
    }
    Some((((min_x + max_x) / 2.0, (min_y + max_y) / 2.0), side))
}

pub fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

fn sample_rgb(frame: &Frame, x: f32, y: f32) -> [f32; 3] {
    if x.is_nan() || y.is_nan() {
        return [0.0, 0.0, 0.0];
    }
    // pixel centres sit at +0.5
    let x = x - 0.5;
    let y = y - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();

    let (w, h) = (frame.width as i32, frame.height as i32);
    let fetch = |cx: f32, cy: f32| -> [f32; 3] {
        let ix = cx as i32;
        let iy = cy as i32;
        if cx < 0.0 || cy < 0.0 || ix >= w || iy >= h {
            return [0.0, 0.0, 0.0];
        }
        let idx = ((iy as u32 * frame.width + ix as u32) as usize) * 4;
        [
            frame.rgba[idx] as f32 / 255.0,
            frame.rgba[idx + 1] as f32 / 255.0,
            frame.rgba[idx + 2] as f32 / 255.0,
        ]
    };

    let fx = x - x0;
    let fy = y - y0;
    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1.0, y0);
    let c01 = fetch(x0, y0 + 1.0);
    let c11 = fetch(x0 + 1.0, y0 + 1.0);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    [
        lerp(lerp(c00[0], c10[0], fx), lerp(c01[0], c11[0], fx), fy),
        lerp(lerp(c00[1], c10[1], fx), lerp(c01[1], c11[1], fx), fy),
        lerp(lerp(c00[2], c10[2], fx), lerp(c01[2], c11[2], fx), fy),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_output(points: &[(f32, f32, f32)]) -> Vec<f32> {
        let mut flat = vec![0.0; MODEL_LANDMARKS * VALUES_PER_LANDMARK];
        for (i, &(x, y, vis_logit)) in points.iter().enumerate() {
            let base = i * VALUES_PER_LANDMARK;
            flat[base] = x;
            flat[base + 1] = y;
            flat[base + 3] = vis_logit;
        }
        flat
    }

    #[test]
    fn letterbox_pads_the_short_side() {
        let frame = Frame::filled(512, 256, [255, 0, 0, 255]);
        let (input, letterbox) = prepare_frame_with_size(&frame, INPUT_SIZE).unwrap();

        assert_eq!(input.shape(), &[1, 256, 256, 3]);
        assert_eq!(letterbox.scale, 0.5);
        assert_eq!((letterbox.pad_x, letterbox.pad_y), (0.0, 64.0));
        // padding stays black, the picture is red
        assert_eq!(input[[0, 10, 128, 0]], 0.0);
        assert_eq!(input[[0, 128, 128, 0]], 1.0);
    }

    #[test]
    fn letterbox_coordinates_map_back_to_frame() {
        let frame = Frame::filled(512, 256, [0; 4]);
        let (_, letterbox) = prepare_frame_with_size(&frame, INPUT_SIZE).unwrap();
        let transform = InputTransform::Letterbox(letterbox);

        let (x, y) = transform.to_normalized(128.0, 128.0);
        assert!((x - 0.5).abs() < 1e-6);
        assert!((y - 0.5).abs() < 1e-6);

        let (x, y) = transform.to_normalized(0.0, 64.0);
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6);
    }

    #[test]
    fn crop_coordinates_map_back_to_frame() {
        let frame = Frame::filled(200, 100, [0, 0, 0, 255]);
        let (input, crop) = prepare_crop(&frame, (100.0, 50.0), 64.0, 32).unwrap();
        assert_eq!(input.shape(), &[1, 32, 32, 3]);

        let transform = InputTransform::Crop(crop);
        let (x, y) = transform.to_normalized(16.0, 16.0);
        assert!((x - 0.5).abs() < 1e-6);
        assert!((y - 0.5).abs() < 1e-6);

        // one model pixel is two frame pixels here
        let (x, _) = transform.to_normalized(32.0, 16.0);
        assert!((x * 200.0 - 132.0).abs() < 1e-4);
    }

    #[test]
    fn crop_outside_frame_samples_black() {
        let frame = Frame::filled(10, 10, [255, 255, 255, 255]);
        let (input, _) = prepare_crop(&frame, (-100.0, -100.0), 20.0, 4).unwrap();
        assert!(input.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn decode_applies_sigmoid_and_projection() {
        let frame = Frame::filled(512, 256, [0; 4]);
        let (_, letterbox) = prepare_frame_with_size(&frame, INPUT_SIZE).unwrap();
        let flat = model_output(&[(128.0, 128.0, 0.0), (256.0, 192.0, 20.0)]);

        let pose = decode_landmarks(&flat, &InputTransform::Letterbox(letterbox)).unwrap();

        assert_eq!(pose.len(), NUM_LANDMARKS);
        let first = pose.points()[0];
        assert!((first.visibility - 0.5).abs() < 1e-6);
        assert!((first.x - 0.5).abs() < 1e-6);
        let second = pose.points()[1];
        assert!(second.visibility > 0.99);
        assert!((second.x - 1.0).abs() < 1e-6 && (second.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn decode_rejects_short_tensor() {
        let transform = InputTransform::Crop(CropTransform {
            center: (0.0, 0.0),
            side: 1.0,
            output_size: 1,
            orig_w: 1,
            orig_h: 1,
        });
        assert!(decode_landmarks(&[0.0; 10], &transform).is_err());
    }

    #[test]
    fn roi_wraps_visible_points() {
        let mut points = vec![Landmark::new(0.0, 0.0, 0.0); NUM_LANDMARKS];
        points[11] = Landmark::new(0.25, 0.25, 0.9);
        points[23] = Landmark::new(0.75, 0.5, 0.9);
        let pose = PoseLandmarks::new(points);

        let (center, side) = roi_from_landmarks(&pose, 400, 400).unwrap();
        assert_eq!(center, (200.0, 150.0));
        assert!((side - 250.0).abs() < 1e-3);
    }

    #[test]
    fn roi_needs_two_visible_points() {
        let mut points = vec![Landmark::new(0.5, 0.5, 0.1); NUM_LANDMARKS];
        points[0].visibility = 1.0;
        assert!(roi_from_landmarks(&PoseLandmarks::new(points), 400, 400).is_none());
    }

    #[test]
    fn empty_frame_is_rejected() {
        let frame = Frame::new(Vec::new(), 0, 0);
        assert!(prepare_frame_with_size(&frame, INPUT_SIZE).is_err());
    }
}
