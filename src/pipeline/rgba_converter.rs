use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use rayon::prelude::*;

use crate::types::Frame;

#[cfg(feature = "camera-nokhwa")]
pub use self::camera_buffer::convert_camera_frame;

/// Byte layout of an uncompressed 8-bit frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackedLayout {
    Rgb,
    Bgr,
    Gray,
}

impl PackedLayout {
    fn bytes_per_pixel(self) -> usize {
        match self {
            PackedLayout::Rgb | PackedLayout::Bgr => 3,
            PackedLayout::Gray => 1,
        }
    }
}

/// Expand a packed RGB/BGR/gray buffer to an RGBA frame.
pub fn packed_to_frame(data: &[u8], width: u32, height: u32, layout: PackedLayout) -> Result<Frame> {
    let pixels = width as usize * height as usize;
    let bpp = layout.bytes_per_pixel();
    if data.len() < pixels * bpp {
        return Err(anyhow!(
            "{layout:?} buffer too small: got {}, expected {}",
            data.len(),
            pixels * bpp
        ));
    }

    let mut rgba = vec![0u8; pixels * 4];
    rgba.par_chunks_mut(4)
        .zip(data[..pixels * bpp].par_chunks_exact(bpp))
        .for_each(|(dst, src)| {
            let [r, g, b] = match layout {
                PackedLayout::Rgb => [src[0], src[1], src[2]],
                PackedLayout::Bgr => [src[2], src[1], src[0]],
                PackedLayout::Gray => [src[0], src[0], src[0]],
            };
            dst.copy_from_slice(&[r, g, b, 255]);
        });

    Ok(Frame::new(rgba, width, height))
}

/// Scale a frame by `factor`, keeping its timestamp. A factor of 1.0 is a no-op.
pub fn resize_frame(frame: Frame, factor: f32) -> Result<Frame> {
    if !(factor > 0.0) {
        return Err(anyhow!("resize factor must be positive, got {factor}"));
    }
    if (factor - 1.0).abs() < f32::EPSILON {
        return Ok(frame);
    }

    let new_w = ((frame.width as f32 * factor) as u32).max(1);
    let new_h = ((frame.height as f32 * factor) as u32).max(1);
    let timestamp = frame.timestamp;

    let src_image =
        fir::images::Image::from_vec_u8(frame.width, frame.height, frame.rgba, fir::PixelType::U8x4)
            .context("frame buffer does not match its dimensions")?;
    let mut dst_image = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let mut resizer = fir::Resizer::new();
    let resize_options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer
        .resize(&src_image, &mut dst_image, Some(&resize_options))
        .context("fast resize failed")?;

    Ok(Frame {
        rgba: dst_image.into_vec(),
        width: new_w,
        height: new_h,
        timestamp,
    })
}

#[cfg(feature = "camera-nokhwa")]
mod camera_buffer {
    use std::convert::TryFrom;

    use anyhow::{Result, anyhow};
    use nokhwa::{Buffer, utils::FrameFormat};
    use yuv::{
        YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
        yuv_nv12_to_rgba, yuyv422_to_rgba,
    };
    use zune_jpeg::{
        JpegDecoder,
        zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
    };

    use super::{PackedLayout, packed_to_frame};
    use crate::types::Frame;

    pub fn convert_camera_frame(buffer: &Buffer) -> Result<Frame> {
        let resolution = buffer.resolution();
        let width = resolution.width_x;
        let height = resolution.height_y;
        let data = buffer.buffer();

        match buffer.source_frame_format() {
            FrameFormat::NV12 => nv12_to_frame(data, width, height),
            FrameFormat::YUYV => yuyv_to_frame(data, width, height),
            FrameFormat::MJPEG => mjpeg_to_frame(data, width, height),
            FrameFormat::RAWRGB => packed_to_frame(data, width, height, PackedLayout::Rgb),
            FrameFormat::RAWBGR => packed_to_frame(data, width, height, PackedLayout::Bgr),
            FrameFormat::GRAY => packed_to_frame(data, width, height, PackedLayout::Gray),
        }
    }

    fn nv12_to_frame(data: &[u8], width: u32, height: u32) -> Result<Frame> {
        let y_plane_len = width as usize * height as usize;
        let uv_plane_len = y_plane_len / 2;
        if data.len() < y_plane_len + uv_plane_len {
            return Err(anyhow!(
                "NV12 buffer too small: got {}, expected {}",
                data.len(),
                y_plane_len + uv_plane_len
            ));
        }

        let image = YuvBiPlanarImage {
            y_plane: &data[..y_plane_len],
            y_stride: width,
            uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
            uv_stride: width,
            width,
            height,
        };
        let mut rgba = vec![0u8; y_plane_len * 4];
        yuv_nv12_to_rgba(
            &image,
            &mut rgba,
            width * 4,
            YuvRange::Full,
            YuvStandardMatrix::Bt709,
            YuvConversionMode::Balanced,
        )
        .map_err(|err| anyhow!("NV12→RGBA failed: {err:?}"))?;

        Ok(Frame::new(rgba, width, height))
    }

    fn yuyv_to_frame(data: &[u8], width: u32, height: u32) -> Result<Frame> {
        let expected_len = width as usize * height as usize * 2;
        if data.len() < expected_len {
            return Err(anyhow!(
                "YUYV buffer too small: got {}, expected {}",
                data.len(),
                expected_len
            ));
        }

        let packed = YuvPackedImage {
            yuy: data,
            yuy_stride: width * 2,
            width,
            height,
        };
        let mut rgba = vec![0u8; width as usize * height as usize * 4];
        yuyv422_to_rgba(
            &packed,
            &mut rgba,
            width * 4,
            YuvRange::Full,
            YuvStandardMatrix::Bt709,
        )
        .map_err(|err| anyhow!("YUYV422→RGBA failed: {err:?}"))?;

        Ok(Frame::new(rgba, width, height))
    }

    // The JPEG header wins over the negotiated resolution when they disagree.
    fn mjpeg_to_frame(data: &[u8], width: u32, height: u32) -> Result<Frame> {
        let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
        let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
        let rgba = decoder
            .decode()
            .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

        let (width, height) = match decoder.info() {
            Some(info) => (
                u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width out of range"))?,
                u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height out of range"))?,
            ),
            None => (width, height),
        };
        let expected_len = usize::try_from(width)
            .and_then(|w| usize::try_from(height).map(|h| w * h * 4))
            .map_err(|_| anyhow!("MJPEG dimensions do not fit usize"))?;
        if rgba.len() < expected_len {
            return Err(anyhow!(
                "MJPEG decode produced too few bytes: got {}, expected {}",
                rgba.len(),
                expected_len
            ));
        }

        Ok(Frame::new(rgba, width, height))
    }
}
