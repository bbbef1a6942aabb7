use std::time::Instant;

use anyhow::{Result, anyhow, bail};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::Frame;

/// Pixel layouts a UVC device may hand us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceLayout {
    Nv12,
    Yuyv,
    Mjpeg,
    Rgb,
    Bgr,
    Gray,
}

#[cfg(feature = "camera-nokhwa")]
pub fn convert_camera_frame(buffer: &nokhwa::Buffer) -> Result<Frame> {
    use nokhwa::utils::FrameFormat;

    let layout = match buffer.source_frame_format() {
        FrameFormat::NV12 => SourceLayout::Nv12,
        FrameFormat::YUYV => SourceLayout::Yuyv,
        FrameFormat::MJPEG => SourceLayout::Mjpeg,
        FrameFormat::RAWRGB => SourceLayout::Rgb,
        FrameFormat::RAWBGR => SourceLayout::Bgr,
        FrameFormat::GRAY => SourceLayout::Gray,
    };
    let resolution = buffer.resolution();
    to_frame(
        layout,
        buffer.buffer(),
        resolution.width_x,
        resolution.height_y,
    )
}

/// Converts one raw frame to an RGBA [`Frame`]. MJPEG frames report their own
/// size, which wins over the negotiated one.
pub fn to_frame(layout: SourceLayout, data: &[u8], width: u32, height: u32) -> Result<Frame> {
    let (rgba, width, height) = match layout {
        SourceLayout::Nv12 => (nv12_to_rgba(data, width, height)?, width, height),
        SourceLayout::Yuyv => (yuyv_to_rgba(data, width, height)?, width, height),
        SourceLayout::Mjpeg => mjpeg_to_rgba(data)?,
        SourceLayout::Rgb => (packed_to_rgba(data, width, height, false)?, width, height),
        SourceLayout::Bgr => (packed_to_rgba(data, width, height, true)?, width, height),
        SourceLayout::Gray => (gray_to_rgba(data, width, height)?, width, height),
    };

    Ok(Frame {
        rgba,
        width,
        height,
        timestamp: Instant::now(),
    })
}

fn pixel_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}

fn ensure_len(kind: &str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() < expected {
        bail!(
            "{kind} buffer too small: got {}, expected {expected}",
            data.len()
        );
    }
    Ok(())
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_len = pixel_count(width, height);
    let uv_len = y_len / 2;
    ensure_len("NV12", data, y_len + uv_len)?;

    let image = YuvBiPlanarImage {
        y_plane: &data[..y_len],
        y_stride: width,
        uv_plane: &data[y_len..y_len + uv_len],
        uv_stride: width,
        width,
        height,
    };

    let mut rgba = vec![0u8; y_len * 4];
    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGBA failed: {err:?}"))?;
    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    ensure_len("YUYV", data, pixel_count(width, height) * 2)?;

    let packed = YuvPackedImage {
        yuy: data,
        yuy_stride: width * 2,
        width,
        height,
    };

    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGBA failed: {err:?}"))?;
    Ok(rgba)
}

fn mjpeg_to_rgba(data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG frame has no header info"))?;
    let width = u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width out of range"))?;
    let height = u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height out of range"))?;
    ensure_len("MJPEG output", &rgba, pixel_count(width, height) * 4)?;
    Ok((rgba, width, height))
}

fn packed_to_rgba(data: &[u8], width: u32, height: u32, swap_rb: bool) -> Result<Vec<u8>> {
    ensure_len("RGB", data, pixel_count(width, height) * 3)?;

    let (r, b) = if swap_rb { (2, 0) } else { (0, 2) };
    let mut rgba = vec![0u8; pixel_count(width, height) * 4];
    rgba.par_chunks_mut(4)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            dst[0] = src[r];
            dst[1] = src[1];
            dst[2] = src[b];
            dst[3] = 255;
        });
    Ok(rgba)
}

fn gray_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let len = pixel_count(width, height);
    ensure_len("GRAY", data, len)?;

    let mut rgba = vec![0u8; len * 4];
    rgba.par_chunks_mut(4)
        .zip(data[..len].par_iter().copied())
        .for_each(|(dst, value)| {
            dst[..3].fill(value);
            dst[3] = 255;
        });
    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_swaps_channels() {
        let frame = to_frame(SourceLayout::Bgr, &[1, 2, 3, 4, 5, 6], 2, 1).unwrap();
        assert_eq!(frame.rgba, vec![3, 2, 1, 255, 6, 5, 4, 255]);
        assert_eq!((frame.width, frame.height), (2, 1));
    }

    #[test]
    fn rgb_keeps_channel_order() {
        let frame = to_frame(SourceLayout::Rgb, &[9, 8, 7], 1, 1).unwrap();
        assert_eq!(frame.rgba, vec![9, 8, 7, 255]);
    }

    #[test]
    fn gray_expands_to_opaque_rgba() {
        let frame = to_frame(SourceLayout::Gray, &[10, 20], 2, 1).unwrap();
        assert_eq!(frame.rgba, vec![10, 10, 10, 255, 20, 20, 20, 255]);
    }

    #[test]
    fn short_buffers_are_rejected() {
        assert!(to_frame(SourceLayout::Rgb, &[1, 2], 1, 1).is_err());
        assert!(to_frame(SourceLayout::Yuyv, &[0; 3], 2, 1).is_err());
        assert!(to_frame(SourceLayout::Nv12, &[0; 4], 2, 2).is_err());
    }

    #[test]
    fn mjpeg_uses_embedded_size() {
        let rgb = image::RgbImage::from_pixel(8, 4, image::Rgb([10, 200, 30]));
        let mut jpeg = Vec::new();
        image::codecs::jpeg::JpegEncoder::new(&mut jpeg)
            .encode_image(&rgb)
            .unwrap();

        let frame = to_frame(SourceLayout::Mjpeg, &jpeg, 0, 0).unwrap();
        assert_eq!((frame.width, frame.height), (8, 4));
        assert_eq!(frame.rgba.len(), 8 * 4 * 4);
    }
}
