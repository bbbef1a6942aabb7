use anyhow::{Result, anyhow};
use image::{DynamicImage, ImageBuffer, Rgba, codecs::jpeg::JpegEncoder};

use crate::types::Frame;

/// Copies `frame` into an offscreen buffer at its native size and encodes it
/// as JPEG. `quality` is on a 0..=1 scale.
pub fn encode_jpeg(frame: &Frame, quality: f32) -> Result<Vec<u8>> {
    if frame.width == 0 || frame.height == 0 {
        return Err(anyhow!(
            "cannot encode a {}x{} frame",
            frame.width,
            frame.height
        ));
    }

    let buffer =
        ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(frame.width, frame.height, frame.rgba.clone())
            .ok_or_else(|| {
                anyhow!(
                    "frame buffer holds {} bytes, expected {}",
                    frame.rgba.len(),
                    frame.width as usize * frame.height as usize * 4
                )
            })?;

    let rgb = DynamicImage::ImageRgba8(buffer).to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, jpeg_quality(quality))
        .encode_image(&rgb)
        .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
    Ok(jpeg)
}

fn jpeg_quality(quality: f32) -> u8 {
    (quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    fn frame(width: u32, height: u32, len: usize) -> Frame {
        Frame {
            rgba: vec![200; len],
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn encodes_native_size_jpeg() {
        let jpeg = encode_jpeg(&frame(32, 24, 32 * 24 * 4), 0.8).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
    }

    #[test]
    fn rejects_short_buffers_and_empty_frames() {
        assert!(encode_jpeg(&frame(32, 24, 10), 0.8).is_err());
        assert!(encode_jpeg(&frame(0, 0, 0), 0.8).is_err());
    }

    #[test]
    fn maps_unit_quality_to_percent() {
        assert_eq!(jpeg_quality(0.8), 80);
        assert_eq!(jpeg_quality(0.0), 1);
        assert_eq!(jpeg_quality(3.0), 100);
    }
}
