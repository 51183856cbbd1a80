use crate::error::{EffectError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

/// Render one synthetic preview frame.
///
/// A moving diagonal gradient with a sweeping bar, so viewers can see the
/// stream is live even without a physical camera. Output is a complete
/// JPEG (SOI through EOI), identical in framing to real camera frames.
pub fn render_preview_frame(seq: u64, width: u32, height: u32) -> Result<Vec<u8>> {
    let phase = ((seq * 4) % 256) as u32;
    let bar_x = ((seq * 8) % width.max(1) as u64) as u32;

    let mut img = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let r = ((x * 255 / width.max(1)) + phase) % 256;
        let g = (y * 255 / height.max(1)) % 256;
        let b = 255 - ((r + g) / 2).min(255);

        let on_bar = x.abs_diff(bar_x) < 4;
        *pixel = if on_bar {
            Rgb([255, 255, 255])
        } else {
            Rgb([r as u8, g as u8, b as u8])
        };
    }

    encode_jpeg(&img, 80)
}

/// Render a synthetic high-resolution capture for simulation mode.
///
/// Distinguishable from preview frames: a flat studio-grey field with a
/// centered framing rectangle derived from the timestamp.
pub fn render_capture(width: u32, height: u32, timestamp_ms: u64) -> Result<Vec<u8>> {
    let tint = (timestamp_ms % 64) as u8;
    let border_x = width / 8;
    let border_y = height / 8;

    let mut img = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let inside = x >= border_x && x < width - border_x && y >= border_y && y < height - border_y;
        *pixel = if inside {
            Rgb([100 + tint, 150, 200 - tint])
        } else {
            Rgb([30, 30, 34])
        };
    }

    encode_jpeg(&img, 90)
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode_image(img)
        .map_err(|e| EffectError::Encode {
            details: e.to_string(),
        })?;
    Ok(buf)
}
