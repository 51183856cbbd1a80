use super::{EffectKind, EffectParams};
use crate::error::EffectError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{GenericImageView, Rgb, RgbImage};
use std::io::Cursor;

/// Read image dimensions without a full decode
pub fn dimensions(data: &[u8]) -> Result<(u32, u32), EffectError> {
    image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| EffectError::Decode {
            details: e.to_string(),
        })?
        .into_dimensions()
        .map_err(|e| EffectError::Decode {
            details: e.to_string(),
        })
}

/// Decode, bound, transform and re-encode one image.
///
/// This is the single transform entry point shared by the worker offload
/// path and the synchronous fallback, so both produce bit-identical output
/// for the same inputs.
pub fn process(
    kind: EffectKind,
    params: EffectParams,
    jpeg: &[u8],
    max_dimension: u32,
    quality: u8,
) -> Result<Vec<u8>, EffectError> {
    let mut decoded = image::load_from_memory(jpeg).map_err(|e| EffectError::Decode {
        details: e.to_string(),
    })?;

    // Bound worst-case CPU cost before any per-pixel work
    let (width, height) = decoded.dimensions();
    if width > max_dimension || height > max_dimension {
        decoded = decoded.resize(max_dimension, max_dimension, FilterType::Triangle);
    }

    let img = decoded.to_rgb8();
    let transformed = apply(kind, params, img);

    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode_image(&transformed)
        .map_err(|e| EffectError::Encode {
            details: e.to_string(),
        })?;

    Ok(buf)
}

/// Apply one effect to a decoded image
pub fn apply(kind: EffectKind, params: EffectParams, img: RgbImage) -> RgbImage {
    let intensity = params.intensity.clamp(0.0, 1.0);
    match kind {
        EffectKind::None => img,
        EffectKind::Grayscale => grayscale(&img, intensity),
        EffectKind::Sepia => sepia(&img, intensity),
        EffectKind::Invert => invert(&img, intensity),
        EffectKind::Vignette => vignette(&img, intensity),
        EffectKind::Blur => blur(&img, intensity),
        EffectKind::Pixelate => pixelate(&img, block_size(params)),
        EffectKind::Fisheye => fisheye(&img, intensity, params.radius),
        EffectKind::Portrait => portrait(&img, intensity),
    }
}

/// Pixelate block edge: explicit parameter wins, otherwise derived from
/// intensity the same way the live-preview slider maps it
fn block_size(params: EffectParams) -> u32 {
    if params.pixel_size >= 2 {
        params.pixel_size.min(64)
    } else {
        ((params.intensity.clamp(0.0, 1.0) * 20.0) as u32).clamp(2, 20)
    }
}

fn blend(original: u8, target: u8, intensity: f32) -> u8 {
    let mixed = original as f32 * (1.0 - intensity) + target as f32 * intensity;
    mixed.round().clamp(0.0, 255.0) as u8
}

fn grayscale(img: &RgbImage, intensity: f32) -> RgbImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let [r, g, b] = pixel.0;
        // Integer luminance weights summing to 256
        let gray = ((r as u32 * 77 + g as u32 * 150 + b as u32 * 29) >> 8) as u8;
        pixel.0 = [
            blend(r, gray, intensity),
            blend(g, gray, intensity),
            blend(b, gray, intensity),
        ];
    }
    out
}

fn sepia(img: &RgbImage, intensity: f32) -> RgbImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let [r, g, b] = pixel.0;
        let (r32, g32, b32) = (r as u32, g as u32, b as u32);
        let tr = ((r32 * 393 + g32 * 769 + b32 * 189) >> 10).min(255) as u8;
        let tg = ((r32 * 349 + g32 * 686 + b32 * 168) >> 10).min(255) as u8;
        let tb = ((r32 * 272 + g32 * 534 + b32 * 131) >> 10).min(255) as u8;
        pixel.0 = [
            blend(r, tr, intensity),
            blend(g, tg, intensity),
            blend(b, tb, intensity),
        ];
    }
    out
}

fn invert(img: &RgbImage, intensity: f32) -> RgbImage {
    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let [r, g, b] = pixel.0;
        pixel.0 = [
            blend(r, 255 - r, intensity),
            blend(g, 255 - g, intensity),
            blend(b, 255 - b, intensity),
        ];
    }
    out
}

/// Radial attenuation from image center; full strength darkens the corner
/// farthest from center to black
fn vignette(img: &RgbImage, intensity: f32) -> RgbImage {
    let (width, height) = img.dimensions();
    let cx = width as f32 * 0.5;
    let cy = height as f32 * 0.5;
    let max_dist = (cx * cx + cy * cy).sqrt();
    let strength = intensity * 2.0;

    let mut out = img.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let dist = (dx * dx + dy * dy).sqrt();
        let factor = (1.0 - (dist / max_dist) * strength).max(0.0);

        let [r, g, b] = pixel.0;
        pixel.0 = [
            (r as f32 * factor).round() as u8,
            (g as f32 * factor).round() as u8,
            (b as f32 * factor).round() as u8,
        ];
    }
    out
}

/// Separable box blur with a small radius derived from intensity. The
/// vertical pass only runs above the mid-intensity threshold to bound cost.
fn blur(img: &RgbImage, intensity: f32) -> RgbImage {
    let radius = ((intensity * 3.0) as i32).clamp(1, 3);
    let horizontal = box_pass(img, radius, true);
    if intensity < 0.5 {
        return horizontal;
    }
    box_pass(&horizontal, radius, false)
}

fn box_pass(img: &RgbImage, radius: i32, horizontal: bool) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut out = RgbImage::new(width, height);

    for y in 0..height {
        for x in 0..width {
            let mut sum = [0u32; 3];
            let mut count = 0u32;

            for k in -radius..=radius {
                let (nx, ny) = if horizontal {
                    (x as i32 + k, y as i32)
                } else {
                    (x as i32, y as i32 + k)
                };
                if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                    continue;
                }
                let p = img.get_pixel(nx as u32, ny as u32);
                sum[0] += p.0[0] as u32;
                sum[1] += p.0[1] as u32;
                sum[2] += p.0[2] as u32;
                count += 1;
            }

            out.put_pixel(
                x,
                y,
                Rgb([
                    ((sum[0] + count / 2) / count) as u8,
                    ((sum[1] + count / 2) / count) as u8,
                    ((sum[2] + count / 2) / count) as u8,
                ]),
            );
        }
    }
    out
}

/// Block averaging: each block is replaced by its mean color
fn pixelate(img: &RgbImage, block: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let mut out = RgbImage::new(width, height);

    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let bw = block.min(width - x);
            let bh = block.min(height - y);

            let mut sum = [0u32; 3];
            for dy in 0..bh {
                for dx in 0..bw {
                    let p = img.get_pixel(x + dx, y + dy);
                    sum[0] += p.0[0] as u32;
                    sum[1] += p.0[1] as u32;
                    sum[2] += p.0[2] as u32;
                }
            }

            let count = bw * bh;
            let avg = Rgb([
                ((sum[0] + count / 2) / count) as u8,
                ((sum[1] + count / 2) / count) as u8,
                ((sum[2] + count / 2) / count) as u8,
            ]);

            for dy in 0..bh {
                for dx in 0..bw {
                    out.put_pixel(x + dx, y + dy, avg);
                }
            }
            x += block;
        }
        y += block;
    }
    out
}

/// Barrel-distortion remap with bilinear sampling. Pixels outside the
/// bounding radius are copied untouched.
fn fisheye(img: &RgbImage, intensity: f32, radius_param: f32) -> RgbImage {
    let (width, height) = img.dimensions();
    let cx = width as f32 * 0.5;
    let cy = height as f32 * 0.5;
    let bound = cx.min(cy) * 0.9 * radius_param.clamp(0.1, 1.0);
    let strength = intensity * 0.5;

    let mut out = img.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist > bound || dist == 0.0 {
            continue;
        }

        // Barrel mapping r' = r(1 + k*r^2) on the normalized radius
        let r = dist / bound;
        let scale = 1.0 + strength * r * r;

        let src_x = (cx + dx * scale).clamp(0.0, (width - 1) as f32);
        let src_y = (cy + dy * scale).clamp(0.0, (height - 1) as f32);

        *pixel = bilinear(img, src_x, src_y);
    }
    out
}

fn bilinear(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();
    let x1 = x.floor() as u32;
    let y1 = y.floor() as u32;
    let x2 = (x1 + 1).min(width - 1);
    let y2 = (y1 + 1).min(height - 1);
    let fx = x - x1 as f32;
    let fy = y - y1 as f32;

    let p11 = img.get_pixel(x1, y1);
    let p21 = img.get_pixel(x2, y1);
    let p12 = img.get_pixel(x1, y2);
    let p22 = img.get_pixel(x2, y2);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p11.0[c] as f32 * (1.0 - fx) + p21.0[c] as f32 * fx;
        let bottom = p12.0[c] as f32 * (1.0 - fx) + p22.0[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Subject-isolation variant: pixels outside a soft centered ellipse are
/// desaturated and darkened, leaving the subject region untouched.
fn portrait(img: &RgbImage, intensity: f32) -> RgbImage {
    let (width, height) = img.dimensions();
    let cx = width as f32 * 0.5;
    let cy = height as f32 * 0.5;
    let semi_x = width as f32 * 0.35;
    let semi_y = height as f32 * 0.45;

    let mut out = img.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let ex = (x as f32 - cx) / semi_x;
        let ey = (y as f32 - cy) / semi_y;
        let e = ex * ex + ey * ey;
        if e <= 1.0 {
            continue;
        }

        // Soft edge over the band just outside the ellipse
        let t = ((e - 1.0) / 0.35).clamp(0.0, 1.0) * intensity;
        let [r, g, b] = pixel.0;
        let gray = ((r as u32 * 77 + g as u32 * 150 + b as u32 * 29) >> 8) as f32;
        let target = (gray * 0.4).round().clamp(0.0, 255.0) as u8;
        pixel.0 = [blend(r, target, t), blend(g, target, t), blend(b, target, t)];
    }
    out
}
