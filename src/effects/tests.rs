use super::*;
use crate::config::EffectsConfig;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

fn test_jpeg(width: u32, height: u32) -> Bytes {
    let mut img = RgbImage::new(width, height);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = Rgb([(x * 5 % 256) as u8, (y * 7 % 256) as u8, 128]);
    }
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, 90);
    encoder.encode_image(&img).unwrap();
    Bytes::from(buf)
}

fn pipeline() -> EffectsPipeline {
    EffectsPipeline::new(EffectsConfig::default())
}

#[tokio::test]
async fn test_none_effect_passes_through() {
    let pipeline = pipeline();
    let jpeg = test_jpeg(32, 32);

    let out = pipeline
        .apply(EffectKind::None, EffectParams::default(), jpeg.clone())
        .await
        .unwrap();
    assert_eq!(out, jpeg);
    assert_eq!(pipeline.cache_len(), 0);
}

#[tokio::test]
async fn test_second_identical_call_hits_cache() {
    let pipeline = pipeline();
    let jpeg = test_jpeg(48, 48);
    let params = EffectParams::default();

    let first = pipeline
        .apply(EffectKind::Grayscale, params, jpeg.clone())
        .await
        .unwrap();
    assert_eq!(pipeline.cache_len(), 1);

    let second = pipeline
        .apply(EffectKind::Grayscale, params, jpeg)
        .await
        .unwrap();
    assert_eq!(pipeline.cache_len(), 1);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_worker_and_sync_paths_are_bit_identical() {
    let jpeg = test_jpeg(40, 30);
    let params = EffectParams {
        intensity: 0.8,
        ..EffectParams::default()
    };

    // Separate pipelines so the second call cannot be a cache hit
    let offloaded = pipeline()
        .apply(EffectKind::Vignette, params, jpeg.clone())
        .await
        .unwrap();
    let synchronous = pipeline()
        .apply_sync(EffectKind::Vignette, params, &jpeg)
        .unwrap();

    assert_eq!(offloaded, synchronous);
}

#[tokio::test]
async fn test_different_params_do_not_share_cache_entries() {
    let pipeline = pipeline();
    let jpeg = test_jpeg(32, 32);

    let low = pipeline
        .apply(
            EffectKind::Vignette,
            EffectParams {
                intensity: 0.1,
                ..EffectParams::default()
            },
            jpeg.clone(),
        )
        .await
        .unwrap();
    let high = pipeline
        .apply(
            EffectKind::Vignette,
            EffectParams {
                intensity: 1.0,
                ..EffectParams::default()
            },
            jpeg,
        )
        .await
        .unwrap();

    assert_eq!(pipeline.cache_len(), 2);
    assert_ne!(low, high);
}

#[tokio::test]
async fn test_cache_capacity_bounds_entries() {
    let config = EffectsConfig {
        cache_capacity: 2,
        ..EffectsConfig::default()
    };
    let pipeline = EffectsPipeline::new(config);

    for kind in [EffectKind::Grayscale, EffectKind::Sepia, EffectKind::Invert] {
        pipeline
            .apply(kind, EffectParams::default(), test_jpeg(24, 24))
            .await
            .unwrap();
    }
    assert_eq!(pipeline.cache_len(), 2);
}

#[tokio::test]
async fn test_garbage_input_surfaces_processing_error() {
    let pipeline = pipeline();
    let result = pipeline
        .apply(
            EffectKind::Grayscale,
            EffectParams::default(),
            Bytes::from_static(b"definitely not a jpeg"),
        )
        .await;
    assert!(result.is_err());
}

#[test]
fn test_active_effect_state() {
    let pipeline = pipeline();
    assert_eq!(pipeline.active().0, EffectKind::None);

    let params = EffectParams {
        intensity: 0.9,
        ..EffectParams::default()
    };
    pipeline.set_active(EffectKind::Fisheye, params);

    let (kind, active_params) = pipeline.active();
    assert_eq!(kind, EffectKind::Fisheye);
    assert!((active_params.intensity - 0.9).abs() < f32::EPSILON);
}

#[test]
fn test_effect_kind_wire_names() {
    assert_eq!(
        serde_json::to_string(&EffectKind::Grayscale).unwrap(),
        "\"grayscale\""
    );
    let kind: EffectKind = serde_json::from_str("\"fisheye\"").unwrap();
    assert_eq!(kind, EffectKind::Fisheye);
}

#[tokio::test]
async fn test_oversized_image_is_downscaled() {
    let config = EffectsConfig {
        preview_max_dimension: 32,
        ..EffectsConfig::default()
    };
    let pipeline = EffectsPipeline::new(config);

    let out = pipeline
        .apply(EffectKind::Grayscale, EffectParams::default(), test_jpeg(64, 48))
        .await
        .unwrap();
    assert_eq!(ops::dimensions(&out).unwrap(), (32, 24));
}
