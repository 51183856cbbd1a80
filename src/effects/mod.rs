mod cache;
pub mod ops;
#[cfg(test)]
mod tests;

pub use cache::{fingerprint, EffectCache, EffectCacheKey};

use crate::config::EffectsConfig;
use crate::error::{EffectError, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Closed set of supported pixel effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    None,
    Grayscale,
    Sepia,
    Invert,
    Vignette,
    Blur,
    Pixelate,
    Fisheye,
    /// Subject-isolation variant of the effect set
    Portrait,
}

/// Effect parameters; a value type that fully defines the transform
/// together with its [`EffectKind`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectParams {
    /// Strength of the effect, 0.0 to 1.0
    #[serde(default = "default_intensity")]
    pub intensity: f32,
    /// Bounding radius scale for fisheye
    #[serde(default = "default_radius")]
    pub radius: f32,
    /// Explicit pixelate block edge; 0 derives the block from intensity
    #[serde(default)]
    pub pixel_size: u32,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            intensity: default_intensity(),
            radius: default_radius(),
            pixel_size: 0,
        }
    }
}

fn default_intensity() -> f32 {
    0.5
}
fn default_radius() -> f32 {
    1.0
}

/// Applies pixel effects to JPEG images with bounded worker offload, LRU
/// result caching and a synchronous fallback.
///
/// The offloaded and synchronous paths share one pure transform function,
/// so for identical inputs they produce bit-identical output; the fallback
/// is a correctness guarantee, not an approximation.
pub struct EffectsPipeline {
    config: EffectsConfig,
    cache: Mutex<EffectCache>,
    workers: Arc<Semaphore>,
    active: Mutex<(EffectKind, EffectParams)>,
}

impl EffectsPipeline {
    pub fn new(config: EffectsConfig) -> Self {
        let cache = Mutex::new(EffectCache::new(config.cache_capacity));
        let workers = Arc::new(Semaphore::new(config.worker_permits.max(1)));
        Self {
            config,
            cache,
            workers,
            active: Mutex::new((EffectKind::None, EffectParams::default())),
        }
    }

    /// The effect currently selected for the live stream
    pub fn active(&self) -> (EffectKind, EffectParams) {
        *self.active.lock()
    }

    /// Select the live-stream effect
    pub fn set_active(&self, kind: EffectKind, params: EffectParams) {
        *self.active.lock() = (kind, params);
    }

    /// Transform an image on a background worker, consulting the cache
    /// first. Falls back to in-place processing when the worker cannot run.
    pub async fn apply(&self, kind: EffectKind, params: EffectParams, jpeg: Bytes) -> Result<Bytes> {
        if kind == EffectKind::None {
            return Ok(jpeg);
        }

        let key = self.cache_key(kind, params, &jpeg)?;
        if let Some(hit) = self.cache.lock().get(&key) {
            debug!("Effect cache hit for {:?}", kind);
            return Ok(hit);
        }

        let max_dimension = self.config.preview_max_dimension;
        let quality = self.config.jpeg_quality;

        let processed = match self.workers.clone().acquire_owned().await {
            Ok(_permit) => {
                let job = jpeg.clone();
                let worker = tokio::task::spawn_blocking(move || {
                    ops::process(kind, params, &job, max_dimension, quality)
                });
                match worker.await {
                    Ok(result) => result,
                    Err(join_error) => {
                        warn!(
                            "Effect worker for {:?} failed ({}), falling back to synchronous processing",
                            kind, join_error
                        );
                        ops::process(kind, params, &jpeg, max_dimension, quality)
                    }
                }
            }
            // Semaphore closed: offloading unavailable, process in place
            Err(_) => ops::process(kind, params, &jpeg, max_dimension, quality),
        }
        .map_err(|e| EffectError::ProcessingFailed {
            details: e.to_string(),
        })?;

        let out = Bytes::from(processed);
        self.cache.lock().insert(key, out.clone());
        Ok(out)
    }

    /// Synchronous transform on the calling thread. Shares the transform
    /// function and the cache with [`EffectsPipeline::apply`].
    pub fn apply_sync(&self, kind: EffectKind, params: EffectParams, jpeg: &[u8]) -> Result<Bytes> {
        if kind == EffectKind::None {
            return Ok(Bytes::copy_from_slice(jpeg));
        }

        let key = self.cache_key(kind, params, jpeg)?;
        if let Some(hit) = self.cache.lock().get(&key) {
            debug!("Effect cache hit for {:?}", kind);
            return Ok(hit);
        }

        let processed = ops::process(
            kind,
            params,
            jpeg,
            self.config.preview_max_dimension,
            self.config.jpeg_quality,
        )?;

        let out = Bytes::from(processed);
        self.cache.lock().insert(key, out.clone());
        Ok(out)
    }

    /// Number of cached results
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    fn cache_key(
        &self,
        kind: EffectKind,
        params: EffectParams,
        jpeg: &[u8],
    ) -> Result<EffectCacheKey> {
        let (width, height) = ops::dimensions(jpeg)?;
        Ok(EffectCacheKey::new(
            kind,
            params,
            width,
            height,
            fingerprint(jpeg),
        ))
    }
}
