use super::{EffectKind, EffectParams};
use bytes::Bytes;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Stable fingerprint of a source image's bytes, used to key cached results
/// by source identity.
pub fn fingerprint(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// Cache key: effect id, source dimensions, quantized parameters and source
/// identity. Parameters are quantized to milli-units so float noise cannot
/// split otherwise-identical requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EffectCacheKey {
    kind: EffectKind,
    width: u32,
    height: u32,
    intensity_milli: u32,
    radius_milli: u32,
    pixel_size: u32,
    source_fingerprint: u64,
}

impl EffectCacheKey {
    pub fn new(
        kind: EffectKind,
        params: EffectParams,
        width: u32,
        height: u32,
        source_fingerprint: u64,
    ) -> Self {
        Self {
            kind,
            width,
            height,
            intensity_milli: (params.intensity.clamp(0.0, 1.0) * 1000.0).round() as u32,
            radius_milli: (params.radius.max(0.0) * 1000.0).round() as u32,
            pixel_size: params.pixel_size,
            source_fingerprint,
        }
    }
}

struct CacheEntry {
    data: Bytes,
    last_used: u64,
}

/// Bounded key→value store for processed images with least-recently-used
/// eviction. Entries are only ever invalidated by capacity pressure.
pub struct EffectCache {
    entries: HashMap<EffectCacheKey, CacheEntry>,
    capacity: usize,
    tick: u64,
}

impl EffectCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            tick: 0,
        }
    }

    /// Look up a processed result, marking it most-recently-used on a hit
    pub fn get(&mut self, key: &EffectCacheKey) -> Option<Bytes> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(key).map(|entry| {
            entry.last_used = tick;
            entry.data.clone()
        })
    }

    /// Insert a processed result, evicting the least-recently-used entry
    /// when at capacity
    pub fn insert(&mut self, key: EffectCacheKey, data: Bytes) {
        self.tick += 1;

        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone())
            {
                self.entries.remove(&oldest);
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                data,
                last_used: self.tick,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
