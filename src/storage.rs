use crate::camera::simulate;
use crate::error::{CameraError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Metadata for one stored capture
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedImage {
    pub filename: String,
    pub path: String,
    pub size_bytes: u64,
    pub timestamp: u64,
}

/// Entry in the photo listing endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoEntry {
    pub filename: String,
    pub path: String,
    pub timestamp: u64,
}

/// Flat-file store for captured photos.
///
/// Filenames follow the `photo_<millis>.jpg` convention; the listing
/// endpoint derives timestamps from the name rather than filesystem
/// metadata, matching what collaborators display.
pub struct CaptureStore {
    dir: PathBuf,
}

impl CaptureStore {
    /// Open the store, creating the uploads directory if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        info!("Capture store ready at {}", dir.display());
        Ok(Self { dir })
    }

    /// Directory the store writes into
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Filename for a capture stamped at `timestamp_ms`
    pub fn capture_filename(timestamp_ms: u64) -> String {
        format!("photo_{}.jpg", timestamp_ms)
    }

    /// Parse the millisecond timestamp out of a `photo_<ts>.jpg` filename
    pub fn parse_timestamp(filename: &str) -> Option<u64> {
        let stem = filename
            .strip_suffix(".jpg")
            .or_else(|| filename.strip_suffix(".jpeg"))
            .or_else(|| filename.strip_suffix(".JPG"))?;
        let ts = stem.strip_prefix("photo_")?;
        // Capture utilities may append counters: photo_123_1.jpg
        let ts = ts.split('_').next()?;
        ts.parse().ok()
    }

    /// List stored photos, newest first
    pub async fn list(&self) -> Result<Vec<PhotoEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let lower = name.to_ascii_lowercase();
            if !lower.ends_with(".jpg") && !lower.ends_with(".jpeg") {
                continue;
            }
            entries.push(PhotoEntry {
                path: format!("/uploads/{}", name),
                timestamp: Self::parse_timestamp(&name).unwrap_or(0),
                filename: name,
            });
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// Delete one photo by filename.
    ///
    /// Filenames containing path separators or parent references are
    /// rejected so the endpoint cannot escape the uploads directory.
    pub async fn delete(&self, filename: &str) -> Result<()> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            warn!("Rejected delete of suspicious filename: {}", filename);
            return Err(CameraError::CaptureFailed {
                details: format!("invalid filename: {}", filename),
            }
            .into());
        }

        let path = self.dir.join(filename);
        tokio::fs::remove_file(&path).await?;
        info!("Deleted photo {}", filename);
        Ok(())
    }

    /// Find the capture file produced for `timestamp_ms`.
    ///
    /// The capture utility may adjust the final filename, so the directory
    /// is scanned for any JPEG whose name contains the timestamp.
    pub async fn find_by_timestamp(&self, timestamp_ms: u64) -> Result<CapturedImage> {
        let needle = timestamp_ms.to_string();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let lower = name.to_ascii_lowercase();
            if !lower.ends_with(".jpg") && !lower.ends_with(".jpeg") {
                continue;
            }
            if !name.contains(&needle) {
                continue;
            }

            let meta = entry.metadata().await?;
            debug!("Capture file found: {} ({} bytes)", name, meta.len());
            return Ok(CapturedImage {
                path: format!("/uploads/{}", name),
                size_bytes: meta.len(),
                timestamp: timestamp_ms,
                filename: name,
            });
        }

        Err(CameraError::CaptureFailed {
            details: format!("no capture file matching timestamp {}", timestamp_ms),
        }
        .into())
    }

    /// Write a synthetic capture for simulation mode
    pub async fn write_simulated(
        &self,
        timestamp_ms: u64,
        resolution: (u32, u32),
    ) -> Result<CapturedImage> {
        let filename = Self::capture_filename(timestamp_ms);
        let jpeg = simulate::render_capture(resolution.0, resolution.1, timestamp_ms)?;
        let size_bytes = jpeg.len() as u64;

        tokio::fs::write(self.dir.join(&filename), jpeg).await?;
        info!("Wrote simulated capture {}", filename);

        Ok(CapturedImage {
            path: format!("/uploads/{}", filename),
            size_bytes,
            timestamp: timestamp_ms,
            filename,
        })
    }

    /// Read a stored photo into memory
    pub async fn read(&self, filename: &str) -> Result<Vec<u8>> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return Err(CameraError::CaptureFailed {
                details: format!("invalid filename: {}", filename),
            }
            .into());
        }
        Ok(tokio::fs::read(self.dir.join(filename)).await?)
    }

    /// Write a processed sibling next to an existing photo
    pub async fn write_processed(&self, source_filename: &str, jpeg: &[u8]) -> Result<String> {
        let stem = source_filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(source_filename);
        let filename = format!("{}_fx.jpg", stem);
        tokio::fs::write(self.dir.join(&filename), jpeg).await?;
        info!("Wrote processed photo {}", filename);
        Ok(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_timestamp_parsing() {
        assert_eq!(CaptureStore::parse_timestamp("photo_1700000000123.jpg"), Some(1700000000123));
        assert_eq!(CaptureStore::parse_timestamp("photo_42_1.jpg"), Some(42));
        assert_eq!(CaptureStore::parse_timestamp("photo_99.jpeg"), Some(99));
        assert_eq!(CaptureStore::parse_timestamp("selfie.jpg"), None);
        assert_eq!(CaptureStore::parse_timestamp("photo_abc.jpg"), None);
    }

    #[tokio::test]
    async fn test_list_sorted_newest_first() {
        let tmp = TempDir::new().unwrap();
        let store = CaptureStore::new(tmp.path()).unwrap();

        for ts in [300u64, 100, 200] {
            tokio::fs::write(tmp.path().join(CaptureStore::capture_filename(ts)), b"x")
                .await
                .unwrap();
        }
        tokio::fs::write(tmp.path().join("notes.txt"), b"ignored")
            .await
            .unwrap();

        let photos = store.list().await.unwrap();
        assert_eq!(photos.len(), 3);
        assert_eq!(photos[0].timestamp, 300);
        assert_eq!(photos[1].timestamp, 200);
        assert_eq!(photos[2].timestamp, 100);
        assert_eq!(photos[0].path, "/uploads/photo_300.jpg");
    }

    #[tokio::test]
    async fn test_delete_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        let store = CaptureStore::new(tmp.path()).unwrap();

        assert!(store.delete("../etc/passwd").await.is_err());
        assert!(store.delete("a/b.jpg").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let tmp = TempDir::new().unwrap();
        let store = CaptureStore::new(tmp.path()).unwrap();

        let path = tmp.path().join("photo_1.jpg");
        tokio::fs::write(&path, b"x").await.unwrap();
        store.delete("photo_1.jpg").await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_find_by_timestamp() {
        let tmp = TempDir::new().unwrap();
        let store = CaptureStore::new(tmp.path()).unwrap();

        tokio::fs::write(tmp.path().join("photo_555.jpg"), b"abcd")
            .await
            .unwrap();

        let found = store.find_by_timestamp(555).await.unwrap();
        assert_eq!(found.filename, "photo_555.jpg");
        assert_eq!(found.size_bytes, 4);

        assert!(store.find_by_timestamp(556).await.is_err());
    }

    #[tokio::test]
    async fn test_write_simulated_capture() {
        let tmp = TempDir::new().unwrap();
        let store = CaptureStore::new(tmp.path()).unwrap();

        let captured = store.write_simulated(777, (160, 120)).await.unwrap();
        assert_eq!(captured.filename, "photo_777.jpg");
        assert!(captured.size_bytes > 0);

        let bytes = store.read(&captured.filename).await.unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[tokio::test]
    async fn test_write_processed_sibling() {
        let tmp = TempDir::new().unwrap();
        let store = CaptureStore::new(tmp.path()).unwrap();

        let name = store.write_processed("photo_9.jpg", b"data").await.unwrap();
        assert_eq!(name, "photo_9_fx.jpg");
        assert!(tmp.path().join("photo_9_fx.jpg").exists());
    }
}
