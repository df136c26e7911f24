//! Content-addressed on-disk cache for post images.
//!
//! Assets are keyed by the trailing segment of their source URL and stored
//! transcoded to JPEG at a fixed quality, so the render side reads one
//! predictable format regardless of what the server hosts. Writes go
//! through temp-file-then-rename: a concurrent reader sees the old asset or
//! the new one, never a torn file.

use std::path::PathBuf;
use thiserror::Error;

use image::codecs::jpeg::JpegEncoder;

/// Quality used when re-encoding downloaded images.
const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Error)]
pub enum AssetError {
    /// Key would escape the store directory or is empty.
    #[error("invalid asset key: {0:?}")]
    InvalidKey(String),

    #[error("failed to decode image payload: {0}")]
    Decode(image::ImageError),

    #[error("failed to encode image: {0}")]
    Encode(image::ImageError),

    #[error("asset store I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Directory of individually named asset files.
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path an asset with `key` would live at.
    pub fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Stores an image under `key`, transcoded to JPEG at quality 90.
    ///
    /// Creates the backing directory on first use (idempotent). Re-putting
    /// an existing key replaces the stored asset wholesale.
    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<(), AssetError> {
        validate_key(key)?;
        std::fs::create_dir_all(&self.root)?;

        let img = image::load_from_memory(bytes).map_err(AssetError::Decode)?;
        // JPEG has no alpha channel; flatten before encoding.
        let rgb = img.into_rgb8();

        let mut encoded = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY);
        rgb.write_with_encoder(encoder).map_err(AssetError::Encode)?;

        super::atomic_write(&self.path(key), &encoded)?;
        tracing::debug!(key = %key, bytes = encoded.len(), "Cached asset");
        Ok(())
    }

    /// Reads a cached asset. A missing key is `Ok(None)`, not an error.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AssetError> {
        if validate_key(key).is_err() {
            // An invalid key can never have been stored.
            return Ok(None);
        }
        match std::fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AssetError::Io(e)),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        validate_key(key).is_ok() && self.path(key).is_file()
    }
}

fn validate_key(key: &str) -> Result<(), AssetError> {
    if key.is_empty()
        || key == "."
        || key == ".."
        || key.contains('/')
        || key.contains('\\')
    {
        return Err(AssetError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store(name: &str) -> AssetStore {
        let dir = std::env::temp_dir().join(format!("vigil_asset_store_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        AssetStore::open(dir)
    }

    /// A tiny valid PNG, built in memory, to feed through the transcoder.
    fn sample_png() -> Vec<u8> {
        let img = image::RgbImage::from_fn(4, 4, |x, y| {
            image::Rgb([(x * 60) as u8, (y * 60) as u8, 128])
        });
        let mut out = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn put_creates_directory_and_get_returns_jpeg() {
        let store = test_store("put_get");

        assert_eq!(store.get("a.jpg").unwrap(), None);
        store.put("a.jpg", &sample_png()).unwrap();

        let cached = store.get("a.jpg").unwrap().expect("asset should exist");
        let format = image::guess_format(&cached).unwrap();
        assert_eq!(format, image::ImageFormat::Jpeg);
    }

    #[test]
    fn double_put_leaves_a_decodable_asset() {
        let store = test_store("double_put");
        let png = sample_png();

        store.put("a.jpg", &png).unwrap();
        store.put("a.jpg", &png).unwrap();

        let cached = store.get("a.jpg").unwrap().unwrap();
        image::load_from_memory(&cached).expect("stored asset should decode");
    }

    #[test]
    fn missing_key_is_absent_not_error() {
        let store = test_store("missing");
        assert!(store.get("nope.jpg").unwrap().is_none());
        assert!(!store.contains("nope.jpg"));
    }

    #[test]
    fn garbage_payload_is_a_decode_error() {
        let store = test_store("garbage");
        let err = store.put("bad.jpg", b"not an image").unwrap_err();
        assert!(matches!(err, AssetError::Decode(_)));
        assert_eq!(store.get("bad.jpg").unwrap(), None);
    }

    #[test]
    fn traversal_keys_are_rejected() {
        let store = test_store("traversal");
        for key in ["../evil.jpg", "a/b.jpg", "", ".."] {
            assert!(
                matches!(store.put(key, &sample_png()), Err(AssetError::InvalidKey(_))),
                "key {key:?} should be rejected"
            );
            assert_eq!(store.get(key).unwrap(), None);
        }
    }
}
