//! Image blobs
//!
//! Cover images are fetched, flattened to RGB, shrunk to fit the configured
//! bounds and re-encoded as base64 JPEG. A failure anywhere leaves the blob
//! empty; the record is still built.

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use thiserror::Error;

use crate::config::ImageSettings;
use crate::error::FetchError;

const JPEG_QUALITY: u8 = 85;

/// Source of raw image bytes
pub trait ImageFetcher {
    fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("image is empty")]
    Empty,

    #[error("image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: u64 },

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Re-encode raw image bytes as a base64 JPEG within the size bounds
pub fn encode_blob(bytes: &[u8], settings: &ImageSettings) -> Result<String, BlobError> {
    if bytes.is_empty() {
        return Err(BlobError::Empty);
    }
    if bytes.len() as u64 > settings.max_bytes {
        return Err(BlobError::TooLarge {
            size: bytes.len(),
            limit: settings.max_bytes,
        });
    }

    let decoded = image::load_from_memory(bytes)?;
    let mut img = DynamicImage::ImageRgb8(decoded.to_rgb8());
    if img.width() > settings.max_width || img.height() > settings.max_height {
        img = img.thumbnail(settings.max_width, settings.max_height);
    }

    let rgb = img.to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&rgb)?;

    Ok(base64::engine::general_purpose::STANDARD.encode(&jpeg))
}

/// Fetch `url` and encode it, `None` (logged) on any failure
pub fn fetch_blob(fetcher: &dyn ImageFetcher, url: &str, settings: &ImageSettings) -> Option<String> {
    if url.is_empty() {
        return None;
    }

    let result = fetcher
        .fetch_image(url)
        .map_err(BlobError::from)
        .and_then(|bytes| encode_blob(&bytes, settings));

    match result {
        Ok(blob) => Some(blob),
        Err(e) => {
            log::warn!("Could not build image blob for '{}': {}", url, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbaImage};
    use std::cell::Cell;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba([200, 30, 30, 128]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn decode(blob: &str) -> DynamicImage {
        let jpeg = base64::engine::general_purpose::STANDARD.decode(blob).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
        image::load_from_memory(&jpeg).unwrap()
    }

    struct StubFetcher {
        bytes: Option<Vec<u8>>,
        calls: Cell<usize>,
    }

    impl ImageFetcher for StubFetcher {
        fn fetch_image(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.set(self.calls.get() + 1);
            self.bytes.clone().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    #[test]
    fn test_large_images_are_downscaled() {
        let blob = encode_blob(&png(3840, 1080), &ImageSettings::default()).unwrap();
        let img = decode(&blob);
        assert_eq!((img.width(), img.height()), (1920, 540));
    }

    #[test]
    fn test_small_images_keep_their_size() {
        let blob = encode_blob(&png(64, 48), &ImageSettings::default()).unwrap();
        let img = decode(&blob);
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[test]
    fn test_failures_leave_blob_empty() {
        assert!(matches!(
            encode_blob(b"not an image", &ImageSettings::default()),
            Err(BlobError::Image(_))
        ));
        assert!(matches!(
            encode_blob(&[], &ImageSettings::default()),
            Err(BlobError::Empty)
        ));

        let tiny_limit = ImageSettings {
            max_bytes: 10,
            ..Default::default()
        };
        assert!(matches!(
            encode_blob(&png(8, 8), &tiny_limit),
            Err(BlobError::TooLarge { .. })
        ));

        let missing = StubFetcher {
            bytes: None,
            calls: Cell::new(0),
        };
        assert_eq!(
            fetch_blob(&missing, "https://cdn.example.com/a.jpg", &ImageSettings::default()),
            None
        );
        assert_eq!(missing.calls.get(), 1);
    }

    #[test]
    fn test_fetch_blob() {
        let fetcher = StubFetcher {
            bytes: Some(png(10, 10)),
            calls: Cell::new(0),
        };
        let settings = ImageSettings::default();
        assert!(fetch_blob(&fetcher, "https://cdn.example.com/a.png", &settings).is_some());
        assert_eq!(fetch_blob(&fetcher, "", &settings), None);
        assert_eq!(fetcher.calls.get(), 1);
    }
}
