//! Image loading and payload encoding.
//!
//! Loading enforces the upload size cap *before* any decode work so an
//! oversized file can never cost a decode pass or touch session state.
//! Encoding is always lossless PNG; payloads destined for the annotation
//! server are wrapped as `data:image/png;base64,` URLs.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageError, RgbaImage};
use rfd::FileDialog;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Maximum supported image dimension in pixels (per axis).
/// Prevents memory exhaustion from crafted files.
pub const MAX_IMAGE_DIM: u32 = 16_384;

/// Prefix every server payload starts with.
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// File extensions offered in the open dialog (the formats the `image`
/// crate is compiled with here).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif"];

/// Error type for image load/encode operations.
#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    /// File or body exceeds the configured upload cap. Carries (actual, cap).
    TooLarge(u64, u64),
    Decode(String),
    /// Decoded dimensions exceed [`MAX_IMAGE_DIM`].
    Oversized(u32, u32),
    BadPayload(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "I/O error: {}", e),
            LoadError::TooLarge(size, cap) => write!(
                f,
                "file is {:.1} MB, limit is {:.1} MB",
                megabytes(*size),
                megabytes(*cap)
            ),
            LoadError::Decode(e) => write!(f, "could not decode image: {}", e),
            LoadError::Oversized(w, h) => write!(
                f,
                "image is {}x{}, larger than the supported {}x{}",
                w, h, MAX_IMAGE_DIM, MAX_IMAGE_DIM
            ),
            LoadError::BadPayload(e) => write!(f, "bad image payload: {}", e),
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<ImageError> for LoadError {
    fn from(e: ImageError) -> Self {
        LoadError::Decode(e.to_string())
    }
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

// ============================================================================
// LOADING
// ============================================================================

/// Load an image file, rejecting anything over `max_bytes` before reading
/// or decoding it.  The metadata check runs first so an oversized file costs
/// one `stat`, not a full read.
pub fn load_image_file(path: &Path, max_bytes: u64) -> Result<RgbaImage, LoadError> {
    let size = std::fs::metadata(path)?.len();
    if size > max_bytes {
        return Err(LoadError::TooLarge(size, max_bytes));
    }
    let bytes = std::fs::read(path)?;
    decode_image_bytes(&bytes, max_bytes)
}

/// Decode raw image bytes (any compiled-in format), enforcing the size cap
/// on the byte length before the decoder sees the data.
pub fn decode_image_bytes(bytes: &[u8], max_bytes: u64) -> Result<RgbaImage, LoadError> {
    if bytes.len() as u64 > max_bytes {
        return Err(LoadError::TooLarge(bytes.len() as u64, max_bytes));
    }
    let img = image::load_from_memory(bytes)?.to_rgba8();
    if img.width() > MAX_IMAGE_DIM || img.height() > MAX_IMAGE_DIM {
        return Err(LoadError::Oversized(img.width(), img.height()));
    }
    Ok(img)
}

/// Show the native open dialog for the supported image formats.
pub fn pick_image_path() -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("Images", IMAGE_EXTENSIONS)
        .add_filter("All Files", &["*"])
        .pick_file()
}

/// Show the native save dialog for a PNG export.
pub fn pick_export_path(default_name: &str) -> Option<PathBuf> {
    FileDialog::new()
        .add_filter("PNG", &["png"])
        .set_file_name(default_name)
        .save_file()
}

// ============================================================================
// ENCODING
// ============================================================================

/// Encode a surface as a lossless PNG (best compression) into memory.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, LoadError> {
    let mut bytes = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut bytes, CompressionType::Best, FilterType::Adaptive);
    #[allow(deprecated)]
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(bytes)
}

/// Encode a surface and write it to a file (local export path).
pub fn export_png(image: &RgbaImage, path: &Path) -> Result<(), LoadError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let encoder =
        PngEncoder::new_with_quality(&mut writer, CompressionType::Best, FilterType::Adaptive);
    #[allow(deprecated)]
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(())
}

/// Wrap a surface as a `data:image/png;base64,` URL for the save payload.
pub fn to_data_url(image: &RgbaImage) -> Result<String, LoadError> {
    let png = encode_png(image)?;
    let mut url = String::with_capacity(PNG_DATA_URL_PREFIX.len() + png.len() * 4 / 3 + 4);
    url.push_str(PNG_DATA_URL_PREFIX);
    url.push_str(&BASE64.encode(&png));
    Ok(url)
}

/// Decode a `data:image/png;base64,` URL back into a surface.
pub fn from_data_url(url: &str) -> Result<RgbaImage, LoadError> {
    let encoded = url
        .strip_prefix(PNG_DATA_URL_PREFIX)
        .ok_or_else(|| LoadError::BadPayload("missing data:image/png;base64, prefix".into()))?;
    let png = BASE64
        .decode(encoded)
        .map_err(|e| LoadError::BadPayload(e.to_string()))?;
    // The cap does not apply here: we produced these bytes ourselves.
    let img = image::load_from_memory(&png)?.to_rgba8();
    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn oversized_bytes_rejected_without_decode() {
        // Garbage that is not a valid image: if the decoder ran, the error
        // would be Decode. The cap must win first.
        let junk = vec![0xABu8; 2048];
        match decode_image_bytes(&junk, 1024) {
            Err(LoadError::TooLarge(size, cap)) => {
                assert_eq!(size, 2048);
                assert_eq!(cap, 1024);
            }
            other => panic!("expected TooLarge, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn undersized_junk_fails_as_decode_error() {
        let junk = vec![0xABu8; 16];
        assert!(matches!(
            decode_image_bytes(&junk, 1024),
            Err(LoadError::Decode(_))
        ));
    }

    #[test]
    fn png_round_trip_is_lossless() {
        let mut img = RgbaImage::from_pixel(7, 5, Rgba([10, 20, 30, 255]));
        img.put_pixel(3, 2, Rgba([200, 0, 100, 128]));
        let png = encode_png(&img).unwrap();
        let back = decode_image_bytes(&png, u64::MAX).unwrap();
        assert_eq!(img, back);
    }

    #[test]
    fn data_url_round_trip() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 1, Rgba([255, 255, 255, 255]));
        let url = to_data_url(&img).unwrap();
        assert!(url.starts_with(PNG_DATA_URL_PREFIX));
        let back = from_data_url(&url).unwrap();
        assert_eq!(img, back);
    }

    #[test]
    fn data_url_without_prefix_rejected() {
        assert!(matches!(
            from_data_url("data:image/jpeg;base64,AAAA"),
            Err(LoadError::BadPayload(_))
        ));
    }
}
