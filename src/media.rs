use std::path::Path;

use anyhow::{Context, Result};
use image::GenericImageView;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// Pixel dimensions of the decoded source image, shown alongside queue and
/// history entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePreview {
    pub width: u32,
    pub height: u32,
}

/// An uploaded image. Immutable once constructed; owned by the queue entry or
/// history entry that references it.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    bytes: Vec<u8>,
    mime_type: String,
    preview: Option<ImagePreview>,
}

impl ImageAsset {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let mime_type = detect_mime_type(&bytes).unwrap_or_else(|| "image/png".to_string());
        let preview = image::load_from_memory(&bytes).ok().map(|decoded| {
            let (width, height) = decoded.dimensions();
            ImagePreview { width, height }
        });
        ImageAsset {
            bytes,
            mime_type,
            preview,
        }
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn preview(&self) -> Option<ImagePreview> {
        self.preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        let pixels = image::RgbaImage::from_pixel(2, 3, image::Rgba([255, 0, 0, 255]));
        image::DynamicImage::ImageRgba8(pixels)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .expect("encode test png");
        buffer.into_inner()
    }

    #[test]
    fn detects_png_and_decodes_preview() {
        let asset = ImageAsset::from_bytes(tiny_png());
        assert_eq!(asset.mime_type(), "image/png");
        assert_eq!(
            asset.preview(),
            Some(ImagePreview {
                width: 2,
                height: 3
            })
        );
    }

    #[test]
    fn unknown_bytes_fall_back_to_png_without_preview() {
        let asset = ImageAsset::from_bytes(vec![0x00, 0x01, 0x02, 0x03]);
        assert_eq!(asset.mime_type(), "image/png");
        assert!(asset.preview().is_none());
    }
}
