use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};

/// A JPEG ready to be inlined into a model request, with a caption naming it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelImage {
    pub label: String,
    pub jpeg: Vec<u8>,
}

/// Downscales to at most `max_width` (keeping aspect) and re-encodes as JPEG.
pub fn encode_for_model(bytes: &[u8], max_width: u32, quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes).context("failed to decode image")?;
    let img = if img.width() > max_width {
        let height = (img.height() as f64 * max_width as f64 / img.width() as f64).round() as u32;
        img.resize_exact(max_width, height.max(1), FilterType::Lanczos3)
    } else {
        img
    };

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)
        .context("failed to encode JPEG")?;
    Ok(buf.into_inner())
}

pub fn encode_file_for_model(path: &Path, max_width: u32, quality: u8) -> Result<Vec<u8>> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    encode_for_model(&bytes, max_width, quality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};

    #[test]
    fn wide_images_are_downscaled() {
        let img = ImageBuffer::from_pixel(1600, 900, Rgb([10u8, 120, 200]));
        let mut png = Cursor::new(Vec::new());
        img.write_to(&mut png, ImageFormat::Png).unwrap();

        let jpeg = encode_for_model(png.get_ref(), 800, 85).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 800);
        assert_eq!(decoded.height(), 450);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(encode_for_model(b"nope", 800, 85).is_err());
    }
}
