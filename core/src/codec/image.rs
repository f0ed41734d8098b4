//! Raster decoding through the `image` crate.

use std::io::Cursor;

use anyhow::{Context, anyhow};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder as _, ImageFormat, ImageReader};
use tracing::trace;

use crate::types::ImageDimensions;

use super::{PageDecoder, Result};

/// RGBA pixel buffer produced for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub dimensions: ImageDimensions,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Resident size charged against the page cache.
    pub fn size_bytes(&self) -> usize {
        self.pixels.len()
    }
}

/// Default [`PageDecoder`]: first frame, EXIF orientation applied, straight-alpha RGBA8888.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterDecoder;

impl PageDecoder for RasterDecoder {
    fn decode(&self, name: &str, bytes: &[u8]) -> Result<DecodedImage> {
        decode_page(name, bytes)
    }
}

/// Decode one archive entry. The format is taken from the entry name when it is recognised and
/// sniffed from the bytes otherwise.
pub fn decode_page(name: &str, data: &[u8]) -> Result<DecodedImage> {
    if data.is_empty() {
        return Err(anyhow!("empty image data for {name}"));
    }

    let reader = match format_hint(name) {
        Some(format) => ImageReader::with_format(Cursor::new(data), format),
        None => ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .context("guessing image format")?,
    };

    let mut decoder =
        reader.into_decoder().with_context(|| format!("constructing decoder for {name}"))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let mut image =
        DynamicImage::from_decoder(decoder).with_context(|| format!("decoding image {name}"))?;
    if orientation != Orientation::NoTransforms {
        trace!(target: "codec::image", name, ?orientation, "applying orientation");
        image.apply_orientation(orientation);
    }

    let rgba = image.into_rgba8();
    let dimensions = ImageDimensions { width: rgba.width(), height: rgba.height() };
    Ok(DecodedImage { dimensions, pixels: rgba.into_raw() })
}

fn format_hint(name: &str) -> Option<ImageFormat> {
    let (_, ext) = name.rsplit_once('.')?;
    ImageFormat::from_extension(ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba, RgbaImage};

    fn sample_image() -> RgbaImage {
        ImageBuffer::from_fn(3, 2, |x, y| match (x, y) {
            (0, 0) => Rgba([255, 0, 0, 255]),
            (1, 0) => Rgba([0, 255, 0, 255]),
            _ => Rgba([0, 0, 255, 255]),
        })
    }

    fn encode(format: ImageFormat) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(sample_image()).write_to(&mut cursor, format).expect("encode");
        cursor.into_inner()
    }

    #[test]
    fn decodes_png_pixels() {
        let decoded = RasterDecoder.decode("pages/01.png", &encode(ImageFormat::Png)).unwrap();
        assert_eq!(decoded.dimensions, ImageDimensions { width: 3, height: 2 });
        assert_eq!(decoded.size_bytes(), 3 * 2 * 4);
        assert_eq!(&decoded.pixels()[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn sniffs_format_when_name_is_misleading() {
        let decoded = decode_page("page.bin", &encode(ImageFormat::Png)).unwrap();
        assert_eq!(decoded.width(), 3);
    }

    #[test]
    fn decodes_gif_first_frame() {
        let decoded = decode_page("anim.GIF", &encode(ImageFormat::Gif)).unwrap();
        assert_eq!(decoded.height(), 2);
    }

    #[test]
    fn rejects_empty_and_garbage_input() {
        assert!(decode_page("a.png", &[]).unwrap_err().to_string().contains("empty image data"));
        assert!(decode_page("a.png", b"not an image").is_err());
    }
}
