//! Image encoding: cropped region → grayscale PNG bytes.
//!
//! Regions are encoded as soon as they are cropped so a document never holds
//! more than one full-resolution page bitmap at a time. PNG is lossless;
//! JPEG artefacts around CJK strokes measurably hurt Tesseract accuracy.

use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Convert to 8-bit grayscale and encode as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let gray = DynamicImage::ImageLuma8(img.to_luma8());
    let mut buf = Vec::new();
    gray.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!("Encoded {}x{} region → {} bytes PNG", gray.width(), gray.height(), buf.len());
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let png = encode_png(&img).expect("encode should succeed");
        assert_eq!(&png[1..4], b"PNG");

        let decoded = image::load_from_memory(&png).expect("valid png");
        assert_eq!((decoded.width(), decoded.height()), (10, 10));
        assert!(matches!(decoded, DynamicImage::ImageLuma8(_)));
    }
}
