//! Image utility functions

use image::GrayImage;

use crate::error::ServiceError;

/// Decode image bytes as single-channel 8-bit grayscale (BMP, PNG, JPEG, ...).
pub fn decode_grayscale(data: &[u8]) -> Result<GrayImage, ServiceError> {
    let img = image::load_from_memory(data).map_err(ServiceError::ImageDecode)?;
    Ok(img.to_luma8())
}

/// Resize a grayscale image with bilinear interpolation.
pub fn resize_bilinear(img: &GrayImage, width: u32, height: u32) -> GrayImage {
    image::imageops::resize(img, width, height, image::imageops::FilterType::Triangle)
}

/// Resize a grayscale image with nearest-neighbor interpolation.
///
/// Used for binary masks, where interpolation must not invent values
/// between 0 and 1.
pub fn resize_nearest(img: &GrayImage, width: u32, height: u32) -> GrayImage {
    image::imageops::resize(img, width, height, image::imageops::FilterType::Nearest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_png(img: &GrayImage) -> Vec<u8> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(img.clone())
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_decode_grayscale_roundtrip() {
        let img = GrayImage::from_fn(16, 12, |x, y| image::Luma([(x + y) as u8]));
        let bytes = encode_png(&img);
        let decoded = decode_grayscale(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (16, 12));
        assert_eq!(decoded.get_pixel(3, 5)[0], 8);
    }

    #[test]
    fn test_decode_grayscale_invalid() {
        let result = decode_grayscale(b"not an image");
        assert!(matches!(result, Err(ServiceError::ImageDecode(_))));
    }

    #[test]
    fn test_resize_nearest_keeps_binary_values() {
        let img = GrayImage::from_fn(4, 4, |x, _| image::Luma([if x < 2 { 0 } else { 1 }]));
        let resized = resize_nearest(&img, 8, 8);
        for p in resized.pixels() {
            assert!(p[0] == 0 || p[0] == 1);
        }
    }
}
