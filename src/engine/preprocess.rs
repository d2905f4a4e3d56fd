//! Fingerprint preprocessing
//!
//! Turns a raw scan into the normalized tensor the recognition model
//! expects: grayscale decode, contrast enhancement, ridge-area masking,
//! resize, and [0,1] normalization.

use image::GrayImage;
use ndarray::Array3;

use super::segmenter::Segmenter;
use crate::error::ServiceError;
use crate::utils::image::{decode_grayscale, resize_bilinear, resize_nearest};

/// CLAHE clip limit used for scanner illumination normalization.
pub const CLAHE_CLIP_LIMIT: f32 = 2.0;
/// CLAHE tile grid (8x8).
pub const CLAHE_TILES: u32 = 8;

/// Preprocess a raw fingerprint image for embedding extraction.
///
/// The segmentation mask is computed from a contrast-enhanced copy but
/// applied to the original image: enhancement helps the model find the
/// ridge area, it must not leak into the embedding input.
pub fn preprocess(
    data: &[u8],
    segmenter: &Segmenter,
    recognition_shape: (u32, u32),
) -> Result<Array3<f32>, ServiceError> {
    let original = decode_grayscale(data)?;

    let (seg_h, seg_w) = segmenter.input_shape();
    let for_segmentation = resize_bilinear(&original, seg_w, seg_h);
    let enhanced = clahe(&for_segmentation, CLAHE_CLIP_LIMIT, CLAHE_TILES, CLAHE_TILES);

    let mask = segmenter.segment(&enhanced);
    let mask_full = resize_nearest(&mask, original.width(), original.height());
    let masked = apply_mask(&original, &mask_full);

    let (rec_h, rec_w) = recognition_shape;
    let resized = resize_bilinear(&masked, rec_w, rec_h);

    Ok(normalize_to_tensor(&resized))
}

/// Multiply a binary {0,1} mask into a grayscale image element-wise.
pub fn apply_mask(img: &GrayImage, mask: &GrayImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let m = mask.get_pixel(x, y)[0].min(1);
        image::Luma([img.get_pixel(x, y)[0] * m])
    })
}

/// Scale an 8-bit image into a `(H, W, 1)` float tensor in [0, 1].
pub fn normalize_to_tensor(img: &GrayImage) -> Array3<f32> {
    let (w, h) = img.dimensions();
    let mut tensor = Array3::<f32>::zeros((h as usize, w as usize, 1));
    for y in 0..h {
        for x in 0..w {
            tensor[[y as usize, x as usize, 0]] = img.get_pixel(x, y)[0] as f32 / 255.0;
        }
    }
    tensor
}

/// Contrast-limited adaptive histogram equalization.
///
/// Per-tile histograms are clipped at `clip_limit` times the uniform bin
/// height, the excess redistributed, and the resulting per-tile lookup
/// tables blended bilinearly per pixel. Matches the usual CLAHE contract:
/// local contrast is stretched without amplifying noise past the clip
/// limit.
pub fn clahe(img: &GrayImage, clip_limit: f32, tiles_x: u32, tiles_y: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    let tiles_x = tiles_x.max(1).min(w);
    let tiles_y = tiles_y.max(1).min(h);
    let tile_w = (w + tiles_x - 1) / tiles_x;
    let tile_h = (h + tiles_y - 1) / tiles_y;

    // One 256-entry LUT per tile.
    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];

    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            let area = ((x1 - x0) * (y1 - y0)) as u32;
            if area == 0 {
                continue;
            }

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[img.get_pixel(x, y)[0] as usize] += 1;
                }
            }

            // Clip and redistribute the excess uniformly; the residual is
            // spread at even strides so the histogram total stays `area`.
            let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > limit {
                    excess += *bin - limit;
                    *bin = limit;
                }
            }
            let bonus = excess / 256;
            for bin in hist.iter_mut() {
                *bin += bonus;
            }
            let mut residual = (excess % 256) as usize;
            if residual > 0 {
                let step = (256 / residual).max(1);
                let mut i = 0;
                while i < 256 && residual > 0 {
                    hist[i] += 1;
                    residual -= 1;
                    i += step;
                }
            }

            let lut = &mut luts[(ty * tiles_x + tx) as usize];
            let mut cdf = 0u32;
            for (v, bin) in hist.iter().enumerate() {
                cdf += bin;
                lut[v] = ((cdf as f32 * 255.0 / area as f32).round() as u32).min(255) as u8;
            }
        }
    }

    // Bilinear blend between the four surrounding tile LUTs.
    let max_tx = (tiles_x - 1) as f32;
    let max_ty = (tiles_y - 1) as f32;
    GrayImage::from_fn(w, h, |x, y| {
        let gx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).clamp(0.0, max_tx);
        let gy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).clamp(0.0, max_ty);

        let tx0 = gx.floor() as u32;
        let ty0 = gy.floor() as u32;
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        let dx = gx - tx0 as f32;
        let dy = gy - ty0 as f32;

        let v = img.get_pixel(x, y)[0] as usize;
        let l00 = luts[(ty0 * tiles_x + tx0) as usize][v] as f32;
        let l10 = luts[(ty0 * tiles_x + tx1) as usize][v] as f32;
        let l01 = luts[(ty1 * tiles_x + tx0) as usize][v] as f32;
        let l11 = luts[(ty1 * tiles_x + tx1) as usize][v] as f32;

        let top = l00 * (1.0 - dx) + l10 * dx;
        let bottom = l01 * (1.0 - dx) + l11 * dx;
        let blended = top * (1.0 - dy) + bottom * dy;

        image::Luma([blended.clamp(0.0, 255.0).round() as u8])
    })
}
