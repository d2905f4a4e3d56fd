//! Ridge-area segmentation
//!
//! Runs the segmentation model over a contrast-enhanced scan and thresholds
//! the probability output into a binary mask. A malformed model output
//! degrades to an all-ones mask (no masking) instead of failing the
//! pipeline.

use image::GrayImage;
use openvino::{ElementType, Shape, Tensor};
use tracing::warn;

use super::loader::{LoadedModel, SafeCompiledModel};

/// Probability threshold separating ridge area from background.
const MASK_THRESHOLD: f32 = 0.5;

pub struct Segmenter {
    model: SafeCompiledModel,
    input_shape: (u32, u32),
}

impl Segmenter {
    pub fn new(model: LoadedModel) -> Self {
        Self {
            model: model.compiled,
            input_shape: model.input_shape,
        }
    }

    /// Declared input resolution as `(height, width)`.
    pub fn input_shape(&self) -> (u32, u32) {
        self.input_shape
    }

    /// Segment an enhanced scan already resized to `input_shape`.
    ///
    /// Returns a {0,1} mask at the model's output resolution, or an
    /// all-ones mask covering the input when inference fails or the output
    /// is malformed.
    pub fn segment(&self, enhanced: &GrayImage) -> GrayImage {
        match self.run_inference(enhanced) {
            Ok((dims, data)) => match mask_from_output(&dims, &data) {
                Some(mask) => mask,
                None => {
                    warn!("Malformed segmentation output {:?}, using full mask", dims);
                    fallback_mask(enhanced.width(), enhanced.height())
                }
            },
            Err(e) => {
                warn!("Segmentation inference failed ({e:#}), using full mask");
                fallback_mask(enhanced.width(), enhanced.height())
            }
        }
    }

    fn run_inference(&self, enhanced: &GrayImage) -> anyhow::Result<(Vec<i64>, Vec<f32>)> {
        let (w, h) = enhanced.dimensions();

        // NHWC [1, H, W, 1], normalized to [0, 1].
        let mut input_data = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                input_data.push(enhanced.get_pixel(x, y)[0] as f32 / 255.0);
            }
        }

        let input_shape = Shape::new(&[1, h as i64, w as i64, 1])?;
        let mut input = Tensor::new(ElementType::F32, &input_shape)?;
        unsafe {
            let tensor_data = input.get_raw_data_mut()?.as_mut_ptr() as *mut f32;
            std::ptr::copy_nonoverlapping(input_data.as_ptr(), tensor_data, input_data.len());
        }

        let mut request = self.model.create_infer_request()?;
        request.set_input_tensor(&input)?;
        request.infer()?;

        let output = request.get_output_tensor()?;
        let output_shape = output.get_shape()?;
        let dims: Vec<i64> = output_shape.get_dimensions().to_vec();

        let output_len = dims.iter().product::<i64>().max(0) as usize;
        let data: Vec<f32> = unsafe {
            let ptr = output.get_raw_data()?.as_ptr() as *const f32;
            std::slice::from_raw_parts(ptr, output_len).to_vec()
        };

        Ok((dims, data))
    }
}

/// Threshold a probability map into a {0,1} mask.
///
/// Accepts `[1, H, W, 1]`, `[1, H, W]` or `[H, W]` outputs. Returns None
/// when the rank is unexpected, a dimension is non-positive, or the data
/// length does not cover `H * W`.
pub fn mask_from_output(dims: &[i64], data: &[f32]) -> Option<GrayImage> {
    let (h, w) = match dims {
        [1, h, w, 1] => (*h, *w),
        [1, h, w] => (*h, *w),
        [h, w] => (*h, *w),
        _ => return None,
    };
    if h <= 0 || w <= 0 {
        return None;
    }
    let (h, w) = (h as u32, w as u32);
    if data.len() != (h * w) as usize {
        return None;
    }

    Some(GrayImage::from_fn(w, h, |x, y| {
        let p = data[(y * w + x) as usize];
        image::Luma([if p > MASK_THRESHOLD { 1 } else { 0 }])
    }))
}

/// All-ones mask: every pixel kept, masking disabled.
pub fn fallback_mask(width: u32, height: u32) -> GrayImage {
    GrayImage::from_pixel(width, height, image::Luma([1]))
}
