//! Embedding extraction
//!
//! Wraps the recognition artifact's shared feature tower as a single-input
//! function from a preprocessed scan to a fixed-length feature vector.

use ndarray::Array3;
use openvino::{ElementType, Shape, Tensor};

use super::loader::{LoadedModel, SafeCompiledModel};
use crate::error::ServiceError;

/// Fixed-length fingerprint feature vector.
///
/// Deterministic for a fixed model and input; never mutated after
/// extraction, only replaced wholesale.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    pub fn len(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }
}

pub struct EmbeddingExtractor {
    model: SafeCompiledModel,
    input_shape: (u32, u32),
}

impl EmbeddingExtractor {
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

    /// Run one forward pass over a preprocessed `(H, W, 1)` tensor.
    pub fn embed(&self, tensor: &Array3<f32>) -> Result<Embedding, ServiceError> {
        let (h, w) = self.input_shape;
        let expected = [h as usize, w as usize, 1];
        if tensor.shape() != expected {
            return Err(ServiceError::Inference(anyhow::anyhow!(
                "preprocessed tensor is {:?}, model expects {:?}",
                tensor.shape(),
                expected
            )));
        }

        self.run_inference(tensor).map_err(ServiceError::Inference)
    }

    fn run_inference(&self, tensor: &Array3<f32>) -> anyhow::Result<Embedding> {
        let (h, w) = self.input_shape;
        let input_data: Vec<f32> = tensor.iter().copied().collect();

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
        let output_len = output_shape
            .get_dimensions()
            .iter()
            .product::<i64>()
            .max(0) as usize;

        let vector: Vec<f32> = unsafe {
            let ptr = output.get_raw_data()?.as_ptr() as *const f32;
            std::slice::from_raw_parts(ptr, output_len).to_vec()
        };

        if vector.is_empty() {
            anyhow::bail!("recognition model produced an empty embedding");
        }

        Ok(Embedding::new(vector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_holds_vector() {
        let e = Embedding::new(vec![0.5, -0.25, 1.0]);
        assert_eq!(e.len(), 3);
        assert!(!e.is_empty());
        assert_eq!(e.vector[1], -0.25);
    }
}
