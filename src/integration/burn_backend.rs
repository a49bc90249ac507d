//! Burn inference backend.
//!
//! Wraps a model built with the Burn framework as an [`InferenceBackend`],
//! so it can back any stage through a [`ModelHandle`].
//!
//! # Example
//!
//! ```ignore
//! use burn::backend::NdArray;
//! use facetrack_rs::integration::{BurnBackend, BurnModel};
//! use facetrack_rs::{FaceDetector, ModelHandle};
//!
//! // Implement BurnModel for your detection model
//! struct MyRetinaFace { /* ... */ }
//!
//! impl BurnModel<NdArray> for MyRetinaFace {
//!     fn forward(&self, input: Tensor<NdArray, 4>) -> Vec<Tensor<NdArray, 2>> {
//!         // Run inference
//!     }
//! }
//!
//! let backend = BurnBackend::new(MyRetinaFace::load("retinaface.bin"), Default::default());
//! let detector = FaceDetector::new(ModelHandle::new("retinaface", backend), Default::default());
//! ```
//!
//! [`ModelHandle`]: crate::stage::ModelHandle

use burn::prelude::*;
use burn::tensor::{Tensor, TensorData};
use ndarray::{Array4, ArrayD, IxDyn};

use crate::error::{InferenceError, InferenceResult};
use crate::stage::InferenceBackend;

/// Trait for Burn-based face models.
///
/// Implement this trait for your specific model architecture.
pub trait BurnModel<B: Backend>: Send + Sync {
    /// Run forward pass on the input tensor.
    ///
    /// # Arguments
    /// * `input` - Input tensor of shape [batch, channels, height, width]
    ///
    /// # Returns
    /// Raw output tensors, one row per detection (or a single row for
    /// attribute models).
    fn forward(&self, input: Tensor<B, 4>) -> Vec<Tensor<B, 2>>;

    /// Expected input shape (batch, channels, height, width).
    fn input_shape(&self) -> [usize; 4] {
        [1, 3, 640, 640]
    }
}

/// Burn model exposed as an [`InferenceBackend`].
pub struct BurnBackend<B: Backend, M: BurnModel<B>> {
    model: M,
    device: B::Device,
}

impl<B: Backend, M: BurnModel<B>> BurnBackend<B, M> {
    /// Create a new backend with the given model and device.
    pub fn new(model: M, device: B::Device) -> Self {
        Self { model, device }
    }

    fn to_tensor(&self, input: Array4<f32>) -> Tensor<B, 4> {
        let (n, c, h, w) = input.dim();
        let values: Vec<f32> = input.iter().copied().collect();
        Tensor::from_data(TensorData::new(values, [n, c, h, w]), &self.device)
    }

    fn to_array(output: Tensor<B, 2>) -> InferenceResult<ArrayD<f32>> {
        let dims = output.dims();
        let values = output
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| InferenceError::malformed(format!("{e:?}")))?;
        ArrayD::from_shape_vec(IxDyn(&dims), values)
            .map_err(|e| InferenceError::malformed(e.to_string()))
    }
}

impl<B: Backend, M: BurnModel<B>> InferenceBackend for BurnBackend<B, M> {
    fn input_shape(&self) -> [usize; 4] {
        self.model.input_shape()
    }

    fn run(&self, input: Array4<f32>) -> InferenceResult<Vec<ArrayD<f32>>> {
        let tensor = self.to_tensor(input);
        self.model
            .forward(tensor)
            .into_iter()
            .map(Self::to_array)
            .collect()
    }
}
