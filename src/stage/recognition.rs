use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, InferenceResult};
use crate::stage::backend::ModelHandle;
use crate::stage::preprocess::Normalization;
use crate::stage::{Crop, InferenceStage, StageKind, first_output};

/// Face identity embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// L2-normalize `values`. `None` when the vector has no finite, non-zero norm.
    pub fn normalized(mut values: Vec<f32>) -> Option<Self> {
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if !(norm > f32::EPSILON) || !norm.is_finite() {
            return None;
        }
        values.iter_mut().for_each(|v| *v /= norm);
        Some(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn norm(&self) -> f32 {
        self.0.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    /// Cosine similarity in [-1, 1]; 0 for mismatched lengths or zero vectors.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        if self.len() != other.len() {
            return 0.0;
        }
        let denom = self.norm() * other.norm();
        if !(denom > f32::EPSILON) {
            return 0.0;
        }
        let dot: f32 = self.0.iter().zip(&other.0).map(|(a, b)| a * b).sum();
        (dot / denom).clamp(-1.0, 1.0)
    }
}

/// Identity embedding on an aligned face crop.
#[derive(Debug, Clone)]
pub struct RecognitionStage {
    model: ModelHandle,
    normalization: Normalization,
    embedding_dim: usize,
}

impl RecognitionStage {
    pub fn new(model: ModelHandle, embedding_dim: usize) -> Self {
        Self {
            model,
            normalization: Normalization::default(),
            embedding_dim,
        }
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}

impl InferenceStage for RecognitionStage {
    type Output = Embedding;

    fn kind(&self) -> StageKind {
        StageKind::Recognition
    }

    fn model(&self) -> &ModelHandle {
        &self.model
    }

    fn normalization(&self) -> &Normalization {
        &self.normalization
    }

    fn postprocess(&self, outputs: &[ArrayD<f32>], _crop: &Crop) -> InferenceResult<Embedding> {
        let values = first_output(outputs, self.kind())?;
        if values.len() != self.embedding_dim {
            return Err(InferenceError::malformed(format!(
                "embedding has {} values, expected {}",
                values.len(),
                self.embedding_dim
            )));
        }
        Embedding::normalized(values)
            .ok_or_else(|| InferenceError::malformed("embedding has zero norm"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{AffineTransform, InferenceBackend};
    use ndarray::{Array4, IxDyn};

    struct Unused;

    impl InferenceBackend for Unused {
        fn input_shape(&self) -> [usize; 4] {
            [1, 3, 112, 112]
        }

        fn run(&self, _: Array4<f32>) -> InferenceResult<Vec<ArrayD<f32>>> {
            Ok(Vec::new())
        }
    }

    fn embed(values: Vec<f32>) -> InferenceResult<Embedding> {
        let crop = Crop {
            transform: AffineTransform::identity(),
            source_size: (112, 112),
            input_size: (112, 112),
        };
        let raw = ArrayD::from_shape_vec(IxDyn(&[1, values.len()]), values).unwrap();
        RecognitionStage::new(ModelHandle::new("arcface", Unused), 4).postprocess(&[raw], &crop)
    }

    #[test]
    fn test_embedding_is_l2_normalized() {
        let embedding = embed(vec![3.0, 0.0, 4.0, 0.0]).unwrap();
        assert_eq!(embedding.as_slice(), &[0.6, 0.0, 0.8, 0.0]);
        assert!((embedding.norm() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_wrong_dimension_and_zero_vector() {
        assert!(matches!(embed(vec![1.0, 2.0]), Err(InferenceError::MalformedOutput(_))));
        assert!(embed(vec![0.0; 4]).is_err());
    }

    #[test]
    fn test_cosine_similarity() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 2.0]);
        let c = Embedding::new(vec![-3.0, 0.0]);
        assert_eq!(a.cosine_similarity(&a), 1.0);
        assert_eq!(a.cosine_similarity(&b), 0.0);
        assert_eq!(a.cosine_similarity(&c), -1.0);
        assert_eq!(a.cosine_similarity(&Embedding::new(vec![1.0])), 0.0);
    }
}
