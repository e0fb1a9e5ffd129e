use std::collections::HashMap;
use std::path::Path;

use log::{debug, info};
use ndarray::Axis;
use ort::session::Session;
use ort::value::Tensor;
use serde::Serialize;

use super::error::ClassifierError;
use super::normalize::{NormalizedTensor, TensorShape};
use crate::runtime::{create_session_builder, RuntimeConfig};

/// Raw per-label scores produced by one forward pass, index-aligned with the label table.
///
/// No sum-to-one invariant is assumed; scores are only compared with each other.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProbabilityVector(Vec<f32>);

impl ProbabilityVector {
    pub fn new(scores: Vec<f32>) -> Self {
        Self(scores)
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

    pub fn get(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        self.0.iter().copied()
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for ProbabilityVector {
    fn from(scores: Vec<f32>) -> Self {
        Self(scores)
    }
}

/// A loaded, immutable model that maps a tensor to a score vector.
///
/// Implementations are shared behind an `Arc` for the lifetime of the pipeline.
/// `infer` blocks the calling thread and is never called concurrently on one
/// instance; the frame gate guarantees that, so implementations need no
/// internal locking.
pub trait InferenceEngine: Send + Sync {
    /// Shape of the single input tensor, batch axis excluded
    fn input_shape(&self) -> TensorShape;

    /// Number of scores produced per forward pass
    fn output_len(&self) -> usize;

    fn infer(&self, tensor: &NormalizedTensor) -> Result<ProbabilityVector, ClassifierError>;
}

/// Rejects tensors whose shape differs from the engine's input shape.
pub fn check_input_shape(expected: TensorShape, tensor: &NormalizedTensor) -> Result<(), ClassifierError> {
    let actual = tensor.shape();
    if actual != expected {
        return Err(ClassifierError::Configuration(format!(
            "Tensor shape {} does not match model input shape {}",
            actual, expected
        )));
    }
    Ok(())
}

/// Validates a raw output buffer and wraps it.
pub fn check_scores(scores: Vec<f32>, expected_len: usize) -> Result<ProbabilityVector, ClassifierError> {
    if scores.len() != expected_len {
        return Err(ClassifierError::Inference(format!(
            "Model produced {} scores, expected {}",
            scores.len(),
            expected_len
        )));
    }
    if let Some(pos) = scores.iter().position(|s| !s.is_finite()) {
        return Err(ClassifierError::Inference(format!(
            "Model produced a non-finite score at index {}",
            pos
        )));
    }
    Ok(ProbabilityVector(scores))
}

/// ONNX Runtime backed engine.
///
/// The session is created once from the model bytes and reused for every
/// classification. Inputs are fed as a single NHWC batch `[1, H, W, C]`.
pub struct OnnxEngine {
    session: Session,
    input_name: String,
    input_shape: TensorShape,
    output_len: usize,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<OnnxEngine>();
    }
};

impl OnnxEngine {
    /// Deserializes a model and runs it once on a zero tensor to learn its output length.
    ///
    /// # Errors
    /// - `ModelLoad` if the bytes are empty, the runtime rejects them, the graph has no
    ///   inputs or outputs, or the trial run fails
    pub fn load(
        model_bytes: &[u8],
        input_shape: TensorShape,
        config: &RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        if model_bytes.is_empty() {
            return Err(ClassifierError::ModelLoad("Model artifact is empty".into()));
        }

        let session = create_session_builder(config)?.commit_from_memory(model_bytes)?;
        Self::validate_model(&session)?;
        let input_name = session.inputs[0].name.clone();

        let mut engine = Self {
            session,
            input_name,
            input_shape,
            output_len: 0,
        };

        let trial = engine
            .run(&NormalizedTensor::zeros(input_shape))
            .map_err(|e| {
                ClassifierError::ModelLoad(format!("Model rejected a {} zero tensor: {}", input_shape, e))
            })?;
        if trial.is_empty() {
            return Err(ClassifierError::ModelLoad("Model produced an empty output".into()));
        }
        engine.output_len = trial.len();

        info!(
            "Model loaded: input '{}' {}, {} outputs, {} intra-op threads",
            engine.input_name, input_shape, engine.output_len, config.intra_threads
        );
        Ok(engine)
    }

    pub fn load_from_file(
        path: impl AsRef<Path>,
        input_shape: TensorShape,
        config: &RuntimeConfig,
    ) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| ClassifierError::ModelLoad(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::load(&bytes, input_shape, config)
    }

    /// Releases the runtime session.
    pub fn unload(self) {
        info!("Unloading model '{}'", self.input_name);
        drop(self);
    }

    fn validate_model(session: &Session) -> Result<(), ClassifierError> {
        if session.inputs.is_empty() {
            return Err(ClassifierError::ModelLoad("Model must have an image input".into()));
        }
        if session.outputs.is_empty() {
            return Err(ClassifierError::ModelLoad("Model must have at least 1 output for scores".into()));
        }
        Ok(())
    }

    fn run(&self, tensor: &NormalizedTensor) -> Result<Vec<f32>, ClassifierError> {
        let batch = tensor.view().insert_axis(Axis(0)).into_dyn();
        let batch = batch.as_standard_layout();
        let input = Tensor::from_array(&batch)
            .map_err(|e| ClassifierError::Inference(format!("Failed to create input tensor: {}", e)))?;

        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.as_str(), input);

        let outputs = self
            .session
            .run(inputs)
            .map_err(|e| ClassifierError::Inference(format!("Failed to run model: {}", e)))?;
        let scores = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::Inference(format!("Failed to extract output tensor: {}", e)))?;

        Ok(scores.iter().copied().collect())
    }
}

impl InferenceEngine for OnnxEngine {
    fn input_shape(&self) -> TensorShape {
        self.input_shape
    }

    fn output_len(&self) -> usize {
        self.output_len
    }

    fn infer(&self, tensor: &NormalizedTensor) -> Result<ProbabilityVector, ClassifierError> {
        check_input_shape(self.input_shape, tensor)?;
        let scores = self.run(tensor)?;
        debug!("Forward pass produced {} scores", scores.len());
        check_scores(scores, self.output_len)
    }
}
