use std::path::Path;
use std::sync::Arc;

use log::{error, info};

use super::engine::{InferenceEngine, OnnxEngine};
use super::error::ClassifierError;
use super::normalize::{ImageNormalizer, PreprocessConfig};
use super::pipeline::{AnalysisSwitch, ClassificationPipeline};
use crate::bundle::ModelBundle;
use crate::labels::LabelTable;
use crate::runtime::RuntimeConfig;

/// A builder for constructing a ClassificationPipeline with a fluent interface.
///
/// Every fatal check (model load, model/label mismatch, tensor shape mismatch)
/// happens here, before the pipeline can accept a frame.
#[derive(Default)]
pub struct PipelineBuilder {
    model_bytes: Option<Vec<u8>>,
    engine: Option<Arc<dyn InferenceEngine>>,
    labels: Option<LabelTable>,
    preprocess: PreprocessConfig,
    runtime_config: RuntimeConfig,
    analysis: AnalysisSwitch,
}

impl PipelineBuilder {
    /// Creates a new empty PipelineBuilder instance with default configuration
    ///
    /// # Example
    /// ```
    /// use plugscan::PipelineBuilder;
    ///
    /// let builder = PipelineBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime configuration used when the model is loaded
    ///
    /// # Example
    /// ```
    /// use plugscan::{PipelineBuilder, RuntimeConfig};
    ///
    /// let builder = PipelineBuilder::new()
    ///     .with_runtime_config(RuntimeConfig::default().with_intra_threads(2));
    /// ```
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Sets the preprocessing parameters the model was trained with
    pub fn with_preprocess_config(mut self, config: PreprocessConfig) -> Self {
        self.preprocess = config;
        self
    }

    pub fn with_labels(mut self, labels: LabelTable) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Shares an externally owned analysis flag with the pipeline
    pub fn with_analysis_switch(mut self, analysis: AnalysisSwitch) -> Self {
        self.analysis = analysis;
        self
    }

    fn ensure_no_model(&self) -> Result<(), ClassifierError> {
        if self.model_bytes.is_some() || self.engine.is_some() {
            return Err(ClassifierError::Configuration("Model already set".to_string()));
        }
        Ok(())
    }

    /// Uses an ONNX model held in memory. The model is loaded by `build()`.
    pub fn with_model_bytes(mut self, bytes: Vec<u8>) -> Result<Self, ClassifierError> {
        self.ensure_no_model()?;
        if bytes.is_empty() {
            return Err(ClassifierError::ModelLoad("Model artifact is empty".to_string()));
        }
        self.model_bytes = Some(bytes);
        Ok(self)
    }

    pub fn with_model_file(self, path: impl AsRef<Path>) -> Result<Self, ClassifierError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            error!("Failed to read model: {}", e);
            ClassifierError::ModelLoad(format!("Failed to read {}: {}", path.display(), e))
        })?;
        self.with_model_bytes(bytes)
    }

    /// Uses the model, label table and preprocessing parameters of a bundle
    ///
    /// # Returns
    /// * `Result<Self, ClassifierError>` - The builder instance if successful, or an error if:
    ///   - A model is already set
    ///   - The bundle has no model, or its checksum does not match
    ///   - The label table or preprocessing manifest cannot be parsed
    pub fn with_bundle(mut self, bundle: &ModelBundle) -> Result<Self, ClassifierError> {
        self.ensure_no_model()?;
        info!("Loading bundle from {:?}", bundle.root());

        let bytes = bundle.read_model()?;
        if let Some(labels) = bundle.load_labels()? {
            self.labels = Some(labels);
        }
        self.preprocess = bundle.load_preprocess()?;
        self.with_model_bytes(bytes)
    }

    /// Uses an already loaded engine, shared with whoever else holds it
    pub fn with_engine(mut self, engine: Arc<dyn InferenceEngine>) -> Result<Self, ClassifierError> {
        self.ensure_no_model()?;
        self.engine = Some(engine);
        Ok(self)
    }

    /// Builds and returns the final ClassificationPipeline instance
    ///
    /// # Returns
    /// * `Result<ClassificationPipeline, ClassifierError>` - The pipeline if successful, or:
    ///   - `ModelLoad` if no model was set or the runtime rejects it
    ///   - `Configuration` if the preprocessing parameters are invalid, the engine's
    ///     input shape differs from the normalizer output, or the engine's output
    ///     length differs from the label table
    pub fn build(self) -> Result<ClassificationPipeline, ClassifierError> {
        let normalizer = ImageNormalizer::new(self.preprocess)?;
        let labels = self.labels.unwrap_or_else(LabelTable::reference);

        let engine: Arc<dyn InferenceEngine> = match (self.engine, self.model_bytes) {
            (Some(engine), _) => engine,
            (None, Some(bytes)) => Arc::new(OnnxEngine::load(
                &bytes,
                normalizer.output_shape(),
                &self.runtime_config,
            )?),
            (None, None) => return Err(ClassifierError::ModelLoad("No model set".to_string())),
        };

        if engine.input_shape() != normalizer.output_shape() {
            return Err(ClassifierError::Configuration(format!(
                "Model expects {} input but preprocessing produces {}",
                engine.input_shape(),
                normalizer.output_shape()
            )));
        }
        if engine.output_len() != labels.len() {
            return Err(ClassifierError::Configuration(format!(
                "Model produces {} scores but the label table has {} entries",
                engine.output_len(),
                labels.len()
            )));
        }

        info!(
            "Pipeline ready: {} input, {} labels",
            normalizer.output_shape(),
            labels.len()
        );
        Ok(ClassificationPipeline::new(normalizer, engine, labels, self.analysis))
    }
}
