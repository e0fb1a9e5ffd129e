mod error;
mod frame;
mod normalize;
mod engine;
mod selector;
mod gate;
mod pipeline;
pub mod builder;

pub use error::{ClassifierError, ErrorKind};
pub use frame::{DecodedImage, PixelFormat, RawFrame};
pub use normalize::{
    luminance, resize_bilinear, to_grayscale, ImageNormalizer, NormalizedTensor, PreprocessConfig, TensorShape,
    LUMA_WEIGHTS,
};
pub use engine::{check_input_shape, check_scores, InferenceEngine, OnnxEngine, ProbabilityVector};
pub use selector::{argmax, select, ClassificationResult};
pub use gate::{Admission, FrameGate, GateStats, InFlight, PipelineState};
pub use pipeline::{AnalysisSwitch, ClassificationPipeline, Outcome};
pub use builder::PipelineBuilder;

/// Information about the configuration of a pipeline
#[derive(Debug, Clone)]
pub struct PipelineInfo {
    /// Shape of the model input tensor
    pub input_shape: TensorShape,
    /// Number of labels the model distinguishes
    pub num_labels: usize,
    /// Labels in model output order
    pub labels: Vec<String>,
    /// Preprocessing applied before inference
    pub preprocess: PreprocessConfig,
}
