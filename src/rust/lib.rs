//! Connector-type image classification with single-flight frame admission.
//!
//! A [`ClassificationPipeline`] turns one image into a [`ClassificationResult`]:
//! grayscale, bilinear resize and range normalization, one forward pass through
//! a model loaded once for the whole process, then a first-maximum top-1
//! selection over the fixed label table.
//!
//! # Basic Usage
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use plugscan::{ClassificationPipeline, ModelBundle, Outcome};
//!
//! let pipeline = ClassificationPipeline::builder()
//!     .with_bundle(&ModelBundle::new_default())?
//!     .build()?;
//!
//! match pipeline.classify_file("connector.jpg") {
//!     Outcome::Success(result) => println!("{} ({:.1}%)", result.label, result.confidence * 100.0),
//!     other => println!("No result: {:?}", other),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Streaming
//!
//! Live frames go through a [`StreamWorker`]. While one frame is being
//! classified every other frame is released on arrival, so memory and CPU stay
//! bounded to a single frame no matter how fast the camera delivers:
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use plugscan::{ClassificationPipeline, ModelBundle, PixelFormat, RawFrame, StreamWorker};
//!
//! let pipeline = Arc::new(ClassificationPipeline::builder()
//!     .with_bundle(&ModelBundle::new_default())?
//!     .build()?);
//!
//! let worker = StreamWorker::spawn(Arc::clone(&pipeline), |result| {
//!     println!("{}", result.label);
//! })?;
//!
//! let frame = RawFrame::new(640, 480, PixelFormat::Nv21, vec![0; 640 * 480 * 3 / 2]);
//! worker.offer(frame);
//! worker.stop();
//! # Ok(())
//! # }
//! ```

pub mod classifier;
mod runtime;
pub mod bundle;
pub mod catalog;
pub mod labels;
pub mod stream;

pub use classifier::{
    AnalysisSwitch, ClassificationPipeline, ClassificationResult, ClassifierError, DecodedImage, ErrorKind,
    FrameGate, GateStats, ImageNormalizer, InferenceEngine, NormalizedTensor, OnnxEngine, Outcome, PipelineBuilder,
    PipelineInfo, PipelineState, PixelFormat, PreprocessConfig, ProbabilityVector, RawFrame, TensorShape,
};
pub use runtime::{create_session_builder, OptimizationLevel, RuntimeConfig};
pub use bundle::{BundleError, ModelBundle};
pub use catalog::{CatalogError, ConnectorCatalog, ConnectorInfo};
pub use labels::LabelTable;
pub use stream::{Offer, StreamWorker};

pub fn init_logger() {
    env_logger::init();
}
