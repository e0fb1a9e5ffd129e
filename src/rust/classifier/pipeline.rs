use std::borrow::Cow;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};

use super::builder::PipelineBuilder;
use super::engine::InferenceEngine;
use super::error::ClassifierError;
use super::frame::{DecodedImage, RawFrame};
use super::gate::{Admission, FrameGate, GateStats, InFlight, PipelineState};
use super::normalize::ImageNormalizer;
use super::selector::{self, ClassificationResult};
use super::PipelineInfo;
use crate::labels::LabelTable;

/// Terminal outcome of one classification attempt.
#[derive(Debug)]
pub enum Outcome {
    Success(ClassificationResult),
    /// The gate was busy; the frame never entered the pipeline
    Dropped,
    /// Analysis was switched off; the frame never reached the gate
    Skipped,
    /// The pipeline was reset while the frame was in flight; no result was delivered
    Cancelled,
    Failed(ClassifierError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn result(&self) -> Option<&ClassificationResult> {
        match self {
            Self::Success(result) => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ClassifierError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// The externally toggled `should_analyze` flag.
///
/// While disabled, frames are released on arrival without touching the gate;
/// the frame source keeps running.
#[derive(Debug, Clone)]
pub struct AnalysisSwitch {
    enabled: Arc<AtomicBool>,
}

impl AnalysisSwitch {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn enable(&self) {
        self.set(true);
    }

    pub fn disable(&self) {
        self.set(false);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Default for AnalysisSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Anything the pipeline can turn into a decoded image.
trait ImageSource {
    fn decode(&self) -> Result<Cow<'_, DecodedImage>, ClassifierError>;
}

impl ImageSource for RawFrame {
    fn decode(&self) -> Result<Cow<'_, DecodedImage>, ClassifierError> {
        DecodedImage::from_frame(self).map(Cow::Owned)
    }
}

impl ImageSource for &DecodedImage {
    fn decode(&self) -> Result<Cow<'_, DecodedImage>, ClassifierError> {
        Ok(Cow::Borrowed(*self))
    }
}

/// FrameGate → ImageNormalizer → InferenceEngine → ResultSelector.
///
/// At most one frame is in flight at any time; the engine is loaded once and
/// shared for the lifetime of the pipeline. Stages run synchronously on the
/// caller's thread. A streamed frame is released as soon as it has been
/// normalized. There is no internal timeout: a stuck forward pass blocks that
/// thread and keeps the gate busy until it returns, even when cancelled.
pub struct ClassificationPipeline {
    gate: FrameGate,
    analysis: AnalysisSwitch,
    normalizer: ImageNormalizer,
    engine: Arc<dyn InferenceEngine>,
    labels: LabelTable,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<ClassificationPipeline>();
    }
};

impl ClassificationPipeline {
    /// Creates a new PipelineBuilder for fluent construction
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub(crate) fn new(
        normalizer: ImageNormalizer,
        engine: Arc<dyn InferenceEngine>,
        labels: LabelTable,
        analysis: AnalysisSwitch,
    ) -> Self {
        Self {
            gate: FrameGate::new(),
            analysis,
            normalizer,
            engine,
            labels,
        }
    }

    /// Classifies one decoded still image.
    ///
    /// The image passes the same gate as streamed frames, so this returns
    /// `Outcome::Dropped` while a frame is being classified.
    pub fn classify(&self, image: &DecodedImage) -> Outcome {
        match self.gate.admit(image) {
            Admission::Admitted(in_flight) => self.finish(in_flight, |_| {}),
            Admission::Dropped => Outcome::Dropped,
        }
    }

    /// Decodes and classifies an imported image file.
    ///
    /// A file that cannot be decoded yields `Outcome::Failed`.
    pub fn classify_file(&self, path: impl AsRef<Path>) -> Outcome {
        match DecodedImage::open(path) {
            Ok(image) => self.classify(&image),
            Err(err) => {
                warn!("{}", err);
                Outcome::Failed(err)
            }
        }
    }

    /// Streamed path: admits `frame` and, if admitted, classifies it on the calling thread.
    ///
    /// `on_result` runs once for a frame that completes, before the gate is
    /// released. It is not called for skipped, dropped, failed or cancelled frames.
    pub fn submit_frame(&self, frame: RawFrame, on_result: impl FnOnce(&ClassificationResult)) -> Outcome {
        match self.admit(frame) {
            Some(Admission::Admitted(in_flight)) => self.process(in_flight, on_result),
            Some(Admission::Dropped) => Outcome::Dropped,
            None => Outcome::Skipped,
        }
    }

    /// Applies the analysis flag and the gate without running anything.
    ///
    /// Returns `None` when analysis is off; the frame is released in that case.
    pub fn admit(&self, frame: RawFrame) -> Option<Admission<RawFrame>> {
        if !self.analysis.is_enabled() {
            debug!("Analysis disabled, releasing frame");
            drop(frame);
            return None;
        }
        Some(self.gate.admit(frame))
    }

    /// Runs an already admitted frame to completion and releases it.
    pub fn process(
        &self,
        in_flight: InFlight<RawFrame>,
        on_result: impl FnOnce(&ClassificationResult),
    ) -> Outcome {
        self.finish(in_flight, on_result)
    }

    /// Cancels whatever frame is in flight: it delivers no result.
    ///
    /// New frames are still dropped until the cancelled one has left the engine.
    pub fn cancel(&self) {
        if self.gate.reset() {
            info!("Cancelling in-flight classification");
        }
    }

    /// Cancels one admission, identified by [`InFlight::ticket`], if it is still in flight.
    pub fn cancel_frame(&self, ticket: u64) -> bool {
        let cancelled = self.gate.cancel(ticket);
        if cancelled {
            info!("Cancelling in-flight classification");
        }
        cancelled
    }

    pub fn state(&self) -> PipelineState {
        self.gate.state()
    }

    pub fn gate_stats(&self) -> GateStats {
        self.gate.stats()
    }

    pub fn analysis(&self) -> &AnalysisSwitch {
        &self.analysis
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn engine(&self) -> &Arc<dyn InferenceEngine> {
        &self.engine
    }

    /// Returns information about the pipeline's configuration
    pub fn info(&self) -> PipelineInfo {
        PipelineInfo {
            input_shape: self.engine.input_shape(),
            num_labels: self.labels.len(),
            labels: self.labels.iter().map(str::to_string).collect(),
            preprocess: self.normalizer.config().clone(),
        }
    }

    fn finish<T: ImageSource>(
        &self,
        mut in_flight: InFlight<T>,
        on_result: impl FnOnce(&ClassificationResult),
    ) -> Outcome {
        let outcome = match self.execute(&mut in_flight) {
            Ok(Some(result)) => {
                on_result(&result);
                Outcome::Success(result)
            }
            Ok(None) => {
                debug!("Frame cancelled before completion");
                Outcome::Cancelled
            }
            Err(err) => {
                if err.is_fatal() {
                    error!("Classification failed: {}", err);
                } else {
                    warn!("Skipping frame: {}", err);
                }
                Outcome::Failed(err)
            }
        };
        in_flight.release();
        outcome
    }

    fn execute<T: ImageSource>(
        &self,
        in_flight: &mut InFlight<T>,
    ) -> Result<Option<ClassificationResult>, ClassifierError> {
        if !in_flight.advance(PipelineState::Preprocessing) {
            return Ok(None);
        }
        let tensor = match in_flight.frame() {
            Some(frame) => self.normalizer.normalize(&*frame.decode()?)?,
            None => return Err(ClassifierError::Preprocessing("Frame was already released".into())),
        };
        in_flight.release_frame();

        if !in_flight.advance(PipelineState::Inferring) {
            return Ok(None);
        }
        let scores = self.engine.infer(&tensor)?;

        if !in_flight.advance(PipelineState::Selecting) {
            return Ok(None);
        }
        let result = selector::select(&scores, &self.labels)?;

        if in_flight.is_cancelled() {
            return Ok(None);
        }
        debug!("Classified as '{}' ({:.3})", result.label, result.confidence);
        Ok(Some(result))
    }
}
