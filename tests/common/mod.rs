#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use env_logger::{Builder, Env};
use plugscan::classifier::check_input_shape;
use plugscan::{
    ClassificationPipeline, ClassifierError, InferenceEngine, LabelTable, NormalizedTensor, PixelFormat,
    PreprocessConfig, ProbabilityVector, RawFrame, TensorShape,
};

// Initialize test logger
pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

/// Small single-channel input so tests stay fast.
pub fn small_config() -> PreprocessConfig {
    PreprocessConfig {
        input_size: 8,
        channels: 1,
        ..Default::default()
    }
}

pub fn small_shape() -> TensorShape {
    TensorShape::square(8, 1)
}

pub fn labels(n: usize) -> LabelTable {
    LabelTable::new((0..n).map(|i| format!("class_{}", i))).unwrap()
}

/// A gray frame whose release bumps `released`.
pub fn counted_frame(released: &Arc<AtomicUsize>, width: u32, height: u32) -> RawFrame {
    let released = Arc::clone(released);
    RawFrame::new(width, height, PixelFormat::Luma8, vec![128; (width * height) as usize]).with_release_hook(
        move || {
            released.fetch_add(1, Ordering::SeqCst);
        },
    )
}

pub fn pipeline_with(engine: Arc<dyn InferenceEngine>, n: usize) -> ClassificationPipeline {
    ClassificationPipeline::builder()
        .with_preprocess_config(small_config())
        .with_labels(labels(n))
        .with_engine(engine)
        .unwrap()
        .build()
        .unwrap()
}

/// Returns the same scores for every input.
pub struct FixedEngine {
    shape: TensorShape,
    scores: Vec<f32>,
    calls: AtomicUsize,
}

impl FixedEngine {
    pub fn new(shape: TensorShape, scores: Vec<f32>) -> Self {
        Self {
            shape,
            scores,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceEngine for FixedEngine {
    fn input_shape(&self) -> TensorShape {
        self.shape
    }

    fn output_len(&self) -> usize {
        self.scores.len()
    }

    fn infer(&self, tensor: &NormalizedTensor) -> Result<ProbabilityVector, ClassifierError> {
        check_input_shape(self.shape, tensor)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProbabilityVector::new(self.scores.clone()))
    }
}

/// Fails every forward pass.
pub struct FailingEngine {
    pub shape: TensorShape,
    pub len: usize,
}

impl InferenceEngine for FailingEngine {
    fn input_shape(&self) -> TensorShape {
        self.shape
    }

    fn output_len(&self) -> usize {
        self.len
    }

    fn infer(&self, _tensor: &NormalizedTensor) -> Result<ProbabilityVector, ClassifierError> {
        Err(ClassifierError::Inference("device lost".into()))
    }
}

/// Deterministic dense layer with fixed pseudo-random weights.
pub struct LinearEngine {
    pub shape: TensorShape,
    pub len: usize,
}

impl InferenceEngine for LinearEngine {
    fn input_shape(&self) -> TensorShape {
        self.shape
    }

    fn output_len(&self) -> usize {
        self.len
    }

    fn infer(&self, tensor: &NormalizedTensor) -> Result<ProbabilityVector, ClassifierError> {
        check_input_shape(self.shape, tensor)?;
        let scores: Vec<f32> = (0..self.len)
            .map(|k| {
                tensor
                    .view()
                    .iter()
                    .enumerate()
                    .map(|(i, v)| v * ((i * 31 + k * 17) % 97) as f32 / 97.0)
                    .sum::<f32>()
            })
            .collect();
        Ok(ProbabilityVector::new(scores))
    }
}

/// Announces each forward pass, then blocks until told to resume.
pub struct BlockingEngine {
    shape: TensorShape,
    scores: Vec<f32>,
    entered: Mutex<Sender<()>>,
    resume: Mutex<Receiver<()>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl BlockingEngine {
    /// Returns the engine, a receiver signalled on entry, and a sender that lets one call finish.
    pub fn new(shape: TensorShape, scores: Vec<f32>) -> (Self, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel();
        let engine = Self {
            shape,
            scores,
            entered: Mutex::new(entered_tx),
            resume: Mutex::new(resume_rx),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        };
        (engine, entered_rx, resume_tx)
    }

    /// Highest number of forward passes observed running at once.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl InferenceEngine for BlockingEngine {
    fn input_shape(&self) -> TensorShape {
        self.shape
    }

    fn output_len(&self) -> usize {
        self.scores.len()
    }

    fn infer(&self, _tensor: &NormalizedTensor) -> Result<ProbabilityVector, ClassifierError> {
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(running, Ordering::SeqCst);
        let _ = self.entered.lock().unwrap().send(());
        let resumed = self.resume.lock().unwrap().recv();
        self.active.fetch_sub(1, Ordering::SeqCst);
        resumed.map_err(|_| ClassifierError::Inference("resume channel closed".into()))?;
        Ok(ProbabilityVector::new(self.scores.clone()))
    }
}
