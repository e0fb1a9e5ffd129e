use ort::Error as OrtError;

use crate::bundle::BundleError;

/// Broad category of a [`ClassifierError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ModelLoad,
    Preprocessing,
    Inference,
    Configuration,
}

/// Represents the different types of errors that can occur in the classification pipeline.
///
/// `ModelLoad` and `Configuration` are fatal: they are raised while the pipeline is
/// being built and mean it cannot serve. `Preprocessing` and `Inference` are scoped
/// to a single frame; the frame is skipped and streaming continues.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    /// The model artifact could not be read, verified or deserialized
    #[error("Model load error: {0}")]
    ModelLoad(String),
    /// The image could not be turned into a tensor
    #[error("Preprocessing error: {0}")]
    Preprocessing(String),
    /// The forward pass failed or produced unusable scores
    #[error("Inference error: {0}")]
    Inference(String),
    /// Model, label table and tensor shape do not agree
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClassifierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ModelLoad(_) => ErrorKind::ModelLoad,
            Self::Preprocessing(_) => ErrorKind::Preprocessing,
            Self::Inference(_) => ErrorKind::Inference,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Fatal errors abort pipeline construction; the rest only cost one frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::ModelLoad | ErrorKind::Configuration)
    }
}

impl From<OrtError> for ClassifierError {
    fn from(err: OrtError) -> Self {
        ClassifierError::ModelLoad(err.to_string())
    }
}

impl From<BundleError> for ClassifierError {
    fn from(err: BundleError) -> Self {
        ClassifierError::ModelLoad(err.to_string())
    }
}
