//! Error types shared by the worker core and both transports.

use std::path::PathBuf;

/// Failure raised by a speech synthesis backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthesisError {
    /// The model could not be loaded onto the requested device.
    #[error("model load failed: {0}")]
    Load(String),

    /// The requested speaker does not exist in the loaded model.
    #[error("unknown voice: {0}")]
    UnknownVoice(String),

    /// The job parameters are not usable by the backend.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Device memory or similar resource ran out during generation.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Any other failure inside the model.
    #[error("inference error: {0}")]
    Inference(String),
}

impl SynthesisError {
    /// Create a load error with message.
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    /// Create an invalid input error with message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an inference error with message.
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }
}

/// Why a single job failed. Carried inside a [`JobResult`](crate::worker::JobResult),
/// never propagated out of the serving loop.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobError {
    #[error("resource unavailable: model is not loaded")]
    ResourceUnavailable,

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// The synthesis task panicked or was torn down.
    #[error("synthesis aborted: {0}")]
    Aborted(String),

    /// The audio artifact could not be written.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Fatal start-up failure. Terminates the service.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Model(#[from] SynthesisError),

    #[error("failed to publish readiness marker {path}: {source}")]
    Marker {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
