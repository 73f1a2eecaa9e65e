//! Text-to-speech backends.
//!
//! The worker treats the model as an opaque, synchronous capability: given
//! text and voice parameters it returns a mono waveform and its sample rate.
//! Every backend implements [`SpeechSynthesizer`], and is constructed by a
//! [`SynthesizerLoader`] so that the expensive load happens exactly once.

#[cfg(feature = "kokoro")]
mod kokoro;
mod tone;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, Backend, Provider};
use crate::error::SynthesisError;

#[cfg(feature = "kokoro")]
pub use kokoro::KokoroLoader;
pub use tone::ToneLoader;

/// Parameters for one synthesis call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub language: String,
    pub speaker: String,
    pub instruct: String,
    pub max_new_tokens: u32,
}

/// Mono audio produced by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    /// Duration in seconds (`samples / sample_rate`).
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Numeric precision the model runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Float32,
    Int8,
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precision::Float32 => write!(f, "float32"),
            Precision::Int8 => write!(f, "int8"),
        }
    }
}

/// Target compute device and the precision chosen for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub provider: Provider,
    pub precision: Precision,
}

impl DeviceSpec {
    /// Pick the precision appropriate for a provider: quantized weights on
    /// CPU, full precision on accelerators.
    pub fn for_provider(provider: Provider) -> Self {
        let precision = match provider {
            Provider::Cpu => Precision::Int8,
            Provider::Cuda | Provider::CoreMl => Precision::Float32,
        };
        Self { provider, precision }
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.provider, self.precision)
    }
}

/// A loaded model. Calls are synchronous and may take seconds.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<Waveform, SynthesisError>;
}

/// Performs the one-time, expensive model load.
pub trait SynthesizerLoader: Send + Sync {
    /// Human-readable model name.
    fn model_name(&self) -> String;

    fn load(&self, device: &DeviceSpec) -> Result<Arc<dyn SpeechSynthesizer>, SynthesisError>;
}

/// Build the loader for the configured backend.
pub fn loader_for(config: &AppConfig) -> anyhow::Result<Box<dyn SynthesizerLoader>> {
    match config.backend {
        Backend::Tone => Ok(Box::new(ToneLoader)),
        #[cfg(feature = "kokoro")]
        Backend::Kokoro => Ok(Box::new(KokoroLoader::new(config))),
        #[cfg(not(feature = "kokoro"))]
        Backend::Kokoro => anyhow::bail!("Kokoro backend not enabled. Rebuild with --features kokoro"),
    }
}
