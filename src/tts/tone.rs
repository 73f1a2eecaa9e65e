//! Deterministic tone generator.
//!
//! Stands in for a real model when running the service without model files:
//! every job yields a sine tone whose length follows the text length.

use std::f32::consts::PI;
use std::sync::Arc;

use tracing::debug;

use super::{DeviceSpec, SpeechSynthesizer, SynthesisRequest, SynthesizerLoader, Waveform};
use crate::error::SynthesisError;

/// Output sample rate, matching the Kokoro backend.
const SAMPLE_RATE: u32 = 24000;

/// Seconds of audio per input character.
const SECONDS_PER_CHAR: f32 = 0.06;

/// Codec frame rate used to turn a token budget into a duration cap.
const FRAMES_PER_SECOND: f32 = 12.0;

const FREQUENCY_HZ: f32 = 220.0;
const AMPLITUDE: f32 = 0.2;

/// Loader for [`ToneSynthesizer`]. Loading is instant.
pub struct ToneLoader;

impl SynthesizerLoader for ToneLoader {
    fn model_name(&self) -> String {
        "tone-generator".to_string()
    }

    fn load(&self, device: &DeviceSpec) -> Result<Arc<dyn SpeechSynthesizer>, SynthesisError> {
        debug!("Tone generator ignores device {}", device);
        Ok(Arc::new(ToneSynthesizer))
    }
}

pub struct ToneSynthesizer;

impl SpeechSynthesizer for ToneSynthesizer {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<Waveform, SynthesisError> {
        let chars = request.text.chars().count() as f32;
        let cap = request.max_new_tokens as f32 / FRAMES_PER_SECOND;
        let seconds = (chars * SECONDS_PER_CHAR).min(cap);
        let count = (seconds * SAMPLE_RATE as f32) as usize;

        let step = 2.0 * PI * FREQUENCY_HZ / SAMPLE_RATE as f32;
        let samples = (0..count).map(|i| AMPLITUDE * (step * i as f32).sin()).collect();

        Ok(Waveform::new(samples, SAMPLE_RATE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;

    fn request(text: &str, max_new_tokens: u32) -> SynthesisRequest {
        SynthesisRequest {
            text: text.to_string(),
            language: "English".to_string(),
            speaker: "af_bella".to_string(),
            instruct: String::new(),
            max_new_tokens,
        }
    }

    #[test]
    fn test_length_follows_text() {
        let synth = ToneLoader.load(&DeviceSpec::for_provider(Provider::Cpu)).unwrap();
        let wave = synth.synthesize(&request("Hello", 2048)).unwrap();
        assert_eq!(wave.sample_rate, SAMPLE_RATE);
        assert!((wave.duration() - 0.3).abs() < 0.01);
        assert!(wave.samples.iter().all(|s| s.abs() <= AMPLITUDE));
    }

    #[test]
    fn test_token_budget_caps_duration() {
        let synth = ToneSynthesizer;
        let long = "a".repeat(1000);
        let wave = synth.synthesize(&request(&long, 12)).unwrap();
        assert!((wave.duration() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_text_is_silent() {
        let wave = ToneSynthesizer.synthesize(&request("", 2048)).unwrap();
        assert!(wave.samples.is_empty());
    }
}
