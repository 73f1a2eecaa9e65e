//! Fake synthesis backends for tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::SynthesisError;
use crate::tts::{DeviceSpec, SpeechSynthesizer, SynthesisRequest, SynthesizerLoader, Waveform};

/// Returns a fixed waveform, optionally slowly, and records when each call ran.
pub struct FakeSynth {
    samples: usize,
    sample_rate: u32,
    delay: Duration,
    fail_on: Option<String>,
    started: AtomicUsize,
    calls: Mutex<Vec<(Instant, Instant)>>,
}

impl FakeSynth {
    pub fn new(samples: usize, sample_rate: u32) -> Self {
        Self { samples, sample_rate, delay: Duration::ZERO, fail_on: None, started: AtomicUsize::new(0), calls: Mutex::new(Vec::new()) }
    }

    /// 16000 samples at 16 kHz.
    pub fn one_second() -> Arc<Self> {
        Arc::new(Self::new(16000, 16000))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every call whose text equals `text`.
    pub fn failing_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }

    /// Number of calls that have entered `synthesize`.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// (start, end) of every finished call, in completion order.
    pub fn calls(&self) -> Vec<(Instant, Instant)> {
        self.calls.lock().clone()
    }
}

impl SpeechSynthesizer for FakeSynth {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<Waveform, SynthesisError> {
        let start = Instant::now();
        self.started.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.calls.lock().push((start, Instant::now()));

        if self.fail_on.as_deref() == Some(request.text.as_str()) {
            return Err(SynthesisError::ResourceExhausted("out of device memory".to_string()));
        }

        Ok(Waveform::new(vec![0.1; self.samples], self.sample_rate))
    }
}

/// Hands out a shared [`FakeSynth`], or fails to load.
pub struct FakeLoader {
    synth: Option<Arc<FakeSynth>>,
    loads: Arc<AtomicUsize>,
}

impl FakeLoader {
    pub fn new(synth: Arc<FakeSynth>) -> Self {
        Self { synth: Some(synth), loads: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn failing() -> Self {
        Self { synth: None, loads: Arc::new(AtomicUsize::new(0)) }
    }

    pub fn load_count(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }
}

impl SynthesizerLoader for FakeLoader {
    fn model_name(&self) -> String {
        "fake".to_string()
    }

    fn load(&self, _device: &DeviceSpec) -> Result<Arc<dyn SpeechSynthesizer>, SynthesisError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match &self.synth {
            Some(synth) => Ok(Arc::clone(synth) as Arc<dyn SpeechSynthesizer>),
            None => Err(SynthesisError::load("incompatible device")),
        }
    }
}
