//! Kokoro multi-lang synthesis through sherpa-rs.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use sherpa_rs::OnnxConfig;
use sherpa_rs::tts::{CommonTtsConfig, KokoroTts, KokoroTtsConfig};
use tracing::{debug, info, warn};

use super::{DeviceSpec, Precision, SpeechSynthesizer, SynthesisRequest, SynthesizerLoader, Waveform};
use crate::config::AppConfig;
use crate::config::voices::{self, Language, Voice};
use crate::error::SynthesisError;

/// Kokoro always produces 24 kHz audio.
const SAMPLE_RATE: u32 = 24000;

const MODEL_DIR_NAME: &str = "kokoro-multi-lang-v1_0";

/// Loads a Kokoro model configured for the family of the default speaker.
pub struct KokoroLoader {
    dir: PathBuf,
    voice: String,
    threads: i32,
    speed: f32,
    debug: bool,
}

impl KokoroLoader {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            dir: config.model_dir.join("tts").join(MODEL_DIR_NAME),
            voice: config.default_speaker.clone(),
            threads: config.tts_threads.try_into().unwrap_or(2),
            speed: config.tts_speed,
            debug: config.verbose,
        }
    }

    /// Files that must exist before loading.
    pub fn required_files(&self) -> Vec<PathBuf> {
        vec![self.model_path(Precision::Float32), self.dir.join("voices.bin"), self.dir.join("tokens.txt")]
    }

    /// Quantized weights are used on CPU when present.
    fn model_path(&self, precision: Precision) -> PathBuf {
        let int8 = self.dir.join("model.int8.onnx");
        if precision == Precision::Int8 {
            if int8.exists() {
                return int8;
            }
            warn!("No int8 model at {}, falling back to float32 weights", int8.display());
        }
        self.dir.join("model.onnx")
    }

    /// Lexicon files for English and Chinese voices; other languages go through espeak-ng.
    fn lexicon(&self, language: Language) -> String {
        let lexicon = |name: &str| self.dir.join(name).to_string_lossy().to_string();
        match language {
            Language::AmericanEnglish => lexicon("lexicon-us-en.txt"),
            Language::BritishEnglish => lexicon("lexicon-gb-en.txt"),
            // Chinese with English fallback
            Language::Mandarin => format!("{},{}", lexicon("lexicon-us-en.txt"), lexicon("lexicon-zh.txt")),
            _ => String::new(),
        }
    }

    /// espeak-ng language for voices without a lexicon.
    fn espeak_lang(language: Language) -> &'static str {
        match language {
            Language::AmericanEnglish | Language::BritishEnglish | Language::Mandarin => "",
            other => other.espeak_code(),
        }
    }
}

impl SynthesizerLoader for KokoroLoader {
    fn model_name(&self) -> String {
        MODEL_DIR_NAME.to_string()
    }

    fn load(&self, device: &DeviceSpec) -> Result<Arc<dyn SpeechSynthesizer>, SynthesisError> {
        let voice = voices::get_voice(&self.voice).ok_or_else(|| SynthesisError::UnknownVoice(self.voice.clone()))?;

        for path in self.required_files() {
            if !path.exists() {
                return Err(SynthesisError::load(format!("required model file not found: {}", path.display())));
            }
        }

        info!("Initializing Kokoro TTS with {} provider", device.provider);
        info!("Voice family: {} (default voice {})", voice.language.name(), voice.name);

        let config = KokoroTtsConfig {
            model: self.model_path(device.precision).to_string_lossy().to_string(),
            voices: self.dir.join("voices.bin").to_string_lossy().to_string(),
            tokens: self.dir.join("tokens.txt").to_string_lossy().to_string(),
            data_dir: self.dir.join("espeak-ng-data").to_string_lossy().to_string(),
            dict_dir: self.dir.join("dict").to_string_lossy().to_string(),
            lexicon: self.lexicon(voice.language),
            lang: Self::espeak_lang(voice.language).to_string(),
            length_scale: 1.0 / self.speed, // length_scale is inverse of speed
            onnx_config: OnnxConfig {
                provider: device.provider.as_sherpa_provider().to_string(),
                num_threads: self.threads,
                debug: self.debug,
            },
            common_config: CommonTtsConfig { max_num_sentences: 1, ..Default::default() }, // Kokoro only supports 1
        };

        let tts = KokoroTts::new(config);

        Ok(Arc::new(KokoroSynthesizer { tts: Mutex::new(tts), family: voice.language, speed: self.speed }))
    }
}

/// A loaded Kokoro model.
pub struct KokoroSynthesizer {
    tts: Mutex<KokoroTts>, // sherpa needs exclusive access per call
    family: Language,      // Voice family the lexicon was loaded for
    speed: f32,
}

impl KokoroSynthesizer {
    fn resolve_voice(&self, request: &SynthesisRequest) -> Result<Voice, SynthesisError> {
        let voice = voices::get_voice(&request.speaker).ok_or_else(|| SynthesisError::UnknownVoice(request.speaker.clone()))?;

        if voice.language != self.family {
            return Err(SynthesisError::invalid_input(format!(
                "voice '{}' is {}, but the model was loaded for {} voices",
                voice.name,
                voice.language.name(),
                self.family.name()
            )));
        }

        if !voice.language.accepts(&request.language) {
            return Err(SynthesisError::invalid_input(format!("voice '{}' speaks {}, not {}", voice.name, voice.language.name(), request.language)));
        }

        Ok(voice)
    }
}

impl SpeechSynthesizer for KokoroSynthesizer {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<Waveform, SynthesisError> {
        let voice = self.resolve_voice(request)?;

        if !request.instruct.is_empty() {
            debug!("Kokoro has no style control, ignoring instruction \"{}\"", request.instruct);
        }

        if request.text.trim().is_empty() {
            return Ok(Waveform::new(Vec::new(), SAMPLE_RATE));
        }

        let audio = self
            .tts
            .lock()
            .create(&request.text, voice.speaker_id, self.speed)
            .map_err(|e| SynthesisError::inference(format!("TTS generation failed: {}", e)))?;

        debug!("Generated {} samples with voice {}", audio.samples.len(), voice.name);
        Ok(Waveform::new(audio.samples, SAMPLE_RATE))
    }
}
