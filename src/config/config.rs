//! Application configuration and CLI argument parsing.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::worker::JobDefaults;

/// Hardware acceleration provider for the model.
/// Auto-detected based on platform if not specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// CPU inference (default fallback, always available)
    #[default]
    Cpu,
    /// NVIDIA CUDA acceleration (Linux only, requires CUDA toolkit)
    Cuda,
    /// Apple CoreML acceleration (macOS only, uses Neural Engine)
    #[value(name = "coreml")]
    #[serde(rename = "coreml")]
    CoreMl,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sherpa_provider())
    }
}

impl Provider {
    /// Provider string compatible with sherpa-rs.
    pub fn as_sherpa_provider(&self) -> &'static str {
        match self {
            Provider::Cpu => "cpu",
            Provider::Cuda => "cuda",
            Provider::CoreMl => "coreml",
        }
    }
}

/// Synthesis backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Kokoro multi-lang model through sherpa-rs (needs the `kokoro` feature)
    Kokoro,
    /// Built-in tone generator, for trying the service without model files
    #[default]
    Tone,
}

/// TTS worker configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "tts-worker")]
#[command(author, version, about = "A persistent text-to-speech worker", long_about = None)]
pub struct AppConfig {
    /// Directory containing model files
    #[arg(long, short = 'd', env = "MODEL_DIR", default_value_os_t = default_model_dir(), global = true)]
    pub model_dir: PathBuf,

    /// Synthesis backend
    #[arg(long, value_enum, env = "TTS_BACKEND", default_value = "tone", global = true)]
    pub backend: Backend,

    /// Hardware acceleration provider (auto-detected if not specified)
    #[arg(long, value_enum, env = "TTS_PROVIDER", global = true)]
    pub provider: Option<Provider>,

    /// Model threads (0 = auto-detect based on CPU cores)
    #[arg(long, default_value = "0", global = true)]
    pub tts_threads: usize,

    /// Speech speed multiplier
    #[arg(long, default_value = "1.0", global = true)]
    pub tts_speed: f32,

    /// Language used when a job does not name one
    #[arg(long, env = "TTS_DEFAULT_LANGUAGE", default_value = "English", global = true)]
    pub default_language: String,

    /// Speaker used when a job does not name one
    #[arg(long, env = "TTS_DEFAULT_SPEAKER", default_value = "af_bella", global = true)]
    pub default_speaker: String,

    /// Style instruction used when a job does not give one
    #[arg(long, env = "TTS_DEFAULT_INSTRUCT", default_value = "", global = true)]
    pub default_instruct: String,

    /// Generation limit used when a job does not give one
    #[arg(long, default_value = "2048", global = true)]
    pub default_max_new_tokens: u32,

    /// Readiness marker written once the model is loaded
    #[arg(long, env = "TTS_READY_FILE", default_value_os_t = std::env::temp_dir().join("tts_worker_ready"), global = true)]
    pub ready_file: PathBuf,

    /// Text synthesized once after loading to warm up the model
    #[arg(long, global = true)]
    pub warmup_text: Option<String>,

    /// Enable verbose logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Also append logs to this file
    #[arg(long, env = "TTS_LOG_FILE", global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve jobs dropped as JSON files into a request directory
    Queue(QueueArgs),
    /// Serve jobs over HTTP
    Serve(ServeArgs),
    /// Submit one job to a running worker and wait for the outcome
    Submit(SubmitArgs),
    /// List the Kokoro voices, or show one voice
    Voices {
        /// Voice to describe
        name: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct QueueDirs {
    /// Directory the worker polls for job files
    #[arg(long, env = "TTS_REQUEST_DIR", default_value_os_t = std::env::temp_dir().join("tts_requests"))]
    pub request_dir: PathBuf,

    /// Directory the worker writes outcome files to
    #[arg(long, env = "TTS_RESPONSE_DIR", default_value_os_t = std::env::temp_dir().join("tts_responses"))]
    pub response_dir: PathBuf,

    /// Idle pause between polls when nothing is pending (milliseconds)
    #[arg(long, default_value = "100")]
    pub poll_interval_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct QueueArgs {
    #[command(flatten)]
    pub dirs: QueueDirs,

    /// Pause after an unexpected error in the serving loop (milliseconds)
    #[arg(long, default_value = "1000")]
    pub error_backoff_ms: u64,

    /// Remove outcomes nobody collected after this long, 0 keeps them (seconds)
    #[arg(long, default_value = "86400")]
    pub response_retention_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "TTS_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind
    #[arg(long, short = 'p', env = "TTS_PORT", default_value = "8000")]
    pub port: u16,
}

#[derive(Args, Debug, Clone)]
pub struct SubmitArgs {
    /// Text to synthesize
    #[arg(long, short = 't')]
    pub text: String,

    #[arg(long)]
    pub language: Option<String>,

    #[arg(long)]
    pub speaker: Option<String>,

    #[arg(long)]
    pub instruct: Option<String>,

    #[arg(long)]
    pub max_new_tokens: Option<u32>,

    /// Where the WAV file should end up
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    /// Job identifier (a UUID is generated when absent)
    #[arg(long)]
    pub id: Option<String>,

    /// Submit over HTTP to this base URL instead of the filesystem queue
    #[arg(long)]
    pub url: Option<String>,

    /// Give up waiting after this many seconds
    #[arg(long, default_value = "300")]
    pub timeout_secs: u64,

    #[command(flatten)]
    pub dirs: QueueDirs,
}

impl QueueDirs {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl QueueArgs {
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn response_retention(&self) -> Option<Duration> {
        (self.response_retention_secs > 0).then(|| Duration::from_secs(self.response_retention_secs))
    }
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        let mut config = Self::parse();
        config.normalize_thread_counts();
        config
    }

    /// Auto-detect the model thread count.
    ///
    /// With CUDA the GPU handles parallelism, so a single CPU thread avoids
    /// contention. On CPU the worker is the only heavy user of the machine and
    /// takes half of the cores.
    fn normalize_thread_counts(&mut self) {
        if self.tts_threads == 0 {
            self.tts_threads = if self.effective_provider() == Provider::Cuda { 1 } else { (num_cpus::get() / 2).max(1) };
        }
    }

    /// Get the effective provider.
    pub fn effective_provider(&self) -> Provider {
        self.provider.unwrap_or_else(detect_provider)
    }

    /// Defaults applied to fields a job leaves out.
    pub fn job_defaults(&self) -> JobDefaults {
        JobDefaults {
            language: self.default_language.clone(),
            speaker: self.default_speaker.clone(),
            instruct: self.default_instruct.clone(),
            max_new_tokens: self.default_max_new_tokens,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.tts_speed <= 0.0 {
            anyhow::bail!("TTS speed must be positive");
        }

        if self.default_max_new_tokens == 0 {
            anyhow::bail!("Default max_new_tokens must be positive");
        }

        match &self.command {
            Command::Queue(args) if args.dirs.poll_interval_ms == 0 => anyhow::bail!("Poll interval must be positive"),
            Command::Submit(args) if args.url.is_none() && args.dirs.poll_interval_ms == 0 => anyhow::bail!("Poll interval must be positive"),
            _ => {}
        }

        // Model files only matter to the process that loads the model
        if matches!(self.command, Command::Queue(_) | Command::Serve(_)) && self.backend == Backend::Kokoro {
            self.validate_kokoro()?;
        }

        Ok(())
    }

    #[cfg(feature = "kokoro")]
    fn validate_kokoro(&self) -> Result<()> {
        if !self.model_dir.exists() {
            anyhow::bail!("Model directory does not exist: {}", self.model_dir.display());
        }

        for path in crate::tts::KokoroLoader::new(self).required_files() {
            if !path.exists() {
                anyhow::bail!("Required model file not found: {}", path.display());
            }
        }

        if crate::config::voices::get_voice(&self.default_speaker).is_none() {
            anyhow::bail!("Default speaker '{}' is not a Kokoro voice", self.default_speaker);
        }

        Ok(())
    }

    #[cfg(not(feature = "kokoro"))]
    fn validate_kokoro(&self) -> Result<()> {
        anyhow::bail!("Kokoro backend not enabled. Rebuild with --features kokoro")
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        info!("Configuration:");
        info!("  Backend: {:?}", self.backend);
        info!("  Model directory: {}", self.model_dir.display());
        info!("  Provider: {}", self.effective_provider());
        info!("  Threads: {}", self.tts_threads);
        info!("  Default language: {}", self.default_language);
        info!("  Default speaker: {}", self.default_speaker);
        info!("  Default max_new_tokens: {}", self.default_max_new_tokens);
        info!("  Readiness marker: {}", self.ready_file.display());
        if let Some(path) = &self.log_file {
            info!("  Log file: {}", path.display());
        }
        match &self.command {
            Command::Queue(args) => {
                info!("  Request directory: {}", args.dirs.request_dir.display());
                info!("  Response directory: {}", args.dirs.response_dir.display());
                info!("  Poll interval: {}ms", args.dirs.poll_interval_ms);
                match args.response_retention() {
                    Some(retention) => info!("  Uncollected outcomes kept for: {}s", retention.as_secs()),
                    None => info!("  Uncollected outcomes kept forever"),
                }
            }
            Command::Serve(args) => {
                info!("  Listen address: {}:{}", args.host, args.port);
            }
            _ => {}
        }
    }
}

/// Get the default model directory (~/.tts-worker/models).
fn default_model_dir() -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        home_dir.join(".tts-worker").join("models")
    } else {
        PathBuf::from("models")
    }
}

/// Auto-detect the best hardware acceleration provider.
fn detect_provider() -> Provider {
    #[cfg(target_os = "macos")]
    {
        Provider::CoreMl
    }

    #[cfg(target_os = "linux")]
    {
        if has_nvidia_gpu() { Provider::Cuda } else { Provider::Cpu }
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Provider::Cpu
    }
}

/// Check if an NVIDIA GPU is available (Linux only).
#[cfg(target_os = "linux")]
fn has_nvidia_gpu() -> bool {
    use std::path::Path;

    let nvidia_paths = [
        "/dev/nvidia0",
        "/dev/nvidiactl",
        "/dev/nvidia-uvm",
        // Jetson devices
        "/dev/nvhost-ctrl",
        "/dev/nvhost-ctrl-gpu",
        "/etc/nv_tegra_release",
    ];

    nvidia_paths.iter().any(|path| Path::new(path).exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_defaults() {
        let config = AppConfig::try_parse_from(["tts-worker", "queue"]).unwrap();
        assert_eq!(config.backend, Backend::Tone);
        let Command::Queue(args) = &config.command else { panic!("expected queue command") };
        assert_eq!(args.dirs.poll_interval(), Duration::from_millis(100));
        assert_eq!(args.error_backoff(), Duration::from_secs(1));
        assert!(args.dirs.request_dir.ends_with("tts_requests"));
        assert_eq!(args.response_retention(), Some(Duration::from_secs(86400)));
        assert!(config.log_file.is_none());

        let defaults = config.job_defaults();
        assert_eq!(defaults.language, "English");
        assert_eq!(defaults.speaker, "af_bella");
        assert_eq!(defaults.max_new_tokens, 2048);
        config.validate().unwrap();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let config = AppConfig::try_parse_from(["tts-worker", "serve", "--port", "9000", "--provider", "cpu", "--tts-threads", "3"]).unwrap();
        let Command::Serve(args) = &config.command else { panic!("expected serve command") };
        assert_eq!(args.port, 9000);
        assert_eq!(config.effective_provider(), Provider::Cpu);
        assert_eq!(config.tts_threads, 3);
    }

    #[test]
    fn test_log_file_and_retention_flags() {
        let config = AppConfig::try_parse_from(["tts-worker", "queue", "--log-file", "/var/log/tts.log", "--response-retention-secs", "0"]).unwrap();
        assert_eq!(config.log_file.as_deref(), Some(std::path::Path::new("/var/log/tts.log")));
        let Command::Queue(args) = &config.command else { panic!("expected queue command") };
        assert_eq!(args.response_retention(), None);
    }

    #[test]
    fn test_validate_rejects_zero_poll_interval() {
        let config = AppConfig::try_parse_from(["tts-worker", "queue", "--poll-interval-ms", "0"]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_speed() {
        let config = AppConfig::try_parse_from(["tts-worker", "--tts-speed", "0", "queue"]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_submit_requires_text_and_output() {
        assert!(AppConfig::try_parse_from(["tts-worker", "submit", "--text", "hi"]).is_err());
        let config = AppConfig::try_parse_from(["tts-worker", "submit", "-t", "hi", "-o", "out.wav", "--url", "http://localhost:8000"]).unwrap();
        let Command::Submit(args) = &config.command else { panic!("expected submit command") };
        assert_eq!(args.timeout_secs, 300);
        assert_eq!(args.url.as_deref(), Some("http://localhost:8000"));
    }
}
