//! TTS Worker - a persistent text-to-speech service.
//!
//! Loads a speech synthesis model once and keeps it resident, serving jobs
//! one at a time either from a filesystem queue (request/response
//! directories) or over HTTP. Jobs never overlap on the model, and every
//! accepted job yields exactly one success or failure outcome.

mod audio;
mod client;
mod config;
mod error;
mod queue;
mod server;
mod tts;
mod worker;

#[cfg(test)]
mod testing;

use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use config::{AppConfig, Command};
use queue::FileQueue;
use tts::DeviceSpec;
use worker::{Controller, PollPolicy, ReadinessMarker, ResourceHolder};

/// Wait for shutdown signal (Ctrl+C or SIGTERM), then cancel `shutdown`.
async fn wait_for_shutdown(shutdown: CancellationToken) {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, shutting down...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, shutting down...");
        }
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();
}

/// Open the log file for appending, creating it if needed.
fn open_log_file(path: &Path) -> Result<File> {
    std::fs::OpenOptions::new().create(true).append(true).open(path).with_context(|| format!("failed to open log file {}", path.display()))
}

/// Build the controller for a serving subcommand.
fn build_controller(config: &AppConfig) -> Result<Controller> {
    let loader = tts::loader_for(config)?;
    let device = DeviceSpec::for_provider(config.effective_provider());
    let resource = ResourceHolder::new(loader, device, ReadinessMarker::new(&config.ready_file));

    Ok(Controller::new(Arc::new(resource), config.job_defaults()).with_warmup(config.warmup_text.clone()))
}

async fn run(config: AppConfig) -> Result<()> {
    match &config.command {
        Command::Voices { name: Some(name) } => config::voices::print_voice_info(name),
        Command::Voices { name: None } => {
            config::voices::print_voices();
            Ok(())
        }
        Command::Submit(args) => client::submit(args).await,
        Command::Queue(args) => {
            config.log_config();
            let queue = FileQueue::open(&args.dirs.request_dir, &args.dirs.response_dir)?;
            let controller = build_controller(&config)?;
            tokio::spawn(wait_for_shutdown(controller.shutdown_token()));

            let policy = PollPolicy { interval: args.dirs.poll_interval(), error_backoff: args.error_backoff(), retention: args.response_retention() };
            controller.run_queue(queue, policy).await
        }
        Command::Serve(args) => {
            config.log_config();
            let addr = format!("{}:{}", args.host, args.port);
            let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("failed to bind {}", addr))?;
            let controller = build_controller(&config)?;
            tokio::spawn(wait_for_shutdown(controller.shutdown_token()));

            controller.run_http(listener).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let config = AppConfig::from_args();

    // Initialize logging with time-only format
    // Respect RUST_LOG env var, fallback to verbose flag, default to info
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| if config.verbose { EnvFilter::try_new("debug") } else { EnvFilter::try_new("info") })
        .unwrap();

    let (log_file, log_file_error) = match config.log_file.as_deref().map(open_log_file).transpose() {
        Ok(file) => (file, None),
        Err(e) => (None, Some(e)),
    };

    // The file gets full dates and no color codes
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_timer(LocalTime::new(time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]")))
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]"))))
        .with(file_layer)
        .init();

    if let Some(e) = log_file_error {
        error!("❌ {:#}", e);
        std::process::exit(1);
    }

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }

    if matches!(config.command, Command::Queue(_) | Command::Serve(_)) {
        info!("🔊 TTS Worker v{}", env!("CARGO_PKG_VERSION"));
    }

    if let Err(e) = run(config).await {
        error!("❌ {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
