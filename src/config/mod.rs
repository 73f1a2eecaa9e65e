//! Configuration module for the TTS worker.
//!
//! Provides CLI argument parsing, configuration management and the voice table.

#[allow(clippy::module_inception)]
mod config;
pub mod voices;

pub use config::{AppConfig, Backend, Command, Provider, SubmitArgs};
