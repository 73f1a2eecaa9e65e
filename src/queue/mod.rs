//! Filesystem job queue.
//!
//! A job is a JSON file in the request directory; its outcome is a JSON file
//! with the same name in the response directory. The request file is removed
//! only after the outcome file is in place, so delivery is at-least-once.

mod fs;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use fs::{FileQueue, Intake, PendingJob};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Outcome file contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Seconds of audio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Seconds spent synthesizing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OutcomeRecord {
    pub fn success(output_path: PathBuf, sample_rate: u32, duration: f64, generation_time: f64) -> Self {
        Self {
            status: Status::Success,
            output_path: Some(output_path),
            sample_rate: Some(sample_rate),
            duration: Some(duration),
            generation_time: Some(generation_time),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: Status::Error, output_path: None, sample_rate: None, duration: None, generation_time: None, error: Some(message.into()) }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
