//! Jobs: one synthesis request with its identifier and artifact location.

use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::tts::SynthesisRequest;

/// Identifiers supplied by callers must be safe to use as file names.
static ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").expect("valid job id pattern"));

/// Identifier of a job. Responses and artifacts are keyed by it, so a job
/// delivered twice maps onto the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId(String);

impl JobId {
    /// Validate a caller-supplied identifier.
    pub fn parse(id: &str) -> Result<Self, JobError> {
        if ID_PATTERN.is_match(id) {
            Ok(Self(id.to_string()))
        } else {
            Err(JobError::InvalidJob(format!("job id '{}' must match {}", id, ID_PATTERN.as_str())))
        }
    }

    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Use a request file's stem as-is; the file already lives in the queue directory.
    pub(crate) fn from_stem(stem: &str) -> Self {
        Self(stem.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job description as submitted by callers. Only `text` is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequest {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruct: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
}

/// Values for the optional job fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDefaults {
    pub language: String,
    pub speaker: String,
    pub instruct: String,
    pub max_new_tokens: u32,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self { language: "English".to_string(), speaker: "af_bella".to_string(), instruct: String::new(), max_new_tokens: 2048 }
    }
}

/// An accepted job. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: JobId,
    pub request: SynthesisRequest,
    pub output_path: Option<PathBuf>,
}

impl Job {
    pub fn new(id: JobId, request: JobRequest, defaults: &JobDefaults) -> Self {
        let JobRequest { text, language, speaker, instruct, output_path, max_new_tokens } = request;
        Self {
            id,
            request: SynthesisRequest {
                text,
                language: language.unwrap_or_else(|| defaults.language.clone()),
                speaker: speaker.unwrap_or_else(|| defaults.speaker.clone()),
                instruct: instruct.unwrap_or_else(|| defaults.instruct.clone()),
                max_new_tokens: max_new_tokens.unwrap_or(defaults.max_new_tokens),
            },
            output_path,
        }
    }

    /// Parse a JSON job description. Unparsable input or missing required
    /// fields become an [`JobError::InvalidJob`] naming the problem.
    pub fn parse(id: JobId, json: &[u8], defaults: &JobDefaults) -> Result<Self, JobError> {
        let request: JobRequest = serde_json::from_slice(json).map_err(|e| JobError::InvalidJob(e.to_string()))?;
        Ok(Self::new(id, request, defaults))
    }

    /// First characters of the text, for log lines.
    pub fn preview(&self) -> String {
        let mut preview: String = self.request.text.chars().take(50).collect();
        if self.request.text.chars().count() > 50 {
            preview.push_str("...");
        }
        preview
    }
}
