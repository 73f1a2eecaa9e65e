//! The outcome of processing one job.

use std::time::Duration;

use crate::error::JobError;
use crate::tts::Waveform;
use crate::worker::JobId;

/// Exactly one per accepted job. Never mutated after creation.
#[derive(Debug)]
pub struct JobResult {
    pub job_id: JobId,
    pub outcome: Result<Waveform, JobError>,
    /// Time spent inside the synthesis call.
    pub generation_time: Duration,
}

impl JobResult {
    /// A failure that never reached the synthesis capability.
    pub fn rejected(job_id: JobId, error: JobError) -> Self {
        Self { job_id, outcome: Err(error), generation_time: Duration::ZERO }
    }
}
