//! The serialized critical section around the synthesis call.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::JobError;
use crate::worker::{Job, JobResult, ResourceHolder};

/// Runs jobs against the shared model, one at a time.
///
/// Both transports go through the same processor, so synthesis calls never
/// overlap no matter how many callers are waiting. Waiters are served in
/// arrival order (the gate is a fair mutex).
pub struct JobProcessor {
    resource: Arc<ResourceHolder>,
    gate: Arc<Mutex<()>>,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl JobProcessor {
    pub fn new(resource: Arc<ResourceHolder>) -> Self {
        Self { resource, gate: Arc::new(Mutex::new(())), succeeded: AtomicU64::new(0), failed: AtomicU64::new(0) }
    }

    pub fn resource(&self) -> &Arc<ResourceHolder> {
        &self.resource
    }

    /// Process one job. Never fails: every error becomes a failure result.
    ///
    /// Once the synthesis call has started it runs to completion even if the
    /// returned future is dropped, and it keeps the gate until then.
    pub async fn process(&self, job: &Job) -> JobResult {
        let turn = Arc::clone(&self.gate).lock_owned().await;

        let Some(synthesizer) = self.resource.handle() else {
            warn!("Job {} rejected: model not loaded", job.id);
            self.failed.fetch_add(1, Ordering::Relaxed);
            return JobResult::rejected(job.id.clone(), JobError::ResourceUnavailable);
        };

        info!("🎵 Job {}: \"{}\" ({}, {})", job.id, job.preview(), job.request.language, job.request.speaker);

        let request = job.request.clone();
        let started = Instant::now();
        let joined = tokio::task::spawn_blocking(move || {
            let _turn = turn;
            synthesizer.synthesize(&request)
        })
        .await;
        let generation_time = started.elapsed();

        let outcome = match joined {
            Ok(Ok(waveform)) => Ok(waveform),
            Ok(Err(e)) => Err(JobError::Synthesis(e)),
            Err(e) => Err(JobError::Aborted(e.to_string())),
        };

        match &outcome {
            Ok(waveform) => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
                info!(
                    "✅ Job {} generated {:.2}s of audio in {:.2}s",
                    job.id,
                    waveform.duration(),
                    generation_time.as_secs_f64()
                );
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!("❌ Job {} failed after {:.2}s: {}", job.id, generation_time.as_secs_f64(), e);
            }
        }

        JobResult { job_id: job.id.clone(), outcome, generation_time }
    }

    /// Wait until no synthesis call is running.
    pub async fn drain(&self) {
        let _turn = self.gate.lock().await;
    }

    /// Record a job that failed before reaching the processor (e.g. malformed input).
    pub fn record_rejection(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
