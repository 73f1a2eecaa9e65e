//! Directory-backed queue implementation.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::OutcomeRecord;
use crate::audio;
use crate::error::JobError;
use crate::worker::{Job, JobDefaults, JobId, JobRequest, JobResult};

/// What the worker found in a request file.
#[derive(Debug)]
pub enum Intake {
    /// A job to process.
    Fresh(Job),
    /// Unparsable or incomplete; answered with a failure right away.
    Malformed(JobError),
    /// An outcome from an earlier pass already exists; only cleanup is left.
    Answered,
}

/// A request file discovered by [`FileQueue::poll`].
#[derive(Debug)]
pub struct PendingJob {
    pub id: JobId,
    pub path: PathBuf,
    pub intake: Intake,
    modified: SystemTime,
}

/// Request and response directories shared by the worker and its clients.
#[derive(Debug, Clone)]
pub struct FileQueue {
    requests: PathBuf,
    responses: PathBuf,
}

impl FileQueue {
    /// Open the queue, creating both directories.
    pub fn open(requests: impl Into<PathBuf>, responses: impl Into<PathBuf>) -> Result<Self> {
        let queue = Self { requests: requests.into(), responses: responses.into() };
        for dir in [&queue.requests, &queue.responses] {
            std::fs::create_dir_all(dir).with_context(|| format!("failed to create queue directory {}", dir.display()))?;
        }
        Ok(queue)
    }

    pub fn request_path(&self, id: &JobId) -> PathBuf {
        self.requests.join(format!("{}.json", id))
    }

    pub fn response_path(&self, id: &JobId) -> PathBuf {
        self.responses.join(format!("{}.json", id))
    }

    /// Where audio goes when the job names no `output_path`.
    pub fn default_artifact_path(&self, id: &JobId) -> PathBuf {
        self.responses.join(format!("{}.wav", id))
    }

    /// List pending request files, oldest first.
    ///
    /// # Errors
    /// Returns an error only if the request directory cannot be listed; a bad
    /// individual file becomes [`Intake::Malformed`].
    pub fn poll(&self, defaults: &JobDefaults) -> Result<Vec<PendingJob>> {
        let entries = std::fs::read_dir(&self.requests).with_context(|| format!("failed to list {}", self.requests.display()))?;

        let mut pending = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            let Some(stem) = job_stem(&path) else { continue };
            let Ok(metadata) = entry.metadata() else { continue };
            if !metadata.is_file() {
                continue;
            }

            let id = JobId::from_stem(stem);
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

            let intake = if self.already_answered(&id, modified) {
                Intake::Answered
            } else {
                match std::fs::read(&path) {
                    Ok(bytes) => match Job::parse(id.clone(), &bytes, defaults) {
                        Ok(job) => Intake::Fresh(job),
                        Err(e) => Intake::Malformed(e),
                    },
                    // Withdrawn by its client since the listing
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => Intake::Malformed(JobError::InvalidJob(format!("unreadable request file: {}", e))),
                }
            };

            pending.push(PendingJob { id, path, intake, modified });
        }

        pending.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.id.as_str().cmp(b.id.as_str())));
        Ok(pending)
    }

    /// A response strictly newer than the request means an earlier pass wrote
    /// the outcome but could not remove the request. A tie is processed again.
    fn already_answered(&self, id: &JobId, request_modified: SystemTime) -> bool {
        std::fs::metadata(self.response_path(id)).and_then(|m| m.modified()).is_ok_and(|answered| answered > request_modified)
    }

    /// Deliver a result: write the audio artifact and the outcome file, then
    /// remove the request file.
    ///
    /// # Errors
    /// Returns an error if the outcome file cannot be written (the request is
    /// left in place for a later pass) or the request file cannot be removed.
    pub fn complete(&self, pending: &PendingJob, result: &JobResult) -> Result<OutcomeRecord> {
        let record = match &result.outcome {
            Ok(waveform) => {
                let requested = match &pending.intake {
                    Intake::Fresh(job) => job.output_path.clone(),
                    _ => None,
                };
                let output = requested.unwrap_or_else(|| self.default_artifact_path(&pending.id));

                match audio::write_wav(&output, waveform) {
                    Ok(()) => {
                        debug!("Audio saved to {}", output.display());
                        OutcomeRecord::success(output, waveform.sample_rate, waveform.duration(), result.generation_time.as_secs_f64())
                    }
                    Err(e) => OutcomeRecord::error(JobError::Delivery(format!("{:#}", e)).to_string()),
                }
            }
            Err(e) => OutcomeRecord::error(e.to_string()),
        };

        let response = self.response_path(&pending.id);
        let json = serde_json::to_vec(&record)?;
        write_atomically(&response, &json).with_context(|| format!("failed to write outcome {}", response.display()))?;
        debug!("Outcome for job {} written to {}", result.job_id, response.display());

        self.remove_request(pending)?;
        Ok(record)
    }

    /// Remove a consumed request file.
    pub fn remove_request(&self, pending: &PendingJob) -> Result<()> {
        match std::fs::remove_file(&pending.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e).with_context(|| format!("failed to remove request {}", pending.path.display())),
            _ => Ok(()),
        }
    }

    /// Enqueue a job (client side). The file appears under its final name only
    /// once fully written.
    pub fn submit(&self, id: &JobId, request: &JobRequest) -> Result<PathBuf> {
        let path = self.request_path(id);
        let json = serde_json::to_vec(request)?;
        write_atomically(&path, &json).with_context(|| format!("failed to write request {}", path.display()))?;
        Ok(path)
    }

    /// Read and consume the outcome for a job, if it exists yet (client side).
    pub fn take_response(&self, id: &JobId) -> Result<Option<OutcomeRecord>> {
        let path = self.response_path(id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
        };

        let record = serde_json::from_slice(&bytes).with_context(|| format!("malformed outcome {}", path.display()))?;
        std::fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))?;
        Ok(Some(record))
    }

    /// Take back a request nobody has picked up yet. Returns whether it was still queued.
    pub fn withdraw(&self, id: &JobId) -> Result<bool> {
        match std::fs::remove_file(self.request_path(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove outcomes and default artifacts nobody collected within
    /// `retention`, typically left by clients that gave up waiting. Files of
    /// a job whose request is still queued are kept. Returns how many files
    /// were removed.
    pub fn sweep_responses(&self, retention: Duration) -> Result<usize> {
        let entries = std::fs::read_dir(&self.responses).with_context(|| format!("failed to list {}", self.responses.display()))?;
        let cutoff = SystemTime::now().checked_sub(retention).unwrap_or(SystemTime::UNIX_EPOCH);

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stem) = job_stem(&path).or_else(|| artifact_stem(&path)) else { continue };
            let Ok(metadata) = entry.metadata() else { continue };
            if !metadata.is_file() || !metadata.modified().is_ok_and(|modified| modified <= cutoff) {
                continue;
            }
            if self.request_path(&JobId::from_stem(stem)).exists() {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed uncollected {}", path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }
}

/// Job files are `<id>.json`; hidden files and temporaries are ignored.
fn job_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    name.strip_suffix(".json").filter(|stem| !stem.is_empty())
}

fn artifact_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    if name.starts_with('.') {
        return None;
    }
    name.strip_suffix(".wav").filter(|stem| !stem.is_empty())
}

fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}
