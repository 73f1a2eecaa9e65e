//! Start-up, serving and shutdown of the worker.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::queue::{FileQueue, Intake, PendingJob};
use crate::server::{self, AppState};
use crate::worker::{Job, JobDefaults, JobId, JobProcessor, JobRequest, JobResult, ResourceHolder};

/// `starting → ready → serving → draining → stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Starting,
    Ready,
    Serving,
    Draining,
    Stopped,
}

/// How the queue loop waits between polls.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    /// Pause when nothing was pending.
    pub interval: Duration,
    /// Pause after the loop itself failed or a delivery failed.
    pub error_backoff: Duration,
    /// Outcomes nobody collected are removed after this long.
    pub retention: Option<Duration>,
}

/// Minimum time between two sweeps of the response directory.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// What one pass over the request directory amounted to.
enum Pass {
    Idle,
    Busy,
    Degraded,
}

/// Drives one worker process: loads the model, serves a transport until
/// shutdown is requested, then releases the model.
pub struct Controller {
    resource: Arc<ResourceHolder>,
    processor: Arc<JobProcessor>,
    defaults: JobDefaults,
    warmup_text: Option<String>,
    state: Arc<watch::Sender<LifecycleState>>,
    shutdown: CancellationToken,
}

impl Controller {
    pub fn new(resource: Arc<ResourceHolder>, defaults: JobDefaults) -> Self {
        let processor = Arc::new(JobProcessor::new(Arc::clone(&resource)));
        let (state, _) = watch::channel(LifecycleState::Starting);
        Self { resource, processor, defaults, warmup_text: None, state: Arc::new(state), shutdown: CancellationToken::new() }
    }

    /// Synthesize `text` once after loading, before serving.
    pub fn with_warmup(mut self, text: Option<String>) -> Self {
        self.warmup_text = text;
        self
    }

    pub fn processor(&self) -> Arc<JobProcessor> {
        Arc::clone(&self.processor)
    }

    /// Cancel this token to request shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    fn set_state(&self, next: LifecycleState) {
        debug!("Lifecycle: {:?} -> {:?}", self.state(), next);
        self.state.send_replace(next);
    }

    /// Load the model. A failure is fatal and leaves the controller stopped.
    async fn start(&self) -> Result<()> {
        self.set_state(LifecycleState::Starting);

        let marker = self.resource.marker();
        if marker.is_present() {
            warn!("Removing stale readiness marker {}", marker.path().display());
            if let Err(e) = marker.clear() {
                warn!("Failed to clear stale readiness marker: {}", e);
            }
        }

        let resource = Arc::clone(&self.resource);
        let loaded = tokio::task::spawn_blocking(move || resource.load()).await;

        match loaded {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.set_state(LifecycleState::Stopped);
                return Err(e).context("failed to load the model");
            }
            Err(e) => {
                self.set_state(LifecycleState::Stopped);
                return Err(e).context("model loading task failed");
            }
        }

        self.set_state(LifecycleState::Ready);
        self.warm_up().await;
        Ok(())
    }

    async fn warm_up(&self) {
        let (Some(text), Some(synthesizer)) = (self.warmup_text.clone(), self.resource.handle()) else { return };

        info!("Warming up the model...");
        let job = Job::new(JobId::from_stem("warmup"), JobRequest { text, ..Default::default() }, &self.defaults);
        match tokio::task::spawn_blocking(move || synthesizer.synthesize(&job.request)).await {
            Ok(Ok(waveform)) => info!("Warm-up complete ({:.2}s of audio)", waveform.duration()),
            Ok(Err(e)) => warn!("Warm-up failed: {}", e),
            Err(e) => warn!("Warm-up task failed: {}", e),
        }
    }

    /// Release the model once the in-flight synthesis call, if any, has ended.
    ///
    /// An HTTP caller that disconnected mid-job no longer holds up the
    /// server, but its call still owns the processor gate.
    async fn finish(&self) {
        mark_draining(&self.state);
        self.processor.drain().await;
        self.resource.release();
        self.set_state(LifecycleState::Stopped);
        info!("✅ Worker stopped");
    }

    /// Serve the filesystem queue until shutdown.
    ///
    /// Shutdown is observed between jobs: the job being processed when it is
    /// requested still gets its outcome written; jobs not yet started stay
    /// queued for the next run.
    pub async fn run_queue(&self, queue: FileQueue, policy: PollPolicy) -> Result<()> {
        self.start().await?;
        self.set_state(LifecycleState::Serving);
        info!("🎧 Ready for jobs");

        tokio::spawn(drain_on_shutdown(self.shutdown.clone(), Arc::clone(&self.state)));

        let mut last_sweep = None;
        while !self.shutdown.is_cancelled() {
            if let Some(retention) = policy.retention {
                if last_sweep.is_none_or(|at: Instant| at.elapsed() >= SWEEP_INTERVAL) {
                    match queue.sweep_responses(retention) {
                        Ok(0) => {}
                        Ok(removed) => info!("🧹 Removed {} uncollected file(s)", removed),
                        Err(e) => warn!("Failed to sweep response directory: {:#}", e),
                    }
                    last_sweep = Some(Instant::now());
                }
            }

            let pause = match self.serve_pending(&queue).await {
                Ok(Pass::Busy) => continue,
                Ok(Pass::Idle) => policy.interval,
                Ok(Pass::Degraded) => policy.error_backoff,
                Err(e) => {
                    error!("Error in serving loop: {:#}", e);
                    policy.error_backoff
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => {}
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("🛑 Shutdown requested, no new jobs will be accepted");
        self.finish().await;
        Ok(())
    }

    async fn serve_pending(&self, queue: &FileQueue) -> Result<Pass> {
        let pending = queue.poll(&self.defaults)?;
        if pending.is_empty() {
            return Ok(Pass::Idle);
        }

        let total = pending.len();
        let mut pass = Pass::Busy;
        for (done, job) in pending.into_iter().enumerate() {
            if self.shutdown.is_cancelled() {
                info!("Leaving {} job(s) queued", total - done);
                break;
            }
            if !self.handle(queue, job).await {
                pass = Pass::Degraded;
            }
        }
        Ok(pass)
    }

    /// Process one request file and deliver its outcome. Returns false if
    /// delivery failed and the request stays for a later pass.
    async fn handle(&self, queue: &FileQueue, pending: PendingJob) -> bool {
        let result = match &pending.intake {
            Intake::Answered => {
                info!("Job {} was already answered, removing its request", pending.id);
                return match queue.remove_request(&pending) {
                    Ok(()) => true,
                    Err(e) => {
                        error!("{:#}", e);
                        false
                    }
                };
            }
            Intake::Malformed(e) => {
                warn!("Rejecting job {}: {}", pending.id, e);
                self.processor.record_rejection();
                JobResult::rejected(pending.id.clone(), e.clone())
            }
            Intake::Fresh(job) => self.processor.process(job).await,
        };

        match queue.complete(&pending, &result) {
            Ok(record) => {
                debug!("Outcome for job {}: {:?}", pending.id, record.status);
                true
            }
            Err(e) => {
                error!("Failed to deliver outcome for job {}: {:#}", pending.id, e);
                false
            }
        }
    }

    /// Serve HTTP until shutdown. In-flight requests finish before the model
    /// is released.
    pub async fn run_http(&self, listener: TcpListener) -> Result<()> {
        self.start().await?;

        let state = AppState::new(self.processor(), self.defaults.clone(), self.subscribe());
        let app = server::create_router(state);

        let addr = listener.local_addr()?;
        self.set_state(LifecycleState::Serving);
        info!("🌐 Listening on http://{}", addr);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(drain_on_shutdown(self.shutdown.clone(), Arc::clone(&self.state)))
            .await;

        self.finish().await;
        served.context("HTTP server failed")
    }
}

/// `serving → draining`, unless the controller has already moved on.
fn mark_draining(state: &watch::Sender<LifecycleState>) {
    state.send_if_modified(|current| {
        let serving = *current == LifecycleState::Serving;
        if serving {
            *current = LifecycleState::Draining;
        }
        serving
    });
}

async fn drain_on_shutdown(shutdown: CancellationToken, state: Arc<watch::Sender<LifecycleState>>) {
    shutdown.cancelled().await;
    info!("🛑 Shutdown requested, finishing the job in flight");
    mark_draining(&state);
}
