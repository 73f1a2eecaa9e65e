//! Command-line client: submit one job and wait for its outcome.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::header::HeaderMap;
use tracing::{debug, info, warn};

use crate::config::SubmitArgs;
use crate::queue::{FileQueue, OutcomeRecord};
use crate::worker::{JobId, JobRequest};

/// Submit the job described by `args` and report the outcome.
///
/// # Errors
/// Returns an error if the job failed, timed out, or could not be submitted.
pub async fn submit(args: &SubmitArgs) -> Result<()> {
    let id = match &args.id {
        Some(id) => JobId::parse(id)?,
        None => JobId::generate(),
    };
    let output = std::path::absolute(&args.output).with_context(|| format!("invalid output path {}", args.output.display()))?;
    let timeout = Duration::from_secs(args.timeout_secs);

    let request = JobRequest {
        text: args.text.clone(),
        language: args.language.clone(),
        speaker: args.speaker.clone(),
        instruct: args.instruct.clone(),
        output_path: None,
        max_new_tokens: args.max_new_tokens,
    };

    let record = match &args.url {
        Some(url) => submit_over_http(url, &id, &request, &output, timeout).await?,
        None => {
            let queue = FileQueue::open(&args.dirs.request_dir, &args.dirs.response_dir)?;
            let request = JobRequest { output_path: Some(output), ..request };
            submit_to_queue(&queue, &id, &request, args.dirs.poll_interval(), timeout).await?
        }
    };

    report(&id, &record)
}

fn report(id: &JobId, record: &OutcomeRecord) -> Result<()> {
    if !record.is_success() {
        anyhow::bail!("job {} failed: {}", id, record.error.as_deref().unwrap_or("unknown error"));
    }

    if let Some(path) = &record.output_path {
        info!("✅ Audio saved to {}", path.display());
    }
    info!(
        "Duration: {:.2}s, sample rate: {} Hz, generation time: {:.2}s",
        record.duration.unwrap_or_default(),
        record.sample_rate.unwrap_or_default(),
        record.generation_time.unwrap_or_default()
    );
    Ok(())
}

/// Write a request file and wait for the worker's outcome file.
///
/// On timeout the request is withdrawn so a worker that comes back later does
/// not synthesize audio nobody is waiting for.
pub async fn submit_to_queue(queue: &FileQueue, id: &JobId, request: &JobRequest, poll_interval: Duration, timeout: Duration) -> Result<OutcomeRecord> {
    let path = queue.submit(id, request)?;
    info!("📨 Submitted job {} ({})", id, path.display());

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(record) = queue.take_response(id)? {
            debug!("Job {} answered: {:?}", id, record.status);
            return Ok(record);
        }

        if Instant::now() >= deadline {
            if queue.withdraw(id)? {
                warn!("Withdrew unanswered request {}", id);
            } else {
                warn!("Job {} is already being processed; its outcome will be left at {}", id, queue.response_path(id).display());
            }
            anyhow::bail!("timed out after {}s waiting for job {}", timeout.as_secs(), id);
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// POST the job to `<url>/generate` and save the returned WAV to `output`.
pub async fn submit_over_http(url: &str, id: &JobId, request: &JobRequest, output: &Path, timeout: Duration) -> Result<OutcomeRecord> {
    let endpoint = format!("{}/generate", url.trim_end_matches('/'));
    let client = reqwest::Client::builder().timeout(timeout).build().context("Failed to create HTTP client")?;

    info!("📨 Posting job {} to {}", id, endpoint);
    let response = client
        .post(&endpoint)
        .header("X-Request-Id", id.as_str())
        .json(request)
        .send()
        .await
        .with_context(|| format!("request to {} failed", endpoint))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let error = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or(body);
        return Ok(OutcomeRecord::error(format!("server returned {}: {}", status, error)));
    }

    let headers = response.headers().clone();
    let wav = response.bytes().await.context("failed to read audio body")?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(output, &wav).with_context(|| format!("failed to write {}", output.display()))?;

    Ok(OutcomeRecord::success(
        PathBuf::from(output),
        header_value(&headers, "x-sample-rate").unwrap_or_default(),
        header_value(&headers, "x-duration").unwrap_or_default(),
        header_value(&headers, "x-generation-time").unwrap_or_default(),
    ))
}

fn header_value<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}
