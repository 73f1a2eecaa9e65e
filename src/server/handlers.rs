//! HTTP request handlers

use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use crate::audio;
use crate::error::JobError;
use crate::server::state::AppState;
use crate::tts::Precision;
use crate::worker::{Job, JobId, LifecycleState};

const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
const GENERATION_TIME: HeaderName = HeaderName::from_static("x-generation-time");
const DURATION: HeaderName = HeaderName::from_static("x-duration");
const SAMPLE_RATE: HeaderName = HeaderName::from_static("x-sample-rate");

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (status, Json(ErrorResponse { error: error.to_string() })).into_response()
}

fn status_for(err: &JobError) -> StatusCode {
    match err {
        JobError::ResourceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        JobError::InvalidJob(_) => StatusCode::BAD_REQUEST,
        JobError::Synthesis(_) | JobError::Aborted(_) | JobError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn readiness(state: &AppState) -> &'static str {
    match (state.resource().is_ready(), state.lifecycle()) {
        (true, LifecycleState::Draining) => "draining",
        (true, _) => "ready",
        (false, LifecycleState::Starting) => "loading",
        (false, _) => "unavailable",
    }
}

// ============================================================================
// Health check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    device: String,
    precision: Precision,
    /// Unix seconds.
    loaded_at: Option<i64>,
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let resource = state.resource().state();
    Json(HealthResponse {
        status: readiness(&state),
        model_loaded: resource.loaded,
        device: resource.device.provider.to_string(),
        precision: resource.device.precision,
        loaded_at: resource.loaded_at.map(|t| t.unix_timestamp()),
    })
}

#[derive(Serialize)]
pub struct SummaryResponse {
    status: &'static str,
    model: String,
    device: String,
    jobs_succeeded: u64,
    jobs_failed: u64,
}

pub async fn summary(State(state): State<AppState>) -> impl IntoResponse {
    Json(SummaryResponse {
        status: readiness(&state),
        model: state.resource().model_name(),
        device: state.resource().device().to_string(),
        jobs_succeeded: state.processor.succeeded(),
        jobs_failed: state.processor.failed(),
    })
}

// ============================================================================
// Generation
// ============================================================================

pub async fn generate(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let id = match headers.get(&REQUEST_ID) {
        Some(value) => match value.to_str().map_err(|e| JobError::InvalidJob(e.to_string())).and_then(JobId::parse) {
            Ok(id) => id,
            Err(e) => {
                warn!("Rejecting HTTP job with a bad request id: {}", e);
                state.processor.record_rejection();
                return error_response(StatusCode::BAD_REQUEST, e);
            }
        },
        None => JobId::generate(),
    };

    if !state.resource().is_ready() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, JobError::ResourceUnavailable);
    }

    let job = match Job::parse(id, &body, &state.defaults) {
        Ok(job) => job,
        Err(e) => {
            warn!("Rejecting HTTP job: {}", e);
            state.processor.record_rejection();
            return error_response(StatusCode::BAD_REQUEST, e);
        }
    };

    let result = state.processor.process(&job).await;
    let waveform = match result.outcome {
        Ok(waveform) => waveform,
        Err(e) => return error_response(status_for(&e), e),
    };

    let wav = match audio::encode_wav(&waveform) {
        Ok(wav) => wav,
        Err(e) => {
            error!("Failed to encode audio for job {}: {:#}", job.id, e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, JobError::Delivery(format!("{:#}", e)));
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/wav"));
    let metadata = [
        (GENERATION_TIME, result.generation_time.as_secs_f64().to_string()),
        (DURATION, waveform.duration().to_string()),
        (SAMPLE_RATE, waveform.sample_rate.to_string()),
        (REQUEST_ID, job.id.to_string()),
    ];
    for (name, value) in metadata {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }

    (StatusCode::OK, headers, Body::from(wav)).into_response()
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;

    use axum::Router;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tokio::sync::watch;
    use tower::ServiceExt; // for oneshot

    use crate::config::Provider;
    use crate::server::{AppState, create_router};
    use crate::testing::{FakeLoader, FakeSynth};
    use crate::tts::DeviceSpec;
    use crate::worker::{JobDefaults, JobProcessor, LifecycleState, ReadinessMarker, ResourceHolder};

    use super::*;

    fn app(dir: &Path, synth: Arc<FakeSynth>, loaded: bool) -> (Router, Arc<JobProcessor>) {
        let resource = ResourceHolder::new(Box::new(FakeLoader::new(synth)), DeviceSpec::for_provider(Provider::Cpu), ReadinessMarker::new(dir.join("ready")));
        if loaded {
            resource.load().unwrap();
        }
        let processor = Arc::new(JobProcessor::new(Arc::new(resource)));
        let (_, lifecycle) = watch::channel(LifecycleState::Serving);
        let state = AppState::new(Arc::clone(&processor), JobDefaults::default(), lifecycle);
        (create_router(state), processor)
    }

    fn post(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/generate")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_generate_returns_wav_with_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let (app, processor) = app(dir.path(), FakeSynth::one_second(), true);

        let mut request = post(json!({"text": "Hello", "language": "English"}));
        request.headers_mut().insert("x-request-id", HeaderValue::from_static("dubbing_7"));
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers.get("content-type").unwrap(), "audio/wav");
        assert_eq!(headers.get("x-sample-rate").unwrap(), "16000");
        assert_eq!(headers.get("x-duration").unwrap(), "1");
        assert_eq!(headers.get("x-request-id").unwrap(), "dubbing_7");
        assert!(headers.get("x-generation-time").unwrap().to_str().unwrap().parse::<f64>().unwrap() >= 0.0);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(processor.succeeded(), 1);
    }

    #[tokio::test]
    async fn test_generate_unloaded_model_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let synth = FakeSynth::one_second();
        let (app, _) = app(dir.path(), Arc::clone(&synth), false);

        let response = app.oneshot(post(json!({"text": "Hello"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(json_body(response).await["error"].as_str().unwrap().contains("not loaded"));
        assert_eq!(synth.started(), 0);
    }

    #[tokio::test]
    async fn test_generate_rejects_malformed_job() {
        let dir = tempfile::tempdir().unwrap();
        let synth = FakeSynth::one_second();
        let (app, processor) = app(dir.path(), Arc::clone(&synth), true);

        let response = app.clone().oneshot(post(json!({"language": "English"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].as_str().unwrap().contains("text"));

        let mut request = post(json!({"text": "Hello"}));
        request.headers_mut().insert("x-request-id", HeaderValue::from_static("../escape"));
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(synth.started(), 0);
        // Both rejections count as failed jobs
        assert_eq!(processor.failed(), 2);
    }

    #[tokio::test]
    async fn test_generate_synthesis_failure_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(FakeSynth::new(100, 16000).failing_on("boom"));
        let (app, _) = app(dir.path(), synth, true);

        let response = app.clone().oneshot(post(json!({"text": "boom"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json_body(response).await["error"].as_str().unwrap().contains("out of device memory"));

        // The model is still usable afterwards
        let response = app.oneshot(post(json!({"text": "fine"}))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_simultaneous_requests_never_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(FakeSynth::new(1600, 16000).with_delay(std::time::Duration::from_millis(100)));
        let (app, _) = app(dir.path(), Arc::clone(&synth), true);

        let (a, b) = tokio::join!(app.clone().oneshot(post(json!({"text": "one"}))), app.oneshot(post(json!({"text": "two"}))));
        assert_eq!(a.unwrap().status(), StatusCode::OK);
        assert_eq!(b.unwrap().status(), StatusCode::OK);

        let calls = synth.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].0 >= calls[0].1, "second call started before the first ended");
    }

    #[tokio::test]
    async fn test_health_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path(), FakeSynth::one_second(), true);

        let response = app.clone().oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health = json_body(response).await;
        assert_eq!(health["status"], "ready");
        assert_eq!(health["model_loaded"], true);
        assert_eq!(health["device"], "cpu");
        assert_eq!(health["precision"], "int8");
        assert!(health["loaded_at"].as_i64().unwrap() > 0);

        app.clone().oneshot(post(json!({"text": "Hello"}))).await.unwrap();
        app.clone().oneshot(post(json!({}))).await.unwrap();

        let response = app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();
        let summary = json_body(response).await;
        assert_eq!(summary["model"], "fake");
        assert_eq!(summary["device"], "cpu (int8)");
        assert_eq!(summary["jobs_succeeded"], 1);
        assert_eq!(summary["jobs_failed"], 1);
    }

    #[tokio::test]
    async fn test_health_reports_unloaded_model() {
        let dir = tempfile::tempdir().unwrap();
        let (app, _) = app(dir.path(), FakeSynth::one_second(), false);

        let response = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
        let health = json_body(response).await;
        assert_eq!(health["status"], "unavailable");
        assert_eq!(health["model_loaded"], false);
        assert!(health["loaded_at"].is_null());
    }
}
