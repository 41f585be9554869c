//! RefSeeker Job Server
//!
//! HTTP surface for queueing schema-extraction jobs. The discovery pipeline
//! is strictly synchronous, so jobs are handed to a dedicated worker thread
//! over a channel instead of running on the async runtime.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (refseeker.toml / env overrides)
//! cargo run --bin refseeker-server
//! ```
//!
//! ## Endpoints
//!
//! - `GET  /status`           - service liveness
//! - `POST /extract`          - queue an extraction, returns `{job_id}`
//! - `GET  /jobs/{id}`        - job status
//! - `GET  /jobs/{id}/results` - report JSON once finished

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use refseeker::{Config, DiscoveryEngine, SourceSpec};

#[derive(Debug, Clone, Deserialize)]
struct ExtractionRequest {
    entries: Vec<SourceSpec>,
}

#[derive(Debug, Clone, Serialize)]
struct ExtractionResponse {
    job_id: String,
}

#[derive(Debug, Clone, Serialize)]
struct StatusResponse {
    status: String,
}

#[derive(Debug, Clone)]
enum JobState {
    Queued,
    Running,
    Finished,
    Failed(String),
}

impl JobState {
    fn as_status(&self) -> String {
        match self {
            JobState::Queued => "queued".to_string(),
            JobState::Running => "running".to_string(),
            JobState::Finished => "finished".to_string(),
            JobState::Failed(message) => format!("failed: {message}"),
        }
    }
}

struct ExtractionJob {
    job_id: String,
    sources: Vec<SourceSpec>,
    queued_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone)]
struct AppState {
    jobs: Arc<DashMap<String, JobState>>,
    queue: crossbeam_channel::Sender<ExtractionJob>,
    results_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Using default configuration ({e})");
        Config::default()
    });
    init_logging(&config);

    let jobs: Arc<DashMap<String, JobState>> = Arc::new(DashMap::new());
    let (tx, rx) = crossbeam_channel::unbounded::<ExtractionJob>();
    let results_dir = config.http.results_dir.clone();
    std::fs::create_dir_all(&results_dir)?;

    // The worker owns the engine exclusively and drains the queue.
    {
        let jobs = jobs.clone();
        let results_dir = results_dir.clone();
        let worker_config = config.clone();
        std::thread::spawn(move || extraction_worker(&worker_config, &rx, &jobs, &results_dir));
    }

    let state = AppState {
        jobs,
        queue: tx,
        results_dir,
    };
    let app = Router::new()
        .route("/status", get(read_status))
        .route("/extract", post(start_extraction))
        .route("/jobs/:job_id", get(read_job_status))
        .route("/jobs/:job_id/results", get(read_job_results))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.http.addr).await?;
    info!(addr = %config.http.addr, "refseeker job server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn read_status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "running".to_string(),
    })
}

async fn start_extraction(
    State(state): State<AppState>,
    Json(request): Json<ExtractionRequest>,
) -> Response {
    let job_id = Uuid::new_v4().to_string();
    state.jobs.insert(job_id.clone(), JobState::Queued);
    let job = ExtractionJob {
        job_id: job_id.clone(),
        sources: request.entries,
        queued_at: chrono::Utc::now(),
    };
    if state.queue.send(job).is_err() {
        error!("extraction worker is gone");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(StatusResponse {
                status: "worker unavailable".to_string(),
            }),
        )
            .into_response();
    }
    info!(job_id = %job_id, "extraction queued");
    Json(ExtractionResponse { job_id }).into_response()
}

async fn read_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    match state.jobs.get(&job_id) {
        Some(job) => Json(StatusResponse {
            status: job.as_status(),
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(StatusResponse {
                status: "unknown".to_string(),
            }),
        )
            .into_response(),
    }
}

async fn read_job_results(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    let status = match state.jobs.get(&job_id) {
        Some(job) => job.as_status(),
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(StatusResponse {
                    status: "unknown".to_string(),
                }),
            )
                .into_response();
        }
    };
    if status != "finished" {
        return (StatusCode::CONFLICT, Json(StatusResponse { status })).into_response();
    }
    let path = state.results_dir.join(&job_id).join("result.json");
    match std::fs::read_to_string(&path) {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(job_id = %job_id, error = %e, "result file missing");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StatusResponse {
                    status: "result unavailable".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Runs on a dedicated thread; one job at a time.
fn extraction_worker(
    config: &Config,
    rx: &crossbeam_channel::Receiver<ExtractionJob>,
    jobs: &DashMap<String, JobState>,
    results_dir: &std::path::Path,
) {
    let mut engine = match DiscoveryEngine::new(config.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "cannot start extraction worker");
            return;
        }
    };
    for job in rx.iter() {
        jobs.insert(job.job_id.clone(), JobState::Running);
        let waited = (chrono::Utc::now() - job.queued_at).num_milliseconds();
        info!(job_id = %job.job_id, queued_ms = waited, "extraction started");
        match engine.discover(&job.sources) {
            Ok(report) => {
                let path = results_dir.join(&job.job_id).join("result.json");
                match report.write_to(&path) {
                    Ok(()) => {
                        jobs.insert(job.job_id.clone(), JobState::Finished);
                        info!(job_id = %job.job_id, "extraction finished");
                    }
                    Err(e) => {
                        jobs.insert(job.job_id.clone(), JobState::Failed(e.to_string()));
                        error!(job_id = %job.job_id, error = %e, "failed to write report");
                    }
                }
            }
            Err(e) => {
                jobs.insert(job.job_id.clone(), JobState::Failed(e.to_string()));
                warn!(job_id = %job.job_id, error = %e, "extraction aborted");
            }
        }
    }
}
