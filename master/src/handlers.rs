use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use common::{
    CoordinatorError, JobId, JobInfo, JobRequest, JobResults, TaskAssignmentRequest,
    TaskAssignmentResponse, TaskCompleteRequest, TaskCompleteResponse, WorkerHeartbeatRequest,
    WorkerHeartbeatResponse, WorkerMetrics, WorkerRegisterRequest, WorkerRegisterResponse,
};
use glob::glob;
use serde_json::json;
use std::fs;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/jobs", post(create_job))
        .route("/api/v1/jobs/:id", get(get_job))
        .route("/api/v1/jobs/:id/results", get(get_job_results))
        .route("/api/v1/workers", get(list_workers))
        .route("/api/v1/workers/register", post(register_worker))
        .route("/api/v1/workers/heartbeat", post(worker_heartbeat))
        .route("/api/v1/tasks/next", post(assign_task))
        .route("/api/v1/tasks/complete", post(complete_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/* ---------------- errores ---------------- */

#[derive(Debug)]
pub enum ApiError {
    Coordinator(CoordinatorError),
    NotFound(String),
    BadRequest(String),
}

impl From<CoordinatorError> for ApiError {
    fn from(e: CoordinatorError) -> Self {
        ApiError::Coordinator(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::Coordinator(e) => {
                let status = match e {
                    CoordinatorError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
                    CoordinatorError::OwnerMismatch { .. }
                    | CoordinatorError::JobAlreadySubmitted { .. } => StatusCode::CONFLICT,
                    CoordinatorError::InvalidJob(_) => StatusCode::BAD_REQUEST,
                    CoordinatorError::QueueFull(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

/// Expande el glob de entrada a archivos regulares, en el orden (alfabético) de `glob`.
pub fn resolve_inputs(pattern: &str) -> Result<Vec<String>, glob::PatternError> {
    let mut files = Vec::new();
    for path in glob(pattern)?.flatten() {
        if path.is_file() {
            files.push(path.to_string_lossy().to_string());
        }
    }
    Ok(files)
}

/* ---------------- handlers HTTP ---------------- */

async fn health() -> &'static str {
    "ok"
}

// Crea el job: una tarea map por archivo que haga match con input_glob
async fn create_job(
    State(state): State<AppState>,
    Json(req): Json<JobRequest>,
) -> Result<Json<JobInfo>, ApiError> {
    let inputs = resolve_inputs(&req.input_glob)
        .map_err(|e| ApiError::BadRequest(format!("patrón input_glob inválido: {e}")))?;

    info!(
        "job '{}' recibido: {} archivos para {} (n_reduce={})",
        req.name,
        inputs.len(),
        req.input_glob,
        req.n_reduce
    );

    let job = state
        .coordinator
        .submit_job(req.name, inputs, req.n_reduce)
        .inspect_err(|e| warn!("job rechazado: {}", e))?;
    Ok(Json(job))
}

fn current_job(state: &AppState, id: JobId) -> Result<JobInfo, ApiError> {
    state
        .coordinator
        .job_info()
        .filter(|job| job.id == id)
        .ok_or_else(|| ApiError::NotFound(format!("job {} no encontrado", id)))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Json<JobInfo>, ApiError> {
    current_job(&state, id).map(Json)
}

// Lista los mr-out-* que hay en el directorio de salida
async fn get_job_results(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<Json<JobResults>, ApiError> {
    let job = current_job(&state, id)?;

    let mut files = Vec::new();
    if let Ok(entries) = fs::read_dir(&state.output_dir) {
        for entry in entries.flatten() {
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with("mr-out-") {
                    files.push(name.to_string());
                }
            }
        }
    }
    files.sort();

    Ok(Json(JobResults {
        job_id: job.id,
        output_dir: state.output_dir.to_string_lossy().to_string(),
        files,
    }))
}

async fn list_workers(State(state): State<AppState>) -> Json<Vec<WorkerMetrics>> {
    Json(state.coordinator.list_workers())
}

async fn register_worker(
    State(state): State<AppState>,
    Json(req): Json<WorkerRegisterRequest>,
) -> Json<WorkerRegisterResponse> {
    let worker_id = state.coordinator.register_worker(req.addr);
    Json(WorkerRegisterResponse { worker_id })
}

async fn worker_heartbeat(
    State(state): State<AppState>,
    Json(req): Json<WorkerHeartbeatRequest>,
) -> Json<WorkerHeartbeatResponse> {
    let ok = state
        .coordinator
        .heartbeat(req.worker_id, req.cpu_percent, req.mem_bytes);
    Json(WorkerHeartbeatResponse { ok })
}

// Nunca espera: si la cola está vacía responde task = None y el worker reintenta
async fn assign_task(
    State(state): State<AppState>,
    Json(req): Json<TaskAssignmentRequest>,
) -> Json<TaskAssignmentResponse> {
    let task = state.coordinator.request_task(req.worker_id);
    Json(TaskAssignmentResponse { task })
}

async fn complete_task(
    State(state): State<AppState>,
    Json(req): Json<TaskCompleteRequest>,
) -> Result<Json<TaskCompleteResponse>, ApiError> {
    let ok = state
        .coordinator
        .report_task(req.worker_id, req.task_id, req.kind)
        .inspect_err(|e| warn!("reporte rechazado: {}", e))?;
    Ok(Json(TaskCompleteResponse { ok }))
}
