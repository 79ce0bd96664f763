use crate::config::Config;
use crate::error::SamplingError;
use crate::metrics;
use crate::registry::ExperimentRegistry;
use crate::resolve::{resolve_batch, resolve_experiment, AssignmentRequest, AssignmentResponse};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Query parameter carrying the page id on the single-experiment endpoint
const PAGE_ID_PARAM: &str = "page_id";

#[derive(Clone)]
struct AppState {
    registry: Arc<ExperimentRegistry>,
}

pub fn build_router(registry: Arc<ExperimentRegistry>) -> Router {
    let state = AppState { registry };

    Router::new()
        .route("/health", get(health_check))
        .route("/assign", post(assign_handler))
        .route("/experiments", get(list_experiments))
        .route("/experiments/:name", get(get_experiment))
        .route("/experiments/:name/assignment", get(assignment_handler))
        .route("/experiments/:name/rollback", post(rollback_experiment))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: Config, registry: Arc<ExperimentRegistry>) -> anyhow::Result<()> {
    metrics::init();

    let app = build_router(registry);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "experiment-sampler"
    }))
}

async fn assign_handler(
    State(state): State<AppState>,
    Json(request): Json<AssignmentRequest>,
) -> Json<AssignmentResponse> {
    let _timer = metrics::REQUEST_DURATION.start_timer();
    metrics::REQUEST_TOTAL.inc();

    Json(resolve_batch(&request, &state.registry))
}

async fn assignment_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let _timer = metrics::REQUEST_DURATION.start_timer();
    metrics::REQUEST_TOTAL.inc();

    let response = assign_single(&state.registry, &name, &params).map_err(|e| {
        metrics::REQUEST_ERRORS.inc();
        e
    })?;

    Ok(Json(response))
}

fn assign_single(
    registry: &ExperimentRegistry,
    name: &str,
    params: &HashMap<String, String>,
) -> Result<serde_json::Value, SamplingError> {
    let experiment = registry
        .get_active(name)
        .ok_or_else(|| SamplingError::ExperimentNotFound(name.to_string()))?;

    let page_id = match params.get(PAGE_ID_PARAM) {
        Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
            SamplingError::InvalidParameter(format!("Invalid page id: {}", raw))
        })?),
        None => None,
    };

    let result = resolve_experiment(&experiment, page_id, params);

    Ok(serde_json::json!({
        "experiment": name,
        "page_id": page_id,
        "bucket": result.bucket,
        "sampled": result.sampled,
        "overridden": result.overridden,
    }))
}

async fn list_experiments(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "experiments": state.registry.experiment_names()
    }))
}

async fn get_experiment(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let experiment = state
        .registry
        .get_experiment(&name)
        .ok_or_else(|| SamplingError::ExperimentNotFound(name.clone()))?;

    Ok(Json(serde_json::to_value(&experiment.def)?))
}

async fn rollback_experiment(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.registry.rollback_experiment(&name)?;

    Ok(Json(serde_json::json!({
        "status": "success",
        "message": format!("Experiment {} rolled back", name)
    })))
}

async fn metrics_handler() -> Result<impl IntoResponse, AppError> {
    let encoder = TextEncoder::new();
    let metric_families = metrics::REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    ))
}

// Error handling
struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<SamplingError>() {
            Some(SamplingError::ExperimentNotFound(_)) => StatusCode::NOT_FOUND,
            Some(SamplingError::InvalidParameter(_)) | Some(SamplingError::InvalidVersion(_)) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.0.to_string();
        tracing::error!("Request error: {}", message);

        (
            status,
            Json(serde_json::json!({
                "error": message
            })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
