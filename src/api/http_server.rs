// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::{DefaultBodyLimit, State},
    http::header,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use axum_extra::extract::Multipart;
use bytes::Bytes;
use std::{sync::Arc, time::Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::errors::{ApiError, ApiErrorResponse};
use super::handlers::{BannerResponse, HealthResponse, ModelInfo};
use crate::inference::{InferencePipeline, ScoredPrediction};
use crate::monitoring::{RequestOutcome, ServiceMetrics};
use crate::vision::MAX_IMAGE_SIZE;

/// Multipart field carrying the uploaded image
pub const FILE_FIELD: &str = "file";

// Room for multipart framing around a maximum-size image
const BODY_LIMIT: usize = MAX_IMAGE_SIZE + 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<InferencePipeline>,
    pub metrics: ServiceMetrics,
}

impl AppState {
    pub fn new(pipeline: Arc<InferencePipeline>, metrics: ServiceMetrics) -> Self {
        Self { pipeline, metrics }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/predict-file", post(predict_file_handler))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(state: AppState, addr: &str) -> anyhow::Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("API server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn root_handler() -> impl IntoResponse {
    Json(BannerResponse::default())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pipeline = &state.pipeline;
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::version::get_version_info(),
        model: ModelInfo::from(pipeline.model()),
        snapshots_enabled: pipeline.snapshots().is_some(),
        issues: None,
    })
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.gather(),
    )
}

/// POST /predict-file - Classify an uploaded image
///
/// # Request
/// - multipart form with the image in the `file` field
///
/// # Response
/// - `label`, `confidence`, `probs`, `saved_filename`
///
/// # Errors
/// - 400 Bad Request: missing `file` field or undecodable image
/// - 503 Service Unavailable: presence filter misconfigured
/// - 500 Internal Server Error: classifier failure
async fn predict_file_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ScoredPrediction>, ApiErrorResponse> {
    let request_id = Uuid::new_v4().to_string();
    let started = Instant::now();

    let result = predict(&state, multipart).await;
    let elapsed = started.elapsed();

    match result {
        Ok(prediction) => {
            let outcome = if prediction.is_no_object() {
                RequestOutcome::Rejected
            } else {
                RequestOutcome::Classified
            };
            state.metrics.record(outcome, elapsed);
            if prediction.saved_filename.is_some() {
                state.metrics.record_snapshot();
            }
            info!(
                "[{}] {} ({:.3}) in {:?}",
                request_id, prediction.label, prediction.confidence, elapsed
            );
            Ok(Json(prediction))
        }
        Err(e) => {
            state.metrics.record(RequestOutcome::Error, elapsed);
            warn!("[{}] prediction failed: {}", request_id, e);
            Err(ApiErrorResponse::new(e, request_id))
        }
    }
}

async fn predict(state: &AppState, multipart: Multipart) -> Result<ScoredPrediction, ApiError> {
    let bytes = read_file_field(multipart).await?;
    debug!("Received {} byte upload", bytes.len());

    let pipeline = state.pipeline.clone();
    let prediction = tokio::task::spawn_blocking(move || pipeline.infer(&bytes))
        .await
        .map_err(|e| ApiError::InternalError(format!("inference task failed: {}", e)))??;
    Ok(prediction)
}

async fn read_file_field(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?
    {
        if field.name() == Some(FILE_FIELD) {
            return field
                .bytes()
                .await
                .map_err(|e| ApiError::InvalidRequest(e.to_string()));
        }
    }
    Err(ApiError::MissingField(FILE_FIELD.to_string()))
}
