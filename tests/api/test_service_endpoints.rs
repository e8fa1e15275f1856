// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use car_damage_node::api::{create_router, AppState};
use car_damage_node::inference::InferencePipeline;
use car_damage_node::monitoring::{RequestOutcome, ServiceMetrics};
use car_damage_node::vision::{CascadePresenceFilter, DetectionParams};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use crate::common::{fixed_model, FixedLogits};

fn state() -> AppState {
    let filter = CascadePresenceFilter::new("unused.xml", DetectionParams::default()).unwrap();
    let pipeline = InferencePipeline::new(fixed_model(FixedLogits::new(vec![1.0; 6])), Arc::new(filter));
    AppState::new(Arc::new(pipeline), ServiceMetrics::new().unwrap())
}

async fn get(state: AppState, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = create_router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, content_type, body.to_vec())
}

#[tokio::test]
async fn test_root_banner() {
    let (status, _, body) = get(state(), "/").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["message"], "Car Damage Detection API is running");
}

#[tokio::test]
async fn test_health_reports_model() {
    let (status, _, body) = get(state(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"]["version"], car_damage_node::version::VERSION_NUMBER);
    assert!(json["version"]["features"]
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f == "haar-presence-filter"));
    assert_eq!(json["model"]["architecture"], "fixed");
    assert_eq!(json["model"]["classes"].as_array().unwrap().len(), 6);
    assert_eq!(json["snapshots_enabled"], false);
}

#[tokio::test]
async fn test_metrics_exposition() {
    let state = state();
    state.metrics.record(RequestOutcome::Classified, Duration::from_millis(12));

    let (status, content_type, body) = get(state, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.unwrap().starts_with("text/plain"));
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("car_damage_predictions_total{outcome=\"classified\"} 1"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let (status, _, _) = get(state(), "/v1/models").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_preflight_allowed() {
    let request = Request::builder()
        .method("OPTIONS")
        .uri("/predict-file")
        .header(header::ORIGIN, "http://localhost:3000")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let response = create_router(state()).oneshot(request).await.unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
