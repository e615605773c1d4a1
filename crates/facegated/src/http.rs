//! HTTP surface for both services.
//!
//! `/verify-face` and `/initialize` front the verification engine;
//! `/update-inventory` and `/status` front the ledger and audit log.
//! Every error is converted to a structured JSON response at this
//! boundary; nothing propagates far enough to crash the process.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::RwLock;

use facegate_ledger::{AuditLog, InventoryLedger};

use crate::config::Config;
use crate::engine::{self, DecisionPolicy, EngineHandle};

/// Shared daemon state, constructed once in `main` and cloned into each
/// handler. The ledger mutex is the single critical section serializing
/// whole decrement batches.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RwLock<Option<EngineHandle>>>,
    pub ledger: Arc<Mutex<InventoryLedger>>,
    pub audit: Arc<AuditLog>,
    pub config: Arc<Config>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/verify-face", post(verify_face))
        .route("/initialize", get(initialize))
        .route("/update-inventory", post(update_inventory))
        .route("/status", get(status))
        .route("/healthz", get(healthz))
        // Camera stills can exceed axum's 2 MB default.
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(state)
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// `POST /verify-face` — multipart form with a binary `image` field.
/// Answers the verdict plus the raw classifier output it derives from.
async fn verify_face(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let Some(engine) = state.engine.read().await.clone() else {
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Face recognition system not properly initialized. Check /initialize.",
        );
    };

    let mut image: Option<Vec<u8>> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("image") {
                    match field.bytes().await {
                        Ok(bytes) => image = Some(bytes.to_vec()),
                        Err(err) => {
                            return json_error(
                                StatusCode::BAD_REQUEST,
                                format!("Failed to read image field: {err}"),
                            )
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    format!("Malformed multipart body: {err}"),
                )
            }
        }
    }

    let Some(image) = image else {
        return json_error(StatusCode::BAD_REQUEST, "No image file provided");
    };

    match engine.verify(image).await {
        Ok(outcome) => Json(json!({
            "result": outcome.verdict.to_string(),
            "label": outcome.label,
            "confidence": outcome.confidence,
        }))
        .into_response(),
        Err(err) if err.is_client_fault() => {
            json_error(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => {
            tracing::error!(error = %err, "verification failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error processing image: {err}"),
            )
        }
    }
}

/// `GET /initialize` — report model status, attempting a (re)load of the
/// engine if it is not yet running. Idempotent once loaded; safe to call
/// repeatedly.
async fn initialize(State(state): State<AppState>) -> Response {
    let detector_path = state.config.detector_model_path();
    let classifier_path = state.config.classifier_model_path();

    let mut report = json!({
        "detector_model": &detector_path,
        "detector_model_exists": Path::new(&detector_path).exists(),
        "classifier_model": &classifier_path,
        "classifier_model_exists": Path::new(&classifier_path).exists(),
    });

    let mut engine = state.engine.write().await;
    if engine.is_some() {
        report["ready"] = json!(true);
        return Json(report).into_response();
    }

    let policy = DecisionPolicy {
        authorized_label: state.config.authorized_label,
        match_threshold: state.config.match_threshold,
    };
    let score_threshold = state.config.detect_score_threshold;
    let spawn = tokio::task::spawn_blocking(move || {
        engine::spawn_engine(&detector_path, &classifier_path, score_threshold, policy)
    })
    .await;

    match spawn {
        Ok(Ok(handle)) => {
            *engine = Some(handle);
            report["ready"] = json!(true);
            tracing::info!("engine initialized via /initialize");
        }
        Ok(Err(err)) => {
            report["ready"] = json!(false);
            report["error"] = json!(err.to_string());
            tracing::warn!(error = %err, "engine initialization failed");
        }
        Err(err) => {
            report["ready"] = json!(false);
            report["error"] = json!(format!("initialization task failed: {err}"));
            tracing::error!(error = %err, "engine initialization task panicked");
        }
    }

    Json(report).into_response()
}

/// `POST /update-inventory` — apply one sold-item batch.
///
/// Deliberately unauthenticated: the capture-and-cart client is trusted to
/// have called `/verify-face` first. This boundary is pinned by tests.
async fn update_inventory(
    State(state): State<AppState>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Response {
    let Ok(Json(payload)) = payload else {
        return json_error(StatusCode::BAD_REQUEST, "Invalid request body");
    };

    let Some(items) = payload.get("items_sold").and_then(|v| v.as_object()) else {
        return json_error(
            StatusCode::BAD_REQUEST,
            "Invalid request, missing items_sold field",
        );
    };

    let mut requests = BTreeMap::new();
    for (sku, qty) in items {
        let Some(qty) = qty.as_i64() else {
            return json_error(
                StatusCode::BAD_REQUEST,
                format!("Invalid quantity for item '{sku}'"),
            );
        };
        requests.insert(sku.clone(), qty);
    }

    // Critical section: the whole batch reads and writes under one lock.
    // Events are collected inside and appended after release (two-phase),
    // with the batch appended as one unit.
    let outcome = {
        let mut ledger = state.ledger.lock().unwrap();
        ledger.decrement_batch(&requests)
    };
    state.audit.append_batch(outcome.events);

    Json(json!({
        "message": "Inventory updated",
        "inventory": outcome.snapshot,
    }))
    .into_response()
}

/// `GET /status` — read-only snapshot of the ledger and the full audit
/// log, for display. No side effects; safe to poll.
async fn status(State(state): State<AppState>) -> Response {
    let inventory = state.ledger.lock().unwrap().snapshot();
    let logs: Vec<String> = state
        .audit
        .snapshot()
        .iter()
        .map(|entry| entry.to_string())
        .collect();

    Json(json!({
        "inventory": inventory,
        "logs": logs,
    }))
    .into_response()
}

/// `GET /healthz` — liveness probe.
async fn healthz() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}
