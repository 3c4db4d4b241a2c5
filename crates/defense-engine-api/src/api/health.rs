// File: src/api/health.rs
//
// Liveness endpoint with a projection status roll-up

use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde_json::json;

use defense_engine_core::projection::ProjectionStatus;
use defense_engine_core::runtime::EngineRuntime;

/// GET /health
pub async fn handle_health(runtime: web::Data<Arc<EngineRuntime>>) -> HttpResponse {
    let cursors = runtime.projection_cursors().await;
    let failed: Vec<&str> = cursors
        .iter()
        .filter(|cursor| cursor.status == ProjectionStatus::Error)
        .map(|cursor| cursor.projection.as_str())
        .collect();

    let body = json!({
        "status": if failed.is_empty() { "healthy" } else { "degraded" },
        "projections": cursors.len(),
        "failed_projections": failed,
        "rpc_methods": runtime.rpc.len(),
    });

    HttpResponse::Ok().json(body)
}
