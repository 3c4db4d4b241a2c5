// File: src/api/jsonrpc.rs
//
// JSON-RPC 2.0 endpoint: strict envelope validation, spec-standard error
// codes, and an application range carrying the engine error taxonomy

use std::sync::Arc;
use std::time::Instant;

use actix_web::{web, HttpResponse};
use serde_json::{json, Value};

use defense_engine_core::error::{EngineError, ErrorKind};
use defense_engine_core::rpc::RpcParams;
use defense_engine_core::runtime::EngineRuntime;

use crate::monitoring::metrics;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Map an engine error onto its JSON-RPC code. Domain failures land in the
/// reserved application range; the taxonomy tag travels in `data.kind`.
pub fn error_code(error: &EngineError) -> i64 {
    match error.kind() {
        ErrorKind::MethodNotFound => METHOD_NOT_FOUND,
        ErrorKind::InvalidParams | ErrorKind::Validation => INVALID_PARAMS,
        ErrorKind::Internal => INTERNAL_ERROR,
        ErrorKind::AggregateNotFound => -32001,
        ErrorKind::VersionConflict => -32002,
        ErrorKind::QueryNotFound => -32003,
        ErrorKind::ProjectionError => -32004,
        ErrorKind::SnapshotError => -32005,
        ErrorKind::Cancelled => -32010,
        ErrorKind::Timeout => -32011,
        ErrorKind::TransportError => -32012,
    }
}

pub(crate) fn error_body(id: Value, code: i64, message: &str, data: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {"code": code, "message": message, "data": data},
        "id": id,
    })
}

pub(crate) fn engine_error_body(id: Value, error: &EngineError) -> Value {
    error_body(
        id,
        error_code(error),
        &error.to_string(),
        json!({"kind": error.kind().as_str()}),
    )
}

/// POST /rpc
pub async fn handle_jsonrpc(
    runtime: web::Data<Arc<EngineRuntime>>,
    body: web::Bytes,
) -> HttpResponse {
    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            return HttpResponse::Ok().json(error_body(
                Value::Null,
                PARSE_ERROR,
                "parse error",
                json!({"detail": e.to_string()}),
            ));
        }
    };

    let Some(request) = parsed.as_object() else {
        return HttpResponse::Ok().json(error_body(
            Value::Null,
            INVALID_REQUEST,
            "invalid request",
            json!({"detail": "request must be a JSON object"}),
        ));
    };

    let id = request.get("id").cloned().unwrap_or(Value::Null);

    if request.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return HttpResponse::Ok().json(error_body(
            id,
            INVALID_REQUEST,
            "invalid request",
            json!({"detail": "jsonrpc must be \"2.0\""}),
        ));
    }

    let Some(method) = request.get("method").and_then(Value::as_str) else {
        return HttpResponse::Ok().json(error_body(
            id,
            INVALID_REQUEST,
            "invalid request",
            json!({"detail": "method must be a string"}),
        ));
    };

    let params = match RpcParams::from_value(request.get("params").cloned()) {
        Ok(params) => params,
        Err(error) => {
            return HttpResponse::Ok().json(engine_error_body(id, &error));
        }
    };

    let started = Instant::now();
    let ctx = super::request_context(&runtime);
    let response = match runtime.rpc.invoke(ctx, method, params).await {
        Ok(result) => {
            metrics::observe_rpc(method, "ok", started.elapsed());
            json!({"jsonrpc": "2.0", "result": result, "id": id})
        }
        Err(error) => {
            metrics::observe_rpc(method, error.kind().as_str(), started.elapsed());
            engine_error_body(id, &error)
        }
    };

    HttpResponse::Ok().json(response)
}

/// GET /rpc answers CORS preflight with permissive headers.
pub async fn handle_preflight() -> HttpResponse {
    HttpResponse::Ok()
        .insert_header(("Access-Control-Allow-Origin", "*"))
        .insert_header(("Access-Control-Allow-Methods", "POST, GET, OPTIONS"))
        .insert_header(("Access-Control-Allow-Headers", "Content-Type"))
        .finish()
}

/// Anything but POST/GET on /rpc is 405.
pub async fn handle_method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed()
        .insert_header(("Allow", "POST, GET"))
        .json(json!({"error": "method not allowed"}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_spec_codes() {
        assert_eq!(
            error_code(&EngineError::MethodNotFound { method: "x".into() }),
            METHOD_NOT_FOUND
        );
        assert_eq!(
            error_code(&EngineError::invalid_params("bad")),
            INVALID_PARAMS
        );
        assert_eq!(error_code(&EngineError::validation("bad")), INVALID_PARAMS);
        assert_eq!(error_code(&EngineError::internal("boom")), INTERNAL_ERROR);
        assert_eq!(
            error_code(&EngineError::VersionConflict {
                aggregate_id: uuid::Uuid::nil(),
                expected: 1,
                actual: 2
            }),
            -32002
        );
    }

    #[test]
    fn error_body_carries_kind() {
        let body = engine_error_body(
            json!(7),
            &EngineError::QueryNotFound { query: "Nope".into() },
        );
        assert_eq!(body["error"]["code"], -32003);
        assert_eq!(body["error"]["data"]["kind"], "query-not-found");
        assert_eq!(body["id"], 7);
    }
}
