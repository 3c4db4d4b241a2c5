// File: src/api/methods.rs
//
// REST-ish invocation and introspection endpoints wrapping the RPC registry

use std::sync::Arc;

use actix_web::{http::StatusCode, web, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use defense_engine_core::error::{EngineError, ErrorKind};
use defense_engine_core::rpc::RpcParams;
use defense_engine_core::runtime::EngineRuntime;

/// HTTP status for an engine error: client-shaped failures are 4xx, the
/// rest 5xx.
fn status_for(error: &EngineError) -> StatusCode {
    match error.kind() {
        ErrorKind::MethodNotFound | ErrorKind::QueryNotFound | ErrorKind::AggregateNotFound => {
            StatusCode::NOT_FOUND
        }
        ErrorKind::VersionConflict => StatusCode::CONFLICT,
        ErrorKind::InvalidParams | ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Timeout | ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &EngineError) -> HttpResponse {
    HttpResponse::build(status_for(error)).json(json!({
        "success": false,
        "error": {"message": error.to_string(), "kind": error.kind().as_str()},
    }))
}

async fn invoke(
    runtime: &Arc<EngineRuntime>,
    method: &str,
    params: Option<Value>,
) -> HttpResponse {
    let params = match RpcParams::from_value(params) {
        Ok(params) => params,
        Err(error) => return error_response(&error),
    };
    let ctx = super::request_context(runtime);
    match runtime.rpc.invoke(ctx, method, params).await {
        Ok(result) => HttpResponse::Ok().json(json!({"success": true, "result": result})),
        Err(error) => error_response(&error),
    }
}

/// POST /rpc/method/{dotted.name} with the params as the JSON body.
pub async fn handle_method(
    runtime: web::Data<Arc<EngineRuntime>>,
    path: web::Path<String>,
    body: web::Bytes,
) -> HttpResponse {
    let params = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => Some(value),
            Err(e) => {
                return error_response(&EngineError::invalid_params(format!(
                    "request body is not JSON: {}",
                    e
                )));
            }
        }
    };
    invoke(&runtime, &path.into_inner(), params).await
}

#[derive(Debug, Deserialize)]
pub struct CallRequest {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// POST /rpc/call with `{method, params}`.
pub async fn handle_call(
    runtime: web::Data<Arc<EngineRuntime>>,
    request: web::Json<CallRequest>,
) -> HttpResponse {
    let request = request.into_inner();
    invoke(&runtime, &request.method, request.params).await
}

/// GET /rpc/methods
pub async fn handle_list_methods(runtime: web::Data<Arc<EngineRuntime>>) -> HttpResponse {
    let descriptors = runtime.rpc.descriptors();
    let mut signatures = Map::new();
    for descriptor in &descriptors {
        signatures.insert(
            descriptor.name.clone(),
            json!({"params": descriptor.params, "result": descriptor.result}),
        );
    }

    HttpResponse::Ok().json(json!({
        "success": true,
        "methods": runtime.rpc.method_names(),
        "signatures": signatures,
        "groups": runtime.rpc.groups(),
        "count": descriptors.len(),
    }))
}

/// GET /rpc/info/{dotted.name}
pub async fn handle_method_info(
    runtime: web::Data<Arc<EngineRuntime>>,
    path: web::Path<String>,
) -> HttpResponse {
    let name = path.into_inner();
    match runtime.rpc.descriptor(&name) {
        Some(descriptor) => {
            HttpResponse::Ok().json(json!({"success": true, "method": descriptor}))
        }
        None => error_response(&EngineError::MethodNotFound { method: name }),
    }
}
