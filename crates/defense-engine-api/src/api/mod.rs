//! HTTP surface of the defense engine.

pub mod admin;
pub mod health;
pub mod jsonrpc;
pub mod methods;
pub mod sse;

use std::sync::Arc;

use actix_web::web;

use defense_engine_core::runtime::EngineRuntime;

/// Mount every route onto an actix `App`.
///
/// The runtime must already be registered as `web::Data<Arc<EngineRuntime>>`.
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/rpc")
            .route(web::post().to(jsonrpc::handle_jsonrpc))
            .route(web::get().to(jsonrpc::handle_preflight))
            .route(web::route().to(jsonrpc::handle_method_not_allowed)),
    )
    .route("/rpc/call", web::post().to(methods::handle_call))
    .route("/rpc/method/{name}", web::post().to(methods::handle_method))
    .route("/rpc/methods", web::get().to(methods::handle_list_methods))
    .route("/rpc/info/{name}", web::get().to(methods::handle_method_info))
    .route("/events/subscribe", web::get().to(sse::handle_subscribe))
    .route("/health", web::get().to(health::handle_health))
    .route("/metrics", web::get().to(crate::monitoring::handle_metrics));
}

/// Request context carrying the transport's default deadline.
pub(crate) fn request_context(runtime: &Arc<EngineRuntime>) -> defense_engine_core::RequestContext {
    defense_engine_core::RequestContext::with_timeout(runtime.config.request_timeout())
}
