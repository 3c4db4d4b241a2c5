// File: tests/jsonrpc_endpoint_tests.rs
//
// Wire-level tests for the JSON-RPC endpoint, the REST-ish method routes,
// and the introspection surface

use std::sync::Arc;

use actix_web::{test, web, App};
use serde_json::{json, Value};

use defense_engine_api::api;
use defense_engine_core::config::EngineConfig;
use defense_engine_core::error::EngineResult;
use defense_engine_core::rpc::{RegisterOptions, RpcHandler, RpcMethod};
use defense_engine_core::runtime::EngineRuntime;
use defense_engine_core::RequestContext;

struct GameHandler;

impl GameHandler {
    async fn status(&self) -> EngineResult<Value> {
        Ok(json!({"state": "lobby", "players": 0}))
    }
}

impl RpcHandler for GameHandler {
    fn methods(self: Arc<Self>) -> Vec<RpcMethod> {
        vec![
            RpcMethod::nullary("GetStatus", &self, |h, _ctx| async move { h.status().await }),
            RpcMethod::nullary("Ping", &self, |_h, _ctx| async move { Ok(json!("pong")) }),
            RpcMethod::nullary("GetState", &self, |_h, _ctx| async move {
                Ok(json!({"internal": true}))
            }),
            RpcMethod::unary("ProcessRawData", &self, |_h, _ctx, raw: Value| async move {
                Ok(raw)
            }),
        ]
    }
}

struct UtilHandler;

impl RpcHandler for UtilHandler {
    fn methods(self: Arc<Self>) -> Vec<RpcMethod> {
        vec![RpcMethod::unary("Echo", &self, |_h, _ctx, value: Value| async move {
            Ok(value)
        })]
    }
}

async fn test_runtime() -> Arc<EngineRuntime> {
    let runtime = EngineRuntime::builder(EngineConfig::default())
        .build()
        .await
        .unwrap();
    runtime
        .rpc
        .register_handler(
            "game",
            &Arc::new(GameHandler),
            RegisterOptions::new().ignore_names(["GetState", "ProcessRawData"]),
        )
        .unwrap();
    runtime
        .rpc
        .register_handler("util", &Arc::new(UtilHandler), RegisterOptions::new())
        .unwrap();
    let runtime = Arc::new(runtime);
    runtime.start(&RequestContext::background()).await.unwrap();
    runtime
}

macro_rules! app {
    ($runtime:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(Arc::clone(&$runtime)))
                .configure(api::init_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn jsonrpc_happy_path() {
    let runtime = test_runtime().await;
    let app = app!(runtime);

    let req = test::TestRequest::post()
        .uri("/rpc")
        .set_json(json!({"jsonrpc": "2.0", "method": "game.GetStatus", "id": 17}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["id"], 17);
    assert_eq!(body["result"]["state"], "lobby");
}

#[actix_web::test]
async fn jsonrpc_object_params_reach_the_method() {
    let runtime = test_runtime().await;
    let app = app!(runtime);

    let req = test::TestRequest::post()
        .uri("/rpc")
        .set_json(json!({
            "jsonrpc": "2.0",
            "method": "util.Echo",
            "params": {"gameId": "g1", "x": 3},
            "id": 1
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["result"]["gameId"], "g1");
}

#[actix_web::test]
async fn ignored_methods_are_absent_and_unreachable() {
    let runtime = test_runtime().await;
    let app = app!(runtime);

    // Introspection lists exactly the two visible methods.
    let req = test::TestRequest::get().uri("/rpc/methods").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["success"], true);
    let game_methods: Vec<&str> = body["methods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap())
        .filter(|m| m.starts_with("game."))
        .collect();
    assert_eq!(game_methods, vec!["game.GetStatus", "game.Ping"]);
    assert_eq!(body["count"], 3);

    // Invoking an ignored method is method-not-found.
    let req = test::TestRequest::post()
        .uri("/rpc")
        .set_json(json!({"jsonrpc": "2.0", "method": "game.GetState", "id": 2}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(body["error"]["data"]["kind"], "method-not-found");
}

#[actix_web::test]
async fn parse_and_envelope_errors_use_spec_codes() {
    let runtime = test_runtime().await;
    let app = app!(runtime);

    // Broken JSON: -32700.
    let req = test::TestRequest::post()
        .uri("/rpc")
        .insert_header(("content-type", "application/json"))
        .set_payload("{not json")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);

    // Wrong version tag: -32600.
    let req = test::TestRequest::post()
        .uri("/rpc")
        .set_json(json!({"jsonrpc": "1.0", "method": "game.Ping", "id": 3}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["error"]["code"], -32600);

    // Arity mismatch: -32602.
    let req = test::TestRequest::post()
        .uri("/rpc")
        .set_json(json!({
            "jsonrpc": "2.0",
            "method": "game.Ping",
            "params": [1, 2],
            "id": 4
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["error"]["code"], -32602);
    assert_eq!(body["error"]["data"]["kind"], "invalid-params");
}

#[actix_web::test]
async fn rpc_resource_rejects_other_verbs() {
    let runtime = test_runtime().await;
    let app = app!(runtime);

    let req = test::TestRequest::delete().uri("/rpc").to_request();
    let response = test::call_service(&app, req).await;
    assert_eq!(response.status(), 405);

    // GET answers the CORS preflight with permissive headers.
    let req = test::TestRequest::get().uri("/rpc").to_request();
    let response = test::call_service(&app, req).await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("Access-Control-Allow-Origin")
            .unwrap(),
        "*"
    );
}

#[actix_web::test]
async fn rest_method_route_maps_status_codes() {
    let runtime = test_runtime().await;
    let app = app!(runtime);

    let req = test::TestRequest::post()
        .uri("/rpc/method/util.Echo")
        .set_json(json!({"hello": "world"}))
        .to_request();
    let response = test::call_service(&app, req).await;
    assert_eq!(response.status(), 200);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["result"]["hello"], "world");

    let req = test::TestRequest::post()
        .uri("/rpc/method/game.Missing")
        .set_json(json!({}))
        .to_request();
    let response = test::call_service(&app, req).await;
    assert_eq!(response.status(), 404);
    let body: Value = test::read_body_json(response).await;
    assert_eq!(body["error"]["kind"], "method-not-found");
}

#[actix_web::test]
async fn rpc_call_route_takes_method_and_params() {
    let runtime = test_runtime().await;
    let app = app!(runtime);

    let req = test::TestRequest::post()
        .uri("/rpc/call")
        .set_json(json!({"method": "game.Ping"}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["result"], "pong");
}

#[actix_web::test]
async fn method_info_returns_one_descriptor() {
    let runtime = test_runtime().await;
    let app = app!(runtime);

    let req = test::TestRequest::get()
        .uri("/rpc/info/util.Echo")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["method"]["name"], "util.Echo");
    assert_eq!(body["method"]["params"][0], "Value");

    let req = test::TestRequest::get()
        .uri("/rpc/info/game.Nope")
        .to_request();
    let response = test::call_service(&app, req).await;
    assert_eq!(response.status(), 404);
}

#[actix_web::test]
async fn health_reports_runtime_shape() {
    let runtime = test_runtime().await;
    let app = app!(runtime);

    let req = test::TestRequest::get().uri("/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["rpc_methods"], 3);
}

#[actix_web::test]
async fn admin_surface_exposes_stats_and_recovery() {
    let runtime = EngineRuntime::builder(EngineConfig::default())
        .build()
        .await
        .unwrap();
    let runtime = Arc::new(runtime);
    defense_engine_api::api::admin::register_admin(&runtime).unwrap();
    runtime.start(&RequestContext::background()).await.unwrap();
    let app = app!(runtime);

    let req = test::TestRequest::post()
        .uri("/rpc")
        .set_json(json!({"jsonrpc": "2.0", "method": "engine.Stats", "id": 1}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["result"]["store"]["total_events"], 0);
    assert!(body["result"]["snapshots"].is_object());

    let req = test::TestRequest::post()
        .uri("/rpc")
        .set_json(json!({"jsonrpc": "2.0", "method": "engine.Projections", "id": 2}))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["result"]["projections"].as_array().unwrap().is_empty());

    // Rebuilding an unknown projection is an error, not a crash.
    let req = test::TestRequest::post()
        .uri("/rpc")
        .set_json(json!({
            "jsonrpc": "2.0",
            "method": "engine.RebuildProjection",
            "params": {"name": "ghost"},
            "id": 3
        }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert!(body["error"]["code"].is_i64());
}
