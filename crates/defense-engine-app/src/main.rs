// File: src/main.rs
//
// Server entry point: configuration from the environment, runtime assembly,
// game-domain registration, actix HTTP server

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use dotenvy::dotenv;

use defense_engine_api::{api, bootstrap, monitoring};
use defense_engine_app::game;
use defense_engine_core::config::EngineConfig;
use defense_engine_core::context::RequestContext;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    monitoring::logging::init_structured_logging();

    let config = EngineConfig::from_env().map_err(to_io_error)?;
    let bind_address = format!("{}:{}", config.host, config.port);

    let runtime = bootstrap::runtime_builder(config)
        .map_err(to_io_error)?
        .add_projection(Arc::new(game::projections::GameViewProjection))
        .add_projection(Arc::new(game::projections::TowerViewProjection))
        .build()
        .await
        .map_err(to_io_error)?;
    let runtime = Arc::new(runtime);

    game::register(&runtime).map_err(to_io_error)?;
    api::admin::register_admin(&runtime).map_err(to_io_error)?;

    let ctx = RequestContext::background();
    runtime.start(&ctx).await.map_err(to_io_error)?;

    tracing::info!(%bind_address, "defense engine listening");

    let app_runtime = Arc::clone(&runtime);
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(Arc::clone(&app_runtime)))
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .configure(api::init_routes)
    })
    .bind(&bind_address)?
    .run()
    .await;

    runtime.stop(&ctx).await.map_err(to_io_error)?;
    server
}

fn to_io_error(error: defense_engine_core::EngineError) -> std::io::Error {
    std::io::Error::other(error.to_string())
}
