use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod engine;
mod error;
mod events;
mod model;
mod models;
mod routes;
mod settings;
mod store;
mod utils;

use config::Config;
use db::init_db;

use crate::api::AppEngine;
use crate::docs::ApiDoc;
use crate::engine::AttendanceEngine;
use crate::events::TracingEventSink;
use crate::settings::SettingsProvider;
use crate::store::mysql::{MySqlSettingsStore, MySqlStore};
use crate::utils::user_lock::UserLocks;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Shift attendance service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "attendance.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(true) // keeps the attendance_events target visible
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let engine: Data<AppEngine> = Data::new(AttendanceEngine::new(
        MySqlStore::new(pool.clone()),
        SettingsProvider::new(MySqlSettingsStore::new(pool.clone()), config.settings_refresh),
        UserLocks::new(config.checkin_lock_ttl),
        TracingEventSink,
    ));

    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config);

    info!(addr = %server_addr, "Listening");

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(engine.clone())
            .app_data(config_data.clone())
            .service(index)
            // Protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, &config_data))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
