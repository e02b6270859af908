//! Job Engine API Server
//!
//! Binary entry point: reads settings from the environment, initializes
//! logging and runs the HTTP server.

use env_logger::Env;
use job_engine::api::run_server;
use job_engine::config::Settings;
use log::info;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let settings = Settings::from_env();
    if settings.openai_api_key.is_empty() {
        log::warn!("OPENAI_API_KEY is not set; synthesis and retrieval will be degraded");
    }
    if settings.rapidapi_key.is_empty() {
        log::warn!("RAPIDAPI_KEY is not set; job search will be degraded");
    }

    info!(
        "starting job_engine v{} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        settings.host,
        settings.port
    );
    run_server(settings).await
}
