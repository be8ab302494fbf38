use std::sync::Arc;

use backend_blog::{
    config::Config, repositories::build_repository, routes::create_routes, AppState,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("backend_blog=debug,tower_http=debug")),
        )
        .init();

    let config = match Config::init() {
        Ok(config) => config,
        Err(err) => {
            error!("🔥 Invalid configuration: {}", err);
            std::process::exit(1);
        }
    };

    let repo = match build_repository(&config).await {
        Ok(repo) => repo,
        Err(err) => {
            error!("🔥 Failed to open post storage: {}", err);
            std::process::exit(1);
        }
    };

    let port = config.port;
    let api_url = config.api_url.clone();
    let app = create_routes(Arc::new(AppState::new(config, repo)));

    let listener = match tokio::net::TcpListener::bind(format!("[::]:{port}")).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("🔥 Failed to bind port {}: {}", port, err);
            std::process::exit(1);
        }
    };

    info!("🚀 Serving posts API at {}", api_url);
    if let Err(err) = axum::serve(listener, app).await {
        error!("Server error: {}", err);
        std::process::exit(1);
    }
}
