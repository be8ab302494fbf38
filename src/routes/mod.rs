use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    Extension, Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{
    handlers::{posts::posts_handler, upload::upload_handler},
    services::uploads::PUBLIC_PREFIX,
    AppState,
};

// Room for multipart boundaries and text fields around the file itself.
const FORM_OVERHEAD: usize = 64 * 1024;

pub fn create_routes(app_state: Arc<AppState>) -> Router {
    let body_limit = app_state.config.max_upload_size + FORM_OVERHEAD;
    let uploads = ServeDir::new(app_state.uploads_service.upload_dir());
    let cors = configure_cors(&app_state.config.base_url);

    let api_route = Router::new()
        .merge(posts_handler())
        .merge(upload_handler())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .nest("/api", api_route)
        .nest_service(PUBLIC_PREFIX, uploads)
        .layer(cors)
}

pub fn configure_cors(base_url: &str) -> CorsLayer {
    let origin = match base_url.trim_end_matches('/').parse::<HeaderValue>() {
        Ok(origin) => AllowOrigin::exact(origin),
        Err(_) => AllowOrigin::any(),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any)
}
