use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Extension, Json, Router,
};

use crate::{models::response::UploadResponse, AppState, Error, Result};

use super::form::read_file_field;

pub fn upload_handler() -> Router {
    Router::new().route("/upload", post(upload))
}

async fn upload(
    Extension(app_state): Extension<Arc<AppState>>,
    multipart: core::result::Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse> {
    let multipart = multipart.map_err(|_| Error::BadRequest("No file uploaded".to_string()))?;
    let image = read_file_field(multipart, "file")
        .await?
        .ok_or_else(|| Error::BadRequest("No file uploaded".to_string()))?;

    let stored = app_state.uploads_service.save_image(image).await?;

    Ok((
        StatusCode::OK,
        Json(UploadResponse {
            success: true,
            url: stored.url,
            original_name: stored.original_name,
            filename: stored.filename,
            size: stored.size,
            content_type: stored.content_type,
        }),
    ))
}
