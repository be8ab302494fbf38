use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};

use crate::{models::response::Response, AppState, Result};

use super::{extractors::PostId, form::PostForm};

pub fn posts_handler() -> Router {
    Router::new()
        .route("/posts", get(get_posts).post(create_post))
        .route(
            "/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
}

async fn get_posts(Extension(app_state): Extension<Arc<AppState>>) -> Result<impl IntoResponse> {
    let posts = app_state.posts_service.get_posts().await?;
    Ok((StatusCode::OK, Json(posts)))
}

async fn get_post(
    Extension(app_state): Extension<Arc<AppState>>,
    PostId(post_id): PostId,
) -> Result<impl IntoResponse> {
    let post = app_state.posts_service.get_post(post_id).await?;
    Ok((StatusCode::OK, Json(post)))
}

async fn create_post(
    Extension(app_state): Extension<Arc<AppState>>,
    form: PostForm,
) -> Result<impl IntoResponse> {
    let mut new_post = form.dto.into_new_post()?;

    if let Some(image) = form.image {
        let stored = app_state.uploads_service.save_image(image).await?;
        new_post.image = Some(stored.url);
    }

    let post = app_state.posts_service.create_post(new_post).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn update_post(
    Extension(app_state): Extension<Arc<AppState>>,
    PostId(post_id): PostId,
    form: PostForm,
) -> Result<impl IntoResponse> {
    let mut changes = form.dto.into_changes()?;

    if let Some(image) = form.image {
        // Don't store a file for a post that isn't there.
        app_state.posts_service.get_post(post_id).await?;
        let stored = app_state.uploads_service.save_image(image).await?;
        changes.image = Some(stored.url);
    }

    let post = app_state
        .posts_service
        .update_post(post_id, changes)
        .await?;

    Ok((StatusCode::OK, Json(post)))
}

async fn delete_post(
    Extension(app_state): Extension<Arc<AppState>>,
    PostId(post_id): PostId,
) -> Result<impl IntoResponse> {
    app_state.posts_service.delete_post(post_id).await?;

    Ok((
        StatusCode::OK,
        Json(Response {
            status: "success",
            message: "Post deleted successfully".to_string(),
        }),
    ))
}
