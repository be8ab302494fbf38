use axum::{
    extract::{multipart::Field, FromRequest, Multipart, Request},
    http::header,
    Json,
};

use crate::{models::posts::PostDto, services::uploads::UploadedImage, Error, Result};

/// A create/update body, sent either as JSON or as `multipart/form-data`
/// with an optional `image` file part.
#[derive(Debug)]
pub struct PostForm {
    pub dto: PostDto,
    pub image: Option<UploadedImage>,
}

impl<S> FromRequest<S> for PostForm
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        if is_multipart(&req) {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| Error::BadRequest(e.body_text()))?;
            return read_post_form(multipart).await;
        }

        let Json(dto) = Json::<PostDto>::from_request(req, state)
            .await
            .map_err(|e| Error::BadRequest(e.body_text()))?;

        Ok(Self { dto, image: None })
    }
}

fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

async fn read_post_form(mut multipart: Multipart) -> Result<PostForm> {
    let mut dto = PostDto::default();
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "image" if field.file_name().is_some() => image = read_file(field).await?,
            "image" => dto.image = Some(read_text(field).await?),
            "imageUrl" => dto.image_url = Some(read_text(field).await?),
            "title" => dto.title = read_text(field).await?,
            "description" => dto.description = read_text(field).await?,
            "date" => dto.date = Some(read_text(field).await?),
            _ => {}
        }
    }

    Ok(PostForm { dto, image })
}

/// Returns the first file part named `field_name`.
pub async fn read_file_field(
    mut multipart: Multipart,
    field_name: &str,
) -> Result<Option<UploadedImage>> {
    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        if field.name() == Some(field_name) {
            return read_file(field).await;
        }
    }

    Ok(None)
}

/// Browsers send an empty, unnamed part for an untouched file input.
async fn read_file(field: Field<'_>) -> Result<Option<UploadedImage>> {
    let file_name = field
        .file_name()
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let data = field.bytes().await.map_err(bad_multipart)?;

    if file_name.is_none() && data.is_empty() {
        return Ok(None);
    }

    Ok(Some(UploadedImage {
        file_name,
        content_type,
        data,
    }))
}

async fn read_text(field: Field<'_>) -> Result<String> {
    field.text().await.map_err(bad_multipart)
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> Error {
    Error::BadRequest(err.body_text())
}
