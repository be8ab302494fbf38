use std::path::{Path, PathBuf};

use axum::body::Bytes;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{Error, Result};

const ALLOWED_TYPES: [&str; 5] = ["jpeg", "jpg", "png", "gif", "webp"];
pub const PUBLIC_PREFIX: &str = "/uploads";

/// A file part pulled out of a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub url: String,
    pub original_name: Option<String>,
    pub filename: String,
    pub size: usize,
    pub content_type: Option<String>,
}

#[derive(Clone)]
pub struct UploadService {
    upload_dir: PathBuf,
    max_size: usize,
}

impl UploadService {
    pub fn new(upload_dir: impl Into<PathBuf>, max_size: usize) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            max_size,
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub async fn save_image(&self, image: UploadedImage) -> Result<StoredUpload> {
        if image.data.is_empty() {
            return Err(Error::BadRequest("No file data found".to_string()));
        }

        if image.data.len() > self.max_size {
            warn!(size = image.data.len(), "rejected oversized upload");
            return Err(Error::UnsupportedMedia(format!(
                "File size must be less than {}MB",
                self.max_size / (1024 * 1024)
            )));
        }

        let extension = image
            .file_name
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .map(|ext| ext.to_string_lossy().to_lowercase());

        let allowed = extension
            .as_deref()
            .is_some_and(|ext| ALLOWED_TYPES.contains(&ext))
            && image.content_type.as_deref().is_some_and(is_allowed_mime);

        if !allowed {
            warn!(
                file_name = ?image.file_name,
                content_type = ?image.content_type,
                "rejected non-image upload"
            );
            return Err(Error::UnsupportedMedia(
                "Only image files are allowed".to_string(),
            ));
        }

        let filename = match extension {
            Some(ext) => format!("{}.{ext}", Uuid::now_v7()),
            None => Uuid::now_v7().to_string(),
        };

        fs::create_dir_all(&self.upload_dir).await?;
        fs::write(self.upload_dir.join(&filename), &image.data).await?;

        info!(%filename, size = image.data.len(), "stored upload");

        Ok(StoredUpload {
            url: format!("{PUBLIC_PREFIX}/{filename}"),
            original_name: image.file_name,
            size: image.data.len(),
            content_type: image.content_type,
            filename,
        })
    }
}

fn is_allowed_mime(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or_default().trim().to_lowercase();
    essence
        .strip_prefix("image/")
        .is_some_and(|subtype| ALLOWED_TYPES.contains(&subtype))
}
