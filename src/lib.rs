use std::sync::Arc;

use config::Config;
use repositories::PostsRepository;
use services::{posts::PostsService, uploads::UploadService};

pub use self::errors::{Error, Result};

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub posts_service: PostsService,
    pub uploads_service: UploadService,
}

impl AppState {
    pub fn new(config: Config, repo: Arc<dyn PostsRepository>) -> Self {
        Self {
            posts_service: PostsService::new(repo),
            uploads_service: UploadService::new(config.upload_dir.clone(), config.max_upload_size),
            config,
        }
    }
}
