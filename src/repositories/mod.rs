use std::sync::Arc;

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::{
    config::{Config, StorageBackend},
    Error, Result,
};

pub mod json_repo;
pub mod posts_repo;

pub use json_repo::JsonFileRepo;
pub use posts_repo::PostsRepository;

#[derive(Clone)]
pub struct PostgresRepo {
    pool: PgPool,
}

impl PostgresRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Opens the storage engine named by the config. For postgres this also
/// checks that a connection can be made.
pub async fn build_repository(config: &Config) -> Result<Arc<dyn PostsRepository>> {
    match config.storage {
        StorageBackend::File => {
            info!("Using JSON file store at {}", config.data_file.display());
            Ok(Arc::new(JsonFileRepo::new(config.data_file.clone())))
        }
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| Error::Config("DATABASE_URL is not set".to_string()))?;

            let pool = PgPoolOptions::new()
                .max_connections(config.db_pool_size)
                .connect(url)
                .await?;

            info!("✅ Connection to the database is successful!");
            Ok(Arc::new(PostgresRepo::new(pool)))
        }
    }
}
