use std::{env, path::PathBuf, str::FromStr};

use crate::{Error, Result};

pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 5 * 1024 * 1024;

/// Which `PostsRepository` implementation serves the routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    File,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" | "json" => Ok(Self::File),
            "postgres" | "postgresql" | "sql" => Ok(Self::Postgres),
            other => Err(Error::Config(format!("unknown STORAGE_BACKEND `{other}`"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageBackend,
    pub data_file: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_size: usize,
    pub database_url: Option<String>,
    pub db_pool_size: u32,
    pub port: u16,
    pub base_url: String,
    pub api_url: String,
}

impl Config {
    /// Loads `.env` (if present) and reads the process environment.
    pub fn init() -> Result<Config> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok().filter(|v| !v.is_empty()))
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = match lookup("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => StorageBackend::File,
        };

        let port = parse_or(&lookup, "PORT", 8080)?;

        let database_url = lookup("DATABASE_URL").or_else(|| compose_database_url(&lookup));
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(Error::Config(
                "DATABASE_URL or DB_HOST/DB_NAME must be set for the postgres backend".to_string(),
            ));
        }

        Ok(Config {
            storage,
            data_file: lookup("DATA_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data").join("posts.json")),
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public").join("uploads")),
            max_upload_size: parse_or(&lookup, "MAX_UPLOAD_SIZE", DEFAULT_MAX_UPLOAD_SIZE)?,
            database_url,
            db_pool_size: parse_or(&lookup, "DB_POOL_SIZE", 10)?,
            port,
            base_url: lookup("BASE_URL").unwrap_or_else(|| "http://localhost:3000".to_string()),
            api_url: lookup("API_URL").unwrap_or_else(|| format!("http://localhost:{port}/api")),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} has an invalid value `{raw}`"))),
        None => Ok(default),
    }
}

fn compose_database_url<F>(lookup: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let host = lookup("DB_HOST")?;
    let name = lookup("DB_NAME")?;
    let port = lookup("DB_PORT").unwrap_or_else(|| "5432".to_string());

    let credentials = match (lookup("DB_USER"), lookup("DB_PASSWORD")) {
        (Some(user), Some(password)) => format!("{user}:{password}@"),
        (Some(user), None) => format!("{user}@"),
        _ => String::new(),
    };

    Some(format!("postgres://{credentials}{host}:{port}/{name}"))
}
