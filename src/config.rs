use std::env;
use std::path::PathBuf;

use crate::error::AppError;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PHOTO_DIR: &str = "data/photos";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Server configuration, read from the environment (and `.env` via dotenvy).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_secret: String,
    pub photo_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?;

        let port = match env::var("PORT") {
            Ok(value) => value
                .parse::<u16>()
                .map_err(|_| AppError::Config(format!("PORT is not a valid port: {}", value)))?,
            Err(_) => DEFAULT_PORT,
        };

        let photo_dir = env::var("PHOTO_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PHOTO_DIR));

        let max_upload_bytes = match env::var("MAX_UPLOAD_BYTES") {
            Ok(value) => value.parse::<usize>().map_err(|_| {
                AppError::Config(format!("MAX_UPLOAD_BYTES is not a number: {}", value))
            })?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            database_url,
            port,
            jwt_secret,
            photo_dir,
            max_upload_bytes,
        })
    }

    /// Configuration that needs no environment. Used by tests and local runs
    /// against the in-memory store.
    pub fn local(jwt_secret: &str, photo_dir: PathBuf) -> Self {
        Self {
            database_url: String::new(),
            port: DEFAULT_PORT,
            jwt_secret: jwt_secret.to_string(),
            photo_dir,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}

fn required(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Config(format!("{} must be set", name)))
}
