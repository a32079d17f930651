use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PhotoError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid photo key: {0}")]
    InvalidKey(String),
}

/// Durable storage for count photo evidence.
///
/// Keys are path-like strings: `{event}/{warehouse}/{uuid}.jpg`.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Store a photo. Overwrites if the key already exists.
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), PhotoError>;

    /// Read a photo back. `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PhotoError>;

    /// Delete a photo. No-op if the key does not exist.
    async fn delete(&self, key: &str) -> Result<(), PhotoError>;
}

/// PhotoStore backed by a local directory. Parent directories are created
/// on `put`.
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn open(base_dir: &Path) -> Result<Self, PhotoError> {
        std::fs::create_dir_all(base_dir).map_err(|e| PhotoError::Io(e.to_string()))?;
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// Resolve a key to a path under `base_dir`. Rejects keys that could
    /// escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf, PhotoError> {
        if key.is_empty() {
            return Err(PhotoError::InvalidKey(key.to_string()));
        }
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(PhotoError::InvalidKey(key.to_string()));
        }
        Ok(self.base_dir.join(relative))
    }
}

#[async_trait]
impl PhotoStore for FileStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<(), PhotoError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PhotoError::Io(e.to_string()))?;
        }
        fs::write(&path, data)
            .await
            .map_err(|e| PhotoError::Io(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PhotoError> {
        let path = self.resolve(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PhotoError::Io(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), PhotoError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PhotoError::Io(e.to_string())),
        }
    }
}

/// Photo evidence attached to a submission.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

const ALLOWED_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "heic"];

impl PhotoUpload {
    /// File extension for storage, taken from the filename and falling back
    /// to the content type. `None` when the type is not an accepted image.
    pub fn extension(&self) -> Option<String> {
        let from_name = self
            .filename
            .as_deref()
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
            .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()));

        from_name.or_else(|| {
            let ext = match self.content_type.as_deref()?.to_ascii_lowercase().as_str() {
                "image/jpeg" | "image/jpg" => "jpg",
                "image/png" => "png",
                "image/webp" => "webp",
                "image/heic" => "heic",
                _ => return None,
            };
            Some(ext.to_string())
        })
    }
}

/// Warehouse code as it appears in a photo key.
pub fn warehouse_segment(warehouse_code: &str) -> String {
    warehouse_code
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Storage key for a new photo: `{event}/{warehouse}/{uuid}.{ext}`.
pub fn photo_key(event_id: Uuid, warehouse_code: &str, extension: &str) -> String {
    format!(
        "{}/{}/{}.{}",
        event_id,
        warehouse_segment(warehouse_code),
        Uuid::new_v4(),
        extension
    )
}

/// Content type to serve a stored photo with, by key extension.
pub fn content_type_for(key: &str) -> &'static str {
    let ext = Path::new(key)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        _ => "application/octet-stream",
    }
}
