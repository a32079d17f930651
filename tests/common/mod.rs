#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use chrono::Utc;
use stockcount::{
    build_router,
    config::Config,
    models::{Product, Role},
    photos::{FileStore, PhotoError, PhotoStore},
    store::MemoryStore,
    utils::Claims,
    AppState,
};

pub const SECRET: &str = "test-secret";
pub const BOUNDARY: &str = "stockcount-boundary";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub app: Router,
    pub photo_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        let photo_dir = tempfile::tempdir().unwrap();
        let photos = FileStore::open(photo_dir.path()).unwrap();
        Self::with_photos(photo_dir, Arc::new(photos))
    }

    pub fn with_failing_photos() -> Self {
        let photo_dir = tempfile::tempdir().unwrap();
        Self::with_photos(photo_dir, Arc::new(FailingPhotos))
    }

    fn with_photos(photo_dir: TempDir, photos: Arc<dyn PhotoStore>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let config = Config::local(SECRET, photo_dir.path().to_path_buf());
        let state = AppState::new(store.clone(), photos, config);
        Self {
            store,
            app: build_router(state),
            photo_dir,
        }
    }

    /// Create an active user assigned to the given warehouses and return
    /// their id and a bearer token.
    pub fn user(&self, email: &str, role: Role, warehouses: &[&str]) -> (Uuid, String) {
        let id = self.store.add_user(email, role);
        for wh in warehouses {
            self.store.assign_warehouse(id, wh);
        }
        (id, token_for(id, email))
    }

    pub fn product(&self, stock_code: &str, upc: i32, cpl: i32, lpp: i32) {
        self.store.add_product(Product {
            id: Uuid::new_v4(),
            stock_code: stock_code.to_string(),
            case_barcode: Some(format!("{}-CASE", stock_code)),
            unit_barcode: Some(format!("{}-UNIT", stock_code)),
            description: format!("{} description", stock_code),
            units_per_case: Some(upc),
            cases_per_layer: Some(cpl),
            layers_per_pallet: Some(lpp),
            updated_at: Utc::now(),
        });
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }
}

/// Sign a token the way the identity service does.
pub fn token_for(id: Uuid, email: &str) -> String {
    let now = Utc::now();
    let claims = Claims {
        sub: id.to_string(),
        email: email.to_string(),
        exp: (now + chrono::Duration::hours(1)).timestamp(),
        iat: now.timestamp(),
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(SECRET.as_ref()),
    )
    .unwrap()
}

pub fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// A multipart body with text fields and an optional `photo` file part.
pub fn multipart(
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    photo: Option<(&str, &str, &[u8])>,
) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((filename, mime, bytes)) = photo {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, filename, mime
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body))
        .unwrap()
}

/// Photo store that is always unavailable.
pub struct FailingPhotos;

#[async_trait]
impl PhotoStore for FailingPhotos {
    async fn put(&self, _key: &str, _data: &[u8]) -> Result<(), PhotoError> {
        Err(PhotoError::Io("disk unavailable".to_string()))
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, PhotoError> {
        Err(PhotoError::Io("disk unavailable".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), PhotoError> {
        Ok(())
    }
}
