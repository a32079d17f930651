use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::Role,
    utils::verify_token,
    AppState,
};

const AUTH_COOKIE: &str = "auth_token";

/// The authenticated caller with the scope needed for authorization checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub warehouses: Vec<String>,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_access_warehouse(&self, warehouse_code: &str) -> bool {
        self.is_admin() || self.warehouses.iter().any(|w| w == warehouse_code)
    }

    /// Admins bypass the check; everyone else needs an assignment.
    pub fn require_warehouse(&self, warehouse_code: &str) -> Result<(), AppError> {
        if self.can_access_warehouse(warehouse_code) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "not assigned to warehouse {}",
                warehouse_code
            )))
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Resolve the caller from a bearer token, falling back to the
/// `auth_token` cookie.
pub async fn authenticate(
    headers: &HeaderMap,
    cookies: Option<&Cookies>,
    state: &AppState,
) -> Result<CurrentUser, AppError> {
    let token = bearer_token(headers)
        .or_else(|| cookies.and_then(|c| c.get(AUTH_COOKIE)).map(|c| c.value().to_string()))
        .ok_or_else(|| AppError::Unauthorized("missing credential".to_string()))?;

    let claims = verify_token(&token, &state.config.jwt_secret)
        .map_err(|e| AppError::Unauthorized(format!("invalid credential: {}", e)))?;

    let user_id = claims
        .user_id()
        .ok_or_else(|| AppError::Unauthorized("invalid credential subject".to_string()))?;

    let user = state
        .store
        .find_active_user(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("unknown or inactive user".to_string()))?;

    let role = user
        .role()
        .ok_or_else(|| AppError::Forbidden(format!("unrecognised role {}", user.role)))?;

    let warehouses = state.store.warehouse_codes_for(user.id).await?;

    Ok(CurrentUser {
        id: user.id,
        email: user.email,
        display_name: user.display_name,
        role,
        warehouses,
    })
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Cookies are only present when the cookie layer is installed
        let cookies = parts.extensions.get::<Cookies>().cloned();
        authenticate(&parts.headers, cookies.as_ref(), state).await
    }
}
