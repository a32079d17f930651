use axum::{
    extract::{Path, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
};

use crate::{
    error::AppError,
    middleware::CurrentUser,
    photos::{content_type_for, warehouse_segment, PhotoError},
    AppState,
};

/// Serve stored evidence to users who can see the photo's warehouse.
/// Keys are `{event}/{warehouse}/{file}`.
pub async fn serve_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let segment = match key.split('/').collect::<Vec<_>>().as_slice() {
        [_, warehouse, _] => warehouse.to_string(),
        _ => return Ok(StatusCode::NOT_FOUND.into_response()),
    };

    let allowed = user.is_admin()
        || user
            .warehouses
            .iter()
            .any(|wh| warehouse_segment(wh) == segment);
    if !allowed {
        return Err(AppError::Forbidden(format!(
            "not assigned to warehouse {}",
            segment
        )));
    }

    match state.photos.get(&key).await {
        Ok(Some(data)) => Ok(([(CONTENT_TYPE, content_type_for(&key))], data).into_response()),
        Ok(None) => Ok(StatusCode::NOT_FOUND.into_response()),
        Err(PhotoError::InvalidKey(_)) => Ok(StatusCode::NOT_FOUND.into_response()),
        Err(e) => Err(e.into()),
    }
}
