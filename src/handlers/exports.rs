use axum::{
    extract::{Query, State},
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::AppError, middleware::CurrentUser, services::export, AppState};

#[derive(Deserialize)]
pub struct ExportQuery {
    event_id: Uuid,
    warehouse_code: String,
}

pub async fn export_counts(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let export = export::export_totals(&state, &user, query.event_id, &query.warehouse_code).await?;

    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        export.filename.replace('"', ""),
        urlencoding::encode(&export.filename)
    );

    Ok((
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        export.body,
    )
        .into_response())
}
