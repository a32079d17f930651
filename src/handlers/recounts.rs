use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::CurrentUser,
    models::RecountTask,
    services::scheduler::{self, AssignmentRequest},
    AppState,
};

#[derive(Serialize)]
pub struct TaskSummary {
    pub id: Uuid,
    pub stock_code: String,
    pub lot_number: Option<String>,
    pub assigned_to: Uuid,
    pub status: String,
}

impl From<RecountTask> for TaskSummary {
    fn from(task: RecountTask) -> Self {
        Self {
            id: task.id,
            stock_code: task.stock_code,
            lot_number: task.lot_number,
            assigned_to: task.assigned_to,
            status: task.status,
        }
    }
}

#[derive(Serialize)]
pub struct TasksResponse {
    pub ok: bool,
    pub tasks: Vec<TaskSummary>,
}

#[derive(Serialize)]
pub struct TaskResponse {
    pub ok: bool,
    pub task: RecountTask,
}

#[derive(Deserialize)]
pub struct TaskQuery {
    event_id: Uuid,
    warehouse_code: String,
    status: Option<String>,
}

pub async fn assign_recounts(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<AssignmentRequest>,
) -> Result<Json<TasksResponse>, AppError> {
    let tasks = scheduler::assign_recounts(&state, &user, request).await?;
    Ok(Json(TasksResponse {
        ok: true,
        tasks: tasks.into_iter().map(TaskSummary::from).collect(),
    }))
}

pub async fn list_recounts(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<TaskQuery>,
) -> Result<Json<TasksResponse>, AppError> {
    let status = query.status.filter(|s| !s.trim().is_empty());
    let tasks =
        scheduler::list_tasks(&state, &user, query.event_id, &query.warehouse_code, status).await?;
    Ok(Json(TasksResponse {
        ok: true,
        tasks: tasks.into_iter().map(TaskSummary::from).collect(),
    }))
}

pub async fn complete_recount(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskResponse>, AppError> {
    let task = scheduler::complete_task(&state, &user, task_id).await?;
    Ok(Json(TaskResponse { ok: true, task }))
}
