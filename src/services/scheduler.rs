//! Round-robin distribution of recount work across a warehouse's workers.
//!
//! The rotation cursor is derived from the assignee of the most recent task
//! for the same event and warehouse. The read and the batch insert are not
//! isolated from each other, so two concurrent calls can start at the same
//! worker; no task is lost, the load is just less even.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::CurrentUser,
    models::{NewRecountTask, RecountFilter, RecountTask, Role},
    AppState,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecountItem {
    pub stock_code: Option<String>,
    pub lot_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRequest {
    pub event_id: Uuid,
    pub warehouse_code: String,
    pub items: Vec<RecountItem>,
}

/// Index in `pool` to start assigning from: the slot after `last`, or 0
/// when there is no previous assignee or they left the pool.
pub fn rotation_start(pool: &[Uuid], last: Option<Uuid>) -> usize {
    if pool.is_empty() {
        return 0;
    }
    last.and_then(|last| pool.iter().position(|id| *id == last))
        .map(|index| (index + 1) % pool.len())
        .unwrap_or(0)
}

/// Assignee for each of `count` items, starting at `start` and wrapping.
pub fn plan_assignments(pool: &[Uuid], start: usize, count: usize) -> Vec<Uuid> {
    if pool.is_empty() {
        return Vec::new();
    }
    (0..count).map(|i| pool[(start + i) % pool.len()]).collect()
}

pub async fn assign_recounts(
    state: &AppState,
    user: &CurrentUser,
    request: AssignmentRequest,
) -> Result<Vec<RecountTask>, AppError> {
    user.require_warehouse(&request.warehouse_code)?;

    if request.items.is_empty() {
        return Err(AppError::Validation("at least one recount item is required".to_string()));
    }

    // Fail the whole batch on the first bad item
    let mut items = Vec::with_capacity(request.items.len());
    for (index, item) in request.items.iter().enumerate() {
        let stock_code = item
            .stock_code
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::Validation(format!("item {} is missing stock_code", index))
            })?;
        let lot_number = item
            .lot_number
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        items.push((stock_code.to_string(), lot_number));
    }

    let event = state
        .store
        .find_event(request.event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("event {}", request.event_id)))?;
    if !event.is_open() {
        return Err(AppError::Conflict(format!(
            "event not accepting recount work (status: {})",
            event.status
        )));
    }

    let pool: Vec<Uuid> = state
        .store
        .eligible_pool(&request.warehouse_code)
        .await?
        .into_iter()
        .map(|u| u.id)
        .collect();
    if pool.is_empty() {
        return Err(AppError::Conflict(format!(
            "no workers assigned to warehouse {}",
            request.warehouse_code
        )));
    }

    let last = state
        .store
        .last_recount_assignee(request.event_id, &request.warehouse_code)
        .await?;
    let start = rotation_start(&pool, last);
    let assignees = plan_assignments(&pool, start, items.len());

    let tasks: Vec<NewRecountTask> = items
        .into_iter()
        .zip(assignees)
        .map(|((stock_code, lot_number), assigned_to)| NewRecountTask {
            event_id: request.event_id,
            warehouse_code: request.warehouse_code.clone(),
            stock_code,
            lot_number,
            assigned_to,
            assigned_by: user.id,
        })
        .collect();

    let created = state.store.insert_recount_tasks(tasks).await?;
    log::info!(
        "Assigned {} recount task(s) for event={} warehouse={} across {} worker(s)",
        created.len(),
        request.event_id,
        request.warehouse_code,
        pool.len()
    );

    Ok(created)
}

/// Tasks for an event and warehouse. Workers only see their own.
pub async fn list_tasks(
    state: &AppState,
    user: &CurrentUser,
    event_id: Uuid,
    warehouse_code: &str,
    status: Option<String>,
) -> Result<Vec<RecountTask>, AppError> {
    user.require_warehouse(warehouse_code)?;

    let filter = RecountFilter {
        event_id,
        warehouse_code: warehouse_code.to_string(),
        assigned_to: if user.role == Role::Worker { Some(user.id) } else { None },
        status,
    };
    state.store.list_recount_tasks(&filter).await
}

/// Mark a task done. Allowed for its assignee, or a manager/admin with access
/// to its warehouse.
pub async fn complete_task(
    state: &AppState,
    user: &CurrentUser,
    task_id: Uuid,
) -> Result<RecountTask, AppError> {
    let task = state
        .store
        .find_recount_task(task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("recount task {}", task_id)))?;

    let is_assignee = task.assigned_to == user.id;
    let is_supervisor =
        user.role != Role::Worker && user.can_access_warehouse(&task.warehouse_code);
    if !is_assignee && !is_supervisor {
        return Err(AppError::Forbidden(format!(
            "not allowed to close recount task {}",
            task_id
        )));
    }

    state
        .store
        .complete_recount_task(task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("recount task {}", task_id)))
}
