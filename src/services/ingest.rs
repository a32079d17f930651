//! Count ingestion: from an authenticated submission to a persisted,
//! unit-normalized count.

use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::CurrentUser,
    models::{NewCount, Product, ProductLookup, TierQuantities},
    normalize::normalize,
    photos::{photo_key, PhotoUpload},
    store::Store,
    AppState,
};

/// A validated submission, independent of the wire format it arrived in.
#[derive(Debug, Clone)]
pub struct Submission {
    pub event_id: Uuid,
    pub warehouse_code: String,
    pub identifiers: ProductLookup,
    pub lot_number: Option<String>,
    pub description: Option<String>,
    pub recount_task_id: Option<Uuid>,
    /// Client-generated idempotency key
    pub client_ref: Option<String>,
    pub quantities: TierQuantities,
    pub photo: Option<PhotoUpload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub id: Uuid,
    pub total_units: i64,
    pub photo_path: Option<String>,
    /// The client reference matched an earlier count, which was returned
    /// instead of inserting a new one.
    pub duplicate: bool,
}

pub async fn submit_count(
    state: &AppState,
    user: &CurrentUser,
    submission: Submission,
) -> Result<SubmissionOutcome, AppError> {
    user.require_warehouse(&submission.warehouse_code)?;

    if let Some(client_ref) = submission.client_ref.as_deref() {
        if let Some(existing) = state.store.find_count_by_client_ref(user.id, client_ref).await? {
            log::info!(
                "Count {} already recorded for client reference {}",
                existing.id,
                client_ref
            );
            return Ok(SubmissionOutcome {
                id: existing.id,
                total_units: existing.total_units,
                photo_path: existing.photo_path,
                duplicate: true,
            });
        }
    }

    let event = state
        .store
        .find_event(submission.event_id)
        .await?
        .ok_or_else(|| AppError::Conflict("event not accepting submissions".to_string()))?;
    if !event.is_open() {
        return Err(AppError::Conflict(format!(
            "event not accepting submissions (status: {})",
            event.status
        )));
    }

    let product = resolve_product(state.store.as_ref(), &submission.identifiers).await?;

    let snapshot = product.packaging();
    let total_units = normalize(&submission.quantities, &snapshot)?;

    if let Some(task_id) = submission.recount_task_id {
        check_recount_task(state.store.as_ref(), user, &submission, &product, task_id).await?;
    }

    let photo_path = match &submission.photo {
        Some(photo) => {
            let extension = photo.extension().ok_or_else(|| {
                AppError::Validation("photo must be a jpg, png, webp or heic image".to_string())
            })?;
            let key = photo_key(submission.event_id, &submission.warehouse_code, &extension);
            state.photos.put(&key, &photo.data).await?;
            Some(key)
        }
        None => None,
    };

    let description = submission
        .description
        .clone()
        .filter(|d| !d.trim().is_empty());

    let new_count = NewCount {
        event_id: submission.event_id,
        warehouse_code: submission.warehouse_code.clone(),
        stock_code: product.stock_code.clone(),
        lot_number: submission.lot_number.clone(),
        description,
        quantities: submission.quantities,
        snapshot,
        total_units,
        submitted_by: user.id,
        photo_path: photo_path.clone(),
        recount_task_id: submission.recount_task_id,
        client_ref: submission.client_ref.clone(),
    };

    let count = match state.store.insert_count(new_count).await {
        Ok(count) => count,
        Err(e) => {
            // Don't leave evidence behind for a count that doesn't exist
            if let Some(key) = &photo_path {
                if let Err(cleanup) = state.photos.delete(key).await {
                    log::warn!("Failed to remove orphaned photo {}: {}", key, cleanup);
                }
            }

            // A concurrent submission with the same client_ref won the insert
            if let (AppError::Conflict(_), Some(client_ref)) = (&e, submission.client_ref.as_deref()) {
                if let Some(existing) = state.store.find_count_by_client_ref(user.id, client_ref).await? {
                    log::info!(
                        "Count {} recorded concurrently for client reference {}",
                        existing.id,
                        client_ref
                    );
                    return Ok(SubmissionOutcome {
                        id: existing.id,
                        total_units: existing.total_units,
                        photo_path: existing.photo_path,
                        duplicate: true,
                    });
                }
            }
            return Err(e);
        }
    };

    log::info!(
        "Count {} recorded: event={} warehouse={} stock_code={} total_units={}",
        count.id,
        count.event_id,
        count.warehouse_code,
        count.stock_code,
        count.total_units
    );

    trigger_refresh(state.store.clone());

    Ok(SubmissionOutcome {
        id: count.id,
        total_units: count.total_units,
        photo_path: count.photo_path,
        duplicate: false,
    })
}

/// Look up the product by each supplied identifier in priority order.
pub async fn resolve_product(
    store: &dyn Store,
    identifiers: &ProductLookup,
) -> Result<Product, AppError> {
    let candidates = identifiers.candidates();
    if candidates.is_empty() {
        return Err(AppError::Validation(
            "one of stock_code, case_barcode or unit_barcode is required".to_string(),
        ));
    }

    for candidate in &candidates {
        if let Some(product) = store.find_product(candidate).await? {
            return Ok(product);
        }
    }

    let tried: Vec<String> = candidates
        .iter()
        .map(|c| format!("{}={}", c.kind(), c.value()))
        .collect();
    Err(AppError::NotFound(format!("no product matches {}", tried.join(", "))))
}

async fn check_recount_task(
    store: &dyn Store,
    user: &CurrentUser,
    submission: &Submission,
    product: &Product,
    task_id: Uuid,
) -> Result<(), AppError> {
    let task = store
        .find_recount_task(task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("recount task {}", task_id)))?;

    if task.assigned_to != user.id {
        return Err(AppError::Forbidden(format!(
            "recount task {} is assigned to another worker",
            task_id
        )));
    }
    if task.event_id != submission.event_id
        || task.warehouse_code != submission.warehouse_code
        || task.stock_code != product.stock_code
    {
        return Err(AppError::Validation(format!(
            "recount task {} is for a different event, warehouse or product",
            task_id
        )));
    }
    if !task.is_pending() {
        return Err(AppError::Conflict(format!(
            "recount task {} is already done",
            task_id
        )));
    }
    Ok(())
}

/// Refresh the aggregate in the background. Failures are only logged.
pub fn trigger_refresh(store: Arc<dyn Store>) {
    tokio::spawn(async move {
        if let Err(e) = store.refresh_totals().await {
            log::warn!("Aggregate refresh failed: {}", e);
        }
    });
}
