pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        Count, CountTotal, NewCount, NewRecountTask, Product, ProductIdentifier, RecountFilter,
        RecountTask, StocktakeEvent, User,
    },
};

/// Persistence used by the count pipeline.
///
/// Users, assignments, events and products are read-only from here. Counts
/// are append-only; recount tasks only ever move from `pending` to `done`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Active user by id. Inactive users are treated as unknown.
    async fn find_active_user(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn warehouse_codes_for(&self, user_id: Uuid) -> Result<Vec<String>, AppError>;

    async fn find_event(&self, id: Uuid) -> Result<Option<StocktakeEvent>, AppError>;

    async fn find_product(&self, identifier: &ProductIdentifier) -> Result<Option<Product>, AppError>;

    async fn find_count_by_client_ref(
        &self,
        submitted_by: Uuid,
        client_ref: &str,
    ) -> Result<Option<Count>, AppError>;

    /// Insert a count. When `recount_task_id` is set, the task is marked
    /// `done` in the same transaction.
    async fn insert_count(&self, count: NewCount) -> Result<Count, AppError>;

    async fn find_recount_task(&self, id: Uuid) -> Result<Option<RecountTask>, AppError>;

    /// Active base-role workers assigned to the warehouse, ordered by email
    /// then id.
    async fn eligible_pool(&self, warehouse_code: &str) -> Result<Vec<User>, AppError>;

    /// Assignee of the most recently created task for the event+warehouse.
    async fn last_recount_assignee(
        &self,
        event_id: Uuid,
        warehouse_code: &str,
    ) -> Result<Option<Uuid>, AppError>;

    /// Insert all tasks or none.
    async fn insert_recount_tasks(
        &self,
        tasks: Vec<NewRecountTask>,
    ) -> Result<Vec<RecountTask>, AppError>;

    async fn list_recount_tasks(&self, filter: &RecountFilter) -> Result<Vec<RecountTask>, AppError>;

    /// Move a pending task to `done`. Returns `None` when the task does not
    /// exist; an already finished task is returned unchanged.
    async fn complete_recount_task(&self, id: Uuid) -> Result<Option<RecountTask>, AppError>;

    /// Rebuild the aggregated totals.
    async fn refresh_totals(&self) -> Result<(), AppError>;

    /// Aggregated totals as of the last refresh.
    async fn count_totals(
        &self,
        event_id: Uuid,
        warehouse_code: &str,
    ) -> Result<Vec<CountTotal>, AppError>;
}
