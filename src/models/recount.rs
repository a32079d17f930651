use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};

pub const RECOUNT_PENDING: &str = "pending";
pub const RECOUNT_DONE: &str = "done";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecountTask {
    pub id: Uuid,
    pub event_id: Uuid,
    pub warehouse_code: String,
    pub stock_code: String,
    pub lot_number: Option<String>,
    pub assigned_to: Uuid,
    pub assigned_by: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RecountTask {
    pub fn is_pending(&self) -> bool {
        self.status == RECOUNT_PENDING
    }
}

#[derive(Debug, Clone)]
pub struct NewRecountTask {
    pub event_id: Uuid,
    pub warehouse_code: String,
    pub stock_code: String,
    pub lot_number: Option<String>,
    pub assigned_to: Uuid,
    pub assigned_by: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct RecountFilter {
    pub event_id: Uuid,
    pub warehouse_code: String,
    /// Restrict to one assignee; `None` lists everyone's tasks.
    pub assigned_to: Option<Uuid>,
    pub status: Option<String>,
}
