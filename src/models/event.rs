use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};

pub const EVENT_STATUS_DRAFT: &str = "draft";
pub const EVENT_STATUS_OPEN: &str = "open";
pub const EVENT_STATUS_CLOSED: &str = "closed";

/// A stocktake event. Only open events accept counts and recount work.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StocktakeEvent {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl StocktakeEvent {
    pub fn is_open(&self) -> bool {
        self.status == EVENT_STATUS_OPEN
    }
}
