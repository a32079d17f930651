use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        event::EVENT_STATUS_OPEN,
        recount::{RECOUNT_DONE, RECOUNT_PENDING},
        Count, CountTotal, NewCount, NewRecountTask, Product, ProductIdentifier, RecountFilter,
        RecountTask, Role, StocktakeEvent, User, WarehouseAssignment,
    },
};

use super::Store;

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    assignments: Vec<WarehouseAssignment>,
    events: Vec<StocktakeEvent>,
    products: Vec<Product>,
    counts: Vec<Count>,
    recount_tasks: Vec<RecountTask>,
    totals: Vec<CountTotal>,
    fail_refresh: bool,
    skip_client_ref_lookup: bool,
}

/// In-process store with the same semantics as [`PgStore`](super::PgStore).
///
/// Totals behave like the materialized view: they only change on
/// `refresh_totals`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))
    }

    fn guard(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_user(&self, email: &str, role: Role) -> Uuid {
        let id = Uuid::new_v4();
        self.guard().users.push(User {
            id,
            email: email.to_string(),
            display_name: email.split('@').next().unwrap_or(email).to_string(),
            role: role.as_str().to_string(),
            is_active: true,
            created_at: Utc::now(),
        });
        id
    }

    pub fn deactivate_user(&self, id: Uuid) {
        if let Some(user) = self.guard().users.iter_mut().find(|u| u.id == id) {
            user.is_active = false;
        }
    }

    pub fn assign_warehouse(&self, user_id: Uuid, warehouse_code: &str) {
        self.guard().assignments.push(WarehouseAssignment {
            user_id,
            warehouse_code: warehouse_code.to_string(),
            assigned_at: Utc::now(),
        });
    }

    pub fn unassign_warehouse(&self, user_id: Uuid, warehouse_code: &str) {
        self.guard()
            .assignments
            .retain(|a| !(a.user_id == user_id && a.warehouse_code == warehouse_code));
    }

    pub fn add_event(&self, name: &str, status: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.guard().events.push(StocktakeEvent {
            id,
            name: name.to_string(),
            status: status.to_string(),
            created_at: Utc::now(),
        });
        id
    }

    pub fn add_open_event(&self, name: &str) -> Uuid {
        self.add_event(name, EVENT_STATUS_OPEN)
    }

    pub fn set_event_status(&self, id: Uuid, status: &str) {
        if let Some(event) = self.guard().events.iter_mut().find(|e| e.id == id) {
            event.status = status.to_string();
        }
    }

    pub fn add_product(&self, product: Product) {
        self.guard().products.push(product);
    }

    /// Change a product's packaging ratios in place.
    pub fn set_product_ratios(
        &self,
        stock_code: &str,
        units_per_case: Option<i32>,
        cases_per_layer: Option<i32>,
        layers_per_pallet: Option<i32>,
    ) {
        let mut inner = self.guard();
        if let Some(product) = inner.products.iter_mut().find(|p| p.stock_code == stock_code) {
            product.units_per_case = units_per_case;
            product.cases_per_layer = cases_per_layer;
            product.layers_per_pallet = layers_per_pallet;
            product.updated_at = Utc::now();
        }
    }

    /// Make subsequent `refresh_totals` calls fail.
    pub fn set_refresh_failure(&self, fail: bool) {
        self.guard().fail_refresh = fail;
    }

    /// The next client_ref lookup misses, as if a concurrent submission
    /// with the same reference had not committed yet.
    pub fn skip_next_client_ref_lookup(&self) {
        self.guard().skip_client_ref_lookup = true;
    }

    pub fn counts(&self) -> Vec<Count> {
        self.guard().counts.clone()
    }

    pub fn recount_tasks(&self) -> Vec<RecountTask> {
        self.guard().recount_tasks.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_active_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .users
            .iter()
            .find(|u| u.id == id && u.is_active)
            .cloned())
    }

    async fn warehouse_codes_for(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        let inner = self.lock()?;
        let mut codes: Vec<String> = inner
            .assignments
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.warehouse_code.clone())
            .collect();
        codes.sort();
        codes.dedup();
        Ok(codes)
    }

    async fn find_event(&self, id: Uuid) -> Result<Option<StocktakeEvent>, AppError> {
        let inner = self.lock()?;
        Ok(inner.events.iter().find(|e| e.id == id).cloned())
    }

    async fn find_product(&self, identifier: &ProductIdentifier) -> Result<Option<Product>, AppError> {
        let inner = self.lock()?;
        let wanted = identifier.value();
        let found = inner
            .products
            .iter()
            .filter(|p| match identifier {
                ProductIdentifier::StockCode(_) => p.stock_code == wanted,
                ProductIdentifier::CaseBarcode(_) => p.case_barcode.as_deref() == Some(wanted),
                ProductIdentifier::UnitBarcode(_) => p.unit_barcode.as_deref() == Some(wanted),
            })
            .max_by_key(|p| p.updated_at)
            .cloned();
        Ok(found)
    }

    async fn find_count_by_client_ref(
        &self,
        submitted_by: Uuid,
        client_ref: &str,
    ) -> Result<Option<Count>, AppError> {
        let mut inner = self.lock()?;
        if inner.skip_client_ref_lookup {
            inner.skip_client_ref_lookup = false;
            return Ok(None);
        }
        Ok(inner
            .counts
            .iter()
            .find(|c| c.submitted_by == submitted_by && c.client_ref.as_deref() == Some(client_ref))
            .cloned())
    }

    async fn insert_count(&self, count: NewCount) -> Result<Count, AppError> {
        let mut inner = self.lock()?;

        if let Some(client_ref) = count.client_ref.as_deref() {
            let taken = inner.counts.iter().any(|c| {
                c.submitted_by == count.submitted_by && c.client_ref.as_deref() == Some(client_ref)
            });
            if taken {
                return Err(AppError::Conflict(format!(
                    "client reference {} already used",
                    client_ref
                )));
            }
        }

        let now = Utc::now();
        let task_id = count.recount_task_id;
        let created = count.into_count(Uuid::new_v4(), now);
        inner.counts.push(created.clone());

        if let Some(task_id) = task_id {
            if let Some(task) = inner
                .recount_tasks
                .iter_mut()
                .find(|t| t.id == task_id && t.status == RECOUNT_PENDING)
            {
                task.status = RECOUNT_DONE.to_string();
                task.completed_at = Some(now);
            }
        }

        Ok(created)
    }

    async fn find_recount_task(&self, id: Uuid) -> Result<Option<RecountTask>, AppError> {
        let inner = self.lock()?;
        Ok(inner.recount_tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn eligible_pool(&self, warehouse_code: &str) -> Result<Vec<User>, AppError> {
        let inner = self.lock()?;
        let mut pool: Vec<User> = inner
            .users
            .iter()
            .filter(|u| u.is_active && u.role() == Some(Role::Worker))
            .filter(|u| {
                inner
                    .assignments
                    .iter()
                    .any(|a| a.user_id == u.id && a.warehouse_code == warehouse_code)
            })
            .cloned()
            .collect();
        pool.sort_by(|a, b| a.email.cmp(&b.email).then(a.id.cmp(&b.id)));
        Ok(pool)
    }

    async fn last_recount_assignee(
        &self,
        event_id: Uuid,
        warehouse_code: &str,
    ) -> Result<Option<Uuid>, AppError> {
        let inner = self.lock()?;
        // Tasks are kept in insertion order
        Ok(inner
            .recount_tasks
            .iter()
            .rev()
            .find(|t| t.event_id == event_id && t.warehouse_code == warehouse_code)
            .map(|t| t.assigned_to))
    }

    async fn insert_recount_tasks(
        &self,
        tasks: Vec<NewRecountTask>,
    ) -> Result<Vec<RecountTask>, AppError> {
        let mut inner = self.lock()?;
        let now = Utc::now();
        let created: Vec<RecountTask> = tasks
            .into_iter()
            .map(|t| RecountTask {
                id: Uuid::new_v4(),
                event_id: t.event_id,
                warehouse_code: t.warehouse_code,
                stock_code: t.stock_code,
                lot_number: t.lot_number,
                assigned_to: t.assigned_to,
                assigned_by: t.assigned_by,
                status: RECOUNT_PENDING.to_string(),
                created_at: now,
                completed_at: None,
            })
            .collect();
        inner.recount_tasks.extend(created.iter().cloned());
        Ok(created)
    }

    async fn list_recount_tasks(&self, filter: &RecountFilter) -> Result<Vec<RecountTask>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .recount_tasks
            .iter()
            .filter(|t| t.event_id == filter.event_id && t.warehouse_code == filter.warehouse_code)
            .filter(|t| filter.assigned_to.map_or(true, |id| t.assigned_to == id))
            .filter(|t| filter.status.as_deref().map_or(true, |s| t.status == s))
            .cloned()
            .collect())
    }

    async fn complete_recount_task(&self, id: Uuid) -> Result<Option<RecountTask>, AppError> {
        let mut inner = self.lock()?;
        let Some(task) = inner.recount_tasks.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        if task.status == RECOUNT_PENDING {
            task.status = RECOUNT_DONE.to_string();
            task.completed_at = Some(Utc::now());
        }
        Ok(Some(task.clone()))
    }

    async fn refresh_totals(&self) -> Result<(), AppError> {
        let mut inner = self.lock()?;
        if inner.fail_refresh {
            return Err(AppError::Internal("aggregate refresh disabled".to_string()));
        }

        // Per group: running total plus the largest non-empty override
        let mut grouped: BTreeMap<(Uuid, String, String, String), (CountTotal, Option<String>)> =
            BTreeMap::new();
        for count in &inner.counts {
            let lot = count.lot_number.clone().unwrap_or_default();
            let key = (
                count.event_id,
                count.warehouse_code.clone(),
                count.stock_code.clone(),
                lot.clone(),
            );
            let (total, description) = grouped.entry(key).or_insert_with(|| {
                let total = CountTotal {
                    event_id: count.event_id,
                    warehouse_code: count.warehouse_code.clone(),
                    stock_code: count.stock_code.clone(),
                    description: String::new(),
                    lot_number: lot,
                    total_units: 0,
                    count_rows: 0,
                };
                (total, None)
            });
            total.total_units += count.total_units;
            total.count_rows += 1;

            let candidate = count.description.as_deref().filter(|d| !d.is_empty());
            if let Some(candidate) = candidate {
                if description.as_deref().map_or(true, |current| candidate > current) {
                    *description = Some(candidate.to_string());
                }
            }
        }

        let totals = grouped
            .into_values()
            .map(|(mut total, description)| {
                total.description = description
                    .or_else(|| {
                        inner
                            .products
                            .iter()
                            .filter(|p| p.stock_code == total.stock_code)
                            .max_by_key(|p| p.updated_at)
                            .map(|p| p.description.clone())
                    })
                    .unwrap_or_default();
                total
            })
            .collect();
        inner.totals = totals;
        Ok(())
    }

    async fn count_totals(
        &self,
        event_id: Uuid,
        warehouse_code: &str,
    ) -> Result<Vec<CountTotal>, AppError> {
        let inner = self.lock()?;
        Ok(inner
            .totals
            .iter()
            .filter(|t| t.event_id == event_id && t.warehouse_code == warehouse_code)
            .cloned()
            .collect())
    }
}
