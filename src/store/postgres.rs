use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    database::Database,
    error::AppError,
    models::{
        recount::{RECOUNT_DONE, RECOUNT_PENDING},
        Count, CountTotal, NewCount, NewRecountTask, Product, ProductIdentifier, RecountFilter,
        RecountTask, StocktakeEvent, User,
    },
};

use super::Store;

/// Store backed by the Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_active_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, display_name, role, is_active, created_at
             FROM users WHERE id = $1 AND is_active = true",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(user)
    }

    async fn warehouse_codes_for(&self, user_id: Uuid) -> Result<Vec<String>, AppError> {
        let codes = sqlx::query_scalar::<_, String>(
            "SELECT warehouse_code FROM warehouse_assignments
             WHERE user_id = $1 ORDER BY warehouse_code",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(codes)
    }

    async fn find_event(&self, id: Uuid) -> Result<Option<StocktakeEvent>, AppError> {
        let event = sqlx::query_as::<_, StocktakeEvent>(
            "SELECT id, name, status, created_at FROM stocktake_events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(event)
    }

    async fn find_product(&self, identifier: &ProductIdentifier) -> Result<Option<Product>, AppError> {
        // Column names come from a closed set, never from input
        let column = match identifier {
            ProductIdentifier::StockCode(_) => "stock_code",
            ProductIdentifier::CaseBarcode(_) => "case_barcode",
            ProductIdentifier::UnitBarcode(_) => "unit_barcode",
        };
        let sql = format!(
            "SELECT id, stock_code, case_barcode, unit_barcode, description,
                    units_per_case, cases_per_layer, layers_per_pallet, updated_at
             FROM products WHERE {} = $1
             ORDER BY updated_at DESC
             LIMIT 1",
            column
        );

        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(identifier.value())
            .fetch_optional(&self.db)
            .await?;

        Ok(product)
    }

    async fn find_count_by_client_ref(
        &self,
        submitted_by: Uuid,
        client_ref: &str,
    ) -> Result<Option<Count>, AppError> {
        let count = sqlx::query_as::<_, Count>(
            "SELECT * FROM counts WHERE submitted_by = $1 AND client_ref = $2",
        )
        .bind(submitted_by)
        .bind(client_ref)
        .fetch_optional(&self.db)
        .await?;

        Ok(count)
    }

    async fn insert_count(&self, count: NewCount) -> Result<Count, AppError> {
        let mut tx = self.db.begin().await?;
        let q = count.quantities;

        let inserted = sqlx::query_as::<_, Count>(
            r#"
            INSERT INTO counts (
                event_id, warehouse_code, stock_code, lot_number, description,
                singles_units, singles_cases, pick_face_layers, pick_face_cases,
                bulk_pallets, bulk_layers, bulk_cases,
                units_per_case, cases_per_layer, layers_per_pallet,
                total_units, submitted_by, photo_path, recount_task_id, client_ref
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING *
            "#,
        )
        .bind(count.event_id)
        .bind(&count.warehouse_code)
        .bind(&count.stock_code)
        .bind(&count.lot_number)
        .bind(&count.description)
        .bind(q.singles_units)
        .bind(q.singles_cases)
        .bind(q.pick_face_layers)
        .bind(q.pick_face_cases)
        .bind(q.bulk_pallets)
        .bind(q.bulk_layers)
        .bind(q.bulk_cases)
        .bind(count.snapshot.units_per_case)
        .bind(count.snapshot.cases_per_layer)
        .bind(count.snapshot.layers_per_pallet)
        .bind(count.total_units)
        .bind(count.submitted_by)
        .bind(&count.photo_path)
        .bind(count.recount_task_id)
        .bind(&count.client_ref)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            // Only (submitted_by, client_ref) is unique on counts
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(format!(
                "client reference {} already used",
                count.client_ref.as_deref().unwrap_or_default()
            )),
            other => AppError::Database(other),
        })?;

        if let Some(task_id) = count.recount_task_id {
            sqlx::query(
                "UPDATE recount_tasks SET status = $1, completed_at = NOW()
                 WHERE id = $2 AND status = $3",
            )
            .bind(RECOUNT_DONE)
            .bind(task_id)
            .bind(RECOUNT_PENDING)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn find_recount_task(&self, id: Uuid) -> Result<Option<RecountTask>, AppError> {
        let task = sqlx::query_as::<_, RecountTask>("SELECT * FROM recount_tasks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(task)
    }

    async fn eligible_pool(&self, warehouse_code: &str) -> Result<Vec<User>, AppError> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.email, u.display_name, u.role, u.is_active, u.created_at
            FROM users u
            JOIN warehouse_assignments wa ON wa.user_id = u.id
            WHERE wa.warehouse_code = $1 AND u.role = 'worker' AND u.is_active = true
            ORDER BY u.email, u.id
            "#,
        )
        .bind(warehouse_code)
        .fetch_all(&self.db)
        .await?;

        Ok(users)
    }

    async fn last_recount_assignee(
        &self,
        event_id: Uuid,
        warehouse_code: &str,
    ) -> Result<Option<Uuid>, AppError> {
        let assignee = sqlx::query_scalar::<_, Uuid>(
            "SELECT assigned_to FROM recount_tasks
             WHERE event_id = $1 AND warehouse_code = $2
             ORDER BY created_at DESC, seq DESC
             LIMIT 1",
        )
        .bind(event_id)
        .bind(warehouse_code)
        .fetch_optional(&self.db)
        .await?;

        Ok(assignee)
    }

    async fn insert_recount_tasks(
        &self,
        tasks: Vec<NewRecountTask>,
    ) -> Result<Vec<RecountTask>, AppError> {
        let mut tx = self.db.begin().await?;
        let mut created = Vec::with_capacity(tasks.len());

        for task in &tasks {
            let row = sqlx::query_as::<_, RecountTask>(
                r#"
                INSERT INTO recount_tasks (
                    event_id, warehouse_code, stock_code, lot_number, assigned_to, assigned_by, status
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id, event_id, warehouse_code, stock_code, lot_number,
                          assigned_to, assigned_by, status, created_at, completed_at
                "#,
            )
            .bind(task.event_id)
            .bind(&task.warehouse_code)
            .bind(&task.stock_code)
            .bind(&task.lot_number)
            .bind(task.assigned_to)
            .bind(task.assigned_by)
            .bind(RECOUNT_PENDING)
            .fetch_one(&mut *tx)
            .await?;
            created.push(row);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn list_recount_tasks(&self, filter: &RecountFilter) -> Result<Vec<RecountTask>, AppError> {
        let mut query_builder = sqlx::QueryBuilder::new(
            "SELECT id, event_id, warehouse_code, stock_code, lot_number,
                    assigned_to, assigned_by, status, created_at, completed_at
             FROM recount_tasks WHERE event_id = ",
        );
        query_builder.push_bind(filter.event_id);
        query_builder.push(" AND warehouse_code = ");
        query_builder.push_bind(filter.warehouse_code.clone());

        if let Some(assignee) = filter.assigned_to {
            query_builder.push(" AND assigned_to = ");
            query_builder.push_bind(assignee);
        }
        if let Some(status) = &filter.status {
            query_builder.push(" AND status = ");
            query_builder.push_bind(status.clone());
        }
        query_builder.push(" ORDER BY created_at, seq");

        let tasks = query_builder
            .build_query_as::<RecountTask>()
            .fetch_all(&self.db)
            .await?;

        Ok(tasks)
    }

    async fn complete_recount_task(&self, id: Uuid) -> Result<Option<RecountTask>, AppError> {
        sqlx::query(
            "UPDATE recount_tasks SET status = $1, completed_at = NOW()
             WHERE id = $2 AND status = $3",
        )
        .bind(RECOUNT_DONE)
        .bind(id)
        .bind(RECOUNT_PENDING)
        .execute(&self.db)
        .await?;

        self.find_recount_task(id).await
    }

    async fn refresh_totals(&self) -> Result<(), AppError> {
        sqlx::query("REFRESH MATERIALIZED VIEW CONCURRENTLY count_totals")
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn count_totals(
        &self,
        event_id: Uuid,
        warehouse_code: &str,
    ) -> Result<Vec<CountTotal>, AppError> {
        let totals = sqlx::query_as::<_, CountTotal>(
            "SELECT event_id, warehouse_code, stock_code, description, lot_number,
                    total_units, count_rows
             FROM count_totals
             WHERE event_id = $1 AND warehouse_code = $2
             ORDER BY stock_code, lot_number",
        )
        .bind(event_id)
        .bind(warehouse_code)
        .fetch_all(&self.db)
        .await?;

        Ok(totals)
    }
}
