use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::PackagingRatios;

/// Raw quantities as recorded by a worker, one field per packaging tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierQuantities {
    pub singles_units: i64,
    pub singles_cases: i64,
    pub pick_face_layers: i64,
    pub pick_face_cases: i64,
    pub bulk_pallets: i64,
    pub bulk_layers: i64,
    pub bulk_cases: i64,
}

impl TierQuantities {
    pub const FIELDS: [&'static str; 7] = [
        "singles_units",
        "singles_cases",
        "pick_face_layers",
        "pick_face_cases",
        "bulk_pallets",
        "bulk_layers",
        "bulk_cases",
    ];

    pub fn values(&self) -> [i64; 7] {
        [
            self.singles_units,
            self.singles_cases,
            self.pick_face_layers,
            self.pick_face_cases,
            self.bulk_pallets,
            self.bulk_layers,
            self.bulk_cases,
        ]
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut i64> {
        match name {
            "singles_units" => Some(&mut self.singles_units),
            "singles_cases" => Some(&mut self.singles_cases),
            "pick_face_layers" => Some(&mut self.pick_face_layers),
            "pick_face_cases" => Some(&mut self.pick_face_cases),
            "bulk_pallets" => Some(&mut self.bulk_pallets),
            "bulk_layers" => Some(&mut self.bulk_layers),
            "bulk_cases" => Some(&mut self.bulk_cases),
            _ => None,
        }
    }
}

/// A persisted, normalized count. Never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Count {
    pub id: Uuid,
    pub event_id: Uuid,
    pub warehouse_code: String,
    pub stock_code: String,
    pub lot_number: Option<String>,
    pub description: Option<String>,
    pub singles_units: i64,
    pub singles_cases: i64,
    pub pick_face_layers: i64,
    pub pick_face_cases: i64,
    pub bulk_pallets: i64,
    pub bulk_layers: i64,
    pub bulk_cases: i64,
    pub units_per_case: i64,
    pub cases_per_layer: i64,
    pub layers_per_pallet: i64,
    pub total_units: i64,
    pub submitted_by: Uuid,
    pub photo_path: Option<String>,
    pub recount_task_id: Option<Uuid>,
    pub client_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Count {
    pub fn quantities(&self) -> TierQuantities {
        TierQuantities {
            singles_units: self.singles_units,
            singles_cases: self.singles_cases,
            pick_face_layers: self.pick_face_layers,
            pick_face_cases: self.pick_face_cases,
            bulk_pallets: self.bulk_pallets,
            bulk_layers: self.bulk_layers,
            bulk_cases: self.bulk_cases,
        }
    }

    /// The packaging ratios in effect when this count was submitted.
    pub fn snapshot(&self) -> PackagingRatios {
        PackagingRatios {
            units_per_case: self.units_per_case,
            cases_per_layer: self.cases_per_layer,
            layers_per_pallet: self.layers_per_pallet,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewCount {
    pub event_id: Uuid,
    pub warehouse_code: String,
    pub stock_code: String,
    pub lot_number: Option<String>,
    pub description: Option<String>,
    pub quantities: TierQuantities,
    pub snapshot: PackagingRatios,
    pub total_units: i64,
    pub submitted_by: Uuid,
    pub photo_path: Option<String>,
    pub recount_task_id: Option<Uuid>,
    pub client_ref: Option<String>,
}

impl NewCount {
    pub fn into_count(self, id: Uuid, created_at: DateTime<Utc>) -> Count {
        let q = self.quantities;
        Count {
            id,
            event_id: self.event_id,
            warehouse_code: self.warehouse_code,
            stock_code: self.stock_code,
            lot_number: self.lot_number,
            description: self.description,
            singles_units: q.singles_units,
            singles_cases: q.singles_cases,
            pick_face_layers: q.pick_face_layers,
            pick_face_cases: q.pick_face_cases,
            bulk_pallets: q.bulk_pallets,
            bulk_layers: q.bulk_layers,
            bulk_cases: q.bulk_cases,
            units_per_case: self.snapshot.units_per_case,
            cases_per_layer: self.snapshot.cases_per_layer,
            layers_per_pallet: self.snapshot.layers_per_pallet,
            total_units: self.total_units,
            submitted_by: self.submitted_by,
            photo_path: self.photo_path,
            recount_task_id: self.recount_task_id,
            client_ref: self.client_ref,
            created_at,
        }
    }
}

/// One row of the aggregated totals view.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CountTotal {
    pub event_id: Uuid,
    pub warehouse_code: String,
    pub stock_code: String,
    pub description: String,
    pub lot_number: String,
    pub total_units: i64,
    pub count_rows: i64,
}
