use axum::{
    extract::{FromRequest, Request, State},
    http::header::CONTENT_TYPE,
    response::Json,
};
use axum_extra::extract::Multipart;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dataurl,
    error::AppError,
    middleware::CurrentUser,
    models::ProductLookup,
    normalize::{quantities_from_raw, RawQuantity},
    photos::PhotoUpload,
    services::ingest::{self, Submission},
    AppState,
};

/// Submission fields shared by the multipart and the all-text JSON form.
#[derive(Debug, Default, Deserialize)]
pub struct CountForm {
    event_id: Option<String>,
    warehouse_code: Option<String>,
    stock_code: Option<String>,
    case_barcode: Option<String>,
    unit_barcode: Option<String>,
    lot_number: Option<String>,
    description: Option<String>,
    recount_task_id: Option<String>,
    client_ref: Option<String>,
    singles_units: Option<RawQuantity>,
    singles_cases: Option<RawQuantity>,
    pick_face_layers: Option<RawQuantity>,
    pick_face_cases: Option<RawQuantity>,
    bulk_pallets: Option<RawQuantity>,
    bulk_layers: Option<RawQuantity>,
    bulk_cases: Option<RawQuantity>,
    /// Data URL (or bare base64) photo for the all-text form
    photo: Option<String>,
    photo_name: Option<String>,
    photo_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub ok: bool,
    pub id: Uuid,
    pub total_units: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub duplicate: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_uuid(field: &str, value: Option<String>) -> Result<Option<Uuid>, AppError> {
    match non_empty(value) {
        Some(v) => Uuid::parse_str(&v)
            .map(Some)
            .map_err(|_| AppError::Validation(format!("{} is not a valid id: {}", field, v))),
        None => Ok(None),
    }
}

impl CountForm {
    fn set_text(&mut self, name: &str, value: String) {
        match name {
            "event_id" => self.event_id = Some(value),
            "warehouse_code" => self.warehouse_code = Some(value),
            "stock_code" => self.stock_code = Some(value),
            "case_barcode" => self.case_barcode = Some(value),
            "unit_barcode" => self.unit_barcode = Some(value),
            "lot_number" => self.lot_number = Some(value),
            "description" => self.description = Some(value),
            "recount_task_id" => self.recount_task_id = Some(value),
            "client_ref" => self.client_ref = Some(value),
            "singles_units" => self.singles_units = Some(RawQuantity::Text(value)),
            "singles_cases" => self.singles_cases = Some(RawQuantity::Text(value)),
            "pick_face_layers" => self.pick_face_layers = Some(RawQuantity::Text(value)),
            "pick_face_cases" => self.pick_face_cases = Some(RawQuantity::Text(value)),
            "bulk_pallets" => self.bulk_pallets = Some(RawQuantity::Text(value)),
            "bulk_layers" => self.bulk_layers = Some(RawQuantity::Text(value)),
            "bulk_cases" => self.bulk_cases = Some(RawQuantity::Text(value)),
            "photo" => self.photo = Some(value),
            "photo_name" => self.photo_name = Some(value),
            "photo_type" => self.photo_type = Some(value),
            _ => (),
        }
    }

    /// Validate into a submission. `binary_photo` comes from a multipart
    /// file field and wins over a textual `photo`.
    pub fn into_submission(self, binary_photo: Option<PhotoUpload>) -> Result<Submission, AppError> {
        let event_id = parse_uuid("event_id", self.event_id)?
            .ok_or_else(|| AppError::Validation("event_id is required".to_string()))?;
        let warehouse_code = non_empty(self.warehouse_code)
            .ok_or_else(|| AppError::Validation("warehouse_code is required".to_string()))?;
        let recount_task_id = parse_uuid("recount_task_id", self.recount_task_id)?;

        let identifiers = ProductLookup {
            stock_code: non_empty(self.stock_code),
            case_barcode: non_empty(self.case_barcode),
            unit_barcode: non_empty(self.unit_barcode),
        };
        if identifiers.candidates().is_empty() {
            return Err(AppError::Validation(
                "one of stock_code, case_barcode or unit_barcode is required".to_string(),
            ));
        }

        let raw = [
            ("singles_units", &self.singles_units),
            ("singles_cases", &self.singles_cases),
            ("pick_face_layers", &self.pick_face_layers),
            ("pick_face_cases", &self.pick_face_cases),
            ("bulk_pallets", &self.bulk_pallets),
            ("bulk_layers", &self.bulk_layers),
            ("bulk_cases", &self.bulk_cases),
        ];
        let supplied = raw
            .iter()
            .filter_map(|&(name, value)| value.as_ref().map(|v| (name, v)));
        let quantities = quantities_from_raw(supplied)?;

        let photo = match binary_photo {
            Some(photo) => Some(photo),
            None => match non_empty(self.photo) {
                Some(text) => {
                    let decoded = dataurl::decode(&text)
                        .map_err(|e| AppError::Validation(format!("photo: {}", e)))?;
                    Some(PhotoUpload {
                        filename: non_empty(self.photo_name),
                        content_type: decoded.mime_type.or_else(|| non_empty(self.photo_type)),
                        data: decoded.bytes,
                    })
                }
                None => None,
            },
        };
        if let Some(photo) = &photo {
            if photo.data.is_empty() {
                return Err(AppError::Validation("photo is empty".to_string()));
            }
        }

        Ok(Submission {
            event_id,
            warehouse_code,
            identifiers,
            lot_number: non_empty(self.lot_number),
            description: non_empty(self.description),
            recount_task_id,
            client_ref: non_empty(self.client_ref),
            quantities,
            photo,
        })
    }
}

async fn parse_count_multipart(
    mut multipart: Multipart,
) -> Result<(CountForm, Option<PhotoUpload>), AppError> {
    let mut form = CountForm::default();
    let mut photo = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {}", e)))?
    {
        let name = match field.name() {
            Some(name) => name.to_string(),
            None => continue,
        };

        // A file part for `photo` is binary evidence; a plain part is a data URL
        if name == "photo" && field.file_name().is_some() {
            let filename = field.file_name().map(|s| s.to_string());
            let content_type = field.content_type().map(|s| s.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("unreadable photo: {}", e)))?;
            if !data.is_empty() {
                photo = Some(PhotoUpload {
                    filename,
                    content_type,
                    data: data.to_vec(),
                });
            }
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("unreadable field {}: {}", name, e)))?;
            form.set_text(&name, text);
        }
    }

    Ok((form, photo))
}

pub async fn submit_count(
    State(state): State<AppState>,
    user: CurrentUser,
    request: Request,
) -> Result<Json<SubmitResponse>, AppError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("multipart/form-data"))
        .unwrap_or(false);

    let (form, binary_photo) = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        parse_count_multipart(multipart).await?
    } else {
        let Json(form) = Json::<CountForm>::from_request(request, &state)
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        (form, None)
    };

    let submission = form.into_submission(binary_photo)?;
    let outcome = ingest::submit_count(&state, &user, submission).await?;

    Ok(Json(SubmitResponse {
        ok: true,
        id: outcome.id,
        total_units: outcome.total_units,
        photo_path: outcome.photo_path,
        duplicate: outcome.duplicate,
    }))
}
