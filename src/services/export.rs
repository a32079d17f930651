use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::CurrentUser,
    models::CountTotal,
    AppState,
};

const HEADER: [&str; 4] = ["stock_code", "description", "lot_number", "total_units"];

pub struct Export {
    pub filename: String,
    pub body: String,
}

/// Refresh the aggregate (best effort) and render it for one event and
/// warehouse.
pub async fn export_totals(
    state: &AppState,
    user: &CurrentUser,
    event_id: Uuid,
    warehouse_code: &str,
) -> Result<Export, AppError> {
    user.require_warehouse(warehouse_code)?;

    if let Err(e) = state.store.refresh_totals().await {
        log::warn!("Aggregate refresh before export failed, serving last totals: {}", e);
    }

    let totals = state.store.count_totals(event_id, warehouse_code).await?;
    log::info!(
        "Exporting {} total(s) for event={} warehouse={}",
        totals.len(),
        event_id,
        warehouse_code
    );

    Ok(Export {
        filename: format!("count-{}-{}.csv", event_id, warehouse_code),
        body: render_csv(&totals),
    })
}

pub fn render_csv(totals: &[CountTotal]) -> String {
    let mut out = String::new();
    push_row(&mut out, HEADER.iter().map(|h| h.to_string()));
    for total in totals {
        push_row(
            &mut out,
            [
                total.stock_code.clone(),
                total.description.clone(),
                total.lot_number.clone(),
                total.total_units.to_string(),
            ],
        );
    }
    out
}

fn push_row<I: IntoIterator<Item = String>>(out: &mut String, fields: I) {
    let line: Vec<String> = fields.into_iter().map(|f| quote_field(&f)).collect();
    out.push_str(&line.join(","));
    out.push_str("\r\n");
}

/// Quote a field when it holds a delimiter, quote or line break.
pub fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
