mod common;

use axum::http::{header, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use stockcount::models::Role;

use common::{get, post_json, Harness};

async fn submit(h: &Harness, token: &str, event: &str, stock_code: &str, lot: Option<&str>, units: i64) {
    let mut body = json!({
        "event_id": event,
        "warehouse_code": "WH1",
        "stock_code": stock_code,
        "singles_units": units,
    });
    if let Some(lot) = lot {
        body["lot_number"] = json!(lot);
    }
    let (status, reply) = h.send_json(post_json("/api/counts", Some(token), body)).await;
    assert_eq!(status, StatusCode::OK, "{}", reply);
}

#[tokio::test]
async fn exports_totals_per_product_and_lot() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_open_event("Year end").to_string();
    h.product("SKU-1", 24, 10, 5);
    h.product("SKU-2", 6, 1, 1);

    submit(&h, &token, &event, "SKU-1", Some("L1"), 5).await;
    submit(&h, &token, &event, "SKU-1", Some("L1"), 7).await;
    submit(&h, &token, &event, "SKU-1", None, 1).await;
    submit(&h, &token, &event, "SKU-2", None, 4).await;

    let response = h
        .app
        .clone()
        .oneshot(get(
            &format!("/api/export?event_id={}&warehouse_code=WH1", event),
            &token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains(&format!("count-{}-WH1.csv", event)));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let csv = String::from_utf8(body.to_vec()).unwrap();
    let lines: Vec<&str> = csv.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(
        lines,
        vec![
            "stock_code,description,lot_number,total_units",
            "SKU-1,SKU-1 description,,1",
            "SKU-1,SKU-1 description,L1,12",
            "SKU-2,SKU-2 description,,4",
        ]
    );
}

#[tokio::test]
async fn description_override_replaces_the_product_description() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_open_event("Year end").to_string();
    h.product("SKU-1", 24, 10, 5);
    h.product("SKU-2", 6, 1, 1);

    let (status, reply) = h
        .send_json(post_json(
            "/api/counts",
            Some(&token),
            json!({
                "event_id": event,
                "warehouse_code": "WH1",
                "stock_code": "SKU-1",
                "description": "Override text",
                "singles_units": 1,
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", reply);
    submit(&h, &token, &event, "SKU-1", None, 2).await;
    submit(&h, &token, &event, "SKU-2", None, 4).await;

    let (status, body) = h
        .send(get(
            &format!("/api/export?event_id={}&warehouse_code=WH1", event),
            &token,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        String::from_utf8(body).unwrap(),
        "stock_code,description,lot_number,total_units\r\n\
         SKU-1,Override text,,3\r\n\
         SKU-2,SKU-2 description,,4\r\n"
    );
}

#[tokio::test]
async fn export_uses_the_latest_product_description() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_open_event("Year end").to_string();
    h.product("SKU-1", 24, 10, 5);
    // A newer master record for the same stock code
    h.store.add_product(stockcount::models::Product {
        id: uuid::Uuid::new_v4(),
        stock_code: "SKU-1".to_string(),
        case_barcode: None,
        unit_barcode: None,
        description: "Renamed item".to_string(),
        units_per_case: Some(24),
        cases_per_layer: Some(10),
        layers_per_pallet: Some(5),
        updated_at: chrono::Utc::now() + chrono::Duration::seconds(5),
    });
    submit(&h, &token, &event, "SKU-1", None, 1).await;

    let (_, body) = h
        .send(get(
            &format!("/api/export?event_id={}&warehouse_code=WH1", event),
            &token,
        ))
        .await;
    assert!(String::from_utf8(body).unwrap().contains("SKU-1,Renamed item,,1\r\n"));
}

#[tokio::test]
async fn refresh_failure_does_not_fail_submission_or_export() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_open_event("Year end").to_string();
    h.product("SKU-1", 24, 10, 5);

    h.store.set_refresh_failure(true);
    submit(&h, &token, &event, "SKU-1", None, 3).await;
    assert_eq!(h.store.counts().len(), 1);

    // Stale (empty) totals are served rather than an error
    let (status, body) = h
        .send(get(
            &format!("/api/export?event_id={}&warehouse_code=WH1", event),
            &token,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        String::from_utf8(body).unwrap(),
        "stock_code,description,lot_number,total_units\r\n"
    );

    h.store.set_refresh_failure(false);
    let (_, body) = h
        .send(get(
            &format!("/api/export?event_id={}&warehouse_code=WH1", event),
            &token,
        ))
        .await;
    assert!(String::from_utf8(body).unwrap().contains("SKU-1,SKU-1 description,,3"));
}

#[tokio::test]
async fn export_requires_warehouse_access() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH2"]);
    let event = h.store.add_open_event("Year end");

    let (status, _) = h
        .send(get(
            &format!("/api/export?event_id={}&warehouse_code=WH1", event),
            &token,
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn health_needs_no_credential() {
    let h = Harness::new();
    let request = axum::http::Request::builder()
        .uri("/health")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, body) = h.send_json(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
