mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::json;
use stockcount::{
    dataurl,
    models::{event::EVENT_STATUS_CLOSED, Role},
};

use common::{multipart, post_json, Harness};

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00];

#[tokio::test]
async fn singles_tier_normalizes_to_units() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_open_event("Year end");
    h.product("SKU-1", 24, 10, 5);

    let (status, body) = h
        .send_json(post_json(
            "/api/counts",
            Some(&token),
            json!({
                "event_id": event.to_string(),
                "warehouse_code": "WH1",
                "stock_code": "SKU-1",
                "singles_units": 5,
                "singles_cases": "2",
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["ok"], true);
    assert_eq!(body["total_units"], 53);
    assert_eq!(h.store.counts().len(), 1);
}

#[tokio::test]
async fn full_pallet_with_photo_over_multipart() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_open_event("Year end");
    h.product("SKU-1", 24, 10, 5);
    let event_id = event.to_string();

    let (status, body) = h
        .send_json(multipart(
            "/api/counts",
            &token,
            &[
                ("event_id", event_id.as_str()),
                ("warehouse_code", "WH1"),
                ("case_barcode", "SKU-1-CASE"),
                ("bulk_pallets", "1"),
            ],
            Some(("shelf.jpg", "image/jpeg", JPEG)),
        ))
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["total_units"], 1200);

    let key = body["photo_path"].as_str().unwrap().to_string();
    assert!(key.starts_with(&format!("{}/WH1/", event)));
    assert!(key.ends_with(".jpg"));
    let stored = std::fs::read(h.photo_dir.path().join(&key)).unwrap();
    assert_eq!(stored, JPEG);

    let counts = h.store.counts();
    assert_eq!(counts[0].stock_code, "SKU-1");
    assert_eq!(counts[0].photo_path.as_deref(), Some(key.as_str()));
}

#[tokio::test]
async fn data_url_photo_in_json_body() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_open_event("Year end");
    h.product("SKU-1", 24, 10, 5);

    let (status, body) = h
        .send_json(post_json(
            "/api/counts",
            Some(&token),
            json!({
                "event_id": event.to_string(),
                "warehouse_code": "WH1",
                "unit_barcode": "SKU-1-UNIT",
                "singles_units": 1,
                "photo": dataurl::encode("image/png", b"\x89PNG\r\n\x1a\n"),
                "photo_name": "fallback.png",
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    let key = body["photo_path"].as_str().unwrap();
    assert!(key.ends_with(".png"));
    let stored = std::fs::read(h.photo_dir.path().join(key)).unwrap();
    assert_eq!(stored, b"\x89PNG\r\n\x1a\n");
}

#[tokio::test]
async fn closed_event_is_a_conflict_and_records_nothing() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_event("Last year", EVENT_STATUS_CLOSED);
    h.product("SKU-1", 24, 10, 5);

    let (status, body) = h
        .send_json(post_json(
            "/api/counts",
            Some(&token),
            json!({
                "event_id": event.to_string(),
                "warehouse_code": "WH1",
                "stock_code": "SKU-1",
                "singles_units": 5,
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert_eq!(body["code"], "conflict");
    assert!(h.store.counts().is_empty());
}

#[tokio::test]
async fn stored_total_survives_ratio_changes() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_open_event("Year end");
    h.product("SKU-1", 24, 10, 5);

    let (status, _) = h
        .send_json(post_json(
            "/api/counts",
            Some(&token),
            json!({
                "event_id": event.to_string(),
                "warehouse_code": "WH1",
                "stock_code": "SKU-1",
                "singles_cases": 2,
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    h.store.set_product_ratios("SKU-1", Some(12), Some(4), Some(2));

    let count = &h.store.counts()[0];
    assert_eq!(count.total_units, 48);
    assert_eq!(count.units_per_case, 24);
    assert_eq!(count.snapshot().cases_per_layer, 10);
}

#[tokio::test]
async fn requires_a_valid_credential() {
    let h = Harness::new();
    let event = h.store.add_open_event("Year end");
    h.product("SKU-1", 24, 10, 5);
    let body = json!({
        "event_id": event.to_string(),
        "warehouse_code": "WH1",
        "stock_code": "SKU-1",
    });

    let (status, reply) = h.send_json(post_json("/api/counts", None, body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply["code"], "unauthorized");

    let (status, _) = h
        .send_json(post_json("/api/counts", Some("not-a-token"), body.clone()))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (id, token) = h.user("gone@example.com", Role::Worker, &["WH1"]);
    h.store.deactivate_user(id);
    let (status, _) = h.send_json(post_json("/api/counts", Some(&token), body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn accepts_the_auth_cookie() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_open_event("Year end");
    h.product("SKU-1", 24, 10, 5);

    let request = Request::builder()
        .method("POST")
        .uri("/api/counts")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::COOKIE, format!("auth_token={}", token))
        .body(Body::from(
            json!({
                "event_id": event.to_string(),
                "warehouse_code": "WH1",
                "stock_code": "SKU-1",
                "singles_units": 1,
            })
            .to_string(),
        ))
        .unwrap();

    let (status, body) = h.send_json(request).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
}

#[tokio::test]
async fn warehouse_scope_is_enforced() {
    let h = Harness::new();
    let (_, worker) = h.user("worker@example.com", Role::Worker, &["WH2"]);
    let (_, admin) = h.user("admin@example.com", Role::Admin, &[]);
    let event = h.store.add_open_event("Year end");
    h.product("SKU-1", 24, 10, 5);
    let body = json!({
        "event_id": event.to_string(),
        "warehouse_code": "WH1",
        "stock_code": "SKU-1",
        "singles_units": 1,
    });

    let (status, reply) = h.send_json(post_json("/api/counts", Some(&worker), body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(reply["code"], "forbidden");

    let (status, _) = h.send_json(post_json("/api/counts", Some(&admin), body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.store.counts().len(), 1);
}

#[tokio::test]
async fn rejects_bad_quantities_and_unknown_products() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_open_event("Year end");
    h.product("SKU-1", 24, 10, 5);

    for bad in [json!(-1), json!("abc"), json!(1.5)] {
        let (status, body) = h
            .send_json(post_json(
                "/api/counts",
                Some(&token),
                json!({
                    "event_id": event.to_string(),
                    "warehouse_code": "WH1",
                    "stock_code": "SKU-1",
                    "bulk_cases": bad,
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "validation");
    }

    let (status, body) = h
        .send_json(post_json(
            "/api/counts",
            Some(&token),
            json!({
                "event_id": event.to_string(),
                "warehouse_code": "WH1",
                "stock_code": "NOPE",
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "not_found");
    assert!(h.store.counts().is_empty());
}

#[tokio::test]
async fn photo_store_failure_records_nothing() {
    let h = Harness::with_failing_photos();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_open_event("Year end");
    h.product("SKU-1", 24, 10, 5);
    let event_id = event.to_string();

    let (status, body) = h
        .send_json(multipart(
            "/api/counts",
            &token,
            &[
                ("event_id", event_id.as_str()),
                ("warehouse_code", "WH1"),
                ("stock_code", "SKU-1"),
                ("singles_units", "3"),
            ],
            Some(("shelf.jpg", "image/jpeg", JPEG)),
        ))
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "storage_error");
    assert!(h.store.counts().is_empty());
}

#[tokio::test]
async fn resubmitting_a_client_ref_returns_the_original_count() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_open_event("Year end");
    h.product("SKU-1", 24, 10, 5);
    let body = json!({
        "event_id": event.to_string(),
        "warehouse_code": "WH1",
        "stock_code": "SKU-1",
        "singles_units": 7,
        "client_ref": "device-entry-1",
    });

    let (_, first) = h.send_json(post_json("/api/counts", Some(&token), body.clone())).await;
    let (status, second) = h.send_json(post_json("/api/counts", Some(&token), body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["duplicate"], true);
    assert!(first.get("duplicate").is_none());
    assert_eq!(h.store.counts().len(), 1);
}

#[tokio::test]
async fn concurrent_client_ref_resolves_to_the_committed_count() {
    let h = Harness::new();
    let (_, token) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let event = h.store.add_open_event("Year end");
    h.product("SKU-1", 24, 10, 5);
    let body = json!({
        "event_id": event.to_string(),
        "warehouse_code": "WH1",
        "stock_code": "SKU-1",
        "singles_units": 7,
        "client_ref": "device-entry-2",
        "photo": dataurl::encode("image/jpeg", JPEG),
        "photo_name": "shelf.jpg",
    });

    let (_, first) = h.send_json(post_json("/api/counts", Some(&token), body.clone())).await;
    // The second request misses the dedupe read and hits the unique key
    h.store.skip_next_client_ref_lookup();
    let (status, second) = h.send_json(post_json("/api/counts", Some(&token), body)).await;

    assert_eq!(status, StatusCode::OK, "{}", second);
    assert_eq!(second["duplicate"], true);
    assert_eq!(first["id"], second["id"]);
    assert_eq!(second["photo_path"], first["photo_path"]);
    assert_eq!(h.store.counts().len(), 1);

    // Only the committed count's photo remains
    let wh_dir = h.photo_dir.path().join(event.to_string()).join("WH1");
    assert_eq!(std::fs::read_dir(wh_dir).unwrap().count(), 1);
}

#[tokio::test]
async fn recount_submission_closes_the_task() {
    let h = Harness::new();
    let (worker_id, worker) = h.user("worker@example.com", Role::Worker, &["WH1"]);
    let (_, manager) = h.user("manager@example.com", Role::Manager, &["WH1"]);
    let event = h.store.add_open_event("Year end");
    h.product("SKU-1", 24, 10, 5);

    let (status, assigned) = h
        .send_json(post_json(
            "/api/recounts",
            Some(&manager),
            json!({
                "event_id": event,
                "warehouse_code": "WH1",
                "items": [{ "stock_code": "SKU-1" }],
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", assigned);
    let task_id = assigned["tasks"][0]["id"].as_str().unwrap().to_string();
    assert_eq!(assigned["tasks"][0]["assigned_to"], worker_id.to_string());

    let submit = json!({
        "event_id": event.to_string(),
        "warehouse_code": "WH1",
        "stock_code": "SKU-1",
        "singles_units": 2,
        "recount_task_id": task_id,
    });
    let (status, body) = h.send_json(post_json("/api/counts", Some(&worker), submit.clone())).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(h.store.recount_tasks()[0].status, "done");

    // A second count against the same task is refused
    let (status, body) = h.send_json(post_json("/api/counts", Some(&worker), submit)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "conflict");
}
