//! API Integration Tests
//!
//! Drive the full router (middleware included) over the in-memory store.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

use pos_ledger::directory::{AccountProfile, DirectoryPolicy, StaticDirectory};
use pos_ledger::domain::AccountToken;

mod common;

use common::TestApp;

fn actor() -> Value {
    json!({"employeeId": "E-100", "username": "cashier"})
}

async fn top_up(app: &TestApp, token: &str, amount: &str) -> Value {
    let (status, body) = app
        .post(
            "/api/credit",
            json!({"token": token, "amount": amount, "actor": actor()}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "top up failed: {}", body);
    body
}

async fn place_order(app: &TestApp, body: Value) -> (StatusCode, Value) {
    app.post("/api/order", body).await
}

fn soda_order(quantity: i64) -> Value {
    json!({
        "lines": [{"itemId": 1, "quantity": quantity}],
        "paymentType": "cash",
        "total": format!("{:.2}", 1.5 * quantity as f64),
    })
}

// =========================================================================
// Health
// =========================================================================

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();
    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

// =========================================================================
// Accounts
// =========================================================================

#[tokio::test]
async fn test_credit_payment_and_balance() {
    let app = TestApp::new();

    let credited = top_up(&app, "00123", "50").await;
    assert_eq!(credited["token"], "123");
    assert_eq!(credited["newBalance"], "50.00");
    assert!(credited["referenceCode"].as_str().unwrap().starts_with("TOPUP-"));
    assert!(credited["transactionId"].is_i64());

    // Numbers are accepted for token and amount
    let (status, body) = app
        .post(
            "/api/credit",
            json!({"token": 123, "amount": 30, "actor": actor()}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newBalance"], "80.00");

    let (status, body) = app
        .post(
            "/api/payment",
            json!({
                "token": "123",
                "amount": "12.25",
                "actor": actor(),
                "label": "Sandwich",
                "quantity": 1
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newBalance"], "67.75");
    assert!(body["referenceCode"].as_str().unwrap().starts_with("PAY-"));

    let (status, body) = app.get("/api/credit?token=123").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token"], "123");
    assert_eq!(body["balance"], "67.75");
    assert!(body.get("name").is_none());
}

#[tokio::test]
async fn test_unknown_token_has_zero_balance() {
    let app = TestApp::new();
    let (status, body) = app.get("/api/credit?token=999").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], "0.00");
}

#[tokio::test]
async fn test_balance_requires_valid_token() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/credit").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");

    let (status, body) = app.get("/api/credit?token=12ab").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_token");
}

#[tokio::test]
async fn test_payment_insufficient_funds() {
    let app = TestApp::new();
    top_up(&app, "77", "20").await;

    let (status, body) = app
        .post(
            "/api/payment",
            json!({"token": "77", "amount": "25.50", "actor": actor()}),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Insufficient credit");
    assert_eq!(body["error_code"], "insufficient_funds");
    assert_eq!(body["currentBalance"], "20.00");
    assert_eq!(body["requiredAmount"], "25.50");

    let (_, body) = app.get("/api/credit?token=77").await;
    assert_eq!(body["balance"], "20.00");
}

#[tokio::test]
async fn test_payment_validation_errors() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/payment", json!({"token": "1", "amount": "5"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "validation_error");

    let (status, body) = app
        .post(
            "/api/payment",
            json!({"token": "1", "amount": "0", "actor": actor()}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_amount");

    let (status, body) = app
        .post(
            "/api/payment",
            json!({"token": "1", "amount": "1.234", "actor": actor()}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_amount");

    let (status, body) = app
        .post(
            "/api/payment",
            json!({"token": "x1", "amount": "1", "actor": actor()}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_token");
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = TestApp::new();
    let (status, body) = app.post("/api/payment", json!({"token": "1"})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_request");
}

#[tokio::test]
async fn test_history_and_balances() {
    let app = TestApp::new();
    top_up(&app, "10", "50").await;
    top_up(&app, "20", "5").await;
    app.post(
        "/api/payment",
        json!({"token": "10", "amount": "8", "actor": actor()}),
    )
    .await;

    let (status, body) = app.get("/api/credit/history?token=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], "42.00");
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["credit"], "50.00");
    assert_eq!(entries[0]["productType"], "Top Up");
    assert_eq!(entries[1]["debit"], "8.00");
    assert_eq!(entries[1]["productName"], "POS Purchase");

    let (status, body) = app.get("/api/credit/balances").await;
    assert_eq!(status, StatusCode::OK);
    let balances = body.as_array().unwrap();
    assert_eq!(balances.len(), 2);
    assert_eq!(balances[0]["token"], "10");
    assert_eq!(balances[0]["balance"], "42.00");
    assert_eq!(balances[0]["entryCount"], 2);
    assert_eq!(balances[1]["token"], "20");
    assert_eq!(balances[1]["totalCredit"], "5.00");
}

#[tokio::test]
async fn test_balances_listed_in_numeric_token_order() {
    let app = TestApp::new();
    for token in ["100", "2", "10"] {
        top_up(&app, token, "1").await;
    }

    let (status, body) = app.get("/api/credit/balances").await;
    assert_eq!(status, StatusCode::OK);
    let tokens: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["token"].as_str().unwrap())
        .collect();
    assert_eq!(tokens, vec!["2", "10", "100"]);
}

// =========================================================================
// Account directory
// =========================================================================

fn directory_app(require_known: bool) -> TestApp {
    let directory = StaticDirectory::new().with_profile(
        AccountToken::parse("42").unwrap(),
        AccountProfile::new("Ada Lovelace", "employee"),
    );
    TestApp::with_options(
        DirectoryPolicy::new(Arc::new(directory), require_known),
        false,
    )
}

#[tokio::test]
async fn test_balance_enriched_from_directory() {
    let app = directory_app(false);

    let (status, body) = app.get("/api/credit?token=42").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Ada Lovelace");
    assert_eq!(body["accountType"], "employee");

    let (status, body) = app.get("/api/credit?token=43").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("name").is_none());
}

#[tokio::test]
async fn test_unknown_account_rejected_when_required() {
    let app = directory_app(true);

    let (status, body) = app.get("/api/credit?token=43").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "account_not_found");

    let (status, _) = app
        .post(
            "/api/credit",
            json!({"token": "43", "amount": "5", "actor": actor()}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    top_up(&app, "42", "5").await;
}

// =========================================================================
// Orders
// =========================================================================

#[tokio::test]
async fn test_cash_order_created() {
    let app = TestApp::new();
    let (status, body) = place_order(&app, soda_order(3)).await;

    assert_eq!(status, StatusCode::CREATED);
    let order_number = body["orderNumber"].as_str().unwrap();
    assert!(order_number.starts_with("ORD-"));

    let order = &body["order"];
    assert_eq!(order["orderNumber"], order_number);
    assert_eq!(order["status"], "Preparing");
    assert_eq!(order["paymentType"], "cash");
    assert_eq!(order["total"], "4.50");
    assert_eq!(order["lines"][0]["label"], "Soda");
    assert_eq!(order["lines"][0]["unitPrice"], "1.50");
    assert!(order.get("ledgerEntryId").is_none());

    assert_eq!(app.store.item(1).await.unwrap().quantity, 2);
}

#[tokio::test]
async fn test_order_insufficient_stock_keeps_stock() {
    let app = TestApp::new();
    place_order(&app, soda_order(3)).await;

    let (status, body) = place_order(&app, soda_order(3)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "insufficient_stock");

    assert_eq!(app.store.item(1).await.unwrap().quantity, 2);
    assert_eq!(app.store.order_count().await, 1);
}

#[tokio::test]
async fn test_order_error_mapping() {
    let app = TestApp::new();

    let (status, body) = place_order(
        &app,
        json!({"lines": [], "paymentType": "cash", "total": "0"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "empty_order");

    let (status, body) = place_order(
        &app,
        json!({"lines": [{"itemId": 99, "quantity": 1}], "paymentType": "cash", "total": "1"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "item_not_found");

    let (status, _) = place_order(
        &app,
        json!({"lines": [{"itemId": 1, "quantity": 1}], "paymentType": "card", "total": "1.50"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = place_order(
        &app,
        json!({"lines": [{"itemId": 1, "quantity": 1}], "paymentType": "cheque", "total": "1.50"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_order_oversized_money_is_bad_request() {
    let app = TestApp::new();

    let (status, body) = place_order(
        &app,
        json!({
            "lines": [{"itemId": 1, "quantity": 2, "unitPrice": "70000000000000000000000000000"}],
            "paymentType": "cash",
            "total": "1.00",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_amount");

    // Would not fit the unit_price column
    let (status, body) = place_order(
        &app,
        json!({
            "lines": [{"itemId": 1, "quantity": 1, "unitPrice": "10000000000"}],
            "paymentType": "cash",
            "total": "1.00",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_amount");

    // Would not fit the order total column
    let (status, body) = place_order(
        &app,
        json!({
            "lines": [{"itemId": 1, "quantity": 1}],
            "paymentType": "cash",
            "total": "1000000000000",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_amount");

    assert_eq!(app.store.item(1).await.unwrap().quantity, 5);
    assert_eq!(app.store.order_count().await, 0);
}

#[tokio::test]
async fn test_payment_quantity_bounds() {
    let app = TestApp::new();
    top_up(&app, "88", "20").await;

    for quantity in ["0.005", "1000000000000"] {
        let (status, body) = app
            .post(
                "/api/payment",
                json!({"token": "88", "amount": "1", "actor": actor(), "quantity": quantity}),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "quantity {}", quantity);
        assert_eq!(body["error_code"], "validation_error");
    }

    let (status, body) = app
        .post(
            "/api/payment",
            json!({"token": "88", "amount": "1", "actor": actor(), "quantity": "2.5"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["newBalance"], "19.00");
}

#[tokio::test]
async fn test_card_order_debits_account() {
    let app = TestApp::new();
    top_up(&app, "500", "10").await;

    let (status, body) = place_order(
        &app,
        json!({
            "lines": [{"itemId": 1, "quantity": 2}, {"itemId": 2, "quantity": 1}],
            "paymentType": "card",
            "token": 500,
            "total": "5.00",
            "actor": actor()
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["order"]["accountToken"], "500");
    assert!(body["order"]["ledgerEntryId"].is_i64());

    let (_, balance) = app.get("/api/credit?token=500").await;
    assert_eq!(balance["balance"], "5.00");

    let (_, history) = app.get("/api/credit/history?token=500").await;
    let entries = history["entries"].as_array().unwrap();
    assert_eq!(
        entries[1]["productName"],
        format!("Order {}", body["orderNumber"].as_str().unwrap())
    );
}

#[tokio::test]
async fn test_card_order_insufficient_funds() {
    let app = TestApp::new();
    top_up(&app, "501", "2").await;

    let (status, body) = place_order(
        &app,
        json!({
            "lines": [{"itemId": 3, "quantity": 1}],
            "paymentType": "card",
            "token": "501",
            "total": "4.25"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "insufficient_funds");
    assert_eq!(body["currentBalance"], "2.00");
    assert_eq!(body["requiredAmount"], "4.25");
    assert_eq!(app.store.item(3).await.unwrap().quantity, 20);
}

#[tokio::test]
async fn test_card_order_stock_failure_rolls_back_debit() {
    let app = TestApp::new();
    top_up(&app, "502", "20").await;

    let (status, _) = place_order(
        &app,
        json!({
            "lines": [{"itemId": 1, "quantity": 1}, {"itemId": 2, "quantity": 2}],
            "paymentType": "card",
            "token": "502",
            "total": "5.50"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, balance) = app.get("/api/credit?token=502").await;
    assert_eq!(balance["balance"], "20.00");
    assert_eq!(app.store.item(1).await.unwrap().quantity, 5);
    assert_eq!(app.store.item(2).await.unwrap().quantity, 1);
}

#[tokio::test]
async fn test_get_and_list_orders() {
    let app = TestApp::new();
    let (_, first) = place_order(&app, soda_order(1)).await;
    let (_, second) = place_order(&app, soda_order(1)).await;
    let first_number = first["orderNumber"].as_str().unwrap();
    let second_number = second["orderNumber"].as_str().unwrap();

    let (status, body) = app.get(&format!("/api/orders/{}", first_number)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orderNumber"], first_number);
    assert_eq!(body["lines"].as_array().unwrap().len(), 1);

    let (status, body) = app.get("/api/orders/ORD-00000000-NOPE00").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "order_not_found");

    let (status, body) = app.get("/api/orders").await;
    assert_eq!(status, StatusCode::OK);
    let orders = body.as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0]["orderNumber"], second_number);

    let (_, body) = app.get("/api/orders?limit=1").await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    app.patch(
        &format!("/api/orders/{}/status", first_number),
        json!({"status": "Serving"}),
    )
    .await;
    let (status, body) = app.get("/api/orders?status=Serving").await;
    assert_eq!(status, StatusCode::OK);
    let serving = body.as_array().unwrap();
    assert_eq!(serving.len(), 1);
    assert_eq!(serving[0]["orderNumber"], first_number);

    let (status, body) = app.get("/api/orders?status=Flying").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_status");
}

#[tokio::test]
async fn test_update_order_status() {
    let app = TestApp::new();
    let (_, created) = place_order(&app, soda_order(1)).await;
    let uri = format!(
        "/api/orders/{}/status",
        created["orderNumber"].as_str().unwrap()
    );

    let (status, body) = app.patch(&uri, json!({"status": "Completed"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Completed");

    // Any-to-any unless strict transitions are enabled
    let (status, body) = app.patch(&uri, json!({"status": "Preparing"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Preparing");

    let (status, body) = app.patch(&uri, json!({"status": "Flying"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_status");

    let (status, _) = app
        .patch("/api/orders/ORD-00000000-NOPE00/status", json!({"status": "Serving"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_strict_transitions_reject_backwards_moves() {
    let app = TestApp::with_options(DirectoryPolicy::disabled(), true);
    let (_, created) = place_order(&app, soda_order(1)).await;
    let uri = format!(
        "/api/orders/{}/status",
        created["orderNumber"].as_str().unwrap()
    );

    let (status, _) = app.patch(&uri, json!({"status": "Serving"})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.patch(&uri, json!({"status": "Preparing"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "invalid_transition");
}

// =========================================================================
// Idempotency
// =========================================================================

#[tokio::test]
async fn test_idempotent_payment_replay() {
    let app = TestApp::new();
    top_up(&app, "900", "30").await;

    let key = Uuid::new_v4().to_string();
    let body = json!({"token": "900", "amount": "10", "actor": actor()});

    let (status, first) = app
        .request("POST", "/api/payment", Some(body.clone()), &[("Idempotency-Key", key.as_str())])
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, second) = app
        .request("POST", "/api/payment", Some(body), &[("Idempotency-Key", key.as_str())])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first, second);

    let (_, balance) = app.get("/api/credit?token=900").await;
    assert_eq!(balance["balance"], "20.00");

    let (status, conflict) = app
        .request(
            "POST",
            "/api/payment",
            Some(json!({"token": "900", "amount": "11", "actor": actor()})),
            &[("Idempotency-Key", key.as_str())],
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(conflict["error_code"], "idempotency_conflict");
}

#[tokio::test]
async fn test_idempotent_order_replay() {
    let app = TestApp::new();
    let key = Uuid::new_v4().to_string();

    let (status, first) = app
        .request("POST", "/api/order", Some(soda_order(2)), &[("Idempotency-Key", key.as_str())])
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, second) = app
        .request("POST", "/api/order", Some(soda_order(2)), &[("Idempotency-Key", key.as_str())])
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["orderNumber"], second["orderNumber"]);

    assert_eq!(app.store.item(1).await.unwrap().quantity, 3);
    assert_eq!(app.store.order_count().await, 1);
}

#[tokio::test]
async fn test_invalid_idempotency_key() {
    let app = TestApp::new();
    let (status, body) = app
        .request(
            "POST",
            "/api/payment",
            Some(json!({"token": "1", "amount": "1", "actor": actor()})),
            &[("Idempotency-Key", "not-a-uuid")],
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "invalid_idempotency_key");
}
