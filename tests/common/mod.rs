//! Common test utilities

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower::util::ServiceExt;

use pos_ledger::api::{self, AppState};
use pos_ledger::directory::DirectoryPolicy;
use pos_ledger::domain::Item;
use pos_ledger::store::{InMemoryStore, Store};

/// Catalog every API test starts from
pub fn catalog() -> Vec<Item> {
    vec![
        Item::new(1, "Soda", dec!(1.50), 5),
        Item::new(2, "Chips", dec!(2.00), 1),
        Item::new(3, "Sandwich", dec!(4.25), 20),
    ]
}

/// Router plus a handle on its store for direct inspection
pub struct TestApp {
    pub router: Router,
    pub store: InMemoryStore,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(DirectoryPolicy::disabled(), false)
    }

    pub fn with_options(directory: DirectoryPolicy, strict_transitions: bool) -> Self {
        let store = InMemoryStore::with_items(catalog());
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let router = api::build_router(AppState::new(shared, directory, strict_transitions));
        Self { router, store }
    }

    /// Send one request and decode the JSON response body
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&json).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request("GET", uri, None, &[]).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(body), &[]).await
    }

    pub async fn patch(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request("PATCH", uri, Some(body), &[]).await
    }
}

/// Connect to `DATABASE_URL`, apply migrations and clear every table.
/// Returns `None` when no database is configured.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    pos_ledger::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    // The ledger is append-only; TRUNCATE does not fire row triggers
    sqlx::query(
        "TRUNCATE TABLE order_line_items, orders, ledger_entries, items, idempotency_keys, account_profiles RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await
    .expect("Failed to clean up DB");

    for item in catalog() {
        sqlx::query("INSERT INTO items (id, name, price, quantity) VALUES ($1, $2, $3, $4)")
            .bind(item.id)
            .bind(&item.name)
            .bind(item.price)
            .bind(item.quantity)
            .execute(&pool)
            .await
            .expect("Failed to seed items");
    }

    Some(pool)
}
