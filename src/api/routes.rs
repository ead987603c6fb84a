//! API Routes
//!
//! HTTP endpoint definitions. Request bodies are parsed into domain types
//! here; services only see validated commands.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::directory::DirectoryPolicy;
use crate::domain::{
    AccountToken, Actor, Amount, DomainError, OperationContext, Order, OrderStatus, PaymentType,
};
use crate::error::{AppError, AppResult};
use crate::handlers::{
    AccountBalance, AccountHistory, AccountTransactionService, BalanceCalculator, BalanceView,
    CreateOrderCommand, CreateOrderResult, CreditCommand, DebitCommand, OrderFulfillmentService,
    OrderLineRequest, TransactionResult, UpdateOrderStatusCommand,
};
use crate::store::Store;

// =========================================================================
// Application state
// =========================================================================

/// Services shared by every request
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountTransactionService,
    pub orders: OrderFulfillmentService,
    pub balances: BalanceCalculator,
    pub store: Arc<dyn Store>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, directory: DirectoryPolicy, strict_transitions: bool) -> Self {
        Self {
            accounts: AccountTransactionService::new(store.clone())
                .with_directory(directory.clone()),
            orders: OrderFulfillmentService::new(store.clone())
                .with_directory(directory.clone())
                .with_strict_transitions(strict_transitions),
            balances: BalanceCalculator::new(store.clone()).with_directory(directory),
            store,
        }
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

/// Accept `"123"` as well as `123` for tokens and amounts
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {}",
            other
        ))),
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    #[serde(deserialize_with = "string_or_number")]
    pub token: String,
    #[serde(deserialize_with = "string_or_number")]
    pub amount: String,
    #[serde(default)]
    pub actor: Option<Actor>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditRequest {
    #[serde(deserialize_with = "string_or_number")]
    pub token: String,
    #[serde(deserialize_with = "string_or_number")]
    pub amount: String,
    #[serde(default)]
    pub actor: Option<Actor>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineBody {
    pub item_id: i64,
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub lines: Vec<OrderLineBody>,
    pub payment_type: String,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    pub token: Option<String>,
    pub total: Decimal,
    #[serde(default)]
    pub actor: Option<Actor>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
}

// =========================================================================
// Parsing helpers
// =========================================================================

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::InvalidRequest(rejection.body_text()))
}

fn parse_token(raw: &str) -> AppResult<AccountToken> {
    AccountToken::parse(raw).map_err(|e| DomainError::InvalidToken(e.to_string()).into())
}

fn required_token(query: &TokenQuery) -> AppResult<AccountToken> {
    match query.token.as_deref() {
        Some(raw) => parse_token(raw),
        None => Err(AppError::InvalidRequest("token query parameter is required".to_string())),
    }
}

fn parse_amount(raw: &str) -> AppResult<Amount> {
    Amount::from_str(raw).map_err(|e| DomainError::InvalidAmount(e.to_string()).into())
}

/// Missing actors fail the service's completeness check with a 400
fn actor_or_blank(actor: Option<Actor>) -> Actor {
    actor.unwrap_or_else(|| Actor::new("", ""))
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router, mounted under `/api`
pub fn create_router() -> Router<AppState> {
    Router::new()
        // Accounts
        .route("/credit", get(get_balance).post(credit))
        .route("/payment", post(payment))
        .route("/credit/history", get(get_history))
        .route("/credit/balances", get(list_balances))
        // Orders
        .route("/order", post(create_order))
        .route("/orders", get(list_orders))
        .route("/orders/:order_number", get(get_order))
        .route("/orders/:order_number/status", patch(update_order_status))
}

// =========================================================================
// GET /health
// =========================================================================

/// Liveness plus a storage round trip
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                timestamp: Utc::now(),
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unavailable",
                    timestamp: Utc::now(),
                }),
            )
        }
    }
}

// =========================================================================
// GET /credit
// =========================================================================

/// Current balance of an account
async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<BalanceView>, AppError> {
    let token = required_token(&query)?;
    let view = state.balances.balance_view(&token).await?;
    Ok(Json(view))
}

// =========================================================================
// POST /credit
// =========================================================================

/// Top up an account
async fn credit(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<CreditRequest>, JsonRejection>,
) -> Result<Json<TransactionResult>, AppError> {
    let request = json_body(payload)?;

    let command = CreditCommand::new(
        parse_token(&request.token)?,
        parse_amount(&request.amount)?,
        actor_or_blank(request.actor),
    );

    let result = state.accounts.credit(command, &context).await?;
    Ok(Json(result))
}

// =========================================================================
// POST /payment
// =========================================================================

/// Charge an account
async fn payment(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<TransactionResult>, AppError> {
    let request = json_body(payload)?;

    let mut command = DebitCommand::new(
        parse_token(&request.token)?,
        parse_amount(&request.amount)?,
        actor_or_blank(request.actor),
    );
    if let Some(label) = request.label.filter(|l| !l.trim().is_empty()) {
        command = command.with_label(label);
    }
    if let Some(quantity) = request.quantity {
        command = command.with_quantity(quantity);
    }

    let result = state.accounts.debit(command, &context).await?;
    Ok(Json(result))
}

// =========================================================================
// GET /credit/history
// =========================================================================

/// Ledger entries of an account, oldest first
async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<AccountHistory>, AppError> {
    let token = required_token(&query)?;
    let history = state.balances.history(&token).await?;
    Ok(Json(history))
}

// =========================================================================
// GET /credit/balances
// =========================================================================

/// Balances of every account in the ledger
async fn list_balances(
    State(state): State<AppState>,
) -> Result<Json<Vec<AccountBalance>>, AppError> {
    let balances = state.balances.balances().await?;
    Ok(Json(balances))
}

// =========================================================================
// POST /order
// =========================================================================

/// Create an order
async fn create_order(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateOrderResult>), AppError> {
    let request = json_body(payload)?;

    let payment_type = PaymentType::from_str(&request.payment_type)?;
    let lines = request
        .lines
        .into_iter()
        .map(|line| {
            let mut built = OrderLineRequest::new(line.item_id, line.quantity);
            if let Some(price) = line.unit_price {
                built = built.with_price(price);
            }
            if let Some(label) = line.label {
                built = built.with_label(label);
            }
            built
        })
        .collect();

    let mut command = CreateOrderCommand::new(lines, payment_type, request.total);
    if let Some(raw) = request.token.as_deref() {
        command = command.with_token(parse_token(raw)?);
    }
    if let Some(actor) = request.actor {
        command = command.with_actor(actor);
    }

    let result = state.orders.create_order(command, &context).await?;
    Ok((StatusCode::CREATED, Json(result)))
}

// =========================================================================
// GET /orders
// =========================================================================

/// Orders newest first
async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrdersQuery>,
) -> Result<Json<Vec<Order>>, AppError> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(OrderStatus::from_str)
        .transpose()?;

    let orders = state.orders.list_orders(query.limit, status).await?;
    Ok(Json(orders))
}

// =========================================================================
// GET /orders/:order_number
// =========================================================================

async fn get_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<Order>, AppError> {
    let order = state.orders.get_order(&order_number).await?;
    Ok(Json(order))
}

// =========================================================================
// PATCH /orders/:order_number/status
// =========================================================================

/// Move an order to another status
async fn update_order_status(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(order_number): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<Order>, AppError> {
    let request = json_body(payload)?;
    let command = UpdateOrderStatusCommand {
        order_number,
        status: OrderStatus::from_str(&request.status)?,
    };

    let order = state.orders.update_status(command, &context).await?;
    Ok(Json(order))
}
