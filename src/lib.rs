//! posLedger Library
//!
//! Re-exports modules for the server binary, integration testing and
//! external use.

pub mod api;
pub mod config;
pub mod db;
pub mod directory;
pub mod domain;
mod error;
pub mod handlers;
pub mod idempotency;
pub mod jobs;
pub mod store;

pub use config::Config;
pub use domain::{AccountToken, Amount, AmountError, Balance, DomainError, OperationContext};
pub use error::{AppError, AppResult, ErrorResponse};
