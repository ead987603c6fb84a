//! Command Handlers module
//!
//! Services that orchestrate business operations. Each one opens a unit of
//! work on the store, validates invariants inside it and commits on success.

mod account_handler;
mod balance;
mod commands;
mod order_handler;


pub use account_handler::AccountTransactionService;
pub use balance::BalanceCalculator;
pub use commands::*;
pub use order_handler::{OrderFulfillmentService, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
