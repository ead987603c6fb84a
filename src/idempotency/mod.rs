//! Idempotency module
//!
//! Prevents duplicate request processing using idempotency keys.
//!
//! The key is checked and the response stored inside the same unit of work
//! as the operation itself, so a replay either sees the committed response
//! or nothing at all.

mod record;

pub use record::{
    compute_request_hash, IdempotencyError, IdempotencyGuard, IdempotencyRecord,
};
