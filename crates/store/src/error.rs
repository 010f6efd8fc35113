//! Typed error type for the store crate.

use thiserror::Error;
use uuid::Uuid;

use crate::models::ExecutionStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found: {0}")]
    NotFound(Uuid),

    #[error("illegal status transition {from} -> {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
