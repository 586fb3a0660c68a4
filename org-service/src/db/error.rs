use service_core::error::AppError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{operation} on '{collection}' timed out after {after:?}")]
    Timeout {
        collection: String,
        operation: &'static str,
        after: Duration,
    },

    #[error("store backend error: {0}")]
    Backend(#[from] mongodb::error::Error),

    #[error("Invalid id: {0}")]
    InvalidId(String),

    #[error("Nothing to update")]
    EmptyUpdate,

    #[error("failed to encode document: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("failed to decode document: {0}")]
    Decode(#[from] bson::de::Error),

    #[error("unsupported query: {0}")]
    Unsupported(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidId(id) => AppError::BadRequest(anyhow::anyhow!("Invalid id: {}", id)),
            StoreError::EmptyUpdate => AppError::BadRequest(anyhow::anyhow!("Nothing to update")),
            other => AppError::DatabaseError(anyhow::Error::new(other)),
        }
    }
}
