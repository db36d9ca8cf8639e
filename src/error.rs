use thiserror::Error;

/// Failures surfaced by a [`crate::store::Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// Another non-cancelled appointment of the same educator overlaps the
    /// requested interval. Retryable from the caller's point of view.
    #[error("slot no longer available")]
    SlotUnavailable { conflicting_id: String },

    #[error(transparent)]
    Database(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StoreError::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str) -> Self {
        StoreError::NotFound { entity }
    }
}
