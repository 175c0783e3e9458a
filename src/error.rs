//! Typed failures surfaced by the validator and lifecycle engine.
//!
//! Every business-rule violation has its own variant so callers (e.g. an
//! HTTP layer) can map each to a distinct status code. Store faults are kept
//! separate in [`StoreError`] and are never conflated with business errors.
use crate::swap::SwapStatus;

#[derive(thiserror::Error, Debug)]
pub enum SwapError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
    #[error("not authorized to {0}")]
    Unauthorized(&'static str),
    #[error("swap request is {current}, must be {required}")]
    InvalidState {
        current: SwapStatus,
        required: SwapStatus,
    },
    #[error("cannot create a swap request with yourself")]
    SelfSwap,
    #[error("cannot send a request to a private profile")]
    PrivateProfile,
    #[error("an equivalent pending swap request already exists")]
    DuplicateRequest,
    #[error("feedback already submitted for this swap")]
    DuplicateFeedback,
    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl SwapError {
    pub(crate) fn user_not_found(id: &str) -> Self {
        Self::NotFound {
            what: "user",
            id: id.to_owned(),
        }
    }
    pub(crate) fn swap_not_found(id: &str) -> Self {
        Self::NotFound {
            what: "swap request",
            id: id.to_owned(),
        }
    }
}

/// Faults raised by the entity store itself (connectivity, codec, lost
/// optimistic-concurrency races). `RevisionConflict` is the only variant the
/// lifecycle engine reacts to; everything else propagates to the caller.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Backend(#[from] sled::Error),
    #[error("codec failure: {0}")]
    Codec(String),
    #[error("referenced entity missing: {0}")]
    Missing(String),
    #[error("revision conflict on {0}")]
    RevisionConflict(String),
}
