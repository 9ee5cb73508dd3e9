use thiserror::Error;

use crate::domain::draft::DraftStatus;
use crate::flows::states::ConversationState;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid conversation transition from {from:?} to {to:?}")]
    InvalidStateTransition { from: ConversationState, to: ConversationState },
    #[error("invalid draft transition from {from:?} to {to:?}")]
    InvalidDraftTransition { from: DraftStatus, to: DraftStatus },
    #[error("draft is not ready for review: missing {missing:?}, {photo_count} photos accepted")]
    IncompleteDraft { missing: Vec<String>, photo_count: u32 },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("could not read `{raw}` as a price")]
    InvalidPrice { raw: String },
    #[error("price {price} is outside the accepted range {min}..={max}")]
    PriceOutOfRange { price: String, min: String, max: String },
    #[error("`{raw}` does not look like an email address")]
    InvalidEmail { raw: String },
}
