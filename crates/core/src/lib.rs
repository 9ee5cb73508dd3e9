pub mod config;
pub mod domain;
pub mod errors;
pub mod fields;
pub mod flows;
pub mod retry;

pub use chrono;

pub use domain::conversation::{Conversation, ConversationId, RECENT_MESSAGE_CAP};
pub use domain::draft::{Draft, DraftId, DraftStatus, PhotoSet, MIN_PHOTOS};
pub use domain::seller::{Seller, SellerId};
pub use errors::{DomainError, ValidationError};
pub use fields::{FieldPatch, ListingFields, MergeOutcome, RequiredField};
pub use flows::states::{
    ConversationState, DraftChoiceContext, PendingIntent, SellContext, StateContext,
};
pub use retry::RetryPolicy;
