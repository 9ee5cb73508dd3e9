use async_trait::async_trait;
use thiserror::Error;

use rewear_core::domain::conversation::Conversation;
use rewear_core::domain::draft::{Draft, DraftId, DraftStatus, PhotoSet};
use rewear_core::domain::seller::{Seller, SellerId};
use rewear_core::fields::ListingFields;

pub mod conversation;
pub mod draft;
pub mod memory;
pub mod seller;

pub use conversation::SqlConversationRepository;
pub use draft::SqlDraftRepository;
pub use memory::{
    InMemoryConversationRepository, InMemoryDraftRepository, InMemorySellerRepository,
};
pub use seller::SqlSellerRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{entity} `{id}` was modified concurrently")]
    Conflict { entity: &'static str, id: String },
    #[error("{entity} `{id}` was not found")]
    NotFound { entity: &'static str, id: String },
}

#[async_trait]
pub trait SellerRepository: Send + Sync {
    async fn find_by_id(&self, id: &SellerId) -> Result<Option<Seller>, RepositoryError>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Seller>, RepositoryError>;
    /// Case-insensitive lookup against the primary or alternate email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Seller>, RepositoryError>;
    async fn create(&self, seller: Seller) -> Result<(), RepositoryError>;
    /// Point `phone` at this seller, releasing it from any other seller
    /// row first.
    async fn link_phone(&self, id: &SellerId, phone: &str) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Conversation>, RepositoryError>;
    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError>;
    /// Optimistic write: succeeds only when the stored row still carries
    /// `conversation.version`, and returns the row with the bumped
    /// version. A concurrent writer surfaces as `Conflict`, never as a
    /// silently lost transition.
    async fn update(&self, conversation: Conversation) -> Result<Conversation, RepositoryError>;
    /// Clear the authorized flag on every other conversation linked to
    /// the seller; used to enforce one active phone session per seller.
    async fn revoke_other_sessions(
        &self,
        seller_id: &SellerId,
        keep_phone: &str,
    ) -> Result<u64, RepositoryError>;
}

/// Partial draft update: a present member overwrites its columns, an
/// absent one leaves them alone. Updates never replace the whole row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DraftChanges {
    pub fields: Option<ListingFields>,
    pub photos: Option<PhotoSet>,
    pub status: Option<DraftStatus>,
}

impl DraftChanges {
    pub fn fields(fields: ListingFields) -> Self {
        Self { fields: Some(fields), ..Self::default() }
    }

    pub fn photos(photos: PhotoSet) -> Self {
        Self { photos: Some(photos), ..Self::default() }
    }

    pub fn status(status: DraftStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }
}

#[async_trait]
pub trait DraftRepository: Send + Sync {
    async fn create(&self, draft: Draft) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &DraftId) -> Result<Option<Draft>, RepositoryError>;
    /// Merge `changes` into an open draft. `NotFound` when the draft is
    /// missing or no longer open; a late collaborator result for a
    /// cancelled draft lands here and is discarded by the caller.
    async fn update(&self, id: &DraftId, changes: DraftChanges) -> Result<Draft, RepositoryError>;
    /// Mark the draft deleted. Idempotent.
    async fn delete(&self, id: &DraftId) -> Result<(), RepositoryError>;
    async fn find_open_for_seller(
        &self,
        seller_id: &SellerId,
    ) -> Result<Option<Draft>, RepositoryError>;
}
