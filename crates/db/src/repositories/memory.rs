use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use rewear_core::domain::conversation::Conversation;
use rewear_core::domain::draft::{Draft, DraftId, DraftStatus};
use rewear_core::domain::seller::{Seller, SellerId};
use rewear_core::flows::states::{ConversationState, StateContext};

use super::{
    ConversationRepository, DraftChanges, DraftRepository, RepositoryError, SellerRepository,
};

#[derive(Default)]
pub struct InMemorySellerRepository {
    sellers: RwLock<HashMap<String, Seller>>,
}

#[async_trait::async_trait]
impl SellerRepository for InMemorySellerRepository {
    async fn find_by_id(&self, id: &SellerId) -> Result<Option<Seller>, RepositoryError> {
        let sellers = self.sellers.read().await;
        Ok(sellers.get(&id.0).cloned())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Seller>, RepositoryError> {
        let sellers = self.sellers.read().await;
        Ok(sellers.values().find(|seller| seller.phone.as_deref() == Some(phone)).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Seller>, RepositoryError> {
        let sellers = self.sellers.read().await;
        Ok(sellers.values().find(|seller| seller.matches_email(email)).cloned())
    }

    async fn create(&self, seller: Seller) -> Result<(), RepositoryError> {
        let mut sellers = self.sellers.write().await;
        sellers.insert(seller.id.0.clone(), seller);
        Ok(())
    }

    async fn link_phone(&self, id: &SellerId, phone: &str) -> Result<(), RepositoryError> {
        let mut sellers = self.sellers.write().await;
        for seller in sellers.values_mut() {
            if seller.id != *id && seller.phone.as_deref() == Some(phone) {
                seller.phone = None;
            }
        }
        let seller = sellers
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound { entity: "seller", id: id.0.clone() })?;
        seller.phone = Some(phone.to_owned());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<String, Conversation>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(phone).cloned())
    }

    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.phone.clone(), conversation);
        Ok(())
    }

    async fn update(&self, conversation: Conversation) -> Result<Conversation, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        let stored = conversations.get_mut(&conversation.phone).ok_or_else(|| {
            RepositoryError::NotFound { entity: "conversation", id: conversation.id.0.clone() }
        })?;

        if stored.version != conversation.version {
            return Err(RepositoryError::Conflict {
                entity: "conversation",
                id: conversation.id.0.clone(),
            });
        }

        let mut updated = conversation;
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn revoke_other_sessions(
        &self,
        seller_id: &SellerId,
        keep_phone: &str,
    ) -> Result<u64, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        let mut revoked = 0;
        for conversation in conversations.values_mut() {
            if conversation.seller_id.as_ref() == Some(seller_id)
                && conversation.phone != keep_phone
                && conversation.authorized
            {
                conversation.authorized = false;
                conversation.authorized_at = None;
                conversation.state = ConversationState::AwaitingEmail;
                conversation.context = StateContext::None;
                conversation.version += 1;
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}

#[derive(Default)]
pub struct InMemoryDraftRepository {
    drafts: RwLock<HashMap<String, Draft>>,
}

#[async_trait::async_trait]
impl DraftRepository for InMemoryDraftRepository {
    async fn create(&self, draft: Draft) -> Result<(), RepositoryError> {
        let mut drafts = self.drafts.write().await;
        drafts.insert(draft.id.0.clone(), draft);
        Ok(())
    }

    async fn find_by_id(&self, id: &DraftId) -> Result<Option<Draft>, RepositoryError> {
        let drafts = self.drafts.read().await;
        Ok(drafts.get(&id.0).cloned())
    }

    async fn update(&self, id: &DraftId, changes: DraftChanges) -> Result<Draft, RepositoryError> {
        let mut drafts = self.drafts.write().await;
        let stored = drafts
            .get_mut(&id.0)
            .filter(|draft| draft.is_open())
            .ok_or_else(|| RepositoryError::NotFound { entity: "draft", id: id.0.clone() })?;

        if let Some(fields) = changes.fields {
            stored.fields = fields;
        }
        if let Some(photos) = changes.photos {
            stored.photos = photos;
        }
        if let Some(status) = changes.status {
            stored.status = status;
        }
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn delete(&self, id: &DraftId) -> Result<(), RepositoryError> {
        let mut drafts = self.drafts.write().await;
        if let Some(draft) = drafts.get_mut(&id.0) {
            draft.status = DraftStatus::Deleted;
        }
        Ok(())
    }

    async fn find_open_for_seller(
        &self,
        seller_id: &SellerId,
    ) -> Result<Option<Draft>, RepositoryError> {
        let drafts = self.drafts.read().await;
        let mut open: Vec<&Draft> = drafts
            .values()
            .filter(|draft| draft.seller_id == *seller_id && draft.is_open())
            .collect();
        open.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then(right.id.0.cmp(&left.id.0))
        });
        Ok(open.first().map(|draft| (*draft).clone()))
    }
}
