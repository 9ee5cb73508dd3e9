use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::seller::SellerId;
use crate::errors::DomainError;
use crate::flows::states::{check_transition, ConversationState, StateContext};

/// Upper bound on the recently-processed inbound message id log kept per
/// conversation. Gateways redeliver; anything older than this window is
/// allowed to replay.
pub const RECENT_MESSAGE_CAP: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

/// The persisted state-machine cursor for one phone number. `version` is
/// bumped on every write and checked optimistically by the repository.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub phone: String,
    pub state: ConversationState,
    pub context: StateContext,
    pub authorized: bool,
    pub seller_id: Option<SellerId>,
    pub authorized_at: Option<DateTime<Utc>>,
    pub auth_attempts: u32,
    pub last_auth_attempt_at: Option<DateTime<Utc>>,
    pub attempt_window_started_at: Option<DateTime<Utc>>,
    pub attempt_window_count: u32,
    pub recent_message_ids: Vec<String>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: ConversationId, phone: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            phone: phone.into(),
            state: ConversationState::New,
            context: StateContext::None,
            authorized: false,
            seller_id: None,
            authorized_at: None,
            auth_attempts: 0,
            last_auth_attempt_at: None,
            attempt_window_started_at: None,
            attempt_window_count: 0,
            recent_message_ids: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `state` with a context shaped for it. Rejects pairs the
    /// transition table forbids, so a handler bug cannot persist an
    /// undefined state.
    pub fn transition(
        &mut self,
        state: ConversationState,
        context: StateContext,
    ) -> Result<(), DomainError> {
        check_transition(self.state, state, &context)?;
        self.state = state;
        self.context = context;
        Ok(())
    }

    /// Record an inbound provider message id. Returns `false` when the id
    /// was already seen (gateway redelivery); the caller treats that as
    /// an idempotent no-op. The log is capped at `RECENT_MESSAGE_CAP`,
    /// oldest first out.
    pub fn remember_message(&mut self, message_id: &str) -> bool {
        if message_id.is_empty() {
            return true;
        }
        if self.recent_message_ids.iter().any(|seen| seen == message_id) {
            return false;
        }
        self.recent_message_ids.push(message_id.to_owned());
        if self.recent_message_ids.len() > RECENT_MESSAGE_CAP {
            let excess = self.recent_message_ids.len() - RECENT_MESSAGE_CAP;
            self.recent_message_ids.drain(..excess);
        }
        true
    }

    pub fn authorize(&mut self, seller_id: SellerId, now: DateTime<Utc>) {
        self.authorized = true;
        self.seller_id = Some(seller_id);
        self.authorized_at = Some(now);
        self.auth_attempts = 0;
    }

    /// Drop authorization without touching the seller link; used when a
    /// newer session for the same seller takes over.
    pub fn revoke(&mut self) {
        self.authorized = false;
        self.authorized_at = None;
        self.state = ConversationState::AwaitingEmail;
        self.context = StateContext::None;
    }
}
