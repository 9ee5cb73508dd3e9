use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use rewear_core::config::SellingConfig;
use rewear_core::domain::conversation::{Conversation, ConversationId};
use rewear_core::domain::seller::{Seller, SellerId};
use rewear_db::repositories::{ConversationRepository, RepositoryError, SellerRepository};

/// Attempt limiting for the verification flows. Two independent guards:
/// `max_attempts` breaks short wrong-email loops by resetting the flow,
/// `window_cap`/`window_secs` throttle abuse across a rolling window.
#[derive(Clone, Debug)]
pub struct AuthPolicy {
    pub max_attempts: u32,
    pub window_cap: u32,
    pub window_secs: i64,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, window_cap: 10, window_secs: 3_600 }
    }
}

impl From<&SellingConfig> for AuthPolicy {
    fn from(config: &SellingConfig) -> Self {
        Self {
            max_attempts: config.max_auth_attempts,
            window_cap: config.attempt_window_cap,
            window_secs: config.attempt_window_secs as i64,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("email did not match; {attempts_left} attempts left")]
    WrongEmail { attempts_left: u32 },
    #[error("verification attempt limit reached")]
    AttemptsExhausted,
    #[error("verification rate limit reached")]
    RateLimited,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Outcome of the new-account email flow: an email already on file
/// routes into the existing-account path rather than minting a
/// duplicate seller.
#[derive(Clone, Debug, PartialEq)]
pub enum Enrollment {
    Created(Seller),
    Existing(Seller),
}

impl Enrollment {
    pub fn seller(&self) -> &Seller {
        match self {
            Self::Created(seller) | Self::Existing(seller) => seller,
        }
    }
}

pub struct SessionManager {
    sellers: Arc<dyn SellerRepository>,
    conversations: Arc<dyn ConversationRepository>,
    policy: AuthPolicy,
    default_commission_pct: Decimal,
}

impl SessionManager {
    pub fn new(
        sellers: Arc<dyn SellerRepository>,
        conversations: Arc<dyn ConversationRepository>,
        policy: AuthPolicy,
        default_commission_pct: Decimal,
    ) -> Self {
        Self { sellers, conversations, policy, default_commission_pct }
    }

    /// Resolve an inbound phone number: load or create its conversation
    /// row and look up the linked (or phone-matching) seller.
    pub async fn resolve(
        &self,
        phone: &str,
    ) -> Result<(Option<Seller>, Conversation), RepositoryError> {
        let conversation = match self.conversations.find_by_phone(phone).await? {
            Some(conversation) => conversation,
            None => {
                let conversation = Conversation::new(
                    ConversationId(format!("conv-{}", Uuid::new_v4())),
                    phone,
                    Utc::now(),
                );
                self.conversations.create(conversation.clone()).await?;
                conversation
            }
        };

        let seller = match &conversation.seller_id {
            Some(seller_id) => self.sellers.find_by_id(seller_id).await?,
            None => self.sellers.find_by_phone(phone).await?,
        };

        Ok((seller, conversation))
    }

    /// Gate one verification submission through the rolling-window rate
    /// limiter. Mutates the window counters on the conversation; the
    /// caller persists the row either way so the attempt is recorded.
    fn gate_attempt(&self, conversation: &mut Conversation, now: DateTime<Utc>) -> Result<(), AuthError> {
        let window = Duration::seconds(self.policy.window_secs);
        let window_expired = conversation
            .attempt_window_started_at
            .map(|started| now - started > window)
            .unwrap_or(true);

        if window_expired {
            conversation.attempt_window_started_at = Some(now);
            conversation.attempt_window_count = 0;
        }

        if conversation.attempt_window_count >= self.policy.window_cap {
            return Err(AuthError::RateLimited);
        }

        conversation.attempt_window_count += 1;
        conversation.last_auth_attempt_at = Some(now);
        Ok(())
    }

    /// Account-lookup flow: the visitor claims an existing account and
    /// supplies its email. A match authorizes the session and re-links
    /// the phone; a miss burns one of the short-loop attempts.
    pub async fn submit_email_for_lookup(
        &self,
        conversation: &mut Conversation,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Seller, AuthError> {
        self.gate_attempt(conversation, now)?;

        match self.sellers.find_by_email(email).await? {
            Some(seller) => {
                self.authorize(conversation, &seller, now).await?;
                Ok(seller)
            }
            None => Err(self.wrong_email(conversation)),
        }
    }

    /// Re-verification for a conversation already linked to a seller
    /// (revoked session, re-linked phone).
    pub async fn submit_email_for_reverification(
        &self,
        conversation: &mut Conversation,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Seller, AuthError> {
        self.gate_attempt(conversation, now)?;

        let linked = match &conversation.seller_id {
            Some(seller_id) => self.sellers.find_by_id(seller_id).await?,
            None => None,
        };

        // Without a seller link this is just an account lookup.
        let seller = match linked {
            Some(seller) if seller.matches_email(email) => seller,
            Some(_) => return Err(self.wrong_email(conversation)),
            None => match self.sellers.find_by_email(email).await? {
                Some(seller) => seller,
                None => return Err(self.wrong_email(conversation)),
            },
        };

        self.authorize(conversation, &seller, now).await?;
        Ok(seller)
    }

    /// New-account flow. An email already registered is treated as an
    /// account lookup instead of creating a duplicate seller: knowing
    /// the email on file is exactly the lookup credential.
    pub async fn submit_email_for_new_account(
        &self,
        conversation: &mut Conversation,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Enrollment, AuthError> {
        self.gate_attempt(conversation, now)?;

        if let Some(existing) = self.sellers.find_by_email(email).await? {
            self.authorize(conversation, &existing, now).await?;
            return Ok(Enrollment::Existing(existing));
        }

        let display_name = email.split('@').next().unwrap_or("Seller").to_owned();
        let seller = Seller {
            id: SellerId(format!("seller-{}", Uuid::new_v4())),
            phone: Some(conversation.phone.clone()),
            email: email.to_owned(),
            alt_email: None,
            display_name,
            commission_pct: self.default_commission_pct,
            created_at: now,
            updated_at: now,
        };
        self.sellers.create(seller.clone()).await?;
        info!(
            event_name = "agent.session.seller_enrolled",
            phone = %conversation.phone,
            "new seller enrolled from conversation"
        );

        self.authorize(conversation, &seller, now).await?;
        Ok(Enrollment::Created(seller))
    }

    /// Known-phone fast path: the number is already linked to a seller,
    /// so verification is skipped and the session authorized directly.
    pub async fn authorize_known_phone(
        &self,
        conversation: &mut Conversation,
        seller: &Seller,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        self.authorize(conversation, seller, now).await
    }

    /// Shared tail of every successful verification: link the phone,
    /// revoke any other authorized session for the seller (one active
    /// phone session, a security invariant), and flag this conversation
    /// authorized. The caller persists the conversation row.
    async fn authorize(
        &self,
        conversation: &mut Conversation,
        seller: &Seller,
        now: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        if seller.phone.as_deref() != Some(conversation.phone.as_str()) {
            self.sellers.link_phone(&seller.id, &conversation.phone).await?;
        }

        let revoked =
            self.conversations.revoke_other_sessions(&seller.id, &conversation.phone).await?;
        if revoked > 0 {
            info!(
                event_name = "agent.session.sessions_revoked",
                phone = %conversation.phone,
                revoked,
                "previous sessions revoked on verification"
            );
        }

        conversation.authorize(seller.id.clone(), now);
        Ok(())
    }

    fn wrong_email(&self, conversation: &mut Conversation) -> AuthError {
        conversation.auth_attempts += 1;
        if conversation.auth_attempts >= self.policy.max_attempts {
            conversation.auth_attempts = 0;
            AuthError::AttemptsExhausted
        } else {
            AuthError::WrongEmail {
                attempts_left: self.policy.max_attempts - conversation.auth_attempts,
            }
        }
    }
}
