use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use rewear_core::domain::conversation::Conversation;
use rewear_core::domain::draft::{Draft, DraftId};
use rewear_core::domain::seller::{Seller, SellerId};
use rewear_core::errors::DomainError;
use rewear_core::fields::RequiredField;
use rewear_core::flows::states::{
    ConversationState, DraftChoiceContext, PendingIntent, SellContext, StateContext,
};
use rewear_db::repositories::{
    ConversationRepository, DraftChanges, DraftRepository, RepositoryError,
};
use rewear_sms::commands::{
    self, AccountAnswer, ConfirmAnswer, DraftChoice, EditTarget, GlobalCommand,
};
use rewear_sms::inbound::InboundSms;
use rewear_sms::replies::{self, Reply};

use crate::extractor::FieldExtractor;
use crate::photos::{IntakeReport, PhotoIntake};
use crate::session::{AuthError, SessionManager};
use crate::submit::{SubmissionError, SubmissionPipeline};

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub min_photos: u32,
    pub confusion_threshold: u8,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { min_photos: 3, confusion_threshold: 3 }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// The outcome of one inbound message. `reply: None` means the gateway
/// should send nothing (duplicate delivery).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub reply: Option<Reply>,
}

/// The conversation state machine. One inbound message in; one reply,
/// one conversation-row write, and whatever draft/photo/catalog side
/// effects the transition calls for.
pub struct ConversationRuntime {
    conversations: Arc<dyn ConversationRepository>,
    drafts: Arc<dyn DraftRepository>,
    session: SessionManager,
    extractor: Arc<dyn FieldExtractor>,
    photos: PhotoIntake,
    submission: SubmissionPipeline,
    config: RuntimeConfig,
}

impl ConversationRuntime {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        drafts: Arc<dyn DraftRepository>,
        session: SessionManager,
        extractor: Arc<dyn FieldExtractor>,
        photos: PhotoIntake,
        submission: SubmissionPipeline,
        config: RuntimeConfig,
    ) -> Self {
        Self { conversations, drafts, session, extractor, photos, submission, config }
    }

    /// Total over every (state, input shape) pair. Failures degrade to a
    /// safe reply; the persisted conversation row is only ever a state
    /// the transition table accepts.
    pub async fn handle(&self, inbound: &InboundSms) -> Turn {
        match self.handle_inner(inbound).await {
            Ok(reply) => Turn { reply },
            Err(RuntimeError::Repository(RepositoryError::Conflict { .. })) => {
                Turn { reply: Some(replies::try_again()) }
            }
            Err(runtime_error) => {
                error!(
                    event_name = "agent.runtime.turn_failed",
                    phone = %inbound.from,
                    error = %runtime_error,
                    "inbound message degraded to generic reply"
                );
                Turn { reply: Some(replies::generic_error()) }
            }
        }
    }

    async fn handle_inner(&self, inbound: &InboundSms) -> Result<Option<Reply>, RuntimeError> {
        let (seller, mut conversation) = self.session.resolve(&inbound.from).await?;

        if !conversation.remember_message(&inbound.message_id) {
            info!(
                event_name = "agent.runtime.duplicate_delivery",
                phone = %inbound.from,
                message_id = %inbound.message_id,
                "replayed message id ignored"
            );
            return Ok(None);
        }

        let text = inbound.body.trim().to_owned();
        let state_in = conversation.state;

        if matches!(commands::parse_global_command(&text), Some(GlobalCommand::Logout)) {
            conversation.authorized = false;
            conversation.authorized_at = None;
            conversation.transition(ConversationState::New, StateContext::None)?;
            self.conversations.update(conversation).await?;
            return Ok(Some(replies::logged_out()));
        }

        // A revoked session caught mid-flow re-verifies before anything
        // else; the seller link survives so the draft can be resumed.
        if conversation.state.requires_auth() && !conversation.authorized {
            conversation.revoke();
            self.conversations.update(conversation).await?;
            return Ok(Some(replies::ask_reverify_email()));
        }

        use ConversationState as S;
        let reply = match conversation.state {
            S::New => self.on_new(&mut conversation, seller.as_ref(), &text).await?,
            S::AwaitingAccountCheck => self.on_account_check(&mut conversation, &text)?,
            S::AwaitingExistingEmail | S::AwaitingNewEmail | S::AwaitingEmail => {
                self.on_email_entry(&mut conversation, &text).await?
            }
            state => match seller.as_ref() {
                Some(seller) => match state {
                    S::Authorized => {
                        self.on_menu(&mut conversation, seller, inbound, &text).await?
                    }
                    S::SellStarted => self.start_sell(&mut conversation, seller).await?,
                    S::SellDraftChoice => {
                        self.on_draft_choice(&mut conversation, &text).await?
                    }
                    S::SellCollecting => {
                        self.on_collecting(&mut conversation, inbound, &text).await?
                    }
                    S::SellDetails => self.on_details(&mut conversation, inbound, &text).await?,
                    S::SellPhotos => self.on_photos(&mut conversation, inbound, &text).await?,
                    S::SellConfirming => {
                        self.on_confirming(&mut conversation, seller, inbound, &text).await?
                    }
                    S::SellEditing => self.on_editing(&mut conversation, &text).await?,
                    _ => {
                        conversation.revoke();
                        replies::ask_reverify_email()
                    }
                },
                // Authorized flag without a seller row is a data
                // anomaly; fall back to re-verification.
                None => {
                    conversation.revoke();
                    replies::ask_reverify_email()
                }
            },
        };

        info!(
            event_name = "agent.runtime.turn",
            phone = %conversation.phone,
            state_in = state_in.as_str(),
            state_out = conversation.state.as_str(),
            "inbound message handled"
        );
        self.conversations.update(conversation).await?;
        Ok(Some(reply))
    }

    async fn on_new(
        &self,
        conversation: &mut Conversation,
        seller: Option<&Seller>,
        text: &str,
    ) -> Result<Reply, RuntimeError> {
        if let Some(seller) = seller {
            // Known phone: verification is skipped entirely.
            self.session.authorize_known_phone(conversation, seller, Utc::now()).await?;
            conversation.transition(ConversationState::Authorized, StateContext::None)?;
            if commands::parse_sell_intent(text) {
                return self.start_sell(conversation, seller).await;
            }
            return Ok(replies::welcome(&seller.display_name));
        }

        let pending_intent =
            if commands::parse_sell_intent(text) { PendingIntent::Sell } else { PendingIntent::Menu };
        conversation.transition(
            ConversationState::AwaitingAccountCheck,
            StateContext::AccountCheck { pending_intent, confusion_count: 0 },
        )?;
        Ok(replies::greeting_new())
    }

    fn on_account_check(
        &self,
        conversation: &mut Conversation,
        text: &str,
    ) -> Result<Reply, RuntimeError> {
        if matches!(commands::parse_global_command(text), Some(GlobalCommand::Help)) {
            return Ok(replies::help_auth());
        }

        let (pending_intent, confusion_count) = match conversation.context {
            StateContext::AccountCheck { pending_intent, confusion_count } => {
                (pending_intent, confusion_count)
            }
            _ => (PendingIntent::Menu, 0),
        };

        match commands::parse_account_answer(text) {
            Some(AccountAnswer::HasAccount) => {
                conversation.transition(
                    ConversationState::AwaitingExistingEmail,
                    StateContext::EmailEntry { pending_intent },
                )?;
                Ok(replies::ask_existing_email())
            }
            Some(AccountAnswer::NewHere) => {
                conversation.transition(
                    ConversationState::AwaitingNewEmail,
                    StateContext::EmailEntry { pending_intent },
                )?;
                Ok(replies::ask_new_email())
            }
            None => {
                let confusion_count = confusion_count.saturating_add(1);
                conversation.context =
                    StateContext::AccountCheck { pending_intent, confusion_count };
                if confusion_count >= self.config.confusion_threshold {
                    Ok(replies::account_check_fallback())
                } else {
                    Ok(replies::account_check_repeat())
                }
            }
        }
    }

    async fn on_email_entry(
        &self,
        conversation: &mut Conversation,
        text: &str,
    ) -> Result<Reply, RuntimeError> {
        if matches!(commands::parse_global_command(text), Some(GlobalCommand::Help)) {
            return Ok(replies::help_auth());
        }

        let pending_intent = match conversation.context {
            StateContext::EmailEntry { pending_intent } => pending_intent,
            _ => PendingIntent::Menu,
        };

        if matches!(
            commands::parse_global_command(text),
            Some(GlobalCommand::Cancel | GlobalCommand::Menu)
        ) {
            conversation.transition(
                ConversationState::AwaitingAccountCheck,
                StateContext::AccountCheck { pending_intent, confusion_count: 0 },
            )?;
            return Ok(replies::account_check_repeat());
        }

        let Some(email) = commands::extract_email(text) else {
            return Ok(replies::invalid_email());
        };

        let now = Utc::now();
        let verified = match conversation.state {
            ConversationState::AwaitingExistingEmail => {
                self.session.submit_email_for_lookup(conversation, &email, now).await
            }
            ConversationState::AwaitingNewEmail => self
                .session
                .submit_email_for_new_account(conversation, &email, now)
                .await
                .map(|enrollment| enrollment.seller().clone()),
            _ => self.session.submit_email_for_reverification(conversation, &email, now).await,
        };

        match verified {
            Ok(seller) => {
                conversation.transition(ConversationState::Authorized, StateContext::None)?;
                if pending_intent == PendingIntent::Sell {
                    return self.start_sell(conversation, &seller).await;
                }
                Ok(replies::welcome(&seller.display_name))
            }
            Err(AuthError::WrongEmail { attempts_left }) => {
                Ok(replies::wrong_email(attempts_left))
            }
            Err(AuthError::AttemptsExhausted) => {
                conversation.transition(
                    ConversationState::AwaitingAccountCheck,
                    StateContext::AccountCheck { pending_intent, confusion_count: 0 },
                )?;
                Ok(replies::attempts_exhausted())
            }
            Err(AuthError::RateLimited) => Ok(replies::rate_limited()),
            Err(AuthError::Repository(repository_error)) => Err(repository_error.into()),
        }
    }

    async fn on_menu(
        &self,
        conversation: &mut Conversation,
        seller: &Seller,
        inbound: &InboundSms,
        text: &str,
    ) -> Result<Reply, RuntimeError> {
        if commands::is_status_query(text) {
            return match self.drafts.find_open_for_seller(&seller.id).await? {
                Some(draft) => {
                    Ok(replies::status_summary(&draft.fields, &draft.photos, self.config.min_photos))
                }
                None => Ok(replies::no_open_listing()),
            };
        }

        if commands::parse_sell_intent(text) {
            return self.start_sell(conversation, seller).await;
        }

        if inbound.has_media() {
            return Ok(replies::photos_without_listing());
        }

        Ok(replies::menu())
    }

    /// Entry into the sell flow. A pre-existing open draft is never
    /// silently resumed or discarded; the seller chooses.
    async fn start_sell(
        &self,
        conversation: &mut Conversation,
        seller: &Seller,
    ) -> Result<Reply, RuntimeError> {
        match self.drafts.find_open_for_seller(&seller.id).await? {
            Some(draft) => {
                conversation.transition(
                    ConversationState::SellDraftChoice,
                    StateContext::DraftChoice(DraftChoiceContext {
                        draft_id: draft.id.clone(),
                        confusion_count: 0,
                    }),
                )?;
                Ok(replies::draft_choice(&replies::draft_summary_line(
                    &draft.fields,
                    &draft.photos,
                )))
            }
            None => {
                conversation.transition(ConversationState::SellStarted, StateContext::None)?;
                let draft = self.create_draft(conversation, seller).await?;
                conversation.transition(
                    ConversationState::SellCollecting,
                    StateContext::Sell(SellContext::new(draft.id)),
                )?;
                Ok(replies::sell_intro())
            }
        }
    }

    async fn create_draft(
        &self,
        conversation: &Conversation,
        seller: &Seller,
    ) -> Result<Draft, RuntimeError> {
        let draft = Draft::new(
            DraftId(format!("draft-{}", Uuid::new_v4())),
            seller.id.clone(),
            conversation.id.clone(),
            Utc::now(),
        );
        self.drafts.create(draft.clone()).await?;
        Ok(draft)
    }

    async fn on_draft_choice(
        &self,
        conversation: &mut Conversation,
        text: &str,
    ) -> Result<Reply, RuntimeError> {
        if matches!(commands::parse_global_command(text), Some(GlobalCommand::Help)) {
            return Ok(replies::help_selling());
        }
        // Backing out keeps the old draft; nothing is discarded without
        // an explicit "fresh".
        if matches!(
            commands::parse_global_command(text),
            Some(GlobalCommand::Menu | GlobalCommand::Cancel)
        ) {
            conversation.transition(ConversationState::Authorized, StateContext::None)?;
            return Ok(replies::paused_to_menu());
        }

        let StateContext::DraftChoice(DraftChoiceContext { draft_id, confusion_count }) =
            conversation.context.clone()
        else {
            conversation.transition(ConversationState::Authorized, StateContext::None)?;
            return Ok(replies::menu());
        };

        let draft = self.drafts.find_by_id(&draft_id).await?.filter(Draft::is_open);

        if commands::is_status_query(text) {
            return Ok(match &draft {
                Some(draft) => {
                    replies::status_summary(&draft.fields, &draft.photos, self.config.min_photos)
                }
                None => replies::no_open_listing(),
            });
        }

        let Some(draft) = draft else {
            // The draft vanished underneath the choice; treat it as a
            // fresh start.
            let seller_id = draft_seller(conversation)?;
            let draft = Draft::new(
                DraftId(format!("draft-{}", Uuid::new_v4())),
                seller_id,
                conversation.id.clone(),
                Utc::now(),
            );
            self.drafts.create(draft.clone()).await?;
            conversation.transition(
                ConversationState::SellCollecting,
                StateContext::Sell(SellContext::new(draft.id)),
            )?;
            return Ok(replies::sell_intro());
        };

        match commands::parse_draft_choice(text) {
            Some(DraftChoice::Continue) => {
                let context = SellContext::new(draft.id.clone());
                let routed = self.route_forward(conversation, &draft, context)?;
                Ok(Reply::new(format!("{} {}", replies::resume_prefix(), routed.body)))
            }
            Some(DraftChoice::StartFresh) => {
                // Fresh deletes the old draft before the new one exists;
                // no orphans.
                self.drafts.delete(&draft.id).await?;
                let seller_id = draft_seller(conversation)?;
                let fresh = Draft::new(
                    DraftId(format!("draft-{}", Uuid::new_v4())),
                    seller_id,
                    conversation.id.clone(),
                    Utc::now(),
                );
                self.drafts.create(fresh.clone()).await?;
                conversation.transition(
                    ConversationState::SellCollecting,
                    StateContext::Sell(SellContext::new(fresh.id)),
                )?;
                Ok(replies::sell_intro())
            }
            None => {
                let confusion_count = confusion_count.saturating_add(1);
                conversation.context = StateContext::DraftChoice(DraftChoiceContext {
                    draft_id: draft.id.clone(),
                    confusion_count,
                });
                if confusion_count >= self.config.confusion_threshold {
                    Ok(replies::draft_choice_fallback())
                } else {
                    Ok(replies::draft_choice(&replies::draft_summary_line(
                        &draft.fields,
                        &draft.photos,
                    )))
                }
            }
        }
    }

    async fn on_collecting(
        &self,
        conversation: &mut Conversation,
        inbound: &InboundSms,
        text: &str,
    ) -> Result<Reply, RuntimeError> {
        if let Some(reply) = self.sell_state_preamble(conversation, text).await? {
            return Ok(reply);
        }

        let Some((draft, mut context)) = self.load_sell_draft(conversation).await? else {
            conversation.transition(ConversationState::Authorized, StateContext::None)?;
            return Ok(replies::no_open_listing());
        };

        let mut draft = draft;
        let mut parts: Vec<String> = Vec::new();

        // Photos always land before text is interpreted.
        if inbound.has_media() {
            let (updated, report) = self.photos.ingest(&inbound.media, draft).await?;
            draft = updated;
            parts.extend(self.photo_report_lines(&report, &draft));
        }

        let mut price_rejected = false;
        if !text.is_empty() {
            let patch = self.extractor.extract(text, &draft.fields).await;
            let mut fields = draft.fields.clone();
            let outcome = fields.merge(patch);
            price_rejected = outcome.invalid_price.is_some();

            if outcome.applied {
                draft = self.drafts.update(&draft.id, DraftChanges::fields(fields)).await?;
                context.confusion_count = 0;
            } else if !price_rejected && !inbound.has_media() {
                // Nothing extracted and nothing else to react to: count
                // it toward the numbered-menu fallback.
                context.confusion_count = context.confusion_count.saturating_add(1);
                let missing = draft.fields.missing_required();
                let over_threshold = context.confusion_count >= self.config.confusion_threshold;
                conversation.context = StateContext::Sell(context);
                return Ok(if over_threshold {
                    replies::collecting_fallback(&missing)
                } else {
                    let next = missing.first().copied().unwrap_or(RequiredField::Price);
                    replies::didnt_understand(next)
                });
            }
        }

        if price_rejected {
            // The rest of the patch merged; only the price is re-asked.
            conversation.context = StateContext::Sell(context);
            parts.push(replies::invalid_price().body);
            return Ok(join_lines(parts));
        }

        let routed = self.route_forward(conversation, &draft, context)?;
        parts.push(routed.body);
        Ok(join_lines(parts))
    }

    async fn on_details(
        &self,
        conversation: &mut Conversation,
        inbound: &InboundSms,
        text: &str,
    ) -> Result<Reply, RuntimeError> {
        if let Some(reply) = self.sell_state_preamble(conversation, text).await? {
            return Ok(reply);
        }

        let Some((draft, context)) = self.load_sell_draft(conversation).await? else {
            conversation.transition(ConversationState::Authorized, StateContext::None)?;
            return Ok(replies::no_open_listing());
        };

        let mut draft = draft;
        let mut parts: Vec<String> = Vec::new();

        if inbound.has_media() {
            let (updated, report) = self.photos.ingest(&inbound.media, draft).await?;
            draft = updated;
            parts.extend(self.photo_report_lines(&report, &draft));
        }

        if !text.is_empty() && !commands::is_skip(text) {
            // The whole message becomes the details blurb; extraction
            // still runs so corrections ("actually size S") land too.
            let patch = self.extractor.extract(text, &draft.fields).await;
            let mut fields = draft.fields.clone();
            let outcome = fields.merge(patch);
            fields.details = Some(text.to_owned());
            draft = self.drafts.update(&draft.id, DraftChanges::fields(fields)).await?;
            if outcome.invalid_price.is_some() {
                parts.push(replies::invalid_price().body);
            }
        } else if text.is_empty() && !inbound.has_media() {
            return Ok(replies::details_prompt());
        }

        let routed = self.route_forward(conversation, &draft, context)?;
        parts.push(routed.body);
        Ok(join_lines(parts))
    }

    async fn on_photos(
        &self,
        conversation: &mut Conversation,
        inbound: &InboundSms,
        text: &str,
    ) -> Result<Reply, RuntimeError> {
        if let Some(reply) = self.sell_state_preamble(conversation, text).await? {
            return Ok(reply);
        }

        let Some((draft, mut context)) = self.load_sell_draft(conversation).await? else {
            conversation.transition(ConversationState::Authorized, StateContext::None)?;
            return Ok(replies::no_open_listing());
        };

        if commands::is_details_request(text) {
            conversation
                .transition(ConversationState::SellDetails, StateContext::Sell(context))?;
            return Ok(replies::details_prompt());
        }

        let mut draft = draft;
        let mut parts: Vec<String> = Vec::new();

        if inbound.has_media() {
            let (updated, report) = self.photos.ingest(&inbound.media, draft).await?;
            draft = updated;
            parts.extend(self.photo_report_lines(&report, &draft));
            context.confusion_count = 0;
        }

        // A text correction is still honored while photos are being
        // collected.
        if !text.is_empty() {
            let patch = self.extractor.extract(text, &draft.fields).await;
            let mut fields = draft.fields.clone();
            let outcome = fields.merge(patch);
            if outcome.applied {
                draft = self.drafts.update(&draft.id, DraftChanges::fields(fields)).await?;
                parts.push(replies::updated_ack().body);
                context.confusion_count = 0;
            }
            if outcome.invalid_price.is_some() {
                parts.push(replies::invalid_price().body);
            } else if !outcome.applied && !inbound.has_media() {
                context.confusion_count = context.confusion_count.saturating_add(1);
                let remaining = draft.photos.remaining(self.config.min_photos);
                conversation.context = StateContext::Sell(context);
                return Ok(replies::photos_nudge(remaining.max(1)));
            }
        }

        if draft.fields.is_complete() && draft.photos.meets_quota(self.config.min_photos) {
            conversation
                .transition(ConversationState::SellConfirming, StateContext::Sell(context))?;
            parts.push(replies::confirm_summary(&draft.fields, &draft.photos).body);
            return Ok(join_lines(parts));
        }

        conversation.context = StateContext::Sell(context);
        if parts.is_empty() {
            let remaining = draft.photos.remaining(self.config.min_photos);
            return Ok(replies::photos_prompt(remaining.max(1)));
        }
        Ok(join_lines(parts))
    }

    async fn on_confirming(
        &self,
        conversation: &mut Conversation,
        seller: &Seller,
        inbound: &InboundSms,
        text: &str,
    ) -> Result<Reply, RuntimeError> {
        if let Some(reply) = self.sell_state_preamble(conversation, text).await? {
            return Ok(reply);
        }

        let Some((draft, mut context)) = self.load_sell_draft(conversation).await? else {
            conversation.transition(ConversationState::Authorized, StateContext::None)?;
            return Ok(replies::no_open_listing());
        };

        match commands::parse_confirm_answer(text) {
            Some(ConfirmAnswer::Submit) => {
                match self.submission.submit_draft(&draft, seller).await {
                    Ok(_) => {
                        conversation
                            .transition(ConversationState::Authorized, StateContext::None)?;
                        Ok(replies::submitted())
                    }
                    Err(SubmissionError::Repository(repository_error)) => {
                        Err(repository_error.into())
                    }
                    // Incomplete draft here means something got cleared
                    // underneath us; show what's missing instead of a
                    // dead-end error.
                    Err(SubmissionError::Domain(_)) => Ok(replies::status_summary(
                        &draft.fields,
                        &draft.photos,
                        self.config.min_photos,
                    )),
                    Err(submission_error) => {
                        info!(
                            event_name = "agent.runtime.submission_retryable",
                            error = %submission_error,
                            "catalog handoff failed; draft and state preserved"
                        );
                        Ok(replies::submission_failed())
                    }
                }
            }
            Some(ConfirmAnswer::Edit) => {
                conversation
                    .transition(ConversationState::SellEditing, StateContext::Sell(context))?;
                Ok(replies::edit_prompt())
            }
            Some(ConfirmAnswer::Cancel) => self.cancel_draft(conversation, &draft.id).await,
            None => {
                if commands::is_details_request(text) {
                    conversation
                        .transition(ConversationState::SellDetails, StateContext::Sell(context))?;
                    return Ok(replies::details_prompt());
                }

                let mut draft = draft;
                let mut parts: Vec<String> = Vec::new();

                if inbound.has_media() {
                    let (updated, report) = self.photos.ingest(&inbound.media, draft).await?;
                    draft = updated;
                    parts.extend(self.photo_report_lines(&report, &draft));
                }

                let mut corrected = false;
                if !text.is_empty() {
                    let patch = self.extractor.extract(text, &draft.fields).await;
                    let mut fields = draft.fields.clone();
                    let outcome = fields.merge(patch);
                    if outcome.applied {
                        draft =
                            self.drafts.update(&draft.id, DraftChanges::fields(fields)).await?;
                        corrected = true;
                    }
                    if outcome.invalid_price.is_some() {
                        parts.push(replies::invalid_price().body);
                    }
                }

                if corrected || inbound.has_media() {
                    context.confusion_count = 0;
                    conversation.context = StateContext::Sell(context);
                    parts.push(replies::confirm_summary(&draft.fields, &draft.photos).body);
                    return Ok(join_lines(parts));
                }

                context.confusion_count = context.confusion_count.saturating_add(1);
                let over_threshold = context.confusion_count >= self.config.confusion_threshold;
                conversation.context = StateContext::Sell(context);
                Ok(if over_threshold {
                    replies::confirm_fallback()
                } else {
                    replies::confirm_repeat()
                })
            }
        }
    }

    async fn on_editing(
        &self,
        conversation: &mut Conversation,
        text: &str,
    ) -> Result<Reply, RuntimeError> {
        if let Some(reply) = self.sell_state_preamble(conversation, text).await? {
            return Ok(reply);
        }

        let Some((draft, mut context)) = self.load_sell_draft(conversation).await? else {
            conversation.transition(ConversationState::Authorized, StateContext::None)?;
            return Ok(replies::no_open_listing());
        };

        if commands::is_back(text) {
            conversation
                .transition(ConversationState::SellConfirming, StateContext::Sell(context))?;
            return Ok(replies::confirm_summary(&draft.fields, &draft.photos));
        }

        match commands::parse_edit_target(text) {
            Some(EditTarget::Details) => {
                let mut fields = draft.fields.clone();
                fields.clear_required();
                self.drafts.update(&draft.id, DraftChanges::fields(fields)).await?;
                context.confusion_count = 0;
                conversation
                    .transition(ConversationState::SellCollecting, StateContext::Sell(context))?;
                Ok(replies::edit_restart_details())
            }
            Some(EditTarget::Photos) => {
                let mut photos = draft.photos.clone();
                photos.clear();
                self.drafts.update(&draft.id, DraftChanges::photos(photos)).await?;
                context.confusion_count = 0;
                conversation
                    .transition(ConversationState::SellPhotos, StateContext::Sell(context))?;
                Ok(replies::photos_prompt(self.config.min_photos))
            }
            Some(EditTarget::Price) => {
                let mut fields = draft.fields.clone();
                fields.clear_price();
                self.drafts.update(&draft.id, DraftChanges::fields(fields)).await?;
                context.confusion_count = 0;
                conversation
                    .transition(ConversationState::SellCollecting, StateContext::Sell(context))?;
                Ok(replies::field_prompt(RequiredField::Price))
            }
            None => {
                context.confusion_count = context.confusion_count.saturating_add(1);
                conversation.context = StateContext::Sell(context);
                Ok(replies::edit_prompt())
            }
        }
    }

    /// Shared front matter for every collection-adjacent state: status
    /// queries first (pure read, before extraction or photo handling),
    /// then the global commands. Returns `Some(reply)` when the turn is
    /// fully handled.
    async fn sell_state_preamble(
        &self,
        conversation: &mut Conversation,
        text: &str,
    ) -> Result<Option<Reply>, RuntimeError> {
        if commands::is_status_query(text) {
            let reply = match self.load_sell_draft(conversation).await? {
                Some((draft, _)) => {
                    replies::status_summary(&draft.fields, &draft.photos, self.config.min_photos)
                }
                None => replies::no_open_listing(),
            };
            return Ok(Some(reply));
        }

        match commands::parse_global_command(text) {
            Some(GlobalCommand::Help) => Ok(Some(replies::help_selling())),
            Some(GlobalCommand::Menu) => {
                conversation.transition(ConversationState::Authorized, StateContext::None)?;
                Ok(Some(replies::paused_to_menu()))
            }
            Some(GlobalCommand::Cancel) => {
                let draft_id = conversation.context.draft_id().cloned();
                let reply = match draft_id {
                    Some(draft_id) => self.cancel_draft(conversation, &draft_id).await?,
                    None => {
                        conversation
                            .transition(ConversationState::Authorized, StateContext::None)?;
                        replies::cancelled()
                    }
                };
                Ok(Some(reply))
            }
            _ => Ok(None),
        }
    }

    async fn cancel_draft(
        &self,
        conversation: &mut Conversation,
        draft_id: &DraftId,
    ) -> Result<Reply, RuntimeError> {
        self.drafts.delete(draft_id).await?;
        conversation.transition(ConversationState::Authorized, StateContext::None)?;
        info!(
            event_name = "agent.runtime.draft_cancelled",
            phone = %conversation.phone,
            draft_id = %draft_id.0,
            "draft deleted on explicit cancel"
        );
        Ok(replies::cancelled())
    }

    async fn load_sell_draft(
        &self,
        conversation: &Conversation,
    ) -> Result<Option<(Draft, SellContext)>, RuntimeError> {
        let StateContext::Sell(context) = conversation.context.clone() else {
            return Ok(None);
        };
        let draft = self.drafts.find_by_id(&context.draft_id).await?.filter(Draft::is_open);
        Ok(draft.map(|draft| (draft, context)))
    }

    /// Advance the sell flow to wherever the draft's completeness points:
    /// next missing field → photo quota → confirmation. Never offers
    /// confirmation while the photo gate or a required field is open.
    fn route_forward(
        &self,
        conversation: &mut Conversation,
        draft: &Draft,
        context: SellContext,
    ) -> Result<Reply, RuntimeError> {
        if let Some(next) = draft.fields.next_missing() {
            conversation
                .transition(ConversationState::SellCollecting, StateContext::Sell(context))?;
            return Ok(replies::acknowledged_then(next));
        }

        if !draft.photos.meets_quota(self.config.min_photos) {
            let remaining = draft.photos.remaining(self.config.min_photos);
            conversation
                .transition(ConversationState::SellPhotos, StateContext::Sell(context))?;
            return Ok(replies::photos_prompt(remaining));
        }

        conversation
            .transition(ConversationState::SellConfirming, StateContext::Sell(context))?;
        Ok(replies::confirm_summary(&draft.fields, &draft.photos))
    }

    fn photo_report_lines(&self, report: &IntakeReport, draft: &Draft) -> Vec<String> {
        let mut lines = Vec::new();
        if report.accepted > 0 {
            lines.push(
                replies::photo_progress(
                    draft.photos.accepted_count(),
                    draft.photos.remaining(self.config.min_photos),
                )
                .body,
            );
        }
        if let Some(reason) = &report.rejection {
            lines.push(replies::photo_rejected(reason).body);
        }
        if !report.failures.is_empty() {
            lines.push(replies::photo_retryable(report.failures.len()).body);
        }
        lines
    }
}

fn draft_seller(conversation: &Conversation) -> Result<SellerId, RuntimeError> {
    conversation.seller_id.clone().ok_or_else(|| {
        RuntimeError::Domain(DomainError::InvariantViolation(
            "sell flow reached without a linked seller".to_owned(),
        ))
    })
}

fn join_lines(parts: Vec<String>) -> Reply {
    Reply::new(parts.into_iter().filter(|part| !part.is_empty()).collect::<Vec<_>>().join("\n"))
}
