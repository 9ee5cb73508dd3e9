use serde::{Deserialize, Serialize};

use crate::domain::draft::DraftId;
use crate::errors::DomainError;

/// The closed set of conversation states. `New` is the entry point;
/// `Authorized` doubles as the top-level menu that the sell flow returns
/// to after submit or cancel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    New,
    AwaitingAccountCheck,
    AwaitingExistingEmail,
    AwaitingNewEmail,
    AwaitingEmail,
    Authorized,
    SellStarted,
    SellDraftChoice,
    SellCollecting,
    SellDetails,
    SellPhotos,
    SellConfirming,
    SellEditing,
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::AwaitingAccountCheck => "awaiting_account_check",
            Self::AwaitingExistingEmail => "awaiting_existing_email",
            Self::AwaitingNewEmail => "awaiting_new_email",
            Self::AwaitingEmail => "awaiting_email",
            Self::Authorized => "authorized",
            Self::SellStarted => "sell_started",
            Self::SellDraftChoice => "sell_draft_choice",
            Self::SellCollecting => "sell_collecting",
            Self::SellDetails => "sell_details",
            Self::SellPhotos => "sell_photos",
            Self::SellConfirming => "sell_confirming",
            Self::SellEditing => "sell_editing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "awaiting_account_check" => Some(Self::AwaitingAccountCheck),
            "awaiting_existing_email" => Some(Self::AwaitingExistingEmail),
            "awaiting_new_email" => Some(Self::AwaitingNewEmail),
            "awaiting_email" => Some(Self::AwaitingEmail),
            "authorized" => Some(Self::Authorized),
            "sell_started" => Some(Self::SellStarted),
            "sell_draft_choice" => Some(Self::SellDraftChoice),
            "sell_collecting" => Some(Self::SellCollecting),
            "sell_details" => Some(Self::SellDetails),
            "sell_photos" => Some(Self::SellPhotos),
            "sell_confirming" => Some(Self::SellConfirming),
            "sell_editing" => Some(Self::SellEditing),
            _ => None,
        }
    }

    /// States that require an authorized session.
    pub fn requires_auth(&self) -> bool {
        matches!(
            self,
            Self::Authorized
                | Self::SellStarted
                | Self::SellDraftChoice
                | Self::SellCollecting
                | Self::SellDetails
                | Self::SellPhotos
                | Self::SellConfirming
                | Self::SellEditing
        )
    }

    /// States in which a draft is being actively built and status
    /// queries / field corrections must be honored before anything else.
    pub fn is_collection_adjacent(&self) -> bool {
        matches!(
            self,
            Self::SellCollecting
                | Self::SellDetails
                | Self::SellPhotos
                | Self::SellConfirming
                | Self::SellEditing
        )
    }

    pub fn in_sell_flow(&self) -> bool {
        matches!(
            self,
            Self::SellStarted
                | Self::SellDraftChoice
                | Self::SellCollecting
                | Self::SellDetails
                | Self::SellPhotos
                | Self::SellConfirming
                | Self::SellEditing
        )
    }

    /// The legal transition table. Staying in place is always allowed;
    /// `New` (logout) and `AwaitingEmail` (session revocation) are
    /// reachable from anywhere.
    pub fn can_transition_to(&self, next: Self) -> bool {
        use ConversationState::*;

        if *self == next || next == New || next == AwaitingEmail {
            return true;
        }

        matches!(
            (self, next),
            (New, AwaitingAccountCheck)
                | (New, Authorized)
                | (AwaitingAccountCheck, AwaitingExistingEmail)
                | (AwaitingAccountCheck, AwaitingNewEmail)
                | (AwaitingExistingEmail, Authorized)
                | (AwaitingExistingEmail, AwaitingAccountCheck)
                | (AwaitingNewEmail, Authorized)
                | (AwaitingNewEmail, AwaitingExistingEmail)
                | (AwaitingNewEmail, AwaitingAccountCheck)
                | (AwaitingEmail, Authorized)
                | (AwaitingEmail, AwaitingAccountCheck)
                | (Authorized, SellStarted)
                | (Authorized, SellDraftChoice)
                | (Authorized, SellCollecting)
                | (SellStarted, SellDraftChoice)
                | (SellStarted, SellCollecting)
                | (SellStarted, Authorized)
                | (SellDraftChoice, SellCollecting)
                | (SellDraftChoice, SellDetails)
                | (SellDraftChoice, SellPhotos)
                | (SellDraftChoice, SellConfirming)
                | (SellDraftChoice, Authorized)
                | (SellCollecting, SellDetails)
                | (SellCollecting, SellPhotos)
                | (SellCollecting, SellConfirming)
                | (SellCollecting, Authorized)
                | (SellDetails, SellPhotos)
                | (SellDetails, SellConfirming)
                | (SellDetails, Authorized)
                | (SellPhotos, SellDetails)
                | (SellPhotos, SellConfirming)
                | (SellPhotos, Authorized)
                | (SellConfirming, SellDetails)
                | (SellConfirming, SellEditing)
                | (SellConfirming, Authorized)
                | (SellEditing, SellCollecting)
                | (SellEditing, SellPhotos)
                | (SellEditing, SellConfirming)
                | (SellEditing, Authorized)
        )
    }
}

/// What the user was trying to do before authentication interrupted
/// them; replayed once the session is authorized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingIntent {
    Sell,
    Menu,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellContext {
    pub draft_id: DraftId,
    pub confusion_count: u8,
}

impl SellContext {
    pub fn new(draft_id: DraftId) -> Self {
        Self { draft_id, confusion_count: 0 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftChoiceContext {
    pub draft_id: DraftId,
    pub confusion_count: u8,
}

/// Per-state context, a tagged union selected by the state enum. Every
/// flow-boundary transition replaces the whole value, so data can never
/// leak from one flow into the next.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateContext {
    #[default]
    None,
    AccountCheck {
        pending_intent: PendingIntent,
        confusion_count: u8,
    },
    EmailEntry {
        pending_intent: PendingIntent,
    },
    DraftChoice(DraftChoiceContext),
    Sell(SellContext),
}

impl StateContext {
    /// Whether this context shape is legal for the given state.
    pub fn fits(&self, state: ConversationState) -> bool {
        use ConversationState::*;

        match self {
            Self::None => matches!(state, New | Authorized | SellStarted | AwaitingEmail),
            Self::AccountCheck { .. } => matches!(state, AwaitingAccountCheck),
            Self::EmailEntry { .. } => {
                matches!(state, AwaitingExistingEmail | AwaitingNewEmail | AwaitingEmail)
            }
            Self::DraftChoice(_) => matches!(state, SellDraftChoice),
            Self::Sell(_) => {
                matches!(state, SellCollecting | SellDetails | SellPhotos | SellConfirming | SellEditing)
            }
        }
    }

    pub fn sell(&self) -> Option<&SellContext> {
        match self {
            Self::Sell(context) => Some(context),
            _ => None,
        }
    }

    pub fn draft_id(&self) -> Option<&DraftId> {
        match self {
            Self::Sell(context) => Some(&context.draft_id),
            Self::DraftChoice(context) => Some(&context.draft_id),
            _ => None,
        }
    }
}

/// Validate a transition including the context shape for the target
/// state. The runtime never persists a pair this function rejects.
pub fn check_transition(
    from: ConversationState,
    to: ConversationState,
    context: &StateContext,
) -> Result<(), DomainError> {
    if !from.can_transition_to(to) {
        return Err(DomainError::InvalidStateTransition { from, to });
    }
    if !context.fits(to) {
        return Err(DomainError::InvariantViolation(format!(
            "context {context:?} does not fit state {to:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::domain::draft::DraftId;
    use crate::errors::DomainError;

    use super::{
        check_transition, ConversationState, PendingIntent, SellContext, StateContext,
    };

    #[test]
    fn state_names_round_trip() {
        let states = [
            ConversationState::New,
            ConversationState::AwaitingAccountCheck,
            ConversationState::AwaitingExistingEmail,
            ConversationState::AwaitingNewEmail,
            ConversationState::AwaitingEmail,
            ConversationState::Authorized,
            ConversationState::SellStarted,
            ConversationState::SellDraftChoice,
            ConversationState::SellCollecting,
            ConversationState::SellDetails,
            ConversationState::SellPhotos,
            ConversationState::SellConfirming,
            ConversationState::SellEditing,
        ];

        for state in states {
            assert_eq!(ConversationState::parse(state.as_str()), Some(state));
        }
        assert_eq!(ConversationState::parse("bogus"), None);
    }

    #[test]
    fn sell_flow_follows_the_table() {
        use ConversationState::*;

        assert!(Authorized.can_transition_to(SellDraftChoice));
        assert!(SellCollecting.can_transition_to(SellPhotos));
        assert!(SellPhotos.can_transition_to(SellConfirming));
        assert!(SellConfirming.can_transition_to(SellEditing));
        assert!(SellEditing.can_transition_to(SellCollecting));

        assert!(!SellPhotos.can_transition_to(SellCollecting));
        assert!(!New.can_transition_to(SellCollecting));
        assert!(!AwaitingAccountCheck.can_transition_to(SellConfirming));
        assert!(!SellConfirming.can_transition_to(SellCollecting));
    }

    #[test]
    fn logout_and_revocation_are_reachable_from_anywhere() {
        use ConversationState::*;

        for state in [New, AwaitingExistingEmail, Authorized, SellCollecting, SellConfirming] {
            assert!(state.can_transition_to(New));
            assert!(state.can_transition_to(AwaitingEmail));
        }
    }

    #[test]
    fn context_shapes_are_tied_to_states() {
        let sell = StateContext::Sell(SellContext::new(DraftId("d-1".to_owned())));
        assert!(sell.fits(ConversationState::SellCollecting));
        assert!(sell.fits(ConversationState::SellConfirming));
        assert!(!sell.fits(ConversationState::Authorized));
        assert!(!sell.fits(ConversationState::AwaitingAccountCheck));

        let none = StateContext::None;
        assert!(none.fits(ConversationState::Authorized));
        assert!(!none.fits(ConversationState::SellCollecting));
    }

    #[test]
    fn check_transition_rejects_stale_context_across_flow_boundary() {
        let sell = StateContext::Sell(SellContext::new(DraftId("d-1".to_owned())));
        let error = check_transition(
            ConversationState::SellConfirming,
            ConversationState::Authorized,
            &sell,
        )
        .expect_err("sell context may not follow the flow back to the menu");

        assert!(matches!(error, DomainError::InvariantViolation(_)));
        check_transition(
            ConversationState::SellConfirming,
            ConversationState::Authorized,
            &StateContext::None,
        )
        .expect("reset context is accepted");
    }

    #[test]
    fn context_serialization_is_stable() {
        let json = serde_json::to_string(&StateContext::None).expect("serialize");
        assert_eq!(json, r#"{"kind":"none"}"#);

        let account = StateContext::AccountCheck {
            pending_intent: PendingIntent::Sell,
            confusion_count: 1,
        };
        let round_tripped: StateContext =
            serde_json::from_str(&serde_json::to_string(&account).expect("serialize"))
                .expect("deserialize");
        assert_eq!(round_tripped, account);
    }
}
