pub mod states;

pub use states::{
    ConversationState, DraftChoiceContext, PendingIntent, SellContext, StateContext,
};
