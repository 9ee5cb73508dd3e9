//! SMS gateway surface
//!
//! This crate owns everything between the messaging provider and the
//! conversation runtime:
//! - **Inbound** (`inbound`) - normalized webhook payload (sender,
//!   body, media references, provider message id for dedup)
//! - **Commands** (`commands`) - the keyword lexicon: global commands,
//!   yes/no, draft-choice answers, edit targets, status phrases, email
//!   extraction
//! - **Replies** (`replies`) - every plain-text reply the runtime can
//!   send
//!
//! Parsing here is deterministic and dumb on purpose; anything that
//! needs judgment goes through the field extractor instead.

pub mod commands;
pub mod inbound;
pub mod replies;

pub use inbound::InboundSms;
pub use replies::Reply;
