//! Conversation runtime - session auth, extraction, and the state machine
//!
//! This crate is the orchestrating layer between the SMS surface and the
//! persistence layer:
//! 1. **Session resolution** (`session`) - phone → seller identity, email
//!    verification, attempt + rate limits, single-session revocation
//! 2. **Field extraction** (`extractor`) - free text → `FieldPatch`,
//!    either deterministic keyword matching or a hosted model behind
//!    `LlmClient`
//! 3. **Photo intake** (`photos`) - classify, route tag/item slots,
//!    durably persist, preserve partial-batch successes
//! 4. **Dispatch** (`runtime`) - the conversation state machine: one
//!    inbound message in, one reply and a set of persisted mutations out
//! 5. **Submission** (`submit`) - completed draft → catalog handoff
//!
//! # Safety principle
//!
//! Collaborators are never trusted blindly. Extraction output merges
//! through an explicit patch type, never overwrites unmentioned fields,
//! and any collaborator failure degrades to a safe reply; the
//! conversation row is always written back in a valid state.

pub mod extractor;
pub mod llm;
pub mod photos;
pub mod retrying;
pub mod runtime;
pub mod session;
pub mod submit;
pub mod vision;
