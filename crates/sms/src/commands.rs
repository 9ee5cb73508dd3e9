//! Keyword lexicon: deterministic classification that runs before any
//! extraction. Matching is whole-message (trimmed, case-insensitive),
//! never substring: "help me price this" is item text, not a command.

/// Commands honored in every state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GlobalCommand {
    Help,
    Menu,
    Logout,
    Cancel,
}

pub fn parse_global_command(text: &str) -> Option<GlobalCommand> {
    if text.trim() == "?" {
        return Some(GlobalCommand::Help);
    }
    match normalize(text).as_str() {
        "help" => Some(GlobalCommand::Help),
        "menu" | "main menu" | "back to menu" => Some(GlobalCommand::Menu),
        "logout" | "log out" | "stop" | "unsubscribe" => Some(GlobalCommand::Logout),
        "cancel" | "quit" | "never mind" | "nevermind" => Some(GlobalCommand::Cancel),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountAnswer {
    HasAccount,
    NewHere,
}

pub fn parse_account_answer(text: &str) -> Option<AccountAnswer> {
    match normalize(text).as_str() {
        "yes" | "y" | "yeah" | "yep" | "i have an account" | "have one" | "1" => {
            Some(AccountAnswer::HasAccount)
        }
        "no" | "n" | "nope" | "new" | "i'm new" | "im new" | "no account" | "2" => {
            Some(AccountAnswer::NewHere)
        }
        _ => None,
    }
}

/// Answer to "continue your draft or start fresh?". Only an unambiguous
/// answer acts; anything else re-prompts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DraftChoice {
    Continue,
    StartFresh,
}

pub fn parse_draft_choice(text: &str) -> Option<DraftChoice> {
    match normalize(text).as_str() {
        "continue" | "resume" | "keep going" | "yes" | "y" | "1" => Some(DraftChoice::Continue),
        "fresh" | "start fresh" | "start over" | "restart" | "new" | "new one" | "no" | "n"
        | "2" => Some(DraftChoice::StartFresh),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfirmAnswer {
    Submit,
    Edit,
    Cancel,
}

pub fn parse_confirm_answer(text: &str) -> Option<ConfirmAnswer> {
    match normalize(text).as_str() {
        "confirm" | "yes" | "y" | "submit" | "looks good" | "lgtm" | "1" => {
            Some(ConfirmAnswer::Submit)
        }
        "edit" | "change" | "fix" | "2" => Some(ConfirmAnswer::Edit),
        "cancel" | "no" | "delete" | "3" => Some(ConfirmAnswer::Cancel),
        _ => None,
    }
}

/// Field-level reset targets offered while editing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditTarget {
    Details,
    Photos,
    Price,
}

pub fn parse_edit_target(text: &str) -> Option<EditTarget> {
    match normalize(text).as_str() {
        "details" | "detail" | "fields" | "description" | "1" => Some(EditTarget::Details),
        "photos" | "photo" | "pictures" | "pics" | "2" => Some(EditTarget::Photos),
        "price" | "cost" | "asking price" | "3" => Some(EditTarget::Price),
        _ => None,
    }
}

pub fn parse_sell_intent(text: &str) -> bool {
    matches!(
        normalize(text).as_str(),
        "sell" | "sell something" | "list" | "list an item" | "new listing" | "1"
    )
}

/// Opt-in to the free-text details step from the photo or confirmation
/// stage.
pub fn is_details_request(text: &str) -> bool {
    matches!(
        normalize(text).as_str(),
        "details" | "add details" | "description" | "add description" | "add a description" | "notes"
    )
}

/// "Skip" answers for the optional-details step.
pub fn is_skip(text: &str) -> bool {
    matches!(normalize(text).as_str(), "skip" | "no" | "none" | "nothing" | "nope" | "na" | "n/a")
}

/// "Back" from the edit menu to the confirmation summary.
pub fn is_back(text: &str) -> bool {
    matches!(normalize(text).as_str(), "back" | "summary" | "show me" | "go back")
}

/// Status phrases are a pure read and must win over extraction in every
/// collection-adjacent state.
pub fn is_status_query(text: &str) -> bool {
    let normalized = normalize(text);
    matches!(
        normalized.as_str(),
        "status"
            | "my status"
            | "show my listing"
            | "show listing"
            | "where are we"
            | "what's left"
            | "whats left"
            | "what do you have so far"
            | "what did i list so far"
            | "what have i listed so far"
            | "summary"
    )
}

/// Pull the first email-looking token out of free text. Verification
/// inputs arrive as "it's ayesha@example.com" about as often as a bare
/// address.
pub fn extract_email(text: &str) -> Option<String> {
    text.split_whitespace()
        .map(|token| token.trim_matches(|ch: char| !ch.is_ascii_alphanumeric() && ch != '@' && ch != '.' && ch != '-' && ch != '_' && ch != '+'))
        .find(|token| looks_like_email(token))
        .map(|token| token.to_ascii_lowercase())
}

fn looks_like_email(token: &str) -> bool {
    let Some((local, domain)) = token.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && tld.len() >= 2 && tld.chars().all(|ch| ch.is_ascii_alphabetic())
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(['.', '!', '?'])
        .trim()
        .to_ascii_lowercase()
}
