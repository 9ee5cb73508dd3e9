//! Every outbound message body the runtime can produce. Templates are
//! plain text (SMS has no rich formatting) and deliberately short;
//! each prompt asks for exactly one thing.

use rewear_core::domain::draft::PhotoSet;
use rewear_core::fields::{format_price, ListingFields, RequiredField};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub body: String,
}

impl Reply {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

pub fn greeting_new() -> Reply {
    Reply::new(
        "Hi, this is Rewear — list your designer pieces over text. \
         Do you already have a seller account with us? (yes/no)",
    )
}

pub fn account_check_fallback() -> Reply {
    Reply::new("Just pick a number:\n1) I have an account\n2) I'm new here")
}

pub fn account_check_repeat() -> Reply {
    Reply::new("Sorry — do you already have a seller account with us? (yes/no)")
}

pub fn ask_existing_email() -> Reply {
    Reply::new("What's the email on your account?")
}

pub fn ask_new_email() -> Reply {
    Reply::new("Welcome! What email should we set your seller account up with?")
}

pub fn ask_reverify_email() -> Reply {
    Reply::new("For security, please re-verify: what's the email on your account?")
}

pub fn invalid_email() -> Reply {
    Reply::new("That doesn't look like an email address — try again, e.g. you@example.com.")
}

pub fn wrong_email(attempts_left: u32) -> Reply {
    Reply::new(format!(
        "That email doesn't match our records. {attempts_left} more \
         {} before we start over.",
        if attempts_left == 1 { "try" } else { "tries" }
    ))
}

pub fn attempts_exhausted() -> Reply {
    Reply::new(
        "That's three misses — let's start over. \
         Do you already have a seller account with us? (yes/no)",
    )
}

pub fn rate_limited() -> Reply {
    Reply::new("Too many attempts for now. Please wait an hour and try again.")
}

pub fn welcome(name: &str) -> Reply {
    Reply::new(format!(
        "You're verified, {name}! Text 'sell' to list an item, \
         'status' to check a listing in progress, or 'help'."
    ))
}

pub fn menu() -> Reply {
    Reply::new("Text 'sell' to list an item, 'status' for your listing in progress, or 'help'.")
}

pub fn sell_intro() -> Reply {
    Reply::new(
        "Let's list your item! Tell me about it — designer, what it is, size, \
         condition, and your asking price. One text or bit by bit, either works. \
         Who's the designer?",
    )
}

pub fn draft_choice(summary: &str) -> Reply {
    Reply::new(format!(
        "You have an unfinished listing ({summary}). \
         Continue it or start fresh? (continue/fresh)"
    ))
}

pub fn draft_choice_fallback() -> Reply {
    Reply::new("Just pick a number:\n1) Continue my draft\n2) Start fresh")
}

pub fn field_prompt(field: RequiredField) -> Reply {
    let question = match field {
        RequiredField::Designer => "Who's the designer or brand?",
        RequiredField::ItemType => "What is the item — kurta, dress, lehenga, ...?",
        RequiredField::Size => "What size is it?",
        RequiredField::Condition => "What condition is it in — like new, gently used, ...?",
        RequiredField::Price => "What's your asking price?",
    };
    Reply::new(question)
}

pub fn acknowledged_then(field: RequiredField) -> Reply {
    Reply::new(format!("Got it. {}", field_prompt(field).body))
}

pub fn didnt_understand(field: RequiredField) -> Reply {
    Reply::new(format!("Sorry, I didn't catch that. {}", field_prompt(field).body))
}

pub fn collecting_fallback(missing: &[RequiredField]) -> Reply {
    let mut lines = vec!["Let's go one at a time. Still needed:".to_owned()];
    for (index, field) in missing.iter().enumerate() {
        lines.push(format!("{}) {}", index + 1, field.label()));
    }
    lines.push("Text the next one (e.g. 'size M'), or 'help'.".to_owned());
    Reply::new(lines.join("\n"))
}

pub fn invalid_price() -> Reply {
    Reply::new("I couldn't read that as a price — try something like $85. What's your asking price?")
}

pub fn details_prompt() -> Reply {
    Reply::new(
        "Anything else buyers should know — flaws, fit, fabric, original price? \
         Or text 'skip'.",
    )
}

pub fn photos_prompt(remaining: u32) -> Reply {
    Reply::new(format!(
        "Now photos! Send at least {remaining} more — a clear shot of the \
         brand tag counts and helps buyers trust the listing."
    ))
}

pub fn photo_progress(accepted: u32, remaining: u32) -> Reply {
    if remaining == 0 {
        Reply::new(format!("{accepted} photos saved — that's enough to continue."))
    } else {
        Reply::new(format!(
            "{accepted} photo{} saved — {remaining} more to go.",
            if accepted == 1 { "" } else { "s" }
        ))
    }
}

pub fn photo_rejected(reason: &str) -> Reply {
    Reply::new(format!(
        "{reason} Please send photos of the clothing item itself."
    ))
}

pub fn photo_retryable(failed: usize) -> Reply {
    Reply::new(format!(
        "{failed} photo{} didn't come through — mind resending {}?",
        if failed == 1 { "" } else { "s" },
        if failed == 1 { "it" } else { "them" }
    ))
}

pub fn confirm_summary(fields: &ListingFields, photos: &PhotoSet) -> Reply {
    let mut lines = vec!["Here's your listing:".to_owned()];
    lines.push(format!("Designer: {}", fields.designer.as_deref().unwrap_or("—")));
    lines.push(format!("Item: {}", fields.item_type.as_deref().unwrap_or("—")));
    lines.push(format!("Size: {}", fields.size.as_deref().unwrap_or("—")));
    lines.push(format!("Condition: {}", fields.condition.as_deref().unwrap_or("—")));
    lines.push(format!(
        "Price: {}",
        fields.asking_price.map(format_price).unwrap_or_else(|| "—".to_owned())
    ));
    if let Some(details) = fields.details.as_deref() {
        lines.push(format!("Details: {details}"));
    }
    lines.push(format!("Photos: {}", photos.accepted_count()));
    lines.push(String::new());
    lines.push("Text 'confirm' to submit for review, 'edit' to change something, or 'cancel'.".to_owned());
    if fields.details.is_none() {
        lines.push("You can also text 'details' to add a short description.".to_owned());
    }
    Reply::new(lines.join("\n"))
}

pub fn confirm_fallback() -> Reply {
    Reply::new("Just pick a number:\n1) Submit for review\n2) Edit something\n3) Cancel the listing")
}

pub fn confirm_repeat() -> Reply {
    Reply::new("Text 'confirm' to submit, 'edit' to change something, or 'cancel'.")
}

pub fn updated_ack() -> Reply {
    Reply::new("Got it — updated.")
}

pub fn photos_nudge(remaining: u32) -> Reply {
    Reply::new(format!(
        "Send photos as picture messages — {remaining} more to go. \
         You can also text a correction like 'price 90'."
    ))
}

pub fn resume_prefix() -> &'static str {
    "Picking up where we left off."
}

pub fn edit_restart_details() -> Reply {
    Reply::new("Okay, let's redo the item info. Who's the designer or brand?")
}

pub fn photos_without_listing() -> Reply {
    Reply::new("Save those photos! Text 'sell' first and I'll attach them to your new listing.")
}

pub fn edit_prompt() -> Reply {
    Reply::new(
        "What would you like to change?\n1) details (re-enter everything)\n2) photos\n3) price\n\
         Or text 'back' to see the summary again.",
    )
}

pub fn submitted() -> Reply {
    Reply::new(
        "Done — your listing is submitted for review! We'll text you once it's \
         approved and live.",
    )
}

pub fn submission_failed() -> Reply {
    Reply::new(
        "We couldn't submit your listing just now — nothing was lost. \
         Text 'confirm' to try again in a moment.",
    )
}

pub fn cancelled() -> Reply {
    Reply::new("Okay, listing discarded. Text 'sell' whenever you want to start a new one.")
}

pub fn paused_to_menu() -> Reply {
    Reply::new("Your draft is saved. Text 'sell' to pick it back up, or 'help' for options.")
}

pub fn status_summary(fields: &ListingFields, photos: &PhotoSet, min_photos: u32) -> Reply {
    let mut lines = vec!["So far:".to_owned()];
    for (label, value) in [
        ("Designer", fields.designer.as_deref()),
        ("Item", fields.item_type.as_deref()),
        ("Size", fields.size.as_deref()),
        ("Condition", fields.condition.as_deref()),
    ] {
        lines.push(format!("{label}: {}", value.unwrap_or("—")));
    }
    lines.push(format!(
        "Price: {}",
        fields.asking_price.map(format_price).unwrap_or_else(|| "—".to_owned())
    ));
    lines.push(format!("Photos: {} of {min_photos}", photos.accepted_count()));

    let missing = fields.missing_required();
    if missing.is_empty() && photos.meets_quota(min_photos) {
        lines.push("Everything's in — text 'confirm' when you're ready.".to_owned());
    } else if missing.is_empty() {
        lines.push(format!("Still needed: {} more photo(s).", photos.remaining(min_photos)));
    } else {
        let names: Vec<&str> = missing.iter().map(|field| field.label()).collect();
        lines.push(format!("Still needed: {}.", names.join(", ")));
    }
    Reply::new(lines.join("\n"))
}

pub fn no_open_listing() -> Reply {
    Reply::new("You don't have a listing in progress. Text 'sell' to start one.")
}

pub fn logged_out() -> Reply {
    Reply::new("You're signed out. Text us anytime to start again.")
}

pub fn help_auth() -> Reply {
    Reply::new(
        "I can verify you by the email on your seller account, or set up a new \
         one. Answer the last question, or text 'stop' to opt out.",
    )
}

pub fn help_selling() -> Reply {
    Reply::new(
        "We're building your listing. Text item info or send photos; 'status' \
         shows what's saved, 'menu' pauses, 'cancel' discards the draft.",
    )
}

pub fn generic_error() -> Reply {
    Reply::new("Something went wrong on our side — please send that again.")
}

pub fn try_again() -> Reply {
    Reply::new("I got two messages at once and want to be careful — mind sending that again?")
}

/// One-line description used in the continue-or-fresh prompt.
pub fn draft_summary_line(fields: &ListingFields, photos: &PhotoSet) -> String {
    let mut parts = Vec::new();
    if let Some(designer) = fields.designer.as_deref() {
        parts.push(designer.to_owned());
    }
    if let Some(item_type) = fields.item_type.as_deref() {
        parts.push(item_type.to_owned());
    }
    if parts.is_empty() {
        parts.push("nothing filled in yet".to_owned());
    }
    let photo_count = photos.accepted_count();
    if photo_count > 0 {
        parts.push(format!("{photo_count} photos"));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use rewear_core::domain::draft::PhotoSet;
    use rewear_core::fields::{ListingFields, RequiredField};

    use super::{
        collecting_fallback, confirm_summary, draft_summary_line, photo_progress, status_summary,
        wrong_email,
    };

    fn complete_fields() -> ListingFields {
        ListingFields {
            designer: Some("Sana Safinaz".to_owned()),
            item_type: Some("kurta".to_owned()),
            size: Some("M".to_owned()),
            condition: Some("like new".to_owned()),
            asking_price: Some(Decimal::new(85, 0)),
            ..ListingFields::default()
        }
    }

    #[test]
    fn confirm_summary_names_all_five_fields_and_the_price() {
        let photos = PhotoSet {
            tag_photo: Some("https://cdn.example/tag.jpg".to_owned()),
            item_photos: vec![
                "https://cdn.example/1.jpg".to_owned(),
                "https://cdn.example/2.jpg".to_owned(),
            ],
        };

        let reply = confirm_summary(&complete_fields(), &photos);
        for expected in ["Sana Safinaz", "kurta", "M", "like new", "$85", "Photos: 3", "confirm"] {
            assert!(reply.body.contains(expected), "summary should mention `{expected}`");
        }
    }

    #[test]
    fn collecting_fallback_numbers_the_missing_fields() {
        let reply =
            collecting_fallback(&[RequiredField::Size, RequiredField::Condition, RequiredField::Price]);
        assert!(reply.body.contains("1) size"));
        assert!(reply.body.contains("2) condition"));
        assert!(reply.body.contains("3) asking price"));
    }

    #[test]
    fn status_summary_lists_whats_missing_without_mutating_anything() {
        let mut fields = complete_fields();
        fields.condition = None;
        let photos = PhotoSet::default();

        let reply = status_summary(&fields, &photos, 3);
        assert!(reply.body.contains("Photos: 0 of 3"));
        assert!(reply.body.contains("Still needed: condition."));
    }

    #[test]
    fn photo_progress_switches_message_at_quota() {
        assert!(photo_progress(1, 2).body.contains("2 more to go"));
        assert!(photo_progress(3, 0).body.contains("enough to continue"));
    }

    #[test]
    fn wrong_email_counts_down() {
        assert!(wrong_email(2).body.contains("2 more tries"));
        assert!(wrong_email(1).body.contains("1 more try"));
    }

    #[test]
    fn draft_summary_line_survives_an_empty_draft() {
        let line = draft_summary_line(&ListingFields::default(), &PhotoSet::default());
        assert_eq!(line, "nothing filled in yet");
    }
}
