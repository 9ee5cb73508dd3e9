use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One inbound message, normalized away from any specific provider's
/// webhook shape. `message_id` is provider-assigned and drives replay
/// dedup; gateways redeliver on slow acks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundSms {
    pub message_id: String,
    pub from: String,
    pub body: String,
    pub media: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InboundParseError {
    #[error("webhook payload is missing `{0}`")]
    MissingField(&'static str),
}

impl InboundSms {
    pub fn new(message_id: impl Into<String>, from: impl Into<String>, body: impl Into<String>) -> Self {
        Self { message_id: message_id.into(), from: from.into(), body: body.into(), media: Vec::new() }
    }

    pub fn with_media(mut self, media: Vec<String>) -> Self {
        self.media = media;
        self
    }

    /// Decode the standard gateway form encoding: `MessageSid`, `From`,
    /// `Body`, `NumMedia` + `MediaUrl{N}`. Body may legitimately be
    /// empty (photo-only messages).
    pub fn from_form(form: &HashMap<String, String>) -> Result<Self, InboundParseError> {
        let message_id = required(form, "MessageSid")?;
        let from = required(form, "From")?;
        let body = form.get("Body").cloned().unwrap_or_default();

        let media_count = form
            .get("NumMedia")
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .unwrap_or(0)
            .min(25);
        let media = (0..media_count)
            .filter_map(|index| form.get(&format!("MediaUrl{index}")))
            .filter(|url| !url.trim().is_empty())
            .map(|url| url.trim().to_owned())
            .collect();

        Ok(Self { message_id, from, body, media })
    }

    pub fn has_text(&self) -> bool {
        !self.body.trim().is_empty()
    }

    pub fn has_media(&self) -> bool {
        !self.media.is_empty()
    }
}

fn required(form: &HashMap<String, String>, key: &'static str) -> Result<String, InboundParseError> {
    form.get(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .ok_or(InboundParseError::MissingField(key))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{InboundParseError, InboundSms};

    fn form(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect()
    }

    #[test]
    fn parses_text_only_payload() {
        let parsed = InboundSms::from_form(&form(&[
            ("MessageSid", "SM-100"),
            ("From", "+15550100"),
            ("Body", "hello"),
        ]))
        .expect("parse");

        assert_eq!(parsed.message_id, "SM-100");
        assert_eq!(parsed.from, "+15550100");
        assert_eq!(parsed.body, "hello");
        assert!(parsed.media.is_empty());
        assert!(parsed.has_text());
        assert!(!parsed.has_media());
    }

    #[test]
    fn parses_media_urls_up_to_num_media() {
        let parsed = InboundSms::from_form(&form(&[
            ("MessageSid", "SM-101"),
            ("From", "+15550100"),
            ("Body", ""),
            ("NumMedia", "2"),
            ("MediaUrl0", "https://media.example/a.jpg"),
            ("MediaUrl1", "https://media.example/b.jpg"),
            ("MediaUrl2", "https://media.example/ignored.jpg"),
        ]))
        .expect("parse");

        assert!(!parsed.has_text());
        assert_eq!(
            parsed.media,
            vec![
                "https://media.example/a.jpg".to_owned(),
                "https://media.example/b.jpg".to_owned()
            ]
        );
    }

    #[test]
    fn missing_sender_or_id_is_rejected() {
        let error = InboundSms::from_form(&form(&[("From", "+15550100")]))
            .expect_err("message id required");
        assert_eq!(error, InboundParseError::MissingField("MessageSid"));

        let error = InboundSms::from_form(&form(&[("MessageSid", "SM-1"), ("Body", "hi")]))
            .expect_err("sender required");
        assert_eq!(error, InboundParseError::MissingField("From"));
    }
}
