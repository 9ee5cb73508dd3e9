use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use rewear_core::fields::{FieldPatch, ListingFields};
use rewear_core::retry::RetryPolicy;

use crate::llm::LlmClient;
use crate::retrying::with_retry;

/// Per-call extraction configuration. Built from config at wiring time
/// and passed in explicitly so tests can swap the instructions without
/// touching any global state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionSpec {
    pub instructions: String,
}

impl Default for ExtractionSpec {
    fn default() -> Self {
        Self {
            instructions: "You turn a seller's text message into listing fields. \
                 Respond with a single JSON object; include ONLY the keys the message \
                 actually mentions, chosen from: designer, item_type, size, condition, \
                 asking_price, details, color_material, reference_link. All values are \
                 strings. Never guess a field the message does not state."
                .to_owned(),
        }
    }
}

/// Turns free text plus the currently known fields into a partial
/// update. Implementations must be total: a collaborator failure is an
/// empty patch, never an error, so the conversation always continues.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, text: &str, known: &ListingFields) -> FieldPatch;
}

/// Extraction through the hosted model. The model is strictly a
/// translator: its output merges through `FieldPatch`, so it can never
/// erase a field it did not mention, and unparseable output degrades to
/// "nothing extracted".
pub struct LlmFieldExtractor {
    client: Arc<dyn LlmClient>,
    spec: ExtractionSpec,
    retry: RetryPolicy,
}

impl LlmFieldExtractor {
    pub fn new(client: Arc<dyn LlmClient>, spec: ExtractionSpec, retry: RetryPolicy) -> Self {
        Self { client, spec, retry }
    }

    fn prompt(&self, text: &str, known: &ListingFields) -> String {
        let known_json = serde_json::to_string(known).unwrap_or_else(|_| "{}".to_owned());
        format!(
            "{}\n\nAlready known fields (do not repeat unless corrected):\n{}\n\nSeller message:\n{}",
            self.spec.instructions, known_json, text
        )
    }
}

#[async_trait]
impl FieldExtractor for LlmFieldExtractor {
    async fn extract(&self, text: &str, known: &ListingFields) -> FieldPatch {
        let prompt = self.prompt(text, known);
        let response =
            with_retry(&self.retry, || self.client.complete(&prompt)).await;

        match response {
            Ok(raw) => match parse_patch(&raw) {
                Some(patch) => patch,
                None => {
                    warn!(
                        event_name = "agent.extractor.unparseable_response",
                        "extraction response did not contain a field object"
                    );
                    FieldPatch::default()
                }
            },
            Err(error) => {
                warn!(
                    event_name = "agent.extractor.request_failed",
                    error = %error,
                    "extraction degraded to empty patch"
                );
                FieldPatch::default()
            }
        }
    }
}

fn parse_patch(raw: &str) -> Option<FieldPatch> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str::<FieldPatch>(body).ok()
}

/// Deterministic keyword extraction used when no hosted model is
/// configured, and as the reference behavior for runtime tests. Matches
/// a fixed lexicon; anything it is not sure about stays absent.
#[derive(Clone, Debug, Default)]
pub struct KeywordFieldExtractor;

impl KeywordFieldExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_sync(&self, text: &str) -> FieldPatch {
        let normalized = normalize_text(text);
        let tokens = tokenize(&normalized);

        FieldPatch {
            designer: extract_designer(&normalized),
            item_type: extract_item_type(&normalized),
            size: extract_size(&normalized, &tokens),
            condition: extract_condition(&normalized),
            asking_price: extract_price_token(&tokens),
            details: None,
            color_material: extract_color_material(&normalized),
            reference_link: extract_link(text),
        }
    }
}

#[async_trait]
impl FieldExtractor for KeywordFieldExtractor {
    async fn extract(&self, text: &str, _known: &ListingFields) -> FieldPatch {
        self.extract_sync(text)
    }
}

const DESIGNERS: &[(&str, &str)] = &[
    ("sana safinaz", "Sana Safinaz"),
    ("maria b", "Maria B"),
    ("asim jofa", "Asim Jofa"),
    ("gul ahmed", "Gul Ahmed"),
    ("khaadi", "Khaadi"),
    ("alkaram", "Alkaram"),
    ("sapphire", "Sapphire"),
    ("limelight", "Limelight"),
    ("elan", "Elan"),
    ("agha noor", "Agha Noor"),
    ("bareeze", "Bareeze"),
    ("nishat", "Nishat"),
    ("gucci", "Gucci"),
    ("prada", "Prada"),
    ("chanel", "Chanel"),
    ("dior", "Dior"),
    ("zara", "Zara"),
];

const ITEM_TYPES: &[&str] = &[
    "shalwar kameez",
    "anarkali",
    "sherwani",
    "lehenga",
    "dupatta",
    "kurta",
    "kameez",
    "saree",
    "sari",
    "gharara",
    "abaya",
    "kaftan",
    "gown",
    "dress",
    "suit",
    "blouse",
    "skirt",
    "jacket",
    "coat",
    "sweater",
    "shirt",
    "trousers",
    "jeans",
    "scarf",
    "shawl",
    "top",
];

const CONDITIONS: &[(&str, &str)] = &[
    ("new with tags", "new with tags"),
    ("nwt", "new with tags"),
    ("brand new", "brand new"),
    ("like new", "like new"),
    ("worn once", "worn once"),
    ("gently used", "gently used"),
    ("excellent", "excellent"),
    ("very good", "very good"),
    ("good condition", "good"),
    ("fair condition", "fair"),
    ("well loved", "fair"),
];

const COLORS: &[&str] = &[
    "black", "white", "ivory", "cream", "red", "maroon", "pink", "blush", "orange", "rust",
    "yellow", "mustard", "green", "emerald", "teal", "blue", "navy", "purple", "lavender", "gold",
    "silver", "grey", "gray", "brown", "beige",
];

const MATERIALS: &[&str] = &[
    "lawn", "silk", "chiffon", "cotton", "linen", "velvet", "organza", "net", "khaddar", "denim",
    "wool", "cashmere", "leather", "satin", "georgette",
];

fn normalize_text(text: &str) -> String {
    text.to_ascii_lowercase()
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() || matches!(character, '$' | '.' | ',') {
            sanitized.push(character);
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

fn extract_designer(normalized: &str) -> Option<String> {
    DESIGNERS
        .iter()
        .find(|(pattern, _)| normalized.contains(pattern))
        .map(|(_, display)| (*display).to_owned())
}

fn extract_item_type(normalized: &str) -> Option<String> {
    // Lexicon is ordered longest-first so "shalwar kameez" wins over
    // "kameez".
    ITEM_TYPES
        .iter()
        .find(|item| contains_word(normalized, item))
        .map(|item| (*item).to_owned())
}

fn extract_size(normalized: &str, tokens: &[String]) -> Option<String> {
    for (phrase, display) in [
        ("extra small", "XS"),
        ("extra large", "XL"),
        ("small", "S"),
        ("medium", "M"),
        ("large", "L"),
    ] {
        if contains_word(normalized, phrase) {
            return Some(display.to_owned());
        }
    }

    for window in tokens.windows(2) {
        if let [label, value] = window {
            if label == "size" {
                return Some(value.to_ascii_uppercase());
            }
        }
    }

    // Bare single-letter sizes ("m", "s") are only trusted when the
    // message is essentially just the size; "it's" tokenizes to a
    // stray "s" otherwise.
    let candidates: &[&str] =
        if tokens.len() <= 2 { &["xs", "s", "m", "l", "xl", "xxl"] } else { &["xs", "xl", "xxl"] };
    tokens
        .iter()
        .find(|token| candidates.contains(&token.as_str()))
        .map(|token| token.to_ascii_uppercase())
}

fn extract_condition(normalized: &str) -> Option<String> {
    CONDITIONS
        .iter()
        .find(|(pattern, _)| normalized.contains(pattern))
        .map(|(_, display)| (*display).to_owned())
}

fn extract_price_token(tokens: &[String]) -> Option<String> {
    let price_context = ["price", "asking", "for", "at", "want"];
    let money_suffix = ["dollars", "dollar", "usd", "bucks"];

    for (index, token) in tokens.iter().enumerate() {
        if token.starts_with('$') && token.len() > 1 {
            return Some(token.clone());
        }

        let is_number = token.replace([',', '.'], "").chars().all(|ch| ch.is_ascii_digit())
            && token.chars().any(|ch| ch.is_ascii_digit());
        if !is_number {
            continue;
        }

        let preceded = index > 0 && price_context.contains(&tokens[index - 1].as_str());
        let followed =
            index + 1 < tokens.len() && money_suffix.contains(&tokens[index + 1].as_str());
        if preceded || followed {
            return Some(token.clone());
        }
    }
    None
}

fn extract_color_material(normalized: &str) -> Option<String> {
    let color = COLORS.iter().find(|color| contains_word(normalized, color));
    let material = MATERIALS.iter().find(|material| contains_word(normalized, material));

    match (color, material) {
        (Some(color), Some(material)) => Some(format!("{color} {material}")),
        (Some(color), None) => Some((*color).to_string()),
        (None, Some(material)) => Some((*material).to_string()),
        (None, None) => None,
    }
}

fn extract_link(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|token| token.starts_with("http://") || token.starts_with("https://"))
        .map(|token| token.trim_end_matches([',', '.', ')']).to_owned())
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.split(|ch: char| !ch.is_ascii_alphanumeric()).any(|word| word == needle)
        || (needle.contains(' ') && haystack.contains(needle))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use rewear_core::fields::ListingFields;
    use rewear_core::retry::RetryPolicy;

    use crate::llm::LlmClient;

    use super::{ExtractionSpec, FieldExtractor, KeywordFieldExtractor, LlmFieldExtractor};

    #[test]
    fn extracts_all_five_fields_from_a_single_message() {
        let patch = KeywordFieldExtractor::new().extract_sync("Sana Safinaz kurta medium like new $85");

        assert_eq!(patch.designer.as_deref(), Some("Sana Safinaz"));
        assert_eq!(patch.item_type.as_deref(), Some("kurta"));
        assert_eq!(patch.size.as_deref(), Some("M"));
        assert_eq!(patch.condition.as_deref(), Some("like new"));
        assert_eq!(patch.asking_price.as_deref(), Some("$85"));
    }

    #[test]
    fn partial_messages_yield_partial_patches() {
        let extractor = KeywordFieldExtractor::new();

        let patch = extractor.extract_sync("it's a Khaadi piece");
        assert_eq!(patch.designer.as_deref(), Some("Khaadi"));
        assert!(patch.item_type.is_none());
        assert!(patch.asking_price.is_none());
        assert!(patch.size.is_none(), "the stray `s` in \"it's\" is not a size");

        let patch = extractor.extract_sync("size L");
        assert_eq!(patch.size.as_deref(), Some("L"));
        assert!(patch.designer.is_none());

        let patch = extractor.extract_sync("m");
        assert_eq!(patch.size.as_deref(), Some("M"), "a bare size answer still parses");

        let patch = extractor.extract_sync("asking 120 for it");
        assert_eq!(patch.asking_price.as_deref(), Some("120"));
    }

    #[test]
    fn unrelated_chatter_extracts_nothing() {
        let patch = KeywordFieldExtractor::new().extract_sync("hi! how does this work?");
        assert!(patch.is_empty());
    }

    #[test]
    fn size_keyword_does_not_become_a_price() {
        let patch = KeywordFieldExtractor::new().extract_sync("size 8 shalwar kameez");
        assert_eq!(patch.size.as_deref(), Some("8"));
        assert_eq!(patch.item_type.as_deref(), Some("shalwar kameez"));
        assert!(patch.asking_price.is_none());
    }

    #[test]
    fn colors_materials_and_links_are_optional_extras() {
        let patch = KeywordFieldExtractor::new()
            .extract_sync("teal lawn dupatta, originally https://shop.example/item/9.");
        assert_eq!(patch.color_material.as_deref(), Some("teal lawn"));
        assert_eq!(patch.item_type.as_deref(), Some("dupatta"));
        assert_eq!(patch.reference_link.as_deref(), Some("https://shop.example/item/9"));
    }

    struct ScriptedLlm {
        response: Result<&'static str, &'static str>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.map(str::to_owned).map_err(|message| anyhow!(message))
        }
    }

    fn no_delay() -> RetryPolicy {
        RetryPolicy { max_attempts: 2, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn llm_extractor_parses_fenced_json() {
        let client = Arc::new(ScriptedLlm {
            response: Ok("```json\n{\"designer\": \"Elan\", \"size\": \"S\"}\n```"),
            calls: AtomicU32::new(0),
        });
        let extractor =
            LlmFieldExtractor::new(client, ExtractionSpec::default(), no_delay());

        let patch = extractor.extract("elan, small", &ListingFields::default()).await;
        assert_eq!(patch.designer.as_deref(), Some("Elan"));
        assert_eq!(patch.size.as_deref(), Some("S"));
    }

    #[tokio::test]
    async fn llm_failure_degrades_to_the_empty_patch() {
        let client =
            Arc::new(ScriptedLlm { response: Err("503"), calls: AtomicU32::new(0) });
        let extractor =
            LlmFieldExtractor::new(client.clone(), ExtractionSpec::default(), no_delay());

        let patch = extractor.extract("anything", &ListingFields::default()).await;
        assert!(patch.is_empty(), "failures must never surface to the flow");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2, "bounded retry ran");
    }

    #[tokio::test]
    async fn llm_garbage_output_degrades_to_the_empty_patch() {
        let client = Arc::new(ScriptedLlm {
            response: Ok("sorry, I cannot help with that"),
            calls: AtomicU32::new(0),
        });
        let extractor =
            LlmFieldExtractor::new(client, ExtractionSpec::default(), no_delay());

        let patch = extractor.extract("khaadi kurta", &ListingFields::default()).await;
        assert!(patch.is_empty());
    }
}
