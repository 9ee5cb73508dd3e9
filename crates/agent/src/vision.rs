use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::llm::LlmClient;

/// What the vision collaborator can tell us about one photo.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PhotoAnalysis {
    pub is_clothing: bool,
    #[serde(default)]
    pub has_tag: bool,
    #[serde(default)]
    pub brand_guess: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[async_trait]
pub trait PhotoClassifier: Send + Sync {
    async fn analyze(&self, photo_ref: &str) -> Result<PhotoAnalysis>;
}

/// Accepts every photo as clothing with no tag detection. Used when no
/// vision backend is configured; the photo quota still applies, only
/// the screening is skipped.
#[derive(Default)]
pub struct LenientPhotoClassifier;

#[async_trait]
impl PhotoClassifier for LenientPhotoClassifier {
    async fn analyze(&self, _photo_ref: &str) -> Result<PhotoAnalysis> {
        Ok(PhotoAnalysis { is_clothing: true, ..PhotoAnalysis::default() })
    }
}

/// Classification through the hosted model: the photo URL goes into the
/// prompt and a JSON verdict comes back.
pub struct LlmPhotoClassifier {
    client: Arc<dyn LlmClient>,
}

impl LlmPhotoClassifier {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PhotoClassifier for LlmPhotoClassifier {
    async fn analyze(&self, photo_ref: &str) -> Result<PhotoAnalysis> {
        let prompt = format!(
            "Look at the photo at {photo_ref}. Respond with a single JSON object: \
             {{\"is_clothing\": bool, \"has_tag\": bool, \"brand_guess\": string|null, \
             \"description\": string|null}}. `has_tag` means a brand or care tag is \
             clearly visible."
        );
        let raw = self.client.complete(&prompt).await?;
        parse_analysis(&raw).ok_or_else(|| anyhow!("classifier returned no JSON verdict"))
    }
}

fn parse_analysis(raw: &str) -> Option<PhotoAnalysis> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();
    serde_json::from_str::<PhotoAnalysis>(body).ok()
}
