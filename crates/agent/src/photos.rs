use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use rewear_core::domain::draft::Draft;
use rewear_core::retry::RetryPolicy;
use rewear_db::repositories::{DraftChanges, DraftRepository, RepositoryError};

use crate::retrying::with_retry;
use crate::vision::PhotoClassifier;

/// Durable storage for accepted photos. `persist` must not return until
/// the photo is safe; implementations poll/retry internally through the
/// shared policy.
#[async_trait]
pub trait PhotoStore: Send + Sync {
    async fn persist(&self, photo_ref: &str) -> Result<String>;
}

/// Gateway media URLs are already hosted on the provider CDN; persisting
/// is the identity function. A real object-store copy sits behind the
/// same trait.
#[derive(Default)]
pub struct PassthroughPhotoStore;

#[async_trait]
impl PhotoStore for PassthroughPhotoStore {
    async fn persist(&self, photo_ref: &str) -> Result<String> {
        Ok(photo_ref.to_owned())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PhotoError {
    #[error("photo could not be analyzed")]
    AnalysisFailed,
    #[error("photo could not be stored")]
    StoreFailed,
}

/// One photo that should be resent; the reason is retryable by
/// definition (non-clothing rejections stop the batch instead).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhotoFailure {
    pub photo_ref: String,
    pub error: PhotoError,
}

/// Outcome of one ingest call. `failures` lists photos that should be
/// resent (retryable); `rejection` is set when a non-clothing photo
/// stopped the batch. Photos accepted before either kind of failure are
/// already persisted against the draft and stay there.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntakeReport {
    pub accepted: u32,
    pub tag_captured: bool,
    pub failures: Vec<PhotoFailure>,
    pub rejection: Option<String>,
}

pub struct PhotoIntake {
    classifier: Arc<dyn PhotoClassifier>,
    store: Arc<dyn PhotoStore>,
    drafts: Arc<dyn DraftRepository>,
    retry: RetryPolicy,
}

impl PhotoIntake {
    pub fn new(
        classifier: Arc<dyn PhotoClassifier>,
        store: Arc<dyn PhotoStore>,
        drafts: Arc<dyn DraftRepository>,
        retry: RetryPolicy,
    ) -> Self {
        Self { classifier, store, drafts, retry }
    }

    /// Run a batch of inbound photo references against the draft. Each
    /// accepted photo is persisted to the draft row before the next one
    /// is looked at, so a mid-batch failure can never take earlier
    /// successes down with it.
    pub async fn ingest(
        &self,
        photo_refs: &[String],
        mut draft: Draft,
    ) -> Result<(Draft, IntakeReport), RepositoryError> {
        let mut report = IntakeReport::default();

        for photo_ref in photo_refs {
            let analysis =
                with_retry(&self.retry, || self.classifier.analyze(photo_ref)).await;

            let analysis = match analysis {
                Ok(analysis) => analysis,
                Err(error) => {
                    warn!(
                        event_name = "agent.photos.analysis_failed",
                        photo_ref,
                        error = %error,
                        "photo kept retryable after classifier failure"
                    );
                    report.failures.push(PhotoFailure {
                        photo_ref: photo_ref.clone(),
                        error: PhotoError::AnalysisFailed,
                    });
                    continue;
                }
            };

            if !analysis.is_clothing {
                report.rejection = Some(match analysis.description {
                    Some(description) => {
                        format!("That last photo looks like {description}, not clothing.")
                    }
                    None => "That last photo doesn't look like a clothing item.".to_owned(),
                });
                break;
            }

            let stored = match with_retry(&self.retry, || self.store.persist(photo_ref)).await {
                Ok(stored) => stored,
                Err(error) => {
                    warn!(
                        event_name = "agent.photos.persist_failed",
                        photo_ref,
                        error = %error,
                        "photo kept retryable after store failure"
                    );
                    report.failures.push(PhotoFailure {
                        photo_ref: photo_ref.clone(),
                        error: PhotoError::StoreFailed,
                    });
                    continue;
                }
            };

            let mut photos = draft.photos.clone();
            if analysis.has_tag && photos.tag_photo.is_none() {
                photos.tag_photo = Some(stored);
                report.tag_captured = true;
            } else {
                photos.item_photos.push(stored);
            }

            draft = self.drafts.update(&draft.id, DraftChanges::photos(photos)).await?;
            report.accepted += 1;
        }

        Ok((draft, report))
    }
}
