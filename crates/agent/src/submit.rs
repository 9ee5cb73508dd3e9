use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use rewear_core::domain::draft::{Draft, DraftStatus, PhotoSet};
use rewear_core::domain::seller::Seller;
use rewear_core::errors::DomainError;
use rewear_core::fields::ListingFields;
use rewear_db::repositories::{DraftChanges, DraftRepository, RepositoryError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogId(pub String);

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("catalog rejected the listing: {0}")]
    Rejected(String),
    #[error("catalog is unreachable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Boundary to the catalog system. The runtime owns idempotency: it
/// calls `submit` at most once per draft unless the previous call
/// failed.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn submit(
        &self,
        fields: &ListingFields,
        photos: &PhotoSet,
    ) -> Result<CatalogId, SubmissionError>;
}

/// Stand-in catalog used until a real backend is wired: accepts every
/// complete draft and mints an id.
#[derive(Default)]
pub struct PreviewCatalogClient;

#[async_trait]
impl CatalogClient for PreviewCatalogClient {
    async fn submit(
        &self,
        fields: &ListingFields,
        _photos: &PhotoSet,
    ) -> Result<CatalogId, SubmissionError> {
        info!(
            event_name = "agent.submit.preview_accepted",
            designer = fields.designer.as_deref().unwrap_or("unknown"),
            "preview catalog accepted listing"
        );
        Ok(CatalogId(format!("cat-{}", Uuid::new_v4())))
    }
}

/// Transactional-email hook fired after a successful handoff. Failures
/// are logged, never surfaced to the seller.
#[async_trait]
pub trait EmailNotifier: Send + Sync {
    async fn listing_received(&self, seller: &Seller, draft: &Draft) -> Result<()>;
}

#[derive(Default)]
pub struct NoopEmailNotifier;

#[async_trait]
impl EmailNotifier for NoopEmailNotifier {
    async fn listing_received(&self, seller: &Seller, _draft: &Draft) -> Result<()> {
        info!(
            event_name = "agent.submit.notice_skipped",
            seller_email = %seller.email,
            "email notifications not configured"
        );
        Ok(())
    }
}

pub struct SubmissionPipeline {
    catalog: Arc<dyn CatalogClient>,
    notifier: Arc<dyn EmailNotifier>,
    drafts: Arc<dyn DraftRepository>,
    min_photos: u32,
}

impl SubmissionPipeline {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        notifier: Arc<dyn EmailNotifier>,
        drafts: Arc<dyn DraftRepository>,
        min_photos: u32,
    ) -> Self {
        Self { catalog, notifier, drafts, min_photos }
    }

    /// Hand a completed draft to the catalog. On any failure the draft
    /// row and conversation state are left untouched so the seller can
    /// simply retry; there is no partial-success state.
    pub async fn submit_draft(
        &self,
        draft: &Draft,
        seller: &Seller,
    ) -> Result<CatalogId, SubmissionError> {
        let mut submitted = draft.clone();
        submitted.mark_pending_review(self.min_photos)?;

        let catalog_id = self.catalog.submit(&submitted.fields, &submitted.photos).await?;

        // The catalog accepted; a failure recording that locally must
        // not trigger a retry loop that would submit twice.
        if let Err(persist_error) = self
            .drafts
            .update(&draft.id, DraftChanges::status(DraftStatus::PendingReview))
            .await
        {
            error!(
                event_name = "agent.submit.status_write_failed",
                catalog_id = %catalog_id.0,
                error = %persist_error,
                "catalog accepted but local status write failed; needs operator attention"
            );
        }

        if let Err(notify_error) = self.notifier.listing_received(seller, &submitted).await {
            warn!(
                event_name = "agent.submit.notice_failed",
                error = %notify_error,
                "listing-received email failed"
            );
        }

        info!(
            event_name = "agent.submit.accepted",
            catalog_id = %catalog_id.0,
            "draft handed off for review"
        );
        Ok(catalog_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;

    use rewear_core::domain::conversation::ConversationId;
    use rewear_core::domain::draft::{Draft, DraftId, DraftStatus, PhotoSet};
    use rewear_core::domain::seller::{Seller, SellerId};
    use rewear_core::fields::ListingFields;
    use rewear_db::repositories::{DraftRepository, InMemoryDraftRepository};

    use super::{
        CatalogClient, CatalogId, NoopEmailNotifier, SubmissionError, SubmissionPipeline,
    };

    struct FlakyCatalog {
        calls: AtomicU32,
        fail_first: bool,
    }

    #[async_trait]
    impl CatalogClient for FlakyCatalog {
        async fn submit(
            &self,
            _fields: &ListingFields,
            _photos: &PhotoSet,
        ) -> Result<CatalogId, SubmissionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                Err(SubmissionError::Unavailable("connection reset".to_owned()))
            } else {
                Ok(CatalogId(format!("cat-{call}")))
            }
        }
    }

    fn seller() -> Seller {
        Seller {
            id: SellerId("s-1".to_owned()),
            phone: Some("+15550100".to_owned()),
            email: "ayesha@example.com".to_owned(),
            alt_email: None,
            display_name: "Ayesha".to_owned(),
            commission_pct: Decimal::new(20, 0),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn complete_draft() -> Draft {
        let mut draft = Draft::new(
            DraftId("d-1".to_owned()),
            SellerId("s-1".to_owned()),
            ConversationId("c-1".to_owned()),
            Utc::now(),
        );
        draft.fields = ListingFields {
            designer: Some("Sana Safinaz".to_owned()),
            item_type: Some("kurta".to_owned()),
            size: Some("M".to_owned()),
            condition: Some("like new".to_owned()),
            asking_price: Some(Decimal::new(85, 0)),
            ..ListingFields::default()
        };
        draft.photos.item_photos =
            (0..3).map(|index| format!("https://cdn.example/{index}.jpg")).collect();
        draft
    }

    #[tokio::test]
    async fn failed_handoff_leaves_the_draft_open_for_retry() {
        let drafts = Arc::new(InMemoryDraftRepository::default());
        let draft = complete_draft();
        drafts.create(draft.clone()).await.expect("create draft");

        let catalog = Arc::new(FlakyCatalog { calls: AtomicU32::new(0), fail_first: true });
        let pipeline = SubmissionPipeline::new(
            catalog.clone(),
            Arc::new(NoopEmailNotifier),
            drafts.clone(),
            3,
        );

        let error = pipeline.submit_draft(&draft, &seller()).await.expect_err("first call fails");
        assert!(matches!(error, SubmissionError::Unavailable(_)));

        let stored = drafts.find_by_id(&draft.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, DraftStatus::Draft, "failure leaves the draft untouched");

        // The retry is the first call that may submit again.
        pipeline.submit_draft(&draft, &seller()).await.expect("retry succeeds");
        let stored = drafts.find_by_id(&draft.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, DraftStatus::PendingReview);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn incomplete_drafts_never_reach_the_catalog() {
        let drafts = Arc::new(InMemoryDraftRepository::default());
        let mut draft = complete_draft();
        draft.photos = PhotoSet::default();
        drafts.create(draft.clone()).await.expect("create draft");

        let catalog = Arc::new(FlakyCatalog { calls: AtomicU32::new(0), fail_first: false });
        let pipeline = SubmissionPipeline::new(
            catalog.clone(),
            Arc::new(NoopEmailNotifier),
            drafts.clone(),
            3,
        );

        let error =
            pipeline.submit_draft(&draft, &seller()).await.expect_err("photo quota unmet");
        assert!(matches!(error, SubmissionError::Domain(_)));
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0, "catalog never called");
    }
}
