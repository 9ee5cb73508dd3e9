use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::conversation::ConversationId;
use crate::domain::seller::SellerId;
use crate::errors::DomainError;
use crate::fields::ListingFields;

/// Minimum accepted photos (tag photo included) before confirmation is
/// offered.
pub const MIN_PHOTOS: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    PendingReview,
    Deleted,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::PendingReview => "pending_review",
            Self::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "pending_review" => Some(Self::PendingReview),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Draft)
    }
}

/// Photo references collected for a draft: one optional tag/label slot
/// plus an ordered item photo list. The tag photo counts toward the
/// quota.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoSet {
    pub tag_photo: Option<String>,
    pub item_photos: Vec<String>,
}

impl PhotoSet {
    pub fn accepted_count(&self) -> u32 {
        self.item_photos.len() as u32 + u32::from(self.tag_photo.is_some())
    }

    pub fn meets_quota(&self, minimum: u32) -> bool {
        self.accepted_count() >= minimum
    }

    pub fn remaining(&self, minimum: u32) -> u32 {
        minimum.saturating_sub(self.accepted_count())
    }

    pub fn clear(&mut self) {
        self.tag_photo = None;
        self.item_photos.clear();
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: DraftId,
    pub seller_id: SellerId,
    pub conversation_id: ConversationId,
    pub status: DraftStatus,
    pub fields: ListingFields,
    pub photos: PhotoSet,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Draft {
    pub fn new(
        id: DraftId,
        seller_id: SellerId,
        conversation_id: ConversationId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            seller_id,
            conversation_id,
            status: DraftStatus::Draft,
            fields: ListingFields::default(),
            photos: PhotoSet::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == DraftStatus::Draft
    }

    /// Ready for catalog handoff: every required field present and the
    /// photo quota met, in whatever order they arrived.
    pub fn ready_for_review(&self, min_photos: u32) -> bool {
        self.is_open() && self.fields.is_complete() && self.photos.meets_quota(min_photos)
    }

    /// Guarded status transition into `PendingReview`; the completion
    /// invariant can never be bypassed by a handler bug.
    pub fn mark_pending_review(&mut self, min_photos: u32) -> Result<(), DomainError> {
        if self.status != DraftStatus::Draft {
            return Err(DomainError::InvalidDraftTransition {
                from: self.status,
                to: DraftStatus::PendingReview,
            });
        }
        if !self.ready_for_review(min_photos) {
            return Err(DomainError::IncompleteDraft {
                missing: self
                    .fields
                    .missing_required()
                    .iter()
                    .map(|field| field.label().to_owned())
                    .collect(),
                photo_count: self.photos.accepted_count(),
            });
        }
        self.status = DraftStatus::PendingReview;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::conversation::ConversationId;
    use crate::domain::seller::SellerId;
    use crate::errors::DomainError;
    use crate::fields::ListingFields;

    use super::{Draft, DraftId, DraftStatus, PhotoSet, MIN_PHOTOS};

    fn draft() -> Draft {
        Draft::new(
            DraftId("d-1".to_owned()),
            SellerId("s-1".to_owned()),
            ConversationId("c-1".to_owned()),
            Utc::now(),
        )
    }

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
    fn tag_photo_counts_toward_quota() {
        let mut photos = PhotoSet::default();
        photos.tag_photo = Some("https://cdn.example/tag.jpg".to_owned());
        photos.item_photos.push("https://cdn.example/1.jpg".to_owned());
        photos.item_photos.push("https://cdn.example/2.jpg".to_owned());

        assert_eq!(photos.accepted_count(), 3);
        assert!(photos.meets_quota(MIN_PHOTOS));
        assert_eq!(photos.remaining(MIN_PHOTOS), 0);
    }

    #[test]
    fn pending_review_requires_fields_and_photos() {
        let mut draft = draft();
        draft.fields = complete_fields();

        let error = draft.mark_pending_review(MIN_PHOTOS).expect_err("photos missing");
        assert!(matches!(error, DomainError::IncompleteDraft { photo_count: 0, .. }));
        assert_eq!(draft.status, DraftStatus::Draft);

        draft.photos.item_photos =
            (0..3).map(|index| format!("https://cdn.example/{index}.jpg")).collect();
        draft.mark_pending_review(MIN_PHOTOS).expect("complete draft submits");
        assert_eq!(draft.status, DraftStatus::PendingReview);
    }

    #[test]
    fn pending_review_requires_fields_regardless_of_photo_count() {
        let mut draft = draft();
        draft.photos.item_photos =
            (0..4).map(|index| format!("https://cdn.example/{index}.jpg")).collect();

        let error = draft.mark_pending_review(MIN_PHOTOS).expect_err("fields missing");
        assert!(matches!(error, DomainError::IncompleteDraft { .. }));
    }

    #[test]
    fn terminal_drafts_cannot_be_resubmitted() {
        let mut draft = draft();
        draft.fields = complete_fields();
        draft.photos.item_photos =
            (0..3).map(|index| format!("https://cdn.example/{index}.jpg")).collect();
        draft.mark_pending_review(MIN_PHOTOS).expect("first submit");

        let error = draft.mark_pending_review(MIN_PHOTOS).expect_err("already terminal");
        assert!(matches!(error, DomainError::InvalidDraftTransition { .. }));
    }

    #[test]
    fn status_names_round_trip() {
        for status in [DraftStatus::Draft, DraftStatus::PendingReview, DraftStatus::Deleted] {
            assert_eq!(DraftStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DraftStatus::parse("archived"), None);
    }
}
