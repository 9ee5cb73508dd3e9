use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use rewear_core::domain::conversation::ConversationId;
use rewear_core::domain::draft::{Draft, DraftId, DraftStatus, PhotoSet};
use rewear_core::domain::seller::SellerId;
use rewear_core::fields::ListingFields;

use super::seller::{parse_decimal, parse_timestamp};
use super::{DraftChanges, DraftRepository, RepositoryError};
use crate::DbPool;

pub struct SqlDraftRepository {
    pool: DbPool,
}

impl SqlDraftRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const DRAFT_COLUMNS: &str = "id, seller_id, conversation_id, status, designer, item_type, size, \
     condition, asking_price, details, color_material, reference_link, tag_photo, item_photos, \
     created_at, updated_at";

#[async_trait::async_trait]
impl DraftRepository for SqlDraftRepository {
    async fn create(&self, draft: Draft) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO draft (
                id, seller_id, conversation_id, status, designer, item_type, size, condition,
                asking_price, details, color_material, reference_link, tag_photo, item_photos,
                created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&draft.id.0)
        .bind(&draft.seller_id.0)
        .bind(&draft.conversation_id.0)
        .bind(draft.status.as_str())
        .bind(draft.fields.designer.as_deref())
        .bind(draft.fields.item_type.as_deref())
        .bind(draft.fields.size.as_deref())
        .bind(draft.fields.condition.as_deref())
        .bind(draft.fields.asking_price.map(|price| price.to_string()))
        .bind(draft.fields.details.as_deref())
        .bind(draft.fields.color_material.as_deref())
        .bind(draft.fields.reference_link.as_deref())
        .bind(draft.photos.tag_photo.as_deref())
        .bind(encode_item_photos(&draft.photos.item_photos)?)
        .bind(draft.created_at.to_rfc3339())
        .bind(draft.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: &DraftId) -> Result<Option<Draft>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {DRAFT_COLUMNS} FROM draft WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(draft_from_row).transpose()
    }

    async fn update(&self, id: &DraftId, changes: DraftChanges) -> Result<Draft, RepositoryError> {
        // Read-merge-write: the update never replaces columns that the
        // change set did not mention, and only lands on a still-open
        // draft; a late write for a cancelled draft reports NotFound.
        let current = self
            .find_by_id(id)
            .await?
            .filter(Draft::is_open)
            .ok_or_else(|| RepositoryError::NotFound { entity: "draft", id: id.0.clone() })?;

        let mut merged = current;
        if let Some(fields) = changes.fields {
            merged.fields = fields;
        }
        if let Some(photos) = changes.photos {
            merged.photos = photos;
        }
        if let Some(status) = changes.status {
            merged.status = status;
        }
        merged.updated_at = Utc::now();

        let result = sqlx::query(
            "UPDATE draft SET
                status = ?,
                designer = ?,
                item_type = ?,
                size = ?,
                condition = ?,
                asking_price = ?,
                details = ?,
                color_material = ?,
                reference_link = ?,
                tag_photo = ?,
                item_photos = ?,
                updated_at = ?
             WHERE id = ? AND status = 'draft'",
        )
        .bind(merged.status.as_str())
        .bind(merged.fields.designer.as_deref())
        .bind(merged.fields.item_type.as_deref())
        .bind(merged.fields.size.as_deref())
        .bind(merged.fields.condition.as_deref())
        .bind(merged.fields.asking_price.map(|price| price.to_string()))
        .bind(merged.fields.details.as_deref())
        .bind(merged.fields.color_material.as_deref())
        .bind(merged.fields.reference_link.as_deref())
        .bind(merged.photos.tag_photo.as_deref())
        .bind(encode_item_photos(&merged.photos.item_photos)?)
        .bind(merged.updated_at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "draft", id: id.0.clone() });
        }

        Ok(merged)
    }

    async fn delete(&self, id: &DraftId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE draft SET status = 'deleted' WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_open_for_seller(
        &self,
        seller_id: &SellerId,
    ) -> Result<Option<Draft>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {DRAFT_COLUMNS} FROM draft
             WHERE seller_id = ? AND status = 'draft'
             ORDER BY created_at DESC, id DESC
             LIMIT 1"
        ))
        .bind(&seller_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(draft_from_row).transpose()
    }
}

fn encode_item_photos(photos: &[String]) -> Result<String, RepositoryError> {
    serde_json::to_string(photos)
        .map_err(|error| RepositoryError::Decode(format!("item photo encode failed: {error}")))
}

fn draft_from_row(row: SqliteRow) -> Result<Draft, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = DraftStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown draft status `{status_raw}`")))?;

    let photos_raw = row.try_get::<String, _>("item_photos")?;
    let item_photos = serde_json::from_str::<Vec<String>>(&photos_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid item_photos: {error}")))?;

    let asking_price = row
        .try_get::<Option<String>, _>("asking_price")?
        .map(|raw| parse_decimal("asking_price", raw))
        .transpose()?;

    Ok(Draft {
        id: DraftId(row.try_get("id")?),
        seller_id: SellerId(row.try_get("seller_id")?),
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        status,
        fields: ListingFields {
            designer: row.try_get("designer")?,
            item_type: row.try_get("item_type")?,
            size: row.try_get("size")?,
            condition: row.try_get("condition")?,
            asking_price,
            details: row.try_get("details")?,
            color_material: row.try_get("color_material")?,
            reference_link: row.try_get("reference_link")?,
        },
        photos: PhotoSet { tag_photo: row.try_get("tag_photo")?, item_photos },
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
