use sqlx::{sqlite::SqliteRow, Row};

use rewear_core::domain::conversation::{Conversation, ConversationId};
use rewear_core::domain::seller::SellerId;
use rewear_core::flows::states::{ConversationState, StateContext};

use super::seller::{parse_optional_timestamp, parse_timestamp};
use super::{ConversationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const CONVERSATION_COLUMNS: &str = "id, phone, state, context_json, authorized, seller_id, \
     authorized_at, auth_attempts, last_auth_attempt_at, attempt_window_started_at, \
     attempt_window_count, recent_message_ids, version, created_at, updated_at";

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversation WHERE phone = ?"
        ))
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        row.map(conversation_from_row).transpose()
    }

    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO conversation (
                id, phone, state, context_json, authorized, seller_id, authorized_at,
                auth_attempts, last_auth_attempt_at, attempt_window_started_at,
                attempt_window_count, recent_message_ids, version, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id.0)
        .bind(&conversation.phone)
        .bind(conversation.state.as_str())
        .bind(encode_context(&conversation.context)?)
        .bind(conversation.authorized)
        .bind(conversation.seller_id.as_ref().map(|id| id.0.as_str()))
        .bind(conversation.authorized_at.map(|value| value.to_rfc3339()))
        .bind(i64::from(conversation.auth_attempts))
        .bind(conversation.last_auth_attempt_at.map(|value| value.to_rfc3339()))
        .bind(conversation.attempt_window_started_at.map(|value| value.to_rfc3339()))
        .bind(i64::from(conversation.attempt_window_count))
        .bind(encode_message_ids(&conversation.recent_message_ids)?)
        .bind(i64::from(conversation.version))
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, conversation: Conversation) -> Result<Conversation, RepositoryError> {
        let expected_version = conversation.version;

        let result = sqlx::query(
            "UPDATE conversation SET
                state = ?,
                context_json = ?,
                authorized = ?,
                seller_id = ?,
                authorized_at = ?,
                auth_attempts = ?,
                last_auth_attempt_at = ?,
                attempt_window_started_at = ?,
                attempt_window_count = ?,
                recent_message_ids = ?,
                version = version + 1,
                updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(conversation.state.as_str())
        .bind(encode_context(&conversation.context)?)
        .bind(conversation.authorized)
        .bind(conversation.seller_id.as_ref().map(|id| id.0.as_str()))
        .bind(conversation.authorized_at.map(|value| value.to_rfc3339()))
        .bind(i64::from(conversation.auth_attempts))
        .bind(conversation.last_auth_attempt_at.map(|value| value.to_rfc3339()))
        .bind(conversation.attempt_window_started_at.map(|value| value.to_rfc3339()))
        .bind(i64::from(conversation.attempt_window_count))
        .bind(encode_message_ids(&conversation.recent_message_ids)?)
        .bind(conversation.updated_at.to_rfc3339())
        .bind(&conversation.id.0)
        .bind(i64::from(expected_version))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict {
                entity: "conversation",
                id: conversation.id.0.clone(),
            });
        }

        let mut updated = conversation;
        updated.version = expected_version + 1;
        Ok(updated)
    }

    async fn revoke_other_sessions(
        &self,
        seller_id: &SellerId,
        keep_phone: &str,
    ) -> Result<u64, RepositoryError> {
        let revoked_context = encode_context(&StateContext::None)?;

        let result = sqlx::query(
            "UPDATE conversation SET
                authorized = 0,
                authorized_at = NULL,
                state = 'awaiting_email',
                context_json = ?,
                version = version + 1
             WHERE seller_id = ? AND phone != ? AND authorized = 1",
        )
        .bind(revoked_context)
        .bind(&seller_id.0)
        .bind(keep_phone)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

fn encode_context(context: &StateContext) -> Result<String, RepositoryError> {
    serde_json::to_string(context)
        .map_err(|error| RepositoryError::Decode(format!("context encode failed: {error}")))
}

fn encode_message_ids(ids: &[String]) -> Result<String, RepositoryError> {
    serde_json::to_string(ids)
        .map_err(|error| RepositoryError::Decode(format!("message id log encode failed: {error}")))
}

fn conversation_from_row(row: SqliteRow) -> Result<Conversation, RepositoryError> {
    let state_raw = row.try_get::<String, _>("state")?;
    let state = ConversationState::parse(&state_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown conversation state `{state_raw}`"))
    })?;

    let context_raw = row.try_get::<String, _>("context_json")?;
    let context = serde_json::from_str::<StateContext>(&context_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid context_json: {error}")))?;

    let ids_raw = row.try_get::<String, _>("recent_message_ids")?;
    let recent_message_ids = serde_json::from_str::<Vec<String>>(&ids_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid recent_message_ids: {error}")))?;

    Ok(Conversation {
        id: ConversationId(row.try_get("id")?),
        phone: row.try_get("phone")?,
        state,
        context,
        authorized: row.try_get("authorized")?,
        seller_id: row.try_get::<Option<String>, _>("seller_id")?.map(SellerId),
        authorized_at: parse_optional_timestamp("authorized_at", row.try_get("authorized_at")?)?,
        auth_attempts: parse_u32("auth_attempts", row.try_get("auth_attempts")?)?,
        last_auth_attempt_at: parse_optional_timestamp(
            "last_auth_attempt_at",
            row.try_get("last_auth_attempt_at")?,
        )?,
        attempt_window_started_at: parse_optional_timestamp(
            "attempt_window_started_at",
            row.try_get("attempt_window_started_at")?,
        )?,
        attempt_window_count: parse_u32(
            "attempt_window_count",
            row.try_get("attempt_window_count")?,
        )?,
        recent_message_ids,
        version: parse_u32("version", row.try_get("version")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use rewear_core::domain::conversation::{Conversation, ConversationId};
    use rewear_core::domain::draft::DraftId;
    use rewear_core::domain::seller::SellerId;
    use rewear_core::flows::states::{ConversationState, SellContext, StateContext};

    use super::SqlConversationRepository;
    use crate::migrations;
    use crate::repositories::{ConversationRepository, RepositoryError};
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    async fn insert_seller(pool: &DbPool, id: &str, phone: &str) {
        sqlx::query(
            "INSERT INTO seller (id, phone, email, display_name, commission_pct, created_at, updated_at)
             VALUES (?, ?, ?, 'Seed Seller', '20', '2026-03-01T10:00:00Z', '2026-03-01T10:00:00Z')",
        )
        .bind(id)
        .bind(phone)
        .bind(format!("{id}@example.com"))
        .execute(pool)
        .await
        .expect("insert seller");
    }

    fn sample_conversation(phone: &str) -> Conversation {
        Conversation::new(
            ConversationId(format!("c-{phone}")),
            phone,
            parse_ts("2026-03-01T10:00:00Z"),
        )
    }

    #[tokio::test]
    async fn conversation_round_trips_with_typed_context() {
        let pool = setup_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());

        let mut conversation = sample_conversation("+15550100");
        conversation.state = ConversationState::SellCollecting;
        conversation.context = StateContext::Sell(SellContext {
            draft_id: DraftId("d-1".to_owned()),
            confusion_count: 2,
        });
        conversation.recent_message_ids = vec!["SM-1".to_owned(), "SM-2".to_owned()];

        repo.create(conversation.clone()).await.expect("create conversation");

        let found = repo.find_by_phone("+15550100").await.expect("find conversation");
        assert_eq!(found, Some(conversation));

        pool.close().await;
    }

    #[tokio::test]
    async fn update_bumps_version_and_detects_conflicts() {
        let pool = setup_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());

        let conversation = sample_conversation("+15550101");
        repo.create(conversation.clone()).await.expect("create conversation");

        let mut first_writer = conversation.clone();
        first_writer.auth_attempts = 1;
        let updated = repo.update(first_writer).await.expect("first update wins");
        assert_eq!(updated.version, 2);

        // A writer still holding the old version must not silently lose
        // its transition.
        let mut second_writer = conversation;
        second_writer.auth_attempts = 9;
        let error = repo.update(second_writer).await.expect_err("stale version conflicts");
        assert!(matches!(error, RepositoryError::Conflict { entity: "conversation", .. }));

        pool.close().await;
    }

    #[tokio::test]
    async fn revoke_other_sessions_keeps_only_the_new_phone() {
        let pool = setup_pool().await;
        let repo = SqlConversationRepository::new(pool.clone());
        insert_seller(&pool, "s-1", "+15550102").await;

        let mut phone_a = sample_conversation("+15550102");
        phone_a.state = ConversationState::Authorized;
        phone_a.authorized = true;
        phone_a.seller_id = Some(SellerId("s-1".to_owned()));
        repo.create(phone_a.clone()).await.expect("create phone A");

        let mut phone_b = sample_conversation("+15550103");
        phone_b.state = ConversationState::Authorized;
        phone_b.authorized = true;
        phone_b.seller_id = Some(SellerId("s-1".to_owned()));
        repo.create(phone_b.clone()).await.expect("create phone B");

        let revoked = repo
            .revoke_other_sessions(&SellerId("s-1".to_owned()), "+15550103")
            .await
            .expect("revoke");
        assert_eq!(revoked, 1);

        let revoked_row =
            repo.find_by_phone("+15550102").await.expect("find phone A").expect("phone A exists");
        assert!(!revoked_row.authorized);
        assert_eq!(revoked_row.state, ConversationState::AwaitingEmail);
        assert_eq!(revoked_row.context, StateContext::None);

        let kept_row =
            repo.find_by_phone("+15550103").await.expect("find phone B").expect("phone B exists");
        assert!(kept_row.authorized);

        pool.close().await;
    }
}
