use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Deterministic demo dataset: one seller with an authorized
/// conversation and a half-built draft, plus a brand-new phone that has
/// never texted in. Safe to re-run; rows are upserted by primary key.
pub struct SeedDataset;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub sellers_seeded: u32,
    pub conversations_seeded: u32,
    pub drafts_seeded: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

const SEED_TIMESTAMP: &str = "2026-03-01T10:00:00Z";

impl SeedDataset {
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        sqlx::query(
            "INSERT INTO seller (id, phone, email, alt_email, display_name, commission_pct,
                                 created_at, updated_at)
             VALUES ('seller-demo-001', '+15550100', 'ayesha@example.com', NULL,
                     'Ayesha Demo', '20', ?, ?)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(SEED_TIMESTAMP)
        .bind(SEED_TIMESTAMP)
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT INTO conversation (id, phone, state, context_json, authorized, seller_id,
                                       authorized_at, auth_attempts, attempt_window_count,
                                       recent_message_ids, version, created_at, updated_at)
             VALUES ('conv-demo-001', '+15550100', 'sell_collecting',
                     '{\"kind\":\"sell\",\"draft_id\":\"draft-demo-001\",\"confusion_count\":0}',
                     1, 'seller-demo-001', ?, 0, 0, '[]', 1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(SEED_TIMESTAMP)
        .bind(SEED_TIMESTAMP)
        .bind(SEED_TIMESTAMP)
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT INTO draft (id, seller_id, conversation_id, status, designer, item_type,
                                size, condition, asking_price, item_photos, created_at, updated_at)
             VALUES ('draft-demo-001', 'seller-demo-001', 'conv-demo-001', 'draft',
                     'Sana Safinaz', 'kurta', NULL, NULL, NULL, '[]', ?, ?)
             ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
        )
        .bind(SEED_TIMESTAMP)
        .bind(SEED_TIMESTAMP)
        .execute(pool)
        .await?;

        Ok(SeedResult { sellers_seeded: 1, conversations_seeded: 1, drafts_seeded: 1 })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        checks.push((
            "seller-demo",
            count(pool, "SELECT COUNT(*) FROM seller WHERE id = 'seller-demo-001'").await? == 1,
        ));
        checks.push((
            "conversation-demo-collecting",
            count(
                pool,
                "SELECT COUNT(*) FROM conversation
                 WHERE id = 'conv-demo-001' AND state = 'sell_collecting' AND authorized = 1",
            )
            .await?
                == 1,
        ));
        checks.push((
            "draft-demo-open",
            count(
                pool,
                "SELECT COUNT(*) FROM draft WHERE id = 'draft-demo-001' AND status = 'draft'",
            )
            .await?
                == 1,
        ));

        let all_present = checks.iter().all(|(_, passed)| *passed);
        Ok(VerificationResult { all_present, checks })
    }
}

async fn count(pool: &DbPool, query: &str) -> Result<i64, RepositoryError> {
    let value: (i64,) = sqlx::query_as(query).fetch_one(pool).await?;
    Ok(value.0)
}

#[cfg(test)]
mod tests {
    use super::SeedDataset;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_loads_and_verifies() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");

        let result = SeedDataset::load(&pool).await.expect("load seeds");
        assert_eq!(result.drafts_seeded, 1);

        let verification = SeedDataset::verify(&pool).await.expect("verify seeds");
        assert!(verification.all_present, "failed checks: {:?}", verification.checks);

        // Loading twice is a no-op, not a constraint violation.
        SeedDataset::load(&pool).await.expect("seed is idempotent");

        pool.close().await;
    }
}
