use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use rewear_core::domain::seller::{Seller, SellerId};

use super::{RepositoryError, SellerRepository};
use crate::DbPool;

pub struct SqlSellerRepository {
    pool: DbPool,
}

impl SqlSellerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const SELLER_COLUMNS: &str =
    "id, phone, email, alt_email, display_name, commission_pct, created_at, updated_at";

#[async_trait::async_trait]
impl SellerRepository for SqlSellerRepository {
    async fn find_by_id(&self, id: &SellerId) -> Result<Option<Seller>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SELLER_COLUMNS} FROM seller WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(seller_from_row).transpose()
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Seller>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SELLER_COLUMNS} FROM seller WHERE phone = ?"))
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;

        row.map(seller_from_row).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Seller>, RepositoryError> {
        // email/alt_email are COLLATE NOCASE in the schema.
        let row = sqlx::query(&format!(
            "SELECT {SELLER_COLUMNS} FROM seller WHERE email = ? OR alt_email = ?"
        ))
        .bind(email.trim())
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(seller_from_row).transpose()
    }

    async fn create(&self, seller: Seller) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO seller (
                id, phone, email, alt_email, display_name, commission_pct, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&seller.id.0)
        .bind(seller.phone.as_deref())
        .bind(&seller.email)
        .bind(seller.alt_email.as_deref())
        .bind(&seller.display_name)
        .bind(seller.commission_pct.to_string())
        .bind(seller.created_at.to_rfc3339())
        .bind(seller.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn link_phone(&self, id: &SellerId, phone: &str) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE seller SET phone = NULL, updated_at = ? WHERE phone = ? AND id != ?")
            .bind(Utc::now().to_rfc3339())
            .bind(phone)
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;

        let updated = sqlx::query("UPDATE seller SET phone = ?, updated_at = ? WHERE id = ?")
            .bind(phone)
            .bind(Utc::now().to_rfc3339())
            .bind(&id.0)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::NotFound { entity: "seller", id: id.0.clone() });
        }

        tx.commit().await?;
        Ok(())
    }
}

fn seller_from_row(row: SqliteRow) -> Result<Seller, RepositoryError> {
    Ok(Seller {
        id: SellerId(row.try_get("id")?),
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        alt_email: row.try_get("alt_email")?,
        display_name: row.try_get("display_name")?,
        commission_pct: parse_decimal("commission_pct", row.try_get("commission_pct")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    value
        .parse::<Decimal>()
        .map_err(|error| RepositoryError::Decode(format!("invalid decimal in `{column}`: {error}")))
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;

    use rewear_core::domain::seller::{Seller, SellerId};

    use super::SqlSellerRepository;
    use crate::migrations;
    use crate::repositories::SellerRepository;
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

    fn sample_seller(id: &str, phone: Option<&str>, email: &str) -> Seller {
        Seller {
            id: SellerId(id.to_owned()),
            phone: phone.map(str::to_owned),
            email: email.to_owned(),
            alt_email: None,
            display_name: "Test Seller".to_owned(),
            commission_pct: Decimal::new(20, 0),
            created_at: parse_ts("2026-03-01T10:00:00Z"),
            updated_at: parse_ts("2026-03-01T10:00:00Z"),
        }
    }

    #[tokio::test]
    async fn seller_round_trip_by_id_phone_and_email() {
        let pool = setup_pool().await;
        let repo = SqlSellerRepository::new(pool.clone());
        let seller = sample_seller("s-1", Some("+15550100"), "ayesha@example.com");

        repo.create(seller.clone()).await.expect("create seller");

        let by_id = repo.find_by_id(&seller.id).await.expect("find by id");
        assert_eq!(by_id, Some(seller.clone()));

        let by_phone = repo.find_by_phone("+15550100").await.expect("find by phone");
        assert_eq!(by_phone, Some(seller.clone()));

        let by_email = repo.find_by_email("AYESHA@EXAMPLE.COM").await.expect("find by email");
        assert_eq!(by_email, Some(seller), "email lookup is case-insensitive");

        pool.close().await;
    }

    #[tokio::test]
    async fn email_lookup_covers_alternate_email() {
        let pool = setup_pool().await;
        let repo = SqlSellerRepository::new(pool.clone());
        let mut seller = sample_seller("s-2", None, "primary@example.com");
        seller.alt_email = Some("Shop@Example.com".to_owned());

        repo.create(seller.clone()).await.expect("create seller");

        let found = repo.find_by_email("shop@example.com").await.expect("find by alt email");
        assert_eq!(found.map(|seller| seller.id), Some(seller.id));

        pool.close().await;
    }

    #[tokio::test]
    async fn link_phone_releases_the_number_from_other_sellers() {
        let pool = setup_pool().await;
        let repo = SqlSellerRepository::new(pool.clone());
        let previous = sample_seller("s-3", Some("+15550111"), "old@example.com");
        let next = sample_seller("s-4", None, "new@example.com");

        repo.create(previous.clone()).await.expect("create previous");
        repo.create(next.clone()).await.expect("create next");

        repo.link_phone(&next.id, "+15550111").await.expect("relink phone");

        let relinked = repo.find_by_phone("+15550111").await.expect("find relinked");
        assert_eq!(relinked.map(|seller| seller.id), Some(next.id));

        let released = repo.find_by_id(&previous.id).await.expect("find previous");
        assert_eq!(released.expect("previous still exists").phone, None);

        pool.close().await;
    }
}
