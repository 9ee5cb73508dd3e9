use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SellerId(pub String);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Seller {
    pub id: SellerId,
    pub phone: Option<String>,
    pub email: String,
    pub alt_email: Option<String>,
    pub display_name: String,
    pub commission_pct: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Seller {
    /// Case-insensitive match against the primary or alternate contact
    /// email.
    pub fn matches_email(&self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        self.email.eq_ignore_ascii_case(candidate)
            || self
                .alt_email
                .as_deref()
                .is_some_and(|alternate| alternate.eq_ignore_ascii_case(candidate))
    }
}
