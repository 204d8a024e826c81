use crate::{
    db::models::pricing::PricingEntry,
    errors::{Error, Result},
};
use sqlx::PgConnection;

pub struct Pricing<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Pricing<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// The current unit price for a work type. Exactly one active entry per
    /// work type is expected; with several, the newest wins.
    pub async fn get_active_unit_price(&mut self, work_type: &str) -> Result<i64> {
        let entry = sqlx::query_as::<_, PricingEntry>(
            "SELECT id, work_type, unit_price, is_active, created_at
             FROM pricing_entries
             WHERE work_type = $1 AND is_active
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(work_type)
        .fetch_optional(&mut *self.db)
        .await?;
        match entry {
            Some(entry) => Ok(entry.unit_price),
            None => Err(Error::PricingNotConfigured {
                work_type: work_type.to_string(),
            }),
        }
    }

    /// Activate a new price for a work type, retiring any previous active
    /// entries in the same statement batch.
    pub async fn set_unit_price(&mut self, work_type: &str, unit_price: i64) -> Result<PricingEntry> {
        if unit_price < 0 {
            return Err(Error::BadRequest {
                message: "Unit price must be non-negative".to_string(),
            });
        }
        sqlx::query("UPDATE pricing_entries SET is_active = FALSE WHERE work_type = $1 AND is_active")
            .bind(work_type)
            .execute(&mut *self.db)
            .await?;
        let entry = sqlx::query_as::<_, PricingEntry>(
            "INSERT INTO pricing_entries (work_type, unit_price)
             VALUES ($1, $2)
             RETURNING id, work_type, unit_price, is_active, created_at",
        )
        .bind(work_type)
        .bind(unit_price)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(entry)
    }
}
