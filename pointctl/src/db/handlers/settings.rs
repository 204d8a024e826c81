use crate::errors::{Error, Result};
use sqlx::PgConnection;

pub const AUTO_REFUND_DAYS_KEY: &str = "auto_refund_days";

pub struct Settings<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Settings<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    pub async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM system_settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(value)
    }

    pub async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO system_settings (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&mut *self.db)
        .await?;
        Ok(())
    }

    /// The auto-refund grace period. The sweep refuses to run without it; a
    /// missing or garbled value must never silently default to sweeping.
    pub async fn auto_refund_days(&mut self) -> Result<i64> {
        let raw = self.get(AUTO_REFUND_DAYS_KEY).await?.ok_or(Error::ConfigMissing {
            key: AUTO_REFUND_DAYS_KEY.to_string(),
        })?;
        let days: i64 = raw.parse().map_err(|_| Error::ConfigMissing {
            key: AUTO_REFUND_DAYS_KEY.to_string(),
        })?;
        if days <= 0 {
            return Err(Error::ConfigMissing {
                key: AUTO_REFUND_DAYS_KEY.to_string(),
            });
        }
        Ok(days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_auto_refund_days_missing(pool: PgPool) {
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let result = Settings::new(&mut conn).auto_refund_days().await;
        assert!(matches!(result, Err(Error::ConfigMissing { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_auto_refund_days_round_trip(pool: PgPool) {
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut settings = Settings::new(&mut conn);
        settings.set(AUTO_REFUND_DAYS_KEY, "14").await.expect("set");
        assert_eq!(settings.auto_refund_days().await.expect("get"), 14);

        settings.set(AUTO_REFUND_DAYS_KEY, "not a number").await.expect("set");
        assert!(matches!(settings.auto_refund_days().await, Err(Error::ConfigMissing { .. })));

        settings.set(AUTO_REFUND_DAYS_KEY, "0").await.expect("set");
        assert!(matches!(settings.auto_refund_days().await, Err(Error::ConfigMissing { .. })));
    }
}
