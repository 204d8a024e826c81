//! Periodic auto-refund of expired pending reviews.
//!
//! Submissions that sit undecided past the configured grace period get their
//! held points returned. Each candidate is processed in its own transaction,
//! so one failure never blocks the rest of the batch, and the conditional
//! status transition re-validates every candidate under a row lock.

use crate::{
    config::SweepConfig,
    db::handlers::{reviews::Reviews, settings::Settings},
    errors::Result,
    types::ReviewId,
    workflow,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

/// Advisory lock key guarding the sweep across replicas ("PTSWEEP" in hex).
const SWEEP_LOCK_ID: i64 = 0x0050_5453_5745_4550_i64;

#[derive(Debug, Default, Clone, Serialize, Deserialize, ToSchema)]
pub struct SweepReport {
    /// Candidates considered
    pub processed: u64,
    /// Refunds committed
    pub refunded: u64,
    /// Candidates no longer eligible at processing time
    pub skipped: u64,
    /// Candidates whose transaction failed and rolled back
    pub failed: u64,
}

async fn refund_one(pool: &PgPool, review_id: ReviewId, cutoff: chrono::DateTime<Utc>) -> Result<bool> {
    let mut tx = pool.begin().await?;
    let refunded = workflow::refund_expired_review(&mut tx, review_id, cutoff).await?;
    tx.commit().await?;
    Ok(refunded)
}

/// One sweep pass. Reads the grace period from system settings, collects the
/// expired pending items and refunds them one transaction at a time.
pub async fn run_auto_refund_sweep(pool: &PgPool, batch_size: i64) -> Result<SweepReport> {
    let mut conn = pool.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let grace_days = Settings::new(&mut conn).auto_refund_days().await?;
    let cutoff = workflow::sweep_cutoff(Utc::now(), grace_days);
    let candidates = Reviews::new(&mut conn).list_expired_pending(cutoff, batch_size).await?;
    drop(conn);

    let mut report = SweepReport::default();
    for review_id in candidates {
        report.processed += 1;
        match refund_one(pool, review_id, cutoff).await {
            Ok(true) => report.refunded += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                error!(%review_id, "sweep refund failed: {e}");
                report.failed += 1;
            }
        }
    }

    info!(
        processed = report.processed,
        refunded = report.refunded,
        skipped = report.skipped,
        failed = report.failed,
        grace_days,
        "auto-refund sweep completed"
    );
    Ok(report)
}

/// Background sweep loop. Only one replica runs each pass: the pass is
/// guarded by a connection-scoped advisory lock, released before the
/// connection returns to the pool.
pub async fn sweep_daemon(pool: PgPool, config: SweepConfig) {
    let mut interval = tokio::time::interval(config.interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let mut conn = match pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("sweep daemon could not acquire a connection: {e}");
                continue;
            }
        };

        let got_lock = sqlx::query_scalar::<_, bool>("SELECT pg_try_advisory_lock($1)")
            .bind(SWEEP_LOCK_ID)
            .fetch_one(&mut *conn)
            .await;
        match got_lock {
            Ok(true) => {
                if let Err(e) = run_auto_refund_sweep(&pool, config.batch_size).await {
                    warn!("auto-refund sweep did not run: {e}");
                }
                if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
                    .bind(SWEEP_LOCK_ID)
                    .execute(&mut *conn)
                    .await
                {
                    error!("failed to release sweep lock: {e}");
                }
            }
            Ok(false) => {
                debug!("another replica holds the sweep lock, skipping this pass");
            }
            Err(e) => {
                error!("failed to check sweep lock: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::models::reviews::ReviewDraft,
        api::models::users::Role,
        db::handlers::{points::Ledger, settings::AUTO_REFUND_DAYS_KEY},
        db::models::reviews::PointStatus,
        errors::Error,
        test_utils::{backdate_submission, create_test_place, create_test_user, grant_points, set_setting},
    };
    use sqlx::PgPool;

    async fn submit_one(pool: &PgPool, owner: uuid::Uuid, place: uuid::Uuid) -> crate::types::ReviewId {
        let mut tx = pool.begin().await.expect("Failed to begin transaction");
        let (rows, _) = workflow::submit_reviews(
            &mut tx,
            owner,
            place,
            vec![ReviewDraft {
                content: "Lovely spot".to_string(),
                image_urls: vec![],
            }],
            true,
        )
        .await
        .expect("Failed to submit");
        tx.commit().await.expect("Failed to commit");
        rows[0].id
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_sweep_requires_grace_period_setting(pool: PgPool) {
        let result = run_auto_refund_sweep(&pool, 100).await;
        assert!(matches!(result, Err(Error::ConfigMissing { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_sweep_refunds_expired_and_spares_fresh(pool: PgPool) {
        set_setting(&pool, AUTO_REFUND_DAYS_KEY, "7").await;
        crate::test_utils::set_unit_price(&pool, 100).await;

        let owner = create_test_user(&pool, Role::Advertiser).await;
        let place = create_test_place(&pool, owner.id).await;
        grant_points(&pool, owner.id, 500).await;

        let expired = submit_one(&pool, owner.id, place).await;
        let fresh = submit_one(&pool, owner.id, place).await;
        backdate_submission(&pool, expired, 10).await;

        let report = run_auto_refund_sweep(&pool, 100).await.expect("sweep");
        assert_eq!(report.processed, 1);
        assert_eq!(report.refunded, 1);
        assert_eq!(report.failed, 0);

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut reviews = Reviews::new(&mut conn);
        let expired_row = reviews.get_by_id(expired).await.expect("get").expect("exists");
        assert_eq!(expired_row.point_status, PointStatus::Refunded);
        let fresh_row = reviews.get_by_id(fresh).await.expect("get").expect("exists");
        assert_eq!(fresh_row.point_status, PointStatus::Pending);

        // 500 granted, two submissions of 100 held, one returned
        let balance = Ledger::new(&mut conn).get_balance(owner.id).await.expect("balance");
        assert_eq!(balance.available_points, 400);
        assert_eq!(balance.pending_points, 100);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_sweep_is_idempotent(pool: PgPool) {
        set_setting(&pool, AUTO_REFUND_DAYS_KEY, "7").await;
        crate::test_utils::set_unit_price(&pool, 100).await;

        let owner = create_test_user(&pool, Role::Advertiser).await;
        let place = create_test_place(&pool, owner.id).await;
        grant_points(&pool, owner.id, 100).await;

        let review_id = submit_one(&pool, owner.id, place).await;
        backdate_submission(&pool, review_id, 10).await;

        let first = run_auto_refund_sweep(&pool, 100).await.expect("sweep");
        assert_eq!(first.refunded, 1);
        let second = run_auto_refund_sweep(&pool, 100).await.expect("sweep");
        assert_eq!(second.processed, 0);

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let balance = Ledger::new(&mut conn).get_balance(owner.id).await.expect("balance");
        // Refunded exactly once
        assert_eq!(balance.available_points, 100);
        assert_eq!(balance.pending_points, 0);
    }
}
