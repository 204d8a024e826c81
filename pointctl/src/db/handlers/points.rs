use crate::{
    db::models::points::{PointBalance, PointTransaction, TransactionKind},
    errors::{Error, Result},
    types::{ReviewId, TransactionId, UserId},
};
use sqlx::PgConnection;
use tracing::trace;

/// The points ledger. Owns every mutation of the three-bucket balance row and
/// the append-only transaction log.
///
/// All mutating operations run on the caller's open transaction and take a
/// `SELECT ... FOR UPDATE` lock on the balance row, so the read-modify-write
/// and the log append commit (or roll back) as one unit, serialized per user.
pub struct Ledger<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Ledger<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Idempotently create a zeroed balance row. Called lazily on first
    /// reference to a user id.
    pub async fn ensure_initialized(&mut self, user_id: UserId) -> Result<()> {
        sqlx::query("INSERT INTO point_balances (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Read the balance row under a row lock held until the surrounding
    /// transaction commits.
    async fn lock_balance(&mut self, user_id: UserId) -> Result<PointBalance> {
        self.ensure_initialized(user_id).await?;
        let balance = sqlx::query_as::<_, PointBalance>(
            "SELECT user_id, available_points, pending_points, total_earned, total_spent, updated_at
             FROM point_balances
             WHERE user_id = $1
             FOR UPDATE",
        )
        .bind(user_id)
        .fetch_one(&mut *self.db)
        .await?;
        trace!(%user_id, available = balance.available_points, pending = balance.pending_points, "locked balance row");
        Ok(balance)
    }

    async fn write_balance(&mut self, balance: &PointBalance) -> Result<()> {
        sqlx::query(
            "UPDATE point_balances
             SET available_points = $2, pending_points = $3, total_earned = $4, total_spent = $5, updated_at = NOW()
             WHERE user_id = $1",
        )
        .bind(balance.user_id)
        .bind(balance.available_points)
        .bind(balance.pending_points)
        .bind(balance.total_earned)
        .bind(balance.total_spent)
        .execute(&mut *self.db)
        .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn append_transaction(
        &mut self,
        user_id: UserId,
        kind: TransactionKind,
        amount: i64,
        balance_before: i64,
        balance_after: i64,
        description: Option<&str>,
        review_id: Option<ReviewId>,
        actor_id: Option<UserId>,
    ) -> Result<PointTransaction> {
        let tx = sqlx::query_as::<_, PointTransaction>(
            "INSERT INTO point_transactions
                 (user_id, kind, amount, balance_before, balance_after, description, review_id, actor_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING id, user_id, kind, amount, balance_before, balance_after, description, review_id, actor_id, created_at",
        )
        .bind(user_id)
        .bind(kind)
        .bind(amount)
        .bind(balance_before)
        .bind(balance_after)
        .bind(description)
        .bind(review_id)
        .bind(actor_id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(tx)
    }

    /// Submission path: move `amount` from the available bucket into pending.
    /// Fails with `InsufficientFunds` without touching anything when the
    /// available bucket cannot cover it.
    pub async fn debit_available_credit_pending(
        &mut self,
        user_id: UserId,
        amount: i64,
        review_id: Option<ReviewId>,
        description: &str,
    ) -> Result<PointTransaction> {
        if amount <= 0 {
            return Err(Error::BadRequest {
                message: "Amount must be greater than zero".to_string(),
            });
        }
        let mut balance = self.lock_balance(user_id).await?;
        if balance.available_points < amount {
            return Err(Error::InsufficientFunds {
                required: amount,
                available: balance.available_points,
            });
        }
        let before = balance.available_points;
        balance.available_points -= amount;
        balance.pending_points += amount;
        self.write_balance(&balance).await?;
        self.append_transaction(
            user_id,
            TransactionKind::Spend,
            -amount,
            before,
            before - amount,
            Some(description),
            review_id,
            None,
        )
        .await
    }

    /// Refund path (reject, cancel, auto-refund): move `amount` back from
    /// pending into available. A pending bucket smaller than `amount` is a
    /// bug, not a user error; it aborts the transaction as an
    /// `InvariantViolation` instead of clamping.
    pub async fn credit_available_from_pending(
        &mut self,
        user_id: UserId,
        amount: i64,
        review_id: Option<ReviewId>,
        description: &str,
    ) -> Result<PointTransaction> {
        if amount <= 0 {
            return Err(Error::BadRequest {
                message: "Amount must be greater than zero".to_string(),
            });
        }
        let mut balance = self.lock_balance(user_id).await?;
        if balance.pending_points < amount {
            return Err(Error::InvariantViolation {
                message: format!(
                    "refund of {amount} would underflow pending bucket ({}) for user {user_id}",
                    balance.pending_points
                ),
            });
        }
        let before = balance.available_points;
        balance.pending_points -= amount;
        balance.available_points += amount;
        self.write_balance(&balance).await?;
        self.append_transaction(
            user_id,
            TransactionKind::Refund,
            amount,
            before,
            before + amount,
            Some(description),
            review_id,
            None,
        )
        .await
    }

    /// Approval path: the pending points are definitively spent. The log row
    /// tracks the pending bucket, which is the one this operation mutates.
    pub async fn settle_pending_as_spent(
        &mut self,
        user_id: UserId,
        amount: i64,
        review_id: Option<ReviewId>,
        description: &str,
    ) -> Result<PointTransaction> {
        if amount <= 0 {
            return Err(Error::BadRequest {
                message: "Amount must be greater than zero".to_string(),
            });
        }
        let mut balance = self.lock_balance(user_id).await?;
        if balance.pending_points < amount {
            return Err(Error::InvariantViolation {
                message: format!(
                    "settlement of {amount} would underflow pending bucket ({}) for user {user_id}",
                    balance.pending_points
                ),
            });
        }
        let before = balance.pending_points;
        balance.pending_points -= amount;
        balance.total_spent += amount;
        self.write_balance(&balance).await?;
        self.append_transaction(
            user_id,
            TransactionKind::Spend,
            -amount,
            before,
            before - amount,
            Some(description),
            review_id,
            None,
        )
        .await
    }

    /// Manual staff adjustment. `amount` is signed and must be non-zero;
    /// negative adjustments cannot overdraw the available bucket.
    pub async fn adjust(
        &mut self,
        user_id: UserId,
        amount: i64,
        description: &str,
        actor_id: UserId,
    ) -> Result<(PointTransaction, PointBalance)> {
        if amount == 0 {
            return Err(Error::BadRequest {
                message: "Amount must be non-zero".to_string(),
            });
        }
        let mut balance = self.lock_balance(user_id).await?;
        if amount < 0 && balance.available_points < -amount {
            return Err(Error::InsufficientFunds {
                required: -amount,
                available: balance.available_points,
            });
        }
        let before = balance.available_points;
        balance.available_points += amount;
        if amount > 0 {
            balance.total_earned += amount;
        }
        self.write_balance(&balance).await?;
        let kind = if amount > 0 {
            TransactionKind::AdminAdd
        } else {
            TransactionKind::AdminSubtract
        };
        let tx = self
            .append_transaction(
                user_id,
                kind,
                amount,
                before,
                before + amount,
                Some(description),
                None,
                Some(actor_id),
            )
            .await?;
        Ok((tx, balance))
    }

    /// Current balance, creating the zeroed row on first read. No lock.
    pub async fn get_balance(&mut self, user_id: UserId) -> Result<PointBalance> {
        self.ensure_initialized(user_id).await?;
        let balance = sqlx::query_as::<_, PointBalance>(
            "SELECT user_id, available_points, pending_points, total_earned, total_spent, updated_at
             FROM point_balances
             WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(balance)
    }

    pub async fn get_transaction_by_id(&mut self, transaction_id: TransactionId) -> Result<Option<PointTransaction>> {
        let tx = sqlx::query_as::<_, PointTransaction>(
            "SELECT id, user_id, kind, amount, balance_before, balance_after, description, review_id, actor_id, created_at
             FROM point_transactions
             WHERE id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(tx)
    }

    pub async fn list_user_transactions(&mut self, user_id: UserId, skip: i64, limit: i64) -> Result<Vec<PointTransaction>> {
        let txs = sqlx::query_as::<_, PointTransaction>(
            "SELECT id, user_id, kind, amount, balance_before, balance_after, description, review_id, actor_id, created_at
             FROM point_transactions
             WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             OFFSET $2 LIMIT $3",
        )
        .bind(user_id)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(txs)
    }

    pub async fn list_all_transactions(&mut self, skip: i64, limit: i64) -> Result<Vec<PointTransaction>> {
        let txs = sqlx::query_as::<_, PointTransaction>(
            "SELECT id, user_id, kind, amount, balance_before, balance_after, description, review_id, actor_id, created_at
             FROM point_transactions
             ORDER BY created_at DESC, id DESC
             OFFSET $1 LIMIT $2",
        )
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(txs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use sqlx::PgPool;
    use uuid::Uuid;

    async fn create_test_user(pool: &PgPool) -> UserId {
        let user_id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, username, role) VALUES ($1, $2, $3)")
            .bind(user_id)
            .bind(format!("testuser_{}", user_id.simple()))
            .bind(Role::Advertiser)
            .execute(pool)
            .await
            .expect("Failed to create test user");
        user_id
    }

    async fn grant(pool: &PgPool, user_id: UserId, amount: i64) {
        let actor = create_test_user(pool).await;
        let mut tx = pool.begin().await.expect("Failed to begin transaction");
        Ledger::new(&mut tx)
            .adjust(user_id, amount, "test grant", actor)
            .await
            .expect("Failed to grant points");
        tx.commit().await.expect("Failed to commit");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_balance_starts_zeroed(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let balance = Ledger::new(&mut conn).get_balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.available_points, 0);
        assert_eq!(balance.pending_points, 0);
        assert_eq!(balance.total_earned, 0);
        assert_eq!(balance.total_spent, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_debit_moves_available_to_pending(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        grant(&pool, user_id, 500).await;

        let mut tx = pool.begin().await.expect("Failed to begin transaction");
        let mut ledger = Ledger::new(&mut tx);
        let record = ledger
            .debit_available_credit_pending(user_id, 150, None, "review submission")
            .await
            .expect("Failed to debit");
        tx.commit().await.expect("Failed to commit");

        assert_eq!(record.kind, TransactionKind::Spend);
        assert_eq!(record.amount, -150);
        assert_eq!(record.balance_before, 500);
        assert_eq!(record.balance_after, 350);

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let balance = Ledger::new(&mut conn).get_balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.available_points, 350);
        assert_eq!(balance.pending_points, 150);
        // Conservation: available + pending unchanged
        assert_eq!(balance.available_points + balance.pending_points, 500);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_debit_insufficient_funds(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        grant(&pool, user_id, 40).await;

        let mut tx = pool.begin().await.expect("Failed to begin transaction");
        let result = Ledger::new(&mut tx)
            .debit_available_credit_pending(user_id, 100, None, "over-debit")
            .await;
        match result {
            Err(Error::InsufficientFunds { required, available }) => {
                assert_eq!(required, 100);
                assert_eq!(available, 40);
            }
            other => panic!("Expected InsufficientFunds, got {other:?}"),
        }
        tx.rollback().await.expect("Failed to rollback");

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let balance = Ledger::new(&mut conn).get_balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.available_points, 40);
        assert_eq!(balance.pending_points, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refund_restores_available(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        grant(&pool, user_id, 200).await;

        let mut tx = pool.begin().await.expect("Failed to begin transaction");
        let mut ledger = Ledger::new(&mut tx);
        ledger
            .debit_available_credit_pending(user_id, 80, None, "submission")
            .await
            .expect("Failed to debit");
        let refund = ledger
            .credit_available_from_pending(user_id, 80, None, "cancelled")
            .await
            .expect("Failed to refund");
        tx.commit().await.expect("Failed to commit");

        assert_eq!(refund.kind, TransactionKind::Refund);
        assert_eq!(refund.amount, 80);
        assert_eq!(refund.balance_before, 120);
        assert_eq!(refund.balance_after, 200);

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let balance = Ledger::new(&mut conn).get_balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.available_points, 200);
        assert_eq!(balance.pending_points, 0);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refund_underflow_is_invariant_violation(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        grant(&pool, user_id, 100).await;

        let mut tx = pool.begin().await.expect("Failed to begin transaction");
        let result = Ledger::new(&mut tx)
            .credit_available_from_pending(user_id, 50, None, "bogus refund")
            .await;
        assert!(
            matches!(result, Err(Error::InvariantViolation { .. })),
            "pending underflow must abort, got {result:?}"
        );
        tx.rollback().await.expect("Failed to rollback");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_settle_moves_pending_to_spent(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        grant(&pool, user_id, 300).await;

        let mut tx = pool.begin().await.expect("Failed to begin transaction");
        let mut ledger = Ledger::new(&mut tx);
        ledger
            .debit_available_credit_pending(user_id, 100, None, "submission")
            .await
            .expect("Failed to debit");
        let settle = ledger
            .settle_pending_as_spent(user_id, 100, None, "approved")
            .await
            .expect("Failed to settle");
        tx.commit().await.expect("Failed to commit");

        // The settlement row tracks the pending bucket
        assert_eq!(settle.balance_before, 100);
        assert_eq!(settle.balance_after, 0);
        assert_eq!(settle.amount, -100);

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let balance = Ledger::new(&mut conn).get_balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.available_points, 200);
        assert_eq!(balance.pending_points, 0);
        assert_eq!(balance.total_spent, 100);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_adjust_zero_rejected(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        let actor = create_test_user(&pool).await;
        let mut tx = pool.begin().await.expect("Failed to begin transaction");
        let result = Ledger::new(&mut tx).adjust(user_id, 0, "noop", actor).await;
        assert!(matches!(result, Err(Error::BadRequest { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_adjust_negative_cannot_overdraw(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        let actor = create_test_user(&pool).await;
        grant(&pool, user_id, 30).await;

        let mut tx = pool.begin().await.expect("Failed to begin transaction");
        let result = Ledger::new(&mut tx).adjust(user_id, -50, "claw back", actor).await;
        assert!(matches!(result, Err(Error::InsufficientFunds { .. })));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_adjust_classifies_by_sign(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        let actor = create_test_user(&pool).await;

        let mut tx = pool.begin().await.expect("Failed to begin transaction");
        let (add, _) = Ledger::new(&mut tx)
            .adjust(user_id, 100, "grant", actor)
            .await
            .expect("Failed to add");
        tx.commit().await.expect("Failed to commit");
        assert_eq!(add.kind, TransactionKind::AdminAdd);
        assert_eq!(add.actor_id, Some(actor));

        let mut tx = pool.begin().await.expect("Failed to begin transaction");
        let (sub, balance) = Ledger::new(&mut tx)
            .adjust(user_id, -25, "correction", actor)
            .await
            .expect("Failed to subtract");
        tx.commit().await.expect("Failed to commit");
        assert_eq!(sub.kind, TransactionKind::AdminSubtract);
        assert_eq!(balance.available_points, 75);
        assert_eq!(balance.total_earned, 100);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_every_transaction_row_balances(pool: PgPool) {
        let user_id = create_test_user(&pool).await;
        grant(&pool, user_id, 1000).await;

        let mut tx = pool.begin().await.expect("Failed to begin transaction");
        let mut ledger = Ledger::new(&mut tx);
        ledger
            .debit_available_credit_pending(user_id, 300, None, "submission")
            .await
            .expect("debit");
        ledger
            .settle_pending_as_spent(user_id, 100, None, "approved")
            .await
            .expect("settle");
        ledger
            .credit_available_from_pending(user_id, 200, None, "rejected")
            .await
            .expect("refund");
        tx.commit().await.expect("Failed to commit");

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let mut ledger = Ledger::new(&mut conn);
        let txs = ledger.list_user_transactions(user_id, 0, 100).await.expect("Failed to list");
        assert_eq!(txs.len(), 4);
        for row in &txs {
            assert_eq!(
                row.balance_after,
                row.balance_before + row.amount,
                "transaction {} violates balance_after == balance_before + amount",
                row.id
            );
        }

        let balance = ledger.get_balance(user_id).await.expect("Failed to get balance");
        assert!(balance.available_points >= 0);
        assert!(balance.pending_points >= 0);
        assert_eq!(balance.available_points, 900);
        assert_eq!(balance.pending_points, 0);
        assert_eq!(balance.total_spent, 100);
    }

    /// Two concurrent submissions for a user with available=100 at price 60:
    /// exactly one must win the row lock and debit to 40, the other must
    /// observe 40 < 60 and fail with InsufficientFunds.
    #[sqlx::test]
    #[test_log::test]
    async fn test_concurrent_debits_no_lost_update(pool: PgPool) {
        use std::sync::Arc;
        use tokio::task;

        let user_id = create_test_user(&pool).await;
        grant(&pool, user_id, 100).await;

        let pool = Arc::new(pool);
        let mut handles = vec![];
        for _ in 0..2 {
            let pool = Arc::clone(&pool);
            handles.push(task::spawn(async move {
                let mut tx = pool.begin().await.expect("Failed to begin transaction");
                let result = Ledger::new(&mut tx)
                    .debit_available_credit_pending(user_id, 60, None, "concurrent submission")
                    .await;
                match result {
                    Ok(_) => {
                        tx.commit().await.expect("Failed to commit");
                        true
                    }
                    Err(Error::InsufficientFunds { .. }) => {
                        tx.rollback().await.expect("Failed to rollback");
                        false
                    }
                    Err(e) => panic!("Unexpected error: {e:?}"),
                }
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.expect("Task panicked") {
                successes += 1;
            }
        }
        assert_eq!(successes, 1, "exactly one of two concurrent debits must succeed");

        let mut conn = pool.acquire().await.expect("Failed to acquire connection");
        let balance = Ledger::new(&mut conn).get_balance(user_id).await.expect("Failed to get balance");
        assert_eq!(balance.available_points, 40);
        assert_eq!(balance.pending_points, 60);
        assert!(balance.available_points >= 0, "available must never go negative");
    }
}
