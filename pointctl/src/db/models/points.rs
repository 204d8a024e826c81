use crate::types::{ReviewId, TransactionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Transaction kind stored as TEXT in the database.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Spend,
    Refund,
    Earn,
    AdminAdd,
    AdminSubtract,
}

/// The three-bucket balance row; one per user, created lazily and never
/// deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PointBalance {
    pub user_id: UserId,
    pub available_points: i64,
    pub pending_points: i64,
    pub total_earned: i64,
    pub total_spent: i64,
    pub updated_at: DateTime<Utc>,
}

/// One row per ledger mutation. `balance_before`/`balance_after` snapshot the
/// bucket the mutation touched, so `balance_after == balance_before + amount`
/// holds for every row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PointTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub description: Option<String>,
    pub review_id: Option<ReviewId>,
    pub actor_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}
