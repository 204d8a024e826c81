use crate::{
    api::models::balances::PointBalanceResponse,
    db::models::points::{PointTransaction, TransactionKind},
    types::{ReviewId, TransactionId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// Request models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PointAdjustmentCreate {
    /// User whose balance is adjusted
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// Signed amount: positive grants points, negative removes them
    pub amount: i64,
    pub description: Option<String>,
}

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PointTransactionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: TransactionId,
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    pub kind: TransactionKind,
    /// Signed amount applied to the tracked bucket
    pub amount: i64,
    pub balance_before: i64,
    pub balance_after: i64,
    pub description: Option<String>,
    /// Set when the transaction was driven by a review work item
    #[schema(value_type = Option<String>, format = "uuid")]
    pub review_id: Option<ReviewId>,
    /// The staff user who performed a manual adjustment
    #[schema(value_type = Option<String>, format = "uuid")]
    pub actor_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// A manual adjustment together with the balance it produced.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PointAdjustmentResponse {
    pub transaction: PointTransactionResponse,
    pub new_balance: PointBalanceResponse,
}

/// Query parameters for listing transactions
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListTransactionsQuery {
    /// Filter by user ID (staff only for other users)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[param(value_type = Option<String>, format = "uuid")]
    pub user_id: Option<UserId>,

    /// Number of items to skip
    pub skip: Option<i64>,

    /// Maximum number of items to return
    pub limit: Option<i64>,
}

// Conversions
impl From<PointTransaction> for PointTransactionResponse {
    fn from(db: PointTransaction) -> Self {
        Self {
            id: db.id,
            user_id: db.user_id,
            kind: db.kind,
            amount: db.amount,
            balance_before: db.balance_before,
            balance_after: db.balance_after,
            description: db.description,
            review_id: db.review_id,
            actor_id: db.actor_id,
            created_at: db.created_at,
        }
    }
}
