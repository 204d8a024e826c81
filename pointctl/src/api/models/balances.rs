use crate::{db::models::points::PointBalance, types::UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PointBalanceResponse {
    #[schema(value_type = String, format = "uuid")]
    pub user_id: UserId,
    /// Points free to spend on new submissions
    pub available_points: i64,
    /// Points held against in-flight review work
    pub pending_points: i64,
    /// Lifetime points granted
    pub total_earned: i64,
    /// Lifetime points definitively spent
    pub total_spent: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<PointBalance> for PointBalanceResponse {
    fn from(db: PointBalance) -> Self {
        Self {
            user_id: db.user_id,
            available_points: db.available_points,
            pending_points: db.pending_points,
            total_earned: db.total_earned,
            total_spent: db.total_spent,
            updated_at: db.updated_at,
        }
    }
}
