use crate::types::{PlaceId, ReviewId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use utoipa::ToSchema;

/// Ledger-facing lifecycle of a review work item. Transitions are validated
/// against [`PointStatus::can_become`] before any SQL is issued, and re-checked
/// by the conditional UPDATE that performs them, so two racing transitions can
/// never both succeed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PointStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Cancelled,
    /// Terminal state reached only through the auto-refund sweep.
    Refunded,
}

impl PointStatus {
    /// The transition table. Everything not listed here is rejected.
    pub fn can_become(self, next: PointStatus) -> bool {
        use PointStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Pending, Refunded)
                | (Rejected, Pending)
                | (Cancelled, Pending)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PointStatus::Draft => "draft",
            PointStatus::Pending => "pending",
            PointStatus::Approved => "approved",
            PointStatus::Rejected => "rejected",
            PointStatus::Cancelled => "cancelled",
            PointStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Publication lifecycle, independent of [`PointStatus`]. `None` on a draft,
/// `AwaitingPost` from submission on; only reachable beyond `AwaitingPost`
/// once the item is approved.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    AwaitingPost,
    Posted,
    DeletedBySystem,
    DeletedByRequest,
    Expired,
}

/// A review work item joined with its owning user (via the place).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReviewRow {
    pub id: ReviewId,
    pub place_id: PlaceId,
    pub owner_id: UserId,
    pub content: String,
    pub image_urls: Vec<String>,
    pub point_status: PointStatus,
    pub review_status: Option<ReviewStatus>,
    pub point_amount: i64,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<UserId>,
    pub rejected_reason: Option<String>,
    pub delete_requested_at: Option<DateTime<Utc>>,
    pub delete_request_reason: Option<String>,
    pub delete_rejected_at: Option<DateTime<Utc>>,
    pub delete_rejected_reason: Option<String>,
    pub delete_rejected_by: Option<UserId>,
    pub review_url: Option<String>,
    pub review_url_registered_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_check_status: Option<String>,
    pub check_fail_count: i32,
    pub deleted_detected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating one review row; batch submission creates several of
/// these under a single ledger debit.
#[derive(Debug, Clone)]
pub struct ReviewCreateDBRequest {
    pub place_id: PlaceId,
    pub content: String,
    pub image_urls: Vec<String>,
    pub point_status: PointStatus,
    pub review_status: Option<ReviewStatus>,
    pub point_amount: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use PointStatus::*;

    #[test]
    fn test_transition_table() {
        assert!(Draft.can_become(Pending));
        assert!(Pending.can_become(Approved));
        assert!(Pending.can_become(Rejected));
        assert!(Pending.can_become(Cancelled));
        assert!(Pending.can_become(Refunded));
        assert!(Rejected.can_become(Pending));
        assert!(Cancelled.can_become(Pending));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for next in [Draft, Pending, Approved, Rejected, Cancelled, Refunded] {
            assert!(!Approved.can_become(next), "approved must be terminal, allowed {next}");
            assert!(!Refunded.can_become(next), "refunded must be terminal, allowed {next}");
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for s in [Draft, Pending, Approved, Rejected, Cancelled, Refunded] {
            assert!(!s.can_become(s));
        }
    }
}
