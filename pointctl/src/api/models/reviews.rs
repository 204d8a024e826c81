use crate::{
    db::models::reviews::{PointStatus, ReviewRow, ReviewStatus},
    types::{PlaceId, ReviewId, UserId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

// Request models

/// One draft in a batch submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewDraft {
    pub content: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
}

/// Batch submission: every item is priced at the current unit price and the
/// whole batch is funded by a single debit, all-or-nothing. With
/// `commit: false` the items are saved as drafts and nothing is charged.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewBatchCreate {
    pub items: Vec<ReviewDraft>,
    #[serde(default = "default_commit")]
    pub commit: bool,
}

fn default_commit() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewReject {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewUrlRegister {
    pub review_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteRequestCreate {
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteRequestReject {
    pub reason: String,
}

// Response models
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ReviewId,
    #[schema(value_type = String, format = "uuid")]
    pub place_id: PlaceId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    pub content: String,
    pub image_urls: Vec<String>,
    pub point_status: PointStatus,
    pub review_status: Option<ReviewStatus>,
    /// Price snapshotted at first submission. Immutable thereafter.
    pub point_amount: i64,
    pub submitted_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_reason: Option<String>,
    pub delete_requested_at: Option<DateTime<Utc>>,
    pub delete_request_reason: Option<String>,
    pub delete_rejected_at: Option<DateTime<Utc>>,
    pub delete_rejected_reason: Option<String>,
    pub review_url: Option<String>,
    pub review_url_registered_at: Option<DateTime<Utc>>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_check_status: Option<String>,
    pub check_fail_count: i32,
    pub deleted_detected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReviewBatchResponse {
    pub reviews: Vec<ReviewResponse>,
    /// Sum debited for the batch. Zero for a draft save.
    pub points_charged: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UrlCheckResponse {
    #[schema(value_type = String, format = "uuid")]
    pub review_id: ReviewId,
    pub alive: bool,
    pub status: String,
    pub review_status: Option<ReviewStatus>,
}

/// Query parameters for listing reviews
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListReviewsQuery {
    /// Filter by ledger-facing status
    pub point_status: Option<PointStatus>,

    /// Number of items to skip
    pub skip: Option<i64>,

    /// Maximum number of items to return
    pub limit: Option<i64>,
}

// Conversions
impl From<ReviewRow> for ReviewResponse {
    fn from(db: ReviewRow) -> Self {
        Self {
            id: db.id,
            place_id: db.place_id,
            owner_id: db.owner_id,
            content: db.content,
            image_urls: db.image_urls,
            point_status: db.point_status,
            review_status: db.review_status,
            point_amount: db.point_amount,
            submitted_at: db.submitted_at,
            approved_at: db.approved_at,
            rejected_at: db.rejected_at,
            rejected_reason: db.rejected_reason,
            delete_requested_at: db.delete_requested_at,
            delete_request_reason: db.delete_request_reason,
            delete_rejected_at: db.delete_rejected_at,
            delete_rejected_reason: db.delete_rejected_reason,
            review_url: db.review_url,
            review_url_registered_at: db.review_url_registered_at,
            last_checked_at: db.last_checked_at,
            last_check_status: db.last_check_status,
            check_fail_count: db.check_fail_count,
            deleted_detected_at: db.deleted_detected_at,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}
