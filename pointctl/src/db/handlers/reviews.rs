use crate::{
    db::models::reviews::{PointStatus, ReviewCreateDBRequest, ReviewRow, ReviewStatus},
    errors::Result,
    types::{PlaceId, ReviewId, UserId},
};
use chrono::{DateTime, Utc};
use sqlx::PgConnection;

const REVIEW_COLUMNS: &str = "r.id, r.place_id, p.owner_id, r.content, r.image_urls, r.point_status, \
     r.review_status, r.point_amount, r.submitted_at, r.approved_at, r.approved_by, r.rejected_at, \
     r.rejected_by, r.rejected_reason, r.delete_requested_at, r.delete_request_reason, \
     r.delete_rejected_at, r.delete_rejected_reason, r.delete_rejected_by, r.review_url, \
     r.review_url_registered_at, r.last_checked_at, r.last_check_status, r.check_fail_count, \
     r.deleted_detected_at, r.created_at, r.updated_at";

/// Repository for review work items. State transitions are conditional
/// UPDATEs guarded on the expected current status; a zero rows-affected count
/// means another transaction got there first and the caller must not proceed.
pub struct Reviews<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Reviews<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    pub async fn create(&mut self, request: ReviewCreateDBRequest) -> Result<ReviewRow> {
        let id: ReviewId = sqlx::query_scalar(
            "INSERT INTO receipt_reviews
                 (place_id, content, image_urls, point_status, review_status, point_amount, submitted_at)
             VALUES ($1, $2, $3, $4, $5, $6,
                     CASE WHEN $4 = 'pending' THEN NOW() ELSE NULL END)
             RETURNING id",
        )
        .bind(request.place_id)
        .bind(&request.content)
        .bind(&request.image_urls)
        .bind(request.point_status)
        .bind(request.review_status)
        .bind(request.point_amount)
        .fetch_one(&mut *self.db)
        .await?;
        let row = self.get_by_id(id).await?;
        row.ok_or_else(|| crate::errors::Error::NotFound {
            resource: "review".to_string(),
            id: id.to_string(),
        })
    }

    pub async fn get_by_id(&mut self, review_id: ReviewId) -> Result<Option<ReviewRow>> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS}
             FROM receipt_reviews r
             JOIN places p ON p.id = r.place_id
             WHERE r.id = $1"
        ))
        .bind(review_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(row)
    }

    /// Fetch with a row lock on the review (not the joined place), held until
    /// the surrounding transaction ends.
    pub async fn get_by_id_for_update(&mut self, review_id: ReviewId) -> Result<Option<ReviewRow>> {
        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS}
             FROM receipt_reviews r
             JOIN places p ON p.id = r.place_id
             WHERE r.id = $1
             FOR UPDATE OF r"
        ))
        .bind(review_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(row)
    }

    pub async fn list_for_place(
        &mut self,
        place_id: PlaceId,
        point_status: Option<PointStatus>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<ReviewRow>> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS}
             FROM receipt_reviews r
             JOIN places p ON p.id = r.place_id
             WHERE r.place_id = $1 AND ($2 IS NULL OR r.point_status = $2)
             ORDER BY r.created_at DESC, r.id DESC
             OFFSET $3 LIMIT $4"
        ))
        .bind(place_id)
        .bind(point_status)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows)
    }

    /// Approve a pending item. Returns false if the item was no longer
    /// pending by the time the UPDATE ran.
    pub async fn mark_approved(&mut self, review_id: ReviewId, approved_by: UserId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE receipt_reviews
             SET point_status = 'approved', review_status = 'awaiting_post',
                 approved_at = NOW(), approved_by = $2, updated_at = NOW()
             WHERE id = $1 AND point_status = 'pending'",
        )
        .bind(review_id)
        .bind(approved_by)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_rejected(
        &mut self,
        review_id: ReviewId,
        rejected_by: UserId,
        reason: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE receipt_reviews
             SET point_status = 'rejected', rejected_at = NOW(), rejected_by = $2,
                 rejected_reason = $3, updated_at = NOW()
             WHERE id = $1 AND point_status = 'pending'",
        )
        .bind(review_id)
        .bind(rejected_by)
        .bind(reason)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_cancelled(&mut self, review_id: ReviewId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE receipt_reviews
             SET point_status = 'cancelled', updated_at = NOW()
             WHERE id = $1 AND point_status = 'pending'",
        )
        .bind(review_id)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Resubmission of a draft, rejected or cancelled item: back to pending
    /// with the review fields from the failed round cleared. point_amount is
    /// kept untouched; the price was snapshotted at creation.
    pub async fn mark_resubmitted(&mut self, review_id: ReviewId, expected: PointStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE receipt_reviews
             SET point_status = 'pending', review_status = 'awaiting_post', submitted_at = NOW(),
                 rejected_at = NULL, rejected_by = NULL, rejected_reason = NULL,
                 updated_at = NOW()
             WHERE id = $1 AND point_status = $2",
        )
        .bind(review_id)
        .bind(expected)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Auto-refund transition. Guarded on both the status and the submission
    /// cutoff so a racing approval or a fresh resubmission is never swept.
    pub async fn mark_refunded(&mut self, review_id: ReviewId, submitted_before: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE receipt_reviews
             SET point_status = 'refunded', review_status = 'expired', updated_at = NOW()
             WHERE id = $1 AND point_status = 'pending' AND submitted_at < $2",
        )
        .bind(review_id)
        .bind(submitted_before)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn set_content(&mut self, review_id: ReviewId, content: &str, image_urls: &[String]) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE receipt_reviews
             SET content = $2, image_urls = $3, updated_at = NOW()
             WHERE id = $1 AND point_status IN ('draft', 'rejected', 'cancelled')",
        )
        .bind(review_id)
        .bind(content)
        .bind(image_urls)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Register the published URL. Flips the publication axis to posted. A
    /// re-registration replaces the URL but keeps the original registration
    /// timestamp.
    pub async fn set_review_url(&mut self, review_id: ReviewId, url: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE receipt_reviews
             SET review_url = $2,
                 review_url_registered_at = COALESCE(review_url_registered_at, NOW()),
                 review_status = 'posted', updated_at = NOW()
             WHERE id = $1 AND point_status = 'approved'
               AND review_status IN ('awaiting_post', 'posted')",
        )
        .bind(review_id)
        .bind(url)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Record one liveness probe outcome. A success resets the failure
    /// streak; a failure past the threshold marks the item deleted.
    pub async fn record_check_result(
        &mut self,
        review_id: ReviewId,
        alive: bool,
        status: &str,
        fail_threshold: i32,
    ) -> Result<Option<ReviewStatus>> {
        let new_status: Option<ReviewStatus> = if alive {
            sqlx::query_scalar(
                "UPDATE receipt_reviews
                 SET last_checked_at = NOW(), last_check_status = $2,
                     check_fail_count = 0, updated_at = NOW()
                 WHERE id = $1
                 RETURNING review_status",
            )
            .bind(review_id)
            .bind(status)
            .fetch_one(&mut *self.db)
            .await?
        } else {
            sqlx::query_scalar(
                "UPDATE receipt_reviews
                 SET last_checked_at = NOW(), last_check_status = $2,
                     check_fail_count = check_fail_count + 1,
                     review_status = CASE
                         WHEN check_fail_count + 1 >= $3 AND review_status = 'posted'
                         THEN 'deleted_by_system' ELSE review_status END,
                     deleted_detected_at = CASE
                         WHEN check_fail_count + 1 >= $3 AND review_status = 'posted'
                         THEN NOW() ELSE deleted_detected_at END,
                     updated_at = NOW()
                 WHERE id = $1
                 RETURNING review_status",
            )
            .bind(review_id)
            .bind(status)
            .bind(fail_threshold)
            .fetch_one(&mut *self.db)
            .await?
        };
        Ok(new_status)
    }

    /// Open a delete request. Allowed on an approved item with no request in
    /// flight; a rejected request can be superseded by a fresh one, which
    /// clears the rejection metadata.
    pub async fn record_delete_request(&mut self, review_id: ReviewId, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE receipt_reviews
             SET delete_requested_at = NOW(), delete_request_reason = $2,
                 delete_rejected_at = NULL, delete_rejected_by = NULL,
                 delete_rejected_reason = NULL, updated_at = NOW()
             WHERE id = $1 AND point_status = 'approved'
               AND (delete_requested_at IS NULL OR delete_rejected_at IS NOT NULL)",
        )
        .bind(review_id)
        .bind(reason)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn approve_delete_request(&mut self, review_id: ReviewId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE receipt_reviews
             SET review_status = 'deleted_by_request', updated_at = NOW()
             WHERE id = $1 AND delete_requested_at IS NOT NULL AND delete_rejected_at IS NULL
               AND review_status NOT IN ('deleted_by_system', 'deleted_by_request')",
        )
        .bind(review_id)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn reject_delete_request(&mut self, review_id: ReviewId, rejected_by: UserId, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE receipt_reviews
             SET delete_rejected_at = NOW(), delete_rejected_by = $2,
                 delete_rejected_reason = $3, updated_at = NOW()
             WHERE id = $1 AND delete_requested_at IS NOT NULL AND delete_rejected_at IS NULL",
        )
        .bind(review_id)
        .bind(rejected_by)
        .bind(reason)
        .execute(&mut *self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Ids of pending items whose submission predates the cutoff. Sweep input;
    /// the per-item transaction re-validates each one under a lock before
    /// refunding, so a stale entry here is harmless.
    pub async fn list_expired_pending(&mut self, submitted_before: DateTime<Utc>, limit: i64) -> Result<Vec<ReviewId>> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM receipt_reviews
             WHERE point_status = 'pending' AND submitted_at < $1
             ORDER BY submitted_at ASC
             LIMIT $2",
        )
        .bind(submitted_before)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(ids)
    }

    /// Posted items due for a liveness probe.
    pub async fn list_due_for_check(&mut self, checked_before: DateTime<Utc>, limit: i64) -> Result<Vec<ReviewRow>> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS}
             FROM receipt_reviews r
             JOIN places p ON p.id = r.place_id
             WHERE r.review_status = 'posted'
               AND (r.last_checked_at IS NULL OR r.last_checked_at < $1)
             ORDER BY r.last_checked_at ASC NULLS FIRST
             LIMIT $2"
        ))
        .bind(checked_before)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(rows)
    }
}
