//! Review/ledger orchestration shared by the API handlers and the sweep.
//!
//! Every function here runs on the caller's open transaction: the review row
//! lock, the status transition, and the ledger movement commit or roll back
//! together. Lock order is always review row first, then balance row.

use crate::{
    api::models::reviews::ReviewDraft,
    db::{
        handlers::{points::Ledger, pricing::Pricing, reviews::Reviews},
        models::reviews::{PointStatus, ReviewCreateDBRequest, ReviewRow, ReviewStatus},
    },
    errors::{Error, Result},
    types::{PlaceId, ReviewId, UserId},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::PgConnection;
use tracing::{debug, info};

/// The only work type the service currently prices.
pub const WORK_TYPE: &str = "receipt_review";

/// Consecutive failed liveness probes before a posted review is considered
/// deleted from the platform.
pub const CHECK_FAIL_THRESHOLD: i32 = 3;

async fn get_review_locked(db: &mut PgConnection, review_id: ReviewId) -> Result<ReviewRow> {
    Reviews::new(db)
        .get_by_id_for_update(review_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "review".to_string(),
            id: review_id.to_string(),
        })
}

fn not_pending(review: &ReviewRow) -> Error {
    Error::NotPending {
        id: review.id.to_string(),
        status: review.point_status.to_string(),
    }
}

/// Submit a batch of review items against a place. Each item is priced at
/// the current unit price; the whole batch is funded by one debit and fails
/// all-or-nothing on insufficient funds. With `commit: false` the items are
/// saved as drafts and nothing is charged; the snapshotted price still
/// applies when a draft is submitted later.
pub async fn submit_reviews(
    db: &mut PgConnection,
    owner_id: UserId,
    place_id: PlaceId,
    drafts: Vec<ReviewDraft>,
    commit: bool,
) -> Result<(Vec<ReviewRow>, i64)> {
    if drafts.is_empty() {
        return Err(Error::BadRequest {
            message: "A submission must contain at least one review".to_string(),
        });
    }
    for draft in &drafts {
        if draft.content.trim().is_empty() {
            return Err(Error::BadRequest {
                message: "Review content must not be empty".to_string(),
            });
        }
    }

    let unit_price = Pricing::new(&mut *db).get_active_unit_price(WORK_TYPE).await?;
    let total = unit_price
        .checked_mul(drafts.len() as i64)
        .ok_or_else(|| Error::BadRequest {
            message: "Submission total overflows".to_string(),
        })?;

    let (point_status, review_status, charged) = if commit {
        Ledger::new(&mut *db)
            .debit_available_credit_pending(
                owner_id,
                total,
                None,
                &format!("submission of {} review(s) at {unit_price} points each", drafts.len()),
            )
            .await?;
        (PointStatus::Pending, Some(ReviewStatus::AwaitingPost), total)
    } else {
        (PointStatus::Draft, None, 0)
    };

    let mut created = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let row = Reviews::new(&mut *db)
            .create(ReviewCreateDBRequest {
                place_id,
                content: draft.content,
                image_urls: draft.image_urls,
                point_status,
                review_status,
                point_amount: unit_price,
            })
            .await?;
        created.push(row);
    }

    info!(%owner_id, %place_id, count = created.len(), charged, commit, "review batch submitted");
    Ok((created, charged))
}

/// Approve a pending review: the held points are definitively spent and the
/// item enters the publication pipeline awaiting its URL.
pub async fn approve_review(db: &mut PgConnection, review_id: ReviewId, approved_by: UserId) -> Result<ReviewRow> {
    let review = get_review_locked(&mut *db, review_id).await?;
    if !review.point_status.can_become(PointStatus::Approved) {
        return Err(not_pending(&review));
    }
    if !Reviews::new(&mut *db).mark_approved(review_id, approved_by).await? {
        return Err(not_pending(&review));
    }
    Ledger::new(&mut *db)
        .settle_pending_as_spent(review.owner_id, review.point_amount, Some(review_id), "review approved")
        .await?;

    info!(%review_id, %approved_by, amount = review.point_amount, "review approved");
    get_review_locked(&mut *db, review_id).await
}

pub async fn reject_review(
    db: &mut PgConnection,
    review_id: ReviewId,
    rejected_by: UserId,
    reason: Option<&str>,
) -> Result<ReviewRow> {
    let review = get_review_locked(&mut *db, review_id).await?;
    if !review.point_status.can_become(PointStatus::Rejected) {
        return Err(not_pending(&review));
    }
    if !Reviews::new(&mut *db).mark_rejected(review_id, rejected_by, reason).await? {
        return Err(not_pending(&review));
    }
    Ledger::new(&mut *db)
        .credit_available_from_pending(review.owner_id, review.point_amount, Some(review_id), "review rejected")
        .await?;

    info!(%review_id, %rejected_by, amount = review.point_amount, "review rejected");
    get_review_locked(&mut *db, review_id).await
}

pub async fn cancel_review(db: &mut PgConnection, review_id: ReviewId) -> Result<ReviewRow> {
    let review = get_review_locked(&mut *db, review_id).await?;
    if !review.point_status.can_become(PointStatus::Cancelled) {
        return Err(not_pending(&review));
    }
    if !Reviews::new(&mut *db).mark_cancelled(review_id).await? {
        return Err(not_pending(&review));
    }
    Ledger::new(&mut *db)
        .credit_available_from_pending(review.owner_id, review.point_amount, Some(review_id), "review cancelled")
        .await?;

    info!(%review_id, amount = review.point_amount, "review cancelled");
    get_review_locked(&mut *db, review_id).await
}

/// Submit a draft, or resubmit a rejected or cancelled review. The point
/// amount snapshotted at creation is charged; the price is never re-read.
pub async fn resubmit_review(db: &mut PgConnection, review_id: ReviewId) -> Result<ReviewRow> {
    let review = get_review_locked(&mut *db, review_id).await?;
    if !review.point_status.can_become(PointStatus::Pending) {
        return Err(Error::InvalidState {
            message: format!(
                "review {review_id} cannot be resubmitted from status {}",
                review.point_status
            ),
        });
    }
    if !Reviews::new(&mut *db).mark_resubmitted(review_id, review.point_status).await? {
        return Err(Error::InvalidState {
            message: format!("review {review_id} changed state during resubmission"),
        });
    }
    Ledger::new(&mut *db)
        .debit_available_credit_pending(review.owner_id, review.point_amount, Some(review_id), "review resubmitted")
        .await?;

    info!(%review_id, amount = review.point_amount, "review resubmitted");
    get_review_locked(&mut *db, review_id).await
}

/// Attach the published platform URL to an approved review.
pub async fn register_review_url(db: &mut PgConnection, review_id: ReviewId, url: &str) -> Result<ReviewRow> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::BadRequest {
            message: "review_url must be an http(s) URL".to_string(),
        });
    }
    let review = get_review_locked(&mut *db, review_id).await?;
    if !Reviews::new(&mut *db).set_review_url(review_id, url).await? {
        return Err(Error::InvalidState {
            message: format!(
                "review {review_id} cannot register a URL (point status {}, review status {:?})",
                review.point_status, review.review_status
            ),
        });
    }
    get_review_locked(&mut *db, review_id).await
}

/// Record the outcome of a liveness probe against the registered URL.
/// Returns the publication status after the update.
pub async fn record_url_check(
    db: &mut PgConnection,
    review_id: ReviewId,
    alive: bool,
    status: &str,
) -> Result<Option<ReviewStatus>> {
    let review = get_review_locked(&mut *db, review_id).await?;
    if review.review_url.is_none() {
        return Err(Error::InvalidState {
            message: format!("review {review_id} has no registered URL to check"),
        });
    }
    let new_status = Reviews::new(&mut *db)
        .record_check_result(review_id, alive, status, CHECK_FAIL_THRESHOLD)
        .await?;
    debug!(%review_id, alive, status, ?new_status, "url check recorded");
    Ok(new_status)
}

pub async fn request_deletion(db: &mut PgConnection, review_id: ReviewId, reason: &str) -> Result<ReviewRow> {
    if reason.trim().is_empty() {
        return Err(Error::BadRequest {
            message: "A deletion reason is required".to_string(),
        });
    }
    let review = get_review_locked(&mut *db, review_id).await?;
    if !Reviews::new(&mut *db).record_delete_request(review_id, reason).await? {
        return Err(Error::InvalidState {
            message: format!(
                "review {review_id} cannot open a delete request (point status {}, open request: {})",
                review.point_status,
                review.delete_requested_at.is_some() && review.delete_rejected_at.is_none()
            ),
        });
    }
    get_review_locked(&mut *db, review_id).await
}

pub async fn approve_deletion(db: &mut PgConnection, review_id: ReviewId) -> Result<ReviewRow> {
    get_review_locked(&mut *db, review_id).await?;
    if !Reviews::new(&mut *db).approve_delete_request(review_id).await? {
        return Err(Error::InvalidState {
            message: format!("review {review_id} has no open delete request"),
        });
    }
    info!(%review_id, "delete request approved");
    get_review_locked(&mut *db, review_id).await
}

pub async fn reject_deletion(
    db: &mut PgConnection,
    review_id: ReviewId,
    rejected_by: UserId,
    reason: &str,
) -> Result<ReviewRow> {
    get_review_locked(&mut *db, review_id).await?;
    if !Reviews::new(&mut *db).reject_delete_request(review_id, rejected_by, reason).await? {
        return Err(Error::InvalidState {
            message: format!("review {review_id} has no open delete request"),
        });
    }
    get_review_locked(&mut *db, review_id).await
}

/// Refund one expired pending review. Returns false when the item no longer
/// qualifies (already decided, or resubmitted after the cutoff was computed).
pub async fn refund_expired_review(
    db: &mut PgConnection,
    review_id: ReviewId,
    submitted_before: DateTime<Utc>,
) -> Result<bool> {
    let Some(review) = Reviews::new(&mut *db).get_by_id_for_update(review_id).await? else {
        return Ok(false);
    };
    if !Reviews::new(&mut *db).mark_refunded(review_id, submitted_before).await? {
        debug!(%review_id, status = %review.point_status, "skipping sweep candidate, no longer eligible");
        return Ok(false);
    }
    Ledger::new(&mut *db)
        .credit_available_from_pending(
            review.owner_id,
            review.point_amount,
            Some(review_id),
            "automatic refund of expired review",
        )
        .await?;
    info!(%review_id, owner_id = %review.owner_id, amount = review.point_amount, "expired review refunded");
    Ok(true)
}

/// Cutoff timestamp for the auto-refund sweep given the configured grace
/// period in days.
pub fn sweep_cutoff(now: DateTime<Utc>, grace_days: i64) -> DateTime<Utc> {
    now - Duration::days(grace_days)
}
