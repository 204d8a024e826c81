use crate::{
    api::models::{
        reviews::{
            DeleteRequestCreate, DeleteRequestReject, ListReviewsQuery, ReviewBatchCreate, ReviewBatchResponse,
            ReviewReject, ReviewResponse, ReviewUrlRegister, UrlCheckResponse,
        },
        users::CurrentUser,
    },
    auth::permissions::{self, operation, resource, RequiresPermission},
    db::handlers::{reviews::Reviews, users as user_handlers},
    errors::{Error, Result},
    types::{Operation, PlaceId, Resource, ReviewId},
    workflow, AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

/// Fetch a review, hiding its existence from users without read access.
async fn load_review_for_read(state: &AppState, review_id: ReviewId, current_user: &CurrentUser) -> Result<crate::db::models::reviews::ReviewRow> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let review = Reviews::new(&mut conn)
        .get_by_id(review_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "review".to_string(),
            id: review_id.to_string(),
        })?;
    let can_read_all = permissions::has_permission(current_user, Resource::Reviews, Operation::ReadAll);
    if !can_read_all && review.owner_id != current_user.id {
        // Return 404 to avoid leaking existence
        return Err(Error::NotFound {
            resource: "review".to_string(),
            id: review_id.to_string(),
        });
    }
    Ok(review)
}

/// Loaded review plus the gate for mutating owner actions (cancel, resubmit,
/// URL registration, delete requests). These are strictly owner-only:
/// moderation staff act through the approve/reject/url-check routes instead.
async fn load_review_for_owner_action(
    state: &AppState,
    review_id: ReviewId,
    current_user: &CurrentUser,
) -> Result<crate::db::models::reviews::ReviewRow> {
    let review = load_review_for_read(state, review_id, current_user).await?;
    if review.owner_id != current_user.id {
        return Err(Error::NotOwner {
            resource: "review".to_string(),
            id: review_id.to_string(),
        });
    }
    Ok(review)
}

/// Submit a batch of reviews against a place
#[utoipa::path(
    post,
    path = "/places/{place_id}/reviews",
    tag = "reviews",
    summary = "Submit a batch of reviews",
    description = "Price each item at the current unit price and debit the place owner's available points in one all-or-nothing movement. Every created review starts pending and awaiting its posted URL. With commit=false the items are saved as drafts and nothing is charged.",
    params(
        ("place_id" = String, Path, description = "Place ID"),
    ),
    request_body = ReviewBatchCreate,
    responses(
        (status = 201, description = "Batch submitted", body = ReviewBatchResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not the place owner"),
        (status = 404, description = "Place not found"),
        (status = 409, description = "Insufficient points"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn submit_reviews(
    State(state): State<AppState>,
    Path(place_id): Path<PlaceId>,
    current_user: CurrentUser,
    Json(data): Json<ReviewBatchCreate>,
) -> Result<(StatusCode, Json<ReviewBatchResponse>)> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let place = user_handlers::get_place_by_id(&mut conn, place_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "place".to_string(),
            id: place_id.to_string(),
        })?;
    drop(conn);

    let can_create_all = permissions::has_permission(&current_user, Resource::Reviews, Operation::CreateAll);
    if !can_create_all && place.owner_id != current_user.id {
        return Err(Error::NotOwner {
            resource: "place".to_string(),
            id: place_id.to_string(),
        });
    }

    let mut tx = state.db.begin().await.map_err(crate::db::errors::DbError::from)?;
    let (rows, points_charged) =
        workflow::submit_reviews(&mut tx, place.owner_id, place_id, data.items, data.commit).await?;
    tx.commit().await.map_err(crate::db::errors::DbError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(ReviewBatchResponse {
            reviews: rows.into_iter().map(ReviewResponse::from).collect(),
            points_charged,
        }),
    ))
}

/// List reviews for a place
#[utoipa::path(
    get,
    path = "/places/{place_id}/reviews",
    tag = "reviews",
    summary = "List reviews for a place",
    params(
        ("place_id" = String, Path, description = "Place ID"),
        ListReviewsQuery
    ),
    responses(
        (status = 200, description = "Reviews for the place", body = [ReviewResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Place not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn list_place_reviews(
    State(state): State<AppState>,
    Path(place_id): Path<PlaceId>,
    Query(query): Query<ListReviewsQuery>,
    current_user: CurrentUser,
) -> Result<Json<Vec<ReviewResponse>>> {
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);

    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let place = user_handlers::get_place_by_id(&mut conn, place_id)
        .await?
        .ok_or_else(|| Error::NotFound {
            resource: "place".to_string(),
            id: place_id.to_string(),
        })?;

    let can_read_all = permissions::has_permission(&current_user, Resource::Reviews, Operation::ReadAll);
    if !can_read_all && place.owner_id != current_user.id {
        return Err(Error::NotFound {
            resource: "place".to_string(),
            id: place_id.to_string(),
        });
    }

    let rows = Reviews::new(&mut conn)
        .list_for_place(place_id, query.point_status, skip, limit)
        .await?;
    Ok(Json(rows.into_iter().map(ReviewResponse::from).collect()))
}

/// Get a single review
#[utoipa::path(
    get,
    path = "/reviews/{id}",
    tag = "reviews",
    summary = "Get a review",
    params(
        ("id" = String, Path, description = "Review ID"),
    ),
    responses(
        (status = 200, description = "Review details", body = ReviewResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Review not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn get_review(
    State(state): State<AppState>,
    Path(review_id): Path<ReviewId>,
    current_user: CurrentUser,
) -> Result<Json<ReviewResponse>> {
    let review = load_review_for_read(&state, review_id, &current_user).await?;
    Ok(Json(ReviewResponse::from(review)))
}

/// Approve a pending review
#[utoipa::path(
    post,
    path = "/reviews/{id}/approve",
    tag = "reviews",
    summary = "Approve a pending review",
    description = "Settle the held points as spent and move the item into the publication pipeline.",
    params(
        ("id" = String, Path, description = "Review ID"),
    ),
    responses(
        (status = 200, description = "Review approved", body = ReviewResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - moderation access required"),
        (status = 404, description = "Review not found"),
        (status = 409, description = "Review is not pending"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn approve_review(
    State(state): State<AppState>,
    Path(review_id): Path<ReviewId>,
    perm: RequiresPermission<resource::Reviews, operation::UpdateAll>,
) -> Result<Json<ReviewResponse>> {
    let mut tx = state.db.begin().await.map_err(crate::db::errors::DbError::from)?;
    let review = workflow::approve_review(&mut tx, review_id, perm.id).await?;
    tx.commit().await.map_err(crate::db::errors::DbError::from)?;
    Ok(Json(ReviewResponse::from(review)))
}

/// Reject a pending review
#[utoipa::path(
    post,
    path = "/reviews/{id}/reject",
    tag = "reviews",
    summary = "Reject a pending review",
    description = "Return the held points to the owner's available bucket. The owner may edit and resubmit.",
    params(
        ("id" = String, Path, description = "Review ID"),
    ),
    request_body = ReviewReject,
    responses(
        (status = 200, description = "Review rejected", body = ReviewResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - moderation access required"),
        (status = 404, description = "Review not found"),
        (status = 409, description = "Review is not pending"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn reject_review(
    State(state): State<AppState>,
    Path(review_id): Path<ReviewId>,
    perm: RequiresPermission<resource::Reviews, operation::UpdateAll>,
    Json(data): Json<ReviewReject>,
) -> Result<Json<ReviewResponse>> {
    let mut tx = state.db.begin().await.map_err(crate::db::errors::DbError::from)?;
    let review = workflow::reject_review(&mut tx, review_id, perm.id, data.reason.as_deref()).await?;
    tx.commit().await.map_err(crate::db::errors::DbError::from)?;
    Ok(Json(ReviewResponse::from(review)))
}

/// Cancel a pending review
#[utoipa::path(
    post,
    path = "/reviews/{id}/cancel",
    tag = "reviews",
    summary = "Cancel a pending review",
    description = "Owner withdraws a pending submission; the held points return to the available bucket.",
    params(
        ("id" = String, Path, description = "Review ID"),
    ),
    responses(
        (status = 200, description = "Review cancelled", body = ReviewResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not the owner"),
        (status = 404, description = "Review not found"),
        (status = 409, description = "Review is not pending"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn cancel_review(
    State(state): State<AppState>,
    Path(review_id): Path<ReviewId>,
    current_user: CurrentUser,
) -> Result<Json<ReviewResponse>> {
    load_review_for_owner_action(&state, review_id, &current_user).await?;
    let mut tx = state.db.begin().await.map_err(crate::db::errors::DbError::from)?;
    let review = workflow::cancel_review(&mut tx, review_id).await?;
    tx.commit().await.map_err(crate::db::errors::DbError::from)?;
    Ok(Json(ReviewResponse::from(review)))
}

/// Resubmit a rejected or cancelled review
#[utoipa::path(
    post,
    path = "/reviews/{id}/resubmit",
    tag = "reviews",
    summary = "Resubmit a rejected or cancelled review",
    description = "Charge the snapshotted point amount again and return the item to the moderation queue.",
    params(
        ("id" = String, Path, description = "Review ID"),
    ),
    responses(
        (status = 200, description = "Review resubmitted", body = ReviewResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not the owner"),
        (status = 404, description = "Review not found"),
        (status = 409, description = "Review cannot be resubmitted or insufficient points"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn resubmit_review(
    State(state): State<AppState>,
    Path(review_id): Path<ReviewId>,
    current_user: CurrentUser,
) -> Result<Json<ReviewResponse>> {
    load_review_for_owner_action(&state, review_id, &current_user).await?;
    let mut tx = state.db.begin().await.map_err(crate::db::errors::DbError::from)?;
    let review = workflow::resubmit_review(&mut tx, review_id).await?;
    tx.commit().await.map_err(crate::db::errors::DbError::from)?;
    Ok(Json(ReviewResponse::from(review)))
}

/// Register the published URL of an approved review
#[utoipa::path(
    put,
    path = "/reviews/{id}/url",
    tag = "reviews",
    summary = "Register the published review URL",
    params(
        ("id" = String, Path, description = "Review ID"),
    ),
    request_body = ReviewUrlRegister,
    responses(
        (status = 200, description = "URL registered", body = ReviewResponse),
        (status = 400, description = "Malformed URL"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not the owner"),
        (status = 404, description = "Review not found"),
        (status = 409, description = "Review is not approved"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn register_review_url(
    State(state): State<AppState>,
    Path(review_id): Path<ReviewId>,
    current_user: CurrentUser,
    Json(data): Json<ReviewUrlRegister>,
) -> Result<Json<ReviewResponse>> {
    load_review_for_owner_action(&state, review_id, &current_user).await?;
    let mut tx = state.db.begin().await.map_err(crate::db::errors::DbError::from)?;
    let review = workflow::register_review_url(&mut tx, review_id, &data.review_url).await?;
    tx.commit().await.map_err(crate::db::errors::DbError::from)?;
    Ok(Json(ReviewResponse::from(review)))
}

/// Probe the registered URL and record the outcome
#[utoipa::path(
    post,
    path = "/reviews/{id}/url-check",
    tag = "reviews",
    summary = "Check that the published review is still live",
    description = "Probe the registered URL. Repeated failures mark the review as deleted by the platform.",
    params(
        ("id" = String, Path, description = "Review ID"),
    ),
    responses(
        (status = 200, description = "Check recorded", body = UrlCheckResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - moderation access required"),
        (status = 404, description = "Review not found"),
        (status = 409, description = "Review has no registered URL"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn check_review_url(
    State(state): State<AppState>,
    Path(review_id): Path<ReviewId>,
    perm: RequiresPermission<resource::Reviews, operation::UpdateAll>,
) -> Result<Json<UrlCheckResponse>> {
    let review = load_review_for_read(&state, review_id, &perm.current_user).await?;
    let url = review.review_url.ok_or_else(|| Error::InvalidState {
        message: format!("review {review_id} has no registered URL to check"),
    })?;

    // Probe outside the transaction; only the recording is transactional.
    let outcome = state.url_checker.check(&url).await;

    let mut tx = state.db.begin().await.map_err(crate::db::errors::DbError::from)?;
    let review_status = workflow::record_url_check(&mut tx, review_id, outcome.alive, &outcome.status).await?;
    tx.commit().await.map_err(crate::db::errors::DbError::from)?;

    Ok(Json(UrlCheckResponse {
        review_id,
        alive: outcome.alive,
        status: outcome.status,
        review_status,
    }))
}

/// Ask for an approved review to be taken down
#[utoipa::path(
    post,
    path = "/reviews/{id}/delete-requests",
    tag = "reviews",
    summary = "Open a delete request",
    params(
        ("id" = String, Path, description = "Review ID"),
    ),
    request_body = DeleteRequestCreate,
    responses(
        (status = 200, description = "Delete request opened", body = ReviewResponse),
        (status = 400, description = "Missing reason"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - not the owner"),
        (status = 404, description = "Review not found"),
        (status = 409, description = "Review not approved or a request is already open"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn create_delete_request(
    State(state): State<AppState>,
    Path(review_id): Path<ReviewId>,
    current_user: CurrentUser,
    Json(data): Json<DeleteRequestCreate>,
) -> Result<Json<ReviewResponse>> {
    load_review_for_owner_action(&state, review_id, &current_user).await?;
    let mut tx = state.db.begin().await.map_err(crate::db::errors::DbError::from)?;
    let review = workflow::request_deletion(&mut tx, review_id, &data.reason).await?;
    tx.commit().await.map_err(crate::db::errors::DbError::from)?;
    Ok(Json(ReviewResponse::from(review)))
}

/// Approve an open delete request
#[utoipa::path(
    post,
    path = "/reviews/{id}/delete-requests/approve",
    tag = "reviews",
    summary = "Approve a delete request",
    params(
        ("id" = String, Path, description = "Review ID"),
    ),
    responses(
        (status = 200, description = "Delete request approved", body = ReviewResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - moderation access required"),
        (status = 404, description = "Review not found"),
        (status = 409, description = "No open delete request"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn approve_delete_request(
    State(state): State<AppState>,
    Path(review_id): Path<ReviewId>,
    _perm: RequiresPermission<resource::Reviews, operation::UpdateAll>,
) -> Result<Json<ReviewResponse>> {
    let mut tx = state.db.begin().await.map_err(crate::db::errors::DbError::from)?;
    let review = workflow::approve_deletion(&mut tx, review_id).await?;
    tx.commit().await.map_err(crate::db::errors::DbError::from)?;
    Ok(Json(ReviewResponse::from(review)))
}

/// Reject an open delete request
#[utoipa::path(
    post,
    path = "/reviews/{id}/delete-requests/reject",
    tag = "reviews",
    summary = "Reject a delete request",
    params(
        ("id" = String, Path, description = "Review ID"),
    ),
    request_body = DeleteRequestReject,
    responses(
        (status = 200, description = "Delete request rejected", body = ReviewResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - moderation access required"),
        (status = 404, description = "Review not found"),
        (status = 409, description = "No open delete request"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn reject_delete_request(
    State(state): State<AppState>,
    Path(review_id): Path<ReviewId>,
    perm: RequiresPermission<resource::Reviews, operation::UpdateAll>,
    Json(data): Json<DeleteRequestReject>,
) -> Result<Json<ReviewResponse>> {
    let mut tx = state.db.begin().await.map_err(crate::db::errors::DbError::from)?;
    let review = workflow::reject_deletion(&mut tx, review_id, perm.id, &data.reason).await?;
    tx.commit().await.map_err(crate::db::errors::DbError::from)?;
    Ok(Json(ReviewResponse::from(review)))
}
