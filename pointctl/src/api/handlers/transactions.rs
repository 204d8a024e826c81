use crate::{
    api::models::{
        balances::PointBalanceResponse,
        transactions::{ListTransactionsQuery, PointAdjustmentCreate, PointAdjustmentResponse, PointTransactionResponse},
        users::CurrentUser,
    },
    auth::permissions::{self, operation, resource, RequiresPermission},
    db::handlers::points::Ledger,
    errors::{Error, Result},
    types::{Operation, Permission, Resource, TransactionId},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

/// Create a manual point adjustment
#[utoipa::path(
    post,
    path = "/transactions",
    tag = "transactions",
    summary = "Create a manual point adjustment",
    description = "Grant or remove points on a user's available bucket (staff only). The amount is signed; negative amounts cannot overdraw the balance.",
    request_body = PointAdjustmentCreate,
    responses(
        (status = 201, description = "Adjustment recorded", body = PointAdjustmentResponse),
        (status = 400, description = "Bad request - zero amount"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - staff access required"),
        (status = 409, description = "Insufficient points for a negative adjustment"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn create_adjustment(
    State(state): State<AppState>,
    perm: RequiresPermission<resource::Points, operation::CreateAll>,
    Json(data): Json<PointAdjustmentCreate>,
) -> Result<(StatusCode, Json<PointAdjustmentResponse>)> {
    let mut tx = state.db.begin().await.map_err(crate::db::errors::DbError::from)?;
    let (transaction, balance) = Ledger::new(&mut tx)
        .adjust(
            data.user_id,
            data.amount,
            data.description.as_deref().unwrap_or("manual adjustment"),
            perm.id,
        )
        .await?;
    tx.commit().await.map_err(crate::db::errors::DbError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(PointAdjustmentResponse {
            transaction: PointTransactionResponse::from(transaction),
            new_balance: PointBalanceResponse::from(balance),
        }),
    ))
}

/// Get a specific transaction by ID
#[utoipa::path(
    get,
    path = "/transactions/{transaction_id}",
    tag = "transactions",
    summary = "Get a specific transaction",
    description = "Get one ledger entry. Users without read-all access can only see their own entries.",
    params(
        ("transaction_id" = String, Path, description = "Transaction ID"),
    ),
    responses(
        (status = 200, description = "Transaction details", body = PointTransactionResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Transaction not found"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<TransactionId>,
    current_user: CurrentUser,
) -> Result<Json<PointTransactionResponse>> {
    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let transaction = Ledger::new(&mut conn).get_transaction_by_id(transaction_id).await?;

    let has_read_all = permissions::has_permission(&current_user, Resource::Points, Operation::ReadAll);

    match transaction {
        Some(tx) if has_read_all || tx.user_id == current_user.id => Ok(Json(PointTransactionResponse::from(tx))),
        // Return 404 to avoid leaking existence
        _ => Err(Error::NotFound {
            resource: "transaction".to_string(),
            id: transaction_id.to_string(),
        }),
    }
}

/// List point transactions
#[utoipa::path(
    get,
    path = "/transactions",
    tag = "transactions",
    summary = "List point transactions",
    description = "Newest first. Users without read-all access see only their own ledger; the user_id filter is restricted accordingly.",
    params(
        ListTransactionsQuery
    ),
    responses(
        (status = 200, description = "List of transactions", body = [PointTransactionResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - cannot access other users' transactions"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListTransactionsQuery>,
    current_user: CurrentUser,
) -> Result<Json<Vec<PointTransactionResponse>>> {
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(100).min(1000);

    let has_read_all = permissions::has_permission(&current_user, Resource::Points, Operation::ReadAll);

    let filter_user_id = match query.user_id {
        Some(requested_user_id) => {
            if !has_read_all && requested_user_id != current_user.id {
                return Err(Error::InsufficientPermissions {
                    required: Permission::Allow(Resource::Points, Operation::ReadAll),
                    action: Operation::ReadAll,
                    resource: "transactions".to_string(),
                });
            }
            Some(requested_user_id)
        }
        None => {
            if has_read_all {
                None
            } else {
                Some(current_user.id)
            }
        }
    };

    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let mut ledger = Ledger::new(&mut conn);

    let transactions = if let Some(user_id) = filter_user_id {
        ledger.list_user_transactions(user_id, skip, limit).await?
    } else {
        ledger.list_all_transactions(skip, limit).await?
    };

    Ok(Json(transactions.into_iter().map(PointTransactionResponse::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::models::users::Role, db::models::points::TransactionKind, test_utils::*};
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_admin_can_adjust_points(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_user(&pool, Role::Admin).await;
        let user = create_test_user(&pool, Role::Advertiser).await;

        let response = app
            .post("/admin/api/v1/transactions")
            .add_header(add_auth_headers(&admin).0, add_auth_headers(&admin).1)
            .json(&json!({
                "user_id": user.id.to_string(),
                "amount": 300,
                "description": "onboarding grant"
            }))
            .await;

        response.assert_status(axum::http::StatusCode::CREATED);
        let adjustment: PointAdjustmentResponse = response.json();
        assert_eq!(adjustment.transaction.user_id, user.id);
        assert_eq!(adjustment.transaction.kind, TransactionKind::AdminAdd);
        assert_eq!(adjustment.transaction.amount, 300);
        assert_eq!(adjustment.transaction.balance_after, 300);
        assert_eq!(adjustment.transaction.actor_id, Some(admin.id));
        assert_eq!(adjustment.new_balance.available_points, 300);
        assert_eq!(adjustment.new_balance.total_earned, 300);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_operator_cannot_adjust_points(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let operator = create_test_user(&pool, Role::Operator).await;
        let user = create_test_user(&pool, Role::Advertiser).await;

        let response = app
            .post("/admin/api/v1/transactions")
            .add_header(add_auth_headers(&operator).0, add_auth_headers(&operator).1)
            .json(&json!({"user_id": user.id.to_string(), "amount": 300}))
            .await;

        response.assert_status_forbidden();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_negative_adjustment_cannot_overdraw(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_user(&pool, Role::Admin).await;
        let user = create_test_user(&pool, Role::Advertiser).await;
        grant_points(&pool, user.id, 50).await;

        let response = app
            .post("/admin/api/v1/transactions")
            .add_header(add_auth_headers(&admin).0, add_auth_headers(&admin).1)
            .json(&json!({"user_id": user.id.to_string(), "amount": -80}))
            .await;

        response.assert_status(axum::http::StatusCode::CONFLICT);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"], "insufficient_funds");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_transactions_scoped_to_own(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let user1 = create_test_user(&pool, Role::Advertiser).await;
        let user2 = create_test_user(&pool, Role::Advertiser).await;
        grant_points(&pool, user1.id, 100).await;
        grant_points(&pool, user2.id, 200).await;

        let response = app
            .get("/admin/api/v1/transactions")
            .add_header(add_auth_headers(&user1).0, add_auth_headers(&user1).1)
            .await;
        response.assert_status_ok();
        let transactions: Vec<PointTransactionResponse> = response.json();
        assert!(!transactions.is_empty());
        assert!(transactions.iter().all(|t| t.user_id == user1.id));

        // Explicitly requesting another user's ledger is forbidden
        let response = app
            .get(&format!("/admin/api/v1/transactions?user_id={}", user2.id))
            .add_header(add_auth_headers(&user1).0, add_auth_headers(&user1).1)
            .await;
        response.assert_status_forbidden();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_other_user_transaction_returns_404(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let user1 = create_test_user(&pool, Role::Advertiser).await;
        let user2 = create_test_user(&pool, Role::Advertiser).await;
        grant_points(&pool, user2.id, 200).await;

        let response = app
            .get("/admin/api/v1/transactions")
            .add_header(add_auth_headers(&user2).0, add_auth_headers(&user2).1)
            .await;
        let transactions: Vec<PointTransactionResponse> = response.json();
        let transaction_id = transactions[0].id;

        // Should return 404 (not 403) to avoid leaking transaction existence
        let response = app
            .get(&format!("/admin/api/v1/transactions/{transaction_id}"))
            .add_header(add_auth_headers(&user1).0, add_auth_headers(&user1).1)
            .await;
        response.assert_status_not_found();
    }
}
