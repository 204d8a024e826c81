use crate::{
    api::models::{
        balances::PointBalanceResponse,
        users::{ActingAs, CurrentUser},
    },
    auth::permissions,
    db::handlers::points::Ledger,
    errors::{Error, Result},
    types::{Operation, Permission, Resource, UserIdOrCurrent},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::Json,
};

/// Get a user's point balance
#[utoipa::path(
    get,
    path = "/balances/{user_id}",
    tag = "balances",
    summary = "Get a point balance",
    description = "Get the three-bucket point balance for a user. Pass `current` to resolve the authenticated user (or the impersonated user when acting on someone's behalf).",
    params(
        ("user_id" = String, Path, description = "User ID, or the literal `current`"),
    ),
    responses(
        (status = 200, description = "Point balance", body = PointBalanceResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - cannot read other users' balances"),
        (status = 500, description = "Internal server error"),
    ),
    security(
        ("X-Pointctl-User" = [])
    )
)]
pub async fn get_balance(
    State(state): State<AppState>,
    Path(user_id): Path<UserIdOrCurrent>,
    current_user: CurrentUser,
    acting_as: Option<ActingAs>,
) -> Result<Json<PointBalanceResponse>> {
    let target = match user_id {
        UserIdOrCurrent::Current(_) => acting_as.map(|a| a.user_id).unwrap_or(current_user.id),
        UserIdOrCurrent::Id(id) => id,
    };

    if target != current_user.id && !permissions::has_permission(&current_user, Resource::Points, Operation::ReadAll) {
        return Err(Error::InsufficientPermissions {
            required: Permission::Allow(Resource::Points, Operation::ReadAll),
            action: Operation::ReadAll,
            resource: "balances".to_string(),
        });
    }

    let mut conn = state.db.acquire().await.map_err(crate::db::errors::DbError::from)?;
    let balance = Ledger::new(&mut conn).get_balance(target).await?;
    Ok(Json(PointBalanceResponse::from(balance)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::models::users::Role, test_utils::*};
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_current_resolves_authenticated_user(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, Role::Advertiser).await;
        grant_points(&pool, user.id, 250).await;

        let response = app
            .get("/admin/api/v1/balances/current")
            .add_header(add_auth_headers(&user).0, add_auth_headers(&user).1)
            .await;
        response.assert_status_ok();
        let balance: PointBalanceResponse = response.json();
        assert_eq!(balance.user_id, user.id);
        assert_eq!(balance.available_points, 250);
        assert_eq!(balance.total_earned, 250);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_reading_another_balance_requires_read_all(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, Role::Advertiser).await;
        let other = create_test_user(&pool, Role::Advertiser).await;
        let operator = create_test_user(&pool, Role::Operator).await;
        grant_points(&pool, other.id, 100).await;

        let response = app
            .get(&format!("/admin/api/v1/balances/{}", other.id))
            .add_header(add_auth_headers(&user).0, add_auth_headers(&user).1)
            .await;
        response.assert_status_forbidden();

        let response = app
            .get(&format!("/admin/api/v1/balances/{}", other.id))
            .add_header(add_auth_headers(&operator).0, add_auth_headers(&operator).1)
            .await;
        response.assert_status_ok();
        let balance: PointBalanceResponse = response.json();
        assert_eq!(balance.user_id, other.id);
        assert_eq!(balance.available_points, 100);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_acting_for_resolves_current_to_target(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_user(&pool, Role::Admin).await;
        let advertiser = create_test_user(&pool, Role::Advertiser).await;
        grant_points(&pool, advertiser.id, 75).await;

        let response = app
            .get("/admin/api/v1/balances/current")
            .add_header(add_auth_headers(&admin).0, add_auth_headers(&admin).1)
            .add_header(acting_for_header(advertiser.id).0, acting_for_header(advertiser.id).1)
            .await;
        response.assert_status_ok();
        let balance: PointBalanceResponse = response.json();
        assert_eq!(balance.user_id, advertiser.id);
        assert_eq!(balance.available_points, 75);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_acting_for_rejected_for_non_staff(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let advertiser = create_test_user(&pool, Role::Advertiser).await;
        let other = create_test_user(&pool, Role::Advertiser).await;

        let response = app
            .get("/admin/api/v1/balances/current")
            .add_header(add_auth_headers(&advertiser).0, add_auth_headers(&advertiser).1)
            .add_header(acting_for_header(other.id).0, acting_for_header(other.id).1)
            .await;
        response.assert_status_forbidden();
    }
}
