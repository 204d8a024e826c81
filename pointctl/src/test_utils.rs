use crate::{
    api::models::users::{Role, UserResponse},
    auth::USER_HEADER,
    config::Config,
    db::handlers::{points::Ledger, settings::Settings, users as user_handlers},
    db::models::users::UserCreateDBRequest,
    types::{PlaceId, ReviewId, UserId},
    urlcheck::{ReviewUrlChecker, StaticUrlChecker},
    workflow, AppState,
};
use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

pub fn create_test_config() -> Config {
    Config {
        port: 0,
        ..Config::default()
    }
}

pub async fn create_test_app(pool: PgPool) -> TestServer {
    create_test_app_with_checker(pool, Arc::new(StaticUrlChecker::alive())).await
}

pub async fn create_test_app_with_checker(pool: PgPool, url_checker: Arc<dyn ReviewUrlChecker>) -> TestServer {
    let state = AppState::builder()
        .db(pool)
        .config(create_test_config())
        .url_checker(url_checker)
        .build();
    let router = crate::build_router(state);
    TestServer::new(router).expect("Failed to create test server")
}

pub async fn create_test_user(pool: &PgPool, role: Role) -> UserResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let user_id = Uuid::new_v4();
    let user = user_handlers::create_user(
        &mut conn,
        UserCreateDBRequest {
            username: format!("testuser_{}", user_id.simple()),
            role,
        },
    )
    .await
    .expect("Failed to create test user");
    UserResponse::from(user)
}

pub async fn create_test_place(pool: &PgPool, owner_id: UserId) -> PlaceId {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    user_handlers::create_place(&mut conn, owner_id, "Test Cafe")
        .await
        .expect("Failed to create test place")
        .id
}

pub async fn grant_points(pool: &PgPool, user_id: UserId, amount: i64) {
    let actor = create_test_user(pool, Role::Admin).await;
    let mut tx = pool.begin().await.expect("Failed to begin transaction");
    Ledger::new(&mut tx)
        .adjust(user_id, amount, "test grant", actor.id)
        .await
        .expect("Failed to grant points");
    tx.commit().await.expect("Failed to commit");
}

pub async fn set_setting(pool: &PgPool, key: &str, value: &str) {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    Settings::new(&mut conn).set(key, value).await.expect("Failed to set setting");
}

pub async fn set_unit_price(pool: &PgPool, unit_price: i64) {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    crate::db::handlers::pricing::Pricing::new(&mut conn)
        .set_unit_price(workflow::WORK_TYPE, unit_price)
        .await
        .expect("Failed to set unit price");
}

pub async fn backdate_submission(pool: &PgPool, review_id: ReviewId, days: i64) {
    sqlx::query("UPDATE receipt_reviews SET submitted_at = NOW() - make_interval(days => $2::int) WHERE id = $1")
        .bind(review_id)
        .bind(days)
        .execute(pool)
        .await
        .expect("Failed to backdate submission");
}

pub fn add_auth_headers(user: &UserResponse) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(USER_HEADER),
        HeaderValue::from_str(&user.username).expect("Username is not a valid header value"),
    )
}

pub fn acting_for_header(user_id: UserId) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static(crate::auth::ACTING_FOR_HEADER),
        HeaderValue::from_str(&user_id.to_string()).expect("User id is not a valid header value"),
    )
}
