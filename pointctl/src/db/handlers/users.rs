use crate::{
    db::models::users::{PlaceDBResponse, UserCreateDBRequest, UserDBResponse},
    errors::Result,
    types::{PlaceId, UserId},
};
use sqlx::PgConnection;

pub async fn create_user(db: &mut PgConnection, request: UserCreateDBRequest) -> Result<UserDBResponse> {
    let user = sqlx::query_as::<_, UserDBResponse>(
        "INSERT INTO users (username, role) VALUES ($1, $2)
         RETURNING id, username, role, created_at",
    )
    .bind(&request.username)
    .bind(request.role)
    .fetch_one(db)
    .await?;
    Ok(user)
}

pub async fn get_user_by_id(db: &mut PgConnection, user_id: UserId) -> Result<Option<UserDBResponse>> {
    let user = sqlx::query_as::<_, UserDBResponse>(
        "SELECT id, username, role, created_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn get_user_by_username(db: &mut PgConnection, username: &str) -> Result<Option<UserDBResponse>> {
    let user = sqlx::query_as::<_, UserDBResponse>(
        "SELECT id, username, role, created_at FROM users WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(db)
    .await?;
    Ok(user)
}

pub async fn create_place(db: &mut PgConnection, owner_id: UserId, name: &str) -> Result<PlaceDBResponse> {
    let place = sqlx::query_as::<_, PlaceDBResponse>(
        "INSERT INTO places (owner_id, name) VALUES ($1, $2)
         RETURNING id, owner_id, name, created_at",
    )
    .bind(owner_id)
    .bind(name)
    .fetch_one(db)
    .await?;
    Ok(place)
}

pub async fn get_place_by_id(db: &mut PgConnection, place_id: PlaceId) -> Result<Option<PlaceDBResponse>> {
    let place = sqlx::query_as::<_, PlaceDBResponse>(
        "SELECT id, owner_id, name, created_at FROM places WHERE id = $1",
    )
    .bind(place_id)
    .fetch_optional(db)
    .await?;
    Ok(place)
}
