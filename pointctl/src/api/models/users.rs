use crate::db::models::users::UserDBResponse;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Role enum for different job functions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
pub enum Role {
    Developer,
    Admin,
    Operator,
    Distributor,
    Advertiser,
    Writer,
}

impl Role {
    /// Staff roles review work items and manage other users' points.
    pub fn is_staff(self) -> bool {
        matches!(self, Role::Developer | Role::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            role: db.role,
            created_at: db.created_at,
        }
    }
}

/// The authenticated principal, resolved from the trusted proxy header on
/// every request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: String,
    pub role: Role,
}

impl From<UserDBResponse> for CurrentUser {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            role: db.role,
        }
    }
}

/// Set when a staff user acts on behalf of another user. Carried separately
/// from [`CurrentUser`] so audit fields always record the real operator.
#[derive(Debug, Clone)]
pub struct ActingAs {
    pub user_id: UserId,
}
