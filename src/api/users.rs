//! Staff account management endpoints (admin only)

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::user::{CreateUser, User},
};

use super::AuthenticatedUser;

/// List staff accounts
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Staff accounts", body = Vec<User>),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn list_users(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<Vec<User>>> {
    claims.require_admin()?;

    let users = state.services.users.list_users().await?;
    Ok(Json(users))
}

/// Create a staff account
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateUser,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin access required"),
        (status = 409, description = "Username already exists")
    )
)]
pub async fn create_user(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(user): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    claims.require_admin()?;

    let created = state.services.users.create_user(user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
