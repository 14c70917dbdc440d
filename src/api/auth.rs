//! Authentication and own-account endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::user::{ChangePassword, UpdateUsername, User},
};

use super::AuthenticatedUser;

/// Login request
#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Login response with a bearer token
#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    /// JWT access token
    pub token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Token lifetime in seconds
    pub expires_in: i64,
    pub user: User,
}

/// Log in with username and password
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<crate::AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let users = &state.services.users;
    let (token, user) = users.authenticate(&request.username, &request.password).await?;

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in: users.token_lifetime(),
        user,
    }))
}

/// Current user
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<User>> {
    let user = state.services.users.get_by_id(claims.user_id).await?;
    Ok(Json(user))
}

/// Change own username
#[utoipa::path(
    put,
    path = "/auth/username",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = UpdateUsername,
    responses(
        (status = 200, description = "Username changed", body = User),
        (status = 400, description = "Invalid username"),
        (status = 409, description = "Username already exists")
    )
)]
pub async fn update_username(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<UpdateUsername>,
) -> AppResult<Json<User>> {
    let user = state
        .services
        .users
        .update_username(claims.user_id, request)
        .await?;
    Ok(Json(user))
}

/// Change own password
#[utoipa::path(
    put,
    path = "/auth/password",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = ChangePassword,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Current password wrong or new password invalid")
    )
)]
pub async fn change_password(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<ChangePassword>,
) -> AppResult<StatusCode> {
    state
        .services
        .users
        .change_password(claims.user_id, request)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
