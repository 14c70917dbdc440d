//! API handlers for Shelfdesk REST endpoints

pub mod auth;
pub mod books;
pub mod events;
pub mod health;
pub mod openapi;
pub mod reservations;
pub mod stats;
pub mod users;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{error::AppError, models::user::UserClaims, AppState};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication and own account
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/username", put(auth::update_username))
        .route("/auth/password", put(auth::change_password))
        // Staff accounts
        .route("/users", get(users::list_users).post(users::create_user))
        // Catalog
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/departments", get(books::list_departments))
        .route("/books/departments/:department", delete(books::delete_department))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route("/books/:id/allocate", post(books::allocate_book))
        .route("/books/:id/release", post(books::release_book))
        // Reservation ledger
        .route(
            "/reservations",
            get(reservations::list_reservations).post(reservations::create_reservation),
        )
        .route("/reservations/archive", get(reservations::list_archive))
        .route("/reservations/sweep", post(reservations::sweep_expired))
        .route("/reservations/consistency", get(reservations::audit_consistency))
        .route(
            "/reservations/consistency/repair",
            post(reservations::repair_consistency),
        )
        .route("/reservations/:id", get(reservations::get_reservation))
        .route("/reservations/:id/confirm", post(reservations::confirm_reservation))
        .route("/reservations/:id/cancel", post(reservations::cancel_reservation))
        // Dashboard
        .route("/stats", get(stats::get_stats))
        .route("/events", get(events::change_feed))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::Utc;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        config::AppConfig,
        models::user::StaffRole,
        repository::Repository,
        services::Services,
    };

    fn app() -> (Router, AppConfig) {
        let config = AppConfig::default();
        // Never connects unless a handler reaches the database
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database.url)
            .unwrap();
        let services = Services::new(Repository::new(pool), &config);
        let state = AppState {
            config: Arc::new(config.clone()),
            services: Arc::new(services),
        };
        (create_router(state), config)
    }

    fn token(config: &AppConfig, role: StaffRole) -> String {
        let now = Utc::now().timestamp();
        UserClaims {
            sub: "desk".to_string(),
            user_id: 1,
            role,
            exp: now + 600,
            iat: now,
        }
        .create_token(&config.auth.jwt_secret)
        .unwrap()
    }

    fn request(method: &str, uri: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (app, _) = app();
        let response = app
            .oneshot(request("GET", "/api/v1/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ledger_requires_token() {
        let (app, _) = app();
        let response = app
            .oneshot(request("GET", "/api/v1/reservations", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_rejects_token_signed_with_other_secret() {
        let (app, config) = app();
        let mut other = config.clone();
        other.auth.jwt_secret = "not-the-server-secret".to_string();
        let forged = token(&other, StaffRole::Admin);

        let response = app
            .oneshot(request("POST", "/api/v1/reservations/sweep", Some(&forged)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_admin_routes_refuse_librarians() {
        let (app, config) = app();
        let librarian = token(&config, StaffRole::Librarian);

        for (method, uri) in [
            ("POST", "/api/v1/reservations/sweep"),
            ("POST", "/api/v1/reservations/consistency/repair"),
            ("GET", "/api/v1/users"),
            ("DELETE", "/api/v1/books/3"),
            ("DELETE", "/api/v1/books/departments/Physics"),
        ] {
            let response = app
                .clone()
                .oneshot(request(method, uri, Some(&librarian)))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN, "{} {}", method, uri);
        }
    }

    #[tokio::test]
    async fn test_openapi_document_is_served() {
        let (app, _) = app();
        let response = app
            .oneshot(request("GET", "/api-docs/openapi.json", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
