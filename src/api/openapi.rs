//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, events, health, reservations, stats, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shelfdesk API",
        version = "0.3.0",
        description = "Library reservation desk REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::me,
        auth::update_username,
        auth::change_password,
        // Users
        users::list_users,
        users::create_user,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::list_departments,
        books::delete_department,
        books::allocate_book,
        books::release_book,
        // Reservations
        reservations::list_reservations,
        reservations::list_archive,
        reservations::create_reservation,
        reservations::get_reservation,
        reservations::confirm_reservation,
        reservations::cancel_reservation,
        reservations::sweep_expired,
        reservations::audit_consistency,
        reservations::repair_consistency,
        // Stats
        stats::get_stats,
        // Events
        events::change_feed,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            // Users
            crate::models::user::User,
            crate::models::user::StaffRole,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUsername,
            crate::models::user::ChangePassword,
            // Books
            crate::models::book::Book,
            crate::models::book::BookStatus,
            crate::models::book::BookSummary,
            crate::models::book::BookHolder,
            crate::models::book::BookDetails,
            crate::models::book::BookList,
            crate::models::book::BookQuery,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::DepartmentDeletion,
            // Reservations
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationStatus,
            crate::models::reservation::ReserverRole,
            crate::models::reservation::ReservationDetails,
            crate::models::reservation::ReservationQuery,
            crate::models::reservation::CreateReservation,
            crate::models::reservation::AllocateBook,
            crate::models::reservation::Allocation,
            crate::models::reservation::CancelOutcome,
            crate::models::reservation::ReleaseOutcome,
            crate::models::reservation::SweepReport,
            crate::models::reservation::ConsistencyReport,
            crate::models::reservation::RepairReport,
            crate::models::reservation::TimeRemainingBody,
            reservations::ConfirmRequest,
            // Stats
            stats::StatsResponse,
            stats::BookStats,
            stats::ReservationStats,
            stats::ArchiveStats,
            // Events
            crate::services::notifier::ChangeEvent,
            crate::services::notifier::ChangeTable,
            crate::services::notifier::ChangeAction,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication and own account"),
        (name = "users", description = "Staff account management"),
        (name = "books", description = "Book catalog"),
        (name = "reservations", description = "Reservation ledger"),
        (name = "stats", description = "Dashboard statistics"),
        (name = "events", description = "Live change feed")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by the secured paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
