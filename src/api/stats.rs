//! Dashboard statistics endpoint

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::AppResult, models::book::BookSummary};

use super::AuthenticatedUser;

/// Statistics response
#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    pub books: BookStats,
    /// Reservations in the active view
    pub reservations: ReservationStats,
    pub archive: ArchiveStats,
    /// Most recently added books
    pub recent_books: Vec<BookSummary>,
}

#[derive(Serialize, ToSchema)]
pub struct BookStats {
    pub total: i64,
    pub available: i64,
    pub allocated: i64,
    /// Allocated share of the catalog, as a rounded percentage
    pub allocation_rate: i64,
}

impl BookStats {
    pub fn new(total: i64, available: i64, allocated: i64) -> Self {
        let allocation_rate = if total > 0 {
            (allocated * 100 + total / 2) / total
        } else {
            0
        };
        Self {
            total,
            available,
            allocated,
            allocation_rate,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ReservationStats {
    /// Every reservation not cancelled
    pub total: i64,
    pub pending: i64,
    pub confirmed: i64,
    pub students: i64,
    pub teachers: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ArchiveStats {
    pub total: i64,
    pub completed: i64,
    /// Cancelled confirmed reservations
    pub deleted: i64,
}

/// Get dashboard statistics
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard statistics", body = StatsResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<StatsResponse>> {
    let stats = state.services.stats.get_stats().await?;
    Ok(Json(stats))
}
