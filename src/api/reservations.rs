//! Reservation ledger endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::reservation::{
        Allocation, CancelOutcome, ConsistencyReport, CreateReservation, RepairReport,
        ReservationDetails, ReservationQuery, SweepReport,
    },
};

use super::AuthenticatedUser;

/// Confirm request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmRequest {
    /// Confirm even if the reserver already holds a confirmed reservation
    #[serde(default)]
    pub force: bool,
}

/// List active reservations (pending, confirmed, completed)
#[utoipa::path(
    get,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(ReservationQuery),
    responses(
        (status = 200, description = "Active reservations, newest first", body = Vec<ReservationDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_reservations(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<ReservationQuery>,
) -> AppResult<Json<Vec<ReservationDetails>>> {
    let reservations = state.services.reservations.list(&query).await?;
    Ok(Json(reservations))
}

/// List completed and cancelled reservations
#[utoipa::path(
    get,
    path = "/reservations/archive",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(ReservationQuery),
    responses(
        (status = 200, description = "Archived reservations, most recently handled first", body = Vec<ReservationDetails>)
    )
)]
pub async fn list_archive(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<ReservationQuery>,
) -> AppResult<Json<Vec<ReservationDetails>>> {
    let reservations = state.services.reservations.list_archive(&query).await?;
    Ok(Json(reservations))
}

/// Record a pending reservation
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = CreateReservation,
    responses(
        (status = 201, description = "Reservation recorded", body = ReservationDetails),
        (status = 400, description = "Missing fields"),
        (status = 422, description = "No book with that serial number")
    )
)]
pub async fn create_reservation(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateReservation>,
) -> AppResult<(StatusCode, Json<ReservationDetails>)> {
    let created = state
        .services
        .reservations
        .create(&claims.actor(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Get a reservation with its book and countdown
#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation details", body = ReservationDetails),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    let reservation = state.services.reservations.get(id).await?;
    Ok(Json(reservation))
}

/// Confirm a pending reservation and allocate its book
#[utoipa::path(
    post,
    path = "/reservations/{id}/confirm",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    request_body(content = ConfirmRequest, description = "Optional; force defaults to false"),
    responses(
        (status = 200, description = "Reservation confirmed", body = Allocation),
        (status = 409, description = "Reserver already holds a book; retry with force"),
        (status = 422, description = "Not pending, or book cannot be resolved"),
        (status = 500, description = "Reservation confirmed but book status not updated")
    )
)]
pub async fn confirm_reservation(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    request: Option<Json<ConfirmRequest>>,
) -> AppResult<Json<Allocation>> {
    let force = request.map(|Json(r)| r.force).unwrap_or(false);
    let allocation = state
        .services
        .reservations
        .confirm(&claims.actor(), id, force)
        .await?;
    Ok(Json(allocation))
}

/// Cancel a reservation
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Confirmed reservations are archived, others removed", body = CancelOutcome),
        (status = 404, description = "Reservation not found"),
        (status = 500, description = "Book released but reservation not archived")
    )
)]
pub async fn cancel_reservation(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<CancelOutcome>> {
    let outcome = state
        .services
        .reservations
        .cancel(&claims.actor(), id)
        .await?;
    Ok(Json(outcome))
}

/// Remove expired pending reservations now
#[utoipa::path(
    post,
    path = "/reservations/sweep",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Expired reservations removed", body = SweepReport),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn sweep_expired(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<SweepReport>> {
    claims.require_admin()?;

    let ledger = &state.services.reservations;
    let removed = ledger.sweep(&claims.actor()).await?;
    Ok(Json(SweepReport {
        removed,
        max_age_hours: ledger.max_age().num_hours(),
    }))
}

/// Report books whose status disagrees with the confirmed reservations
#[utoipa::path(
    get,
    path = "/reservations/consistency",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Consistency report", body = ConsistencyReport)
    )
)]
pub async fn audit_consistency(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<ConsistencyReport>> {
    let report = state.services.reservations.audit().await?;
    Ok(Json(report))
}

/// Reset book statuses to match the confirmed reservations
#[utoipa::path(
    post,
    path = "/reservations/consistency/repair",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Statuses rewritten", body = RepairReport),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn repair_consistency(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<RepairReport>> {
    claims.require_admin()?;

    let report = state
        .services
        .reservations
        .repair(&claims.actor())
        .await?;
    Ok(Json(report))
}
