//! Reservations repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use super::{contains_pattern, ReservationStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::BookHolder,
        reservation::{
            NewReservation, Reservation, ReservationFilter, ReservationStatus, ReservationUpdate,
            ReserverRole,
        },
    },
};

const RESERVATION_COLUMNS: &str = r#"
    id, reserver_name, reserver_id, reserver_role, book_name, book_sr_no, book_id,
    status, handled_by, created_at, updated_at
"#;

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// List reservations matching `filter`, newest first
    async fn search(&self, filter: &ReservationFilter) -> AppResult<Vec<Reservation>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(contains_pattern);

        let mut conditions = Vec::new();
        if !filter.statuses.is_empty() {
            conditions.push(format!("status = ANY(${})", conditions.len() + 1));
        }
        if filter.reserver_id.is_some() {
            conditions.push(format!("reserver_id = ${}", conditions.len() + 1));
        }
        if filter.reserver_role.is_some() {
            conditions.push(format!("reserver_role = ${}", conditions.len() + 1));
        }
        if filter.book_id.is_some() {
            conditions.push(format!("book_id = ${}", conditions.len() + 1));
        }
        if filter.book_sr_no.is_some() {
            conditions.push(format!("book_sr_no = ${}", conditions.len() + 1));
        }
        if search.is_some() {
            let idx = conditions.len() + 1;
            conditions.push(format!(
                "(reserver_name ILIKE ${0} ESCAPE '\\' OR reserver_id ILIKE ${0} ESCAPE '\\' \
                 OR book_name ILIKE ${0} ESCAPE '\\')",
                idx
            ));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let query = format!(
            "SELECT {} FROM reservations {} ORDER BY created_at DESC, id DESC",
            RESERVATION_COLUMNS, where_clause
        );

        let statuses: Vec<String> = filter
            .statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let mut builder = sqlx::query_as::<_, Reservation>(&query);
        if !statuses.is_empty() { builder = builder.bind(statuses); }
        if let Some(ref reserver_id) = filter.reserver_id { builder = builder.bind(reserver_id); }
        if let Some(role) = filter.reserver_role { builder = builder.bind(role); }
        if let Some(book_id) = filter.book_id { builder = builder.bind(book_id); }
        if let Some(ref sr_no) = filter.book_sr_no { builder = builder.bind(sr_no); }
        if let Some(ref s) = search { builder = builder.bind(s); }

        let reservations = builder.fetch_all(&self.pool).await?;
        Ok(reservations)
    }

    /// Confirmed reservations holding any of the given books
    pub async fn confirmed_holders(&self, book_ids: &[Uuid]) -> AppResult<Vec<(Uuid, BookHolder)>> {
        if book_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, reserver_name, reserver_id, book_id
            FROM reservations
            WHERE status = $1 AND book_id = ANY($2)
            ORDER BY id
            "#,
        )
        .bind(ReservationStatus::Confirmed)
        .bind(book_ids)
        .fetch_all(&self.pool)
        .await?;

        let holders = rows
            .into_iter()
            .map(|row| {
                let book_id: Uuid = row.get("book_id");
                (
                    book_id,
                    BookHolder {
                        reservation_id: row.get("id"),
                        reserver_name: row.get("reserver_name"),
                        reserver_id: row.get("reserver_id"),
                    },
                )
            })
            .collect();

        Ok(holders)
    }

    /// Count reservations with the given status
    pub async fn count_by_status(&self, status: ReservationStatus) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reservations WHERE status = $1")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Count non-archived reservations for a reserver role
    pub async fn count_active_by_role(&self, role: ReserverRole) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE reserver_role = $1 AND status <> $2",
        )
        .bind(role)
        .bind(ReservationStatus::Deleted)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[async_trait]
impl ReservationStore for ReservationsRepository {
    async fn get(&self, id: i32) -> AppResult<Option<Reservation>> {
        let query = format!("SELECT {} FROM reservations WHERE id = $1", RESERVATION_COLUMNS);
        let reservation = sqlx::query_as::<_, Reservation>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(reservation)
    }

    async fn list(&self, filter: &ReservationFilter) -> AppResult<Vec<Reservation>> {
        self.search(filter).await
    }

    async fn insert(&self, reservation: &NewReservation) -> AppResult<Reservation> {
        let query = format!(
            r#"
            INSERT INTO reservations (
                reserver_name, reserver_id, reserver_role, book_name, book_sr_no,
                book_id, status, handled_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        );
        let created = sqlx::query_as::<_, Reservation>(&query)
            .bind(&reservation.reserver_name)
            .bind(&reservation.reserver_id)
            .bind(reservation.reserver_role)
            .bind(&reservation.book_name)
            .bind(&reservation.book_sr_no)
            .bind(reservation.book_id)
            .bind(reservation.status)
            .bind(reservation.handled_by)
            .bind(reservation.created_at)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn update(&self, id: i32, update: &ReservationUpdate) -> AppResult<Reservation> {
        let query = format!(
            r#"
            UPDATE reservations SET
                status = $2,
                book_id = COALESCE($3, book_id),
                handled_by = COALESCE($4, handled_by),
                updated_at = $5
            WHERE id = $1
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        );
        sqlx::query_as::<_, Reservation>(&query)
            .bind(id)
            .bind(update.status)
            .bind(update.book_id)
            .bind(update.handled_by)
            .bind(update.updated_at)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Reservation with id {} not found", id)));
        }
        Ok(())
    }

    async fn delete_pending_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM reservations WHERE status = $1 AND created_at <= $2")
            .bind(ReservationStatus::Pending)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
