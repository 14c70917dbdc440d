//! Repository layer for database operations
//!
//! The reservation ledger only talks to storage through [`BookStore`] and
//! [`ReservationStore`]; the Postgres repositories implement both.

pub mod books;
pub mod reservations;
pub mod users;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookStatus},
        reservation::{NewReservation, Reservation, ReservationFilter, ReservationUpdate},
    },
};

/// Book catalog operations needed by the reservation ledger
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Option<Book>>;

    async fn find_by_sr_no(&self, sr_no: &str) -> AppResult<Option<Book>>;

    async fn find_by_book_id(&self, book_id: Uuid) -> AppResult<Option<Book>>;

    async fn list_by_status(&self, status: BookStatus) -> AppResult<Vec<Book>>;

    async fn set_status(&self, id: i32, status: BookStatus) -> AppResult<()>;
}

/// Reservation ledger storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn get(&self, id: i32) -> AppResult<Option<Reservation>>;

    async fn list(&self, filter: &ReservationFilter) -> AppResult<Vec<Reservation>>;

    async fn insert(&self, reservation: &NewReservation) -> AppResult<Reservation>;

    async fn update(&self, id: i32, update: &ReservationUpdate) -> AppResult<Reservation>;

    async fn delete(&self, id: i32) -> AppResult<()>;

    /// Hard-delete pending reservations created at or before `cutoff`
    async fn delete_pending_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: books::BooksRepository,
    pub reservations: reservations::ReservationsRepository,
    pub users: users::UsersRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: books::BooksRepository::new(pool.clone()),
            reservations: reservations::ReservationsRepository::new(pool.clone()),
            users: users::UsersRepository::new(pool.clone()),
            pool,
        }
    }

    /// Check database connectivity
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Wrap user search text for a substring `ILIKE ... ESCAPE '\'`, so its own
/// `%` and `_` match literally
pub(crate) fn contains_pattern(search: &str) -> String {
    let mut pattern = String::with_capacity(search.len() + 2);
    pattern.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
