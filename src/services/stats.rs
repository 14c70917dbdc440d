//! Dashboard statistics service

use crate::{
    api::stats::{ArchiveStats, BookStats, ReservationStats, StatsResponse},
    error::AppResult,
    models::{
        book::BookStatus,
        reservation::{ReservationStatus, ReserverRole},
    },
    repository::Repository,
};

/// Number of recently added books shown on the dashboard
const RECENT_BOOKS: i64 = 5;

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
}

impl StatsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Counters shown on the dashboard landing page
    pub async fn get_stats(&self) -> AppResult<StatsResponse> {
        let books = &self.repository.books;
        let reservations = &self.repository.reservations;

        let book_stats = BookStats::new(
            books.count(None).await?,
            books.count(Some(BookStatus::Available)).await?,
            books.count(Some(BookStatus::Allocated)).await?,
        );

        let pending = reservations.count_by_status(ReservationStatus::Pending).await?;
        let confirmed = reservations.count_by_status(ReservationStatus::Confirmed).await?;
        let completed = reservations.count_by_status(ReservationStatus::Completed).await?;
        let deleted = reservations.count_by_status(ReservationStatus::Deleted).await?;

        let reservation_stats = ReservationStats {
            // Completed reservations still show in the active list
            total: pending + confirmed + completed,
            pending,
            confirmed,
            students: reservations.count_active_by_role(ReserverRole::Student).await?,
            teachers: reservations.count_active_by_role(ReserverRole::Teacher).await?,
        };

        let archive_stats = ArchiveStats {
            total: completed + deleted,
            completed,
            deleted,
        };

        let recent_books = books
            .recent(RECENT_BOOKS)
            .await?
            .iter()
            .map(|b| b.summary())
            .collect();

        Ok(StatsResponse {
            books: book_stats,
            reservations: reservation_stats,
            archive: archive_stats,
            recent_books,
        })
    }
}
