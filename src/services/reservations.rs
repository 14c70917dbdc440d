//! Reservation ledger
//!
//! Owns the reservation lifecycle and keeps book statuses in step with it:
//! a book is Allocated exactly when a confirmed reservation references it.
//! Book and reservation rows are written independently, so when the second
//! write of a pair fails the caller gets [`AppError::PartialFailure`] and the
//! divergence can be found again with [`ReservationsService::audit`].

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use super::{
    clock::Clock,
    notifier::{ChangeAction, ChangeNotifier, ChangeTable},
};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookStatus},
        reservation::{
            time_remaining, AllocateBook, Allocation, CancelOutcome, ConsistencyReport,
            CreateReservation, NewReservation, ReleaseOutcome, RepairReport, Reservation,
            ReservationDetails, ReservationFilter, ReservationQuery, ReservationStatus,
            ReservationUpdate, TimeRemaining,
        },
        user::Actor,
    },
    repository::{BookStore, ReservationStore},
};

#[derive(Clone)]
pub struct ReservationsService {
    books: Arc<dyn BookStore>,
    reservations: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    notifier: ChangeNotifier,
    max_age: Duration,
}

/// Cache key for resolving the book behind a list of reservations
#[derive(Hash, PartialEq, Eq)]
enum BookKey {
    Id(Uuid),
    SrNo(String),
}

impl ReservationsService {
    pub fn new(
        books: Arc<dyn BookStore>,
        reservations: Arc<dyn ReservationStore>,
        clock: Arc<dyn Clock>,
        notifier: ChangeNotifier,
        max_age: Duration,
    ) -> Self {
        Self {
            books,
            reservations,
            clock,
            notifier,
            max_age,
        }
    }

    /// Expiry threshold for pending reservations
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Countdown for a reservation against the configured threshold
    pub fn time_remaining(&self, reservation: &Reservation) -> TimeRemaining {
        time_remaining(reservation.created_at, self.clock.now(), self.max_age)
    }

    /// Get one reservation with its book
    pub async fn get(&self, id: i32) -> AppResult<ReservationDetails> {
        let reservation = self.require(id).await?;
        let book = self.resolve_book(&reservation).await?;
        Ok(self.details(reservation, book, self.clock.now()))
    }

    /// Active view: everything except archived cancellations, newest first
    pub async fn list(&self, query: &ReservationQuery) -> AppResult<Vec<ReservationDetails>> {
        let statuses = match query.status {
            Some(status) if ReservationStatus::active().contains(&status) => vec![status],
            Some(_) => return Ok(Vec::new()),
            None => ReservationStatus::active().to_vec(),
        };
        let rows = self.reservations.list(&Self::filter(statuses, query)).await?;
        self.attach_books(rows).await
    }

    /// Completed and cancelled reservations, most recently handled first
    pub async fn list_archive(&self, query: &ReservationQuery) -> AppResult<Vec<ReservationDetails>> {
        let statuses = match query.status {
            Some(status) if ReservationStatus::archived().contains(&status) => vec![status],
            Some(_) => return Ok(Vec::new()),
            None => ReservationStatus::archived().to_vec(),
        };
        let mut rows = self.reservations.list(&Self::filter(statuses, query)).await?;
        rows.sort_by(|a, b| {
            let a_at = a.updated_at.unwrap_or(a.created_at);
            let b_at = b.updated_at.unwrap_or(b.created_at);
            b_at.cmp(&a_at).then(b.id.cmp(&a.id))
        });
        self.attach_books(rows).await
    }

    /// Record a new pending reservation for the book carrying `book_sr_no`
    pub async fn create(&self, actor: &Actor, input: CreateReservation) -> AppResult<ReservationDetails> {
        input.validate()?;

        let sr_no = input.book_sr_no.trim();
        let book = self
            .books
            .find_by_sr_no(sr_no)
            .await?
            .ok_or_else(|| AppError::Lookup(format!("No book with serial number {}", sr_no)))?;

        let now = self.clock.now();
        let reservation = self
            .reservations
            .insert(&NewReservation {
                reserver_name: input.reserver_name.trim().to_string(),
                reserver_id: input.reserver_id.trim().to_string(),
                reserver_role: input.reserver_role,
                book_name: book.name.clone(),
                book_sr_no: sr_no.to_string(),
                book_id: None,
                status: ReservationStatus::Pending,
                handled_by: actor.user_id,
                created_at: now,
            })
            .await?;
        self.notifier
            .publish(ChangeTable::Reservations, ChangeAction::Insert, Some(reservation.id));

        tracing::info!(
            "{} recorded reservation {} of {} for {}",
            actor.username,
            reservation.id,
            sr_no,
            reservation.reserver_id
        );
        Ok(self.details(reservation, Some(book), now))
    }

    /// Confirm a pending reservation and allocate its book.
    ///
    /// Without `force`, a reserver who already holds a confirmed reservation
    /// is refused and nothing is written.
    pub async fn confirm(&self, actor: &Actor, id: i32, force: bool) -> AppResult<Allocation> {
        let reservation = self.require(id).await?;
        if !reservation.is_pending() {
            return Err(AppError::BusinessRule(format!(
                "Only pending reservations can be confirmed; reservation {} is {}",
                id, reservation.status
            )));
        }

        let sr_no = reservation.book_sr_no.trim();
        if sr_no.is_empty() {
            return Err(AppError::Validation(
                "Reservation has no book serial number".to_string(),
            ));
        }

        let overrode_conflict = self
            .check_reserver(&reservation.reserver_id, &reservation.reserver_name, force)
            .await?;

        let mut book = self
            .books
            .find_by_sr_no(sr_no)
            .await?
            .ok_or_else(|| AppError::Lookup(format!("No book with serial number {}", sr_no)))?;

        let confirmed = self
            .reservations
            .update(
                id,
                &ReservationUpdate {
                    status: ReservationStatus::Confirmed,
                    book_id: Some(book.book_id),
                    handled_by: actor.user_id,
                    updated_at: self.clock.now(),
                },
            )
            .await?;
        self.notifier
            .publish(ChangeTable::Reservations, ChangeAction::Update, Some(id));

        if let Err(e) = self.books.set_status(book.id, BookStatus::Allocated).await {
            tracing::error!(
                "Reservation {} confirmed by {} but book {} stayed Available: {}",
                id,
                actor.username,
                book.id,
                e
            );
            return Err(AppError::PartialFailure(format!(
                "Reservation confirmed but failed to update book status for \"{}\" ({})",
                book.name, e
            )));
        }
        book.status = BookStatus::Allocated;
        self.notifier
            .publish(ChangeTable::Books, ChangeAction::Update, Some(book.id));

        if overrode_conflict {
            tracing::warn!(
                "{} confirmed reservation {} for {} despite an existing confirmed reservation",
                actor.username,
                id,
                confirmed.reserver_id
            );
        } else {
            tracing::info!("{} confirmed reservation {}", actor.username, id);
        }

        Ok(Allocation {
            reservation: confirmed,
            book: book.summary(),
            overrode_conflict,
        })
    }

    /// Cancel a reservation.
    ///
    /// A confirmed reservation is kept as `deleted` and frees its book
    /// unless another confirmed reservation still holds it; anything else
    /// is removed outright.
    pub async fn cancel(&self, actor: &Actor, id: i32) -> AppResult<CancelOutcome> {
        let reservation = self.require(id).await?;

        if !reservation.is_confirmed() {
            self.reservations.delete(id).await?;
            self.notifier
                .publish(ChangeTable::Reservations, ChangeAction::Delete, Some(id));
            tracing::info!(
                "{} removed {} reservation {}",
                actor.username,
                reservation.status,
                id
            );
            return Ok(CancelOutcome::Removed { id });
        }

        let book_released = match self.resolve_book(&reservation).await? {
            Some(book) => {
                let other_holders = self
                    .reservations
                    .list(&ReservationFilter::with_statuses(&[ReservationStatus::Confirmed]))
                    .await?
                    .into_iter()
                    .filter(|r| r.id != id && r.references(&book))
                    .count();

                if other_holders > 0 {
                    tracing::info!(
                        "Book {} stays Allocated for {} other confirmed reservation(s)",
                        book.id,
                        other_holders
                    );
                    false
                } else {
                    self.books.set_status(book.id, BookStatus::Available).await?;
                    self.notifier
                        .publish(ChangeTable::Books, ChangeAction::Update, Some(book.id));
                    true
                }
            }
            None => {
                tracing::warn!(
                    "Book {} of reservation {} no longer exists; archiving anyway",
                    reservation.book_sr_no,
                    id
                );
                false
            }
        };

        let update = ReservationUpdate {
            status: ReservationStatus::Deleted,
            book_id: None,
            handled_by: actor.user_id,
            updated_at: self.clock.now(),
        };
        let archived = match self.reservations.update(id, &update).await {
            Ok(archived) => archived,
            Err(e) if book_released => {
                tracing::error!(
                    "Book of reservation {} released by {} but the reservation stayed confirmed: {}",
                    id,
                    actor.username,
                    e
                );
                return Err(AppError::PartialFailure(format!(
                    "Book released but failed to archive reservation {} ({})",
                    id, e
                )));
            }
            Err(e) => return Err(e),
        };
        self.notifier
            .publish(ChangeTable::Reservations, ChangeAction::Update, Some(id));

        tracing::info!("{} cancelled confirmed reservation {}", actor.username, id);
        Ok(CancelOutcome::Archived {
            reservation: archived,
            book_released,
        })
    }

    /// Allocate an Available book straight to a reserver, recording a
    /// confirmed reservation for it
    pub async fn allocate_book(
        &self,
        actor: &Actor,
        book_pk: i32,
        input: AllocateBook,
    ) -> AppResult<Allocation> {
        input.validate()?;

        let mut book = self.require_book(book_pk).await?;
        if book.is_allocated() {
            return Err(AppError::BusinessRule(format!(
                "\"{}\" is already allocated",
                book.name
            )));
        }
        let sr_no = book
            .sr_no
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::Validation(format!("\"{}\" has no serial number", book.name))
            })?;

        let reserver_name = input.reserver_name.trim();
        let reserver_id = input.reserver_id.trim();
        let overrode_conflict = self
            .check_reserver(reserver_id, reserver_name, input.force)
            .await?;

        let reservation = self
            .reservations
            .insert(&NewReservation {
                reserver_name: reserver_name.to_string(),
                reserver_id: reserver_id.to_string(),
                reserver_role: input.reserver_role,
                book_name: book.name.clone(),
                book_sr_no: sr_no,
                book_id: Some(book.book_id),
                status: ReservationStatus::Confirmed,
                handled_by: actor.user_id,
                created_at: self.clock.now(),
            })
            .await?;
        self.notifier
            .publish(ChangeTable::Reservations, ChangeAction::Insert, Some(reservation.id));

        if let Err(e) = self.books.set_status(book.id, BookStatus::Allocated).await {
            tracing::error!(
                "Reservation {} recorded by {} but book {} stayed Available: {}",
                reservation.id,
                actor.username,
                book.id,
                e
            );
            return Err(AppError::PartialFailure(format!(
                "Reservation recorded but failed to update book status for \"{}\" ({})",
                book.name, e
            )));
        }
        book.status = BookStatus::Allocated;
        self.notifier
            .publish(ChangeTable::Books, ChangeAction::Update, Some(book.id));

        tracing::info!(
            "{} allocated book {} to {}",
            actor.username,
            book.id,
            reservation.reserver_id
        );
        Ok(Allocation {
            reservation,
            book: book.summary(),
            overrode_conflict,
        })
    }

    /// Flip a book back to Available, archiving every confirmed reservation
    /// that holds it
    pub async fn release_book(&self, actor: &Actor, book_pk: i32) -> AppResult<ReleaseOutcome> {
        let mut book = self.require_book(book_pk).await?;

        let holders: Vec<Reservation> = self
            .reservations
            .list(&ReservationFilter::with_statuses(&[ReservationStatus::Confirmed]))
            .await?
            .into_iter()
            .filter(|r| r.references(&book))
            .collect();

        let mut archived_reservations = Vec::with_capacity(holders.len());
        for holder in holders {
            self.cancel(actor, holder.id).await?;
            archived_reservations.push(holder.id);
        }

        if archived_reservations.is_empty() && book.is_allocated() {
            tracing::warn!("Book {} was Allocated without a confirmed reservation", book.id);
            self.books.set_status(book.id, BookStatus::Available).await?;
            self.notifier
                .publish(ChangeTable::Books, ChangeAction::Update, Some(book.id));
        }
        book.status = BookStatus::Available;

        Ok(ReleaseOutcome {
            book: book.summary(),
            archived_reservations,
        })
    }

    /// Remove pending reservations older than `max_age`; returns how many went
    pub async fn sweep_expired(&self, actor: &Actor, max_age: Duration) -> AppResult<u64> {
        let cutoff = self.clock.now() - max_age;
        let removed = self.reservations.delete_pending_created_before(cutoff).await?;
        if removed > 0 {
            self.notifier
                .publish(ChangeTable::Reservations, ChangeAction::Delete, None);
            tracing::info!("{} swept {} expired pending reservations", actor.username, removed);
        }
        Ok(removed)
    }

    /// Sweep with the configured threshold
    pub async fn sweep(&self, actor: &Actor) -> AppResult<u64> {
        self.sweep_expired(actor, self.max_age).await
    }

    /// Compare book statuses against confirmed reservations
    pub async fn audit(&self) -> AppResult<ConsistencyReport> {
        let confirmed = self
            .reservations
            .list(&ReservationFilter::with_statuses(&[ReservationStatus::Confirmed]))
            .await?;

        let mut report = ConsistencyReport::default();
        for book in self.books.list_by_status(BookStatus::Allocated).await? {
            if !confirmed.iter().any(|r| r.references(&book)) {
                report.orphaned_allocations.push(book.summary());
            }
        }

        for reservation in confirmed {
            match self.resolve_book(&reservation).await? {
                None => report.unresolved.push(reservation),
                Some(book) if !book.is_allocated() => report.unallocated_loans.push(reservation),
                Some(_) => {}
            }
        }

        Ok(report)
    }

    /// Rewrite book statuses so they agree with the confirmed reservations
    pub async fn repair(&self, actor: &Actor) -> AppResult<RepairReport> {
        let report = self.audit().await?;
        let mut repair = RepairReport::default();

        for book in &report.orphaned_allocations {
            self.books.set_status(book.id, BookStatus::Available).await?;
            self.notifier
                .publish(ChangeTable::Books, ChangeAction::Update, Some(book.id));
            repair.released_books.push(book.id);
        }

        for reservation in &report.unallocated_loans {
            if let Some(book) = self.resolve_book(reservation).await? {
                self.books.set_status(book.id, BookStatus::Allocated).await?;
                self.notifier
                    .publish(ChangeTable::Books, ChangeAction::Update, Some(book.id));
                repair.allocated_books.push(book.id);
            }
        }

        repair.unresolved_reservations = report.unresolved.iter().map(|r| r.id).collect();

        tracing::info!(
            "{} repaired book statuses: {} released, {} allocated, {} unresolved",
            actor.username,
            repair.released_books.len(),
            repair.allocated_books.len(),
            repair.unresolved_reservations.len()
        );
        Ok(repair)
    }

    /// Returns whether a conflict was overridden
    async fn check_reserver(&self, reserver_id: &str, reserver_name: &str, force: bool) -> AppResult<bool> {
        let held = self
            .reservations
            .list(&ReservationFilter::confirmed_for_reserver(reserver_id))
            .await?;

        match held.first() {
            None => Ok(false),
            Some(_) if force => Ok(true),
            Some(existing) => Err(AppError::ReserverConflict {
                reserver_name: reserver_name.to_string(),
                held_book: existing.book_name.clone(),
            }),
        }
    }

    async fn require(&self, id: i32) -> AppResult<Reservation> {
        self.reservations
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    async fn require_book(&self, id: i32) -> AppResult<Book> {
        self.books
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// The book a reservation points at: by `book_id` once confirmed, else by serial number
    async fn resolve_book(&self, reservation: &Reservation) -> AppResult<Option<Book>> {
        match Self::book_key(reservation) {
            Some(BookKey::Id(book_id)) => self.books.find_by_book_id(book_id).await,
            Some(BookKey::SrNo(sr_no)) => self.books.find_by_sr_no(&sr_no).await,
            None => Ok(None),
        }
    }

    fn book_key(reservation: &Reservation) -> Option<BookKey> {
        if let Some(book_id) = reservation.book_id {
            return Some(BookKey::Id(book_id));
        }
        let sr_no = reservation.book_sr_no.trim();
        (!sr_no.is_empty()).then(|| BookKey::SrNo(sr_no.to_string()))
    }

    async fn attach_books(&self, rows: Vec<Reservation>) -> AppResult<Vec<ReservationDetails>> {
        let now = self.clock.now();
        let mut books: HashMap<BookKey, Option<Book>> = HashMap::new();
        let mut details = Vec::with_capacity(rows.len());

        for reservation in rows {
            let book = match Self::book_key(&reservation) {
                Some(key) => match books.get(&key) {
                    Some(book) => book.clone(),
                    None => {
                        let book = self.resolve_book(&reservation).await?;
                        books.insert(key, book.clone());
                        book
                    }
                },
                None => None,
            };
            details.push(self.details(reservation, book, now));
        }

        Ok(details)
    }

    fn details(&self, reservation: Reservation, book: Option<Book>, now: DateTime<Utc>) -> ReservationDetails {
        let time_remaining = reservation
            .is_pending()
            .then(|| time_remaining(reservation.created_at, now, self.max_age));
        ReservationDetails {
            book: book.as_ref().map(Book::summary),
            time_remaining,
            reservation,
        }
    }

    fn filter(statuses: Vec<ReservationStatus>, query: &ReservationQuery) -> ReservationFilter {
        ReservationFilter {
            statuses,
            reserver_role: query.role,
            search: query
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            ..Default::default()
        }
    }
}
