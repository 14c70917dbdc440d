//! In-memory stores and a settable clock for service tests

use std::sync::{
    atomic::{AtomicBool, AtomicI32, Ordering},
    Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use super::clock::Clock;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookStatus},
        reservation::{
            NewReservation, Reservation, ReservationFilter, ReservationStatus, ReservationUpdate,
            ReserverRole,
        },
    },
    repository::{BookStore, ReservationStore},
};

pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Books and reservations kept in vectors, with switchable write failures
#[derive(Default)]
pub struct InMemoryLibrary {
    books: Mutex<Vec<Book>>,
    reservations: Mutex<Vec<Reservation>>,
    next_id: AtomicI32,
    pub fail_book_writes: AtomicBool,
    pub fail_reservation_writes: AtomicBool,
}

impl InMemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn add_book(&self, name: &str, sr_no: &str, status: BookStatus) -> Book {
        let book = Book {
            id: self.next_id(),
            book_id: Uuid::new_v4(),
            sr_no: Some(sr_no.to_string()),
            name: name.to_string(),
            author: None,
            department: "Computer Science".to_string(),
            edition: None,
            status,
            uploaded_by: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.books.lock().unwrap().push(book.clone());
        book
    }

    pub fn add_reservation(
        &self,
        reserver: (&str, &str),
        book: &Book,
        status: ReservationStatus,
        created_at: DateTime<Utc>,
    ) -> Reservation {
        let reservation = Reservation {
            id: self.next_id(),
            reserver_name: reserver.0.to_string(),
            reserver_id: reserver.1.to_string(),
            reserver_role: ReserverRole::Student,
            book_name: book.name.clone(),
            book_sr_no: book.sr_no.clone().unwrap_or_default(),
            book_id: (status == ReservationStatus::Confirmed).then_some(book.book_id),
            status,
            handled_by: None,
            created_at,
            updated_at: None,
        };
        self.reservations.lock().unwrap().push(reservation.clone());
        reservation
    }

    pub fn book(&self, id: i32) -> Book {
        self.books
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .expect("book exists")
    }

    pub fn reservation(&self, id: i32) -> Option<Reservation> {
        self.reservations
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.lock().unwrap().len()
    }

    pub fn remove_book(&self, id: i32) {
        self.books.lock().unwrap().retain(|b| b.id != id);
    }

    /// Allocated ⟺ some confirmed reservation references the book
    pub fn allocation_invariant_holds(&self) -> bool {
        let books = self.books.lock().unwrap();
        let reservations = self.reservations.lock().unwrap();
        books.iter().all(|book| {
            let held = reservations
                .iter()
                .any(|r| r.is_confirmed() && r.references(book));
            held == book.is_allocated()
        })
    }

    fn injected(flag: &AtomicBool, what: &str) -> AppResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(AppError::Internal(format!("injected {} failure", what)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BookStore for InMemoryLibrary {
    async fn get(&self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.books.lock().unwrap().iter().find(|b| b.id == id).cloned())
    }

    async fn find_by_sr_no(&self, sr_no: &str) -> AppResult<Option<Book>> {
        Ok(self
            .books
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.sr_no.as_deref() == Some(sr_no))
            .cloned())
    }

    async fn find_by_book_id(&self, book_id: Uuid) -> AppResult<Option<Book>> {
        Ok(self
            .books
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.book_id == book_id)
            .cloned())
    }

    async fn list_by_status(&self, status: BookStatus) -> AppResult<Vec<Book>> {
        Ok(self
            .books
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.status == status)
            .cloned()
            .collect())
    }

    async fn set_status(&self, id: i32, status: BookStatus) -> AppResult<()> {
        Self::injected(&self.fail_book_writes, "book write")?;
        let mut books = self.books.lock().unwrap();
        let book = books
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;
        book.status = status;
        Ok(())
    }
}

#[async_trait]
impl ReservationStore for InMemoryLibrary {
    async fn get(&self, id: i32) -> AppResult<Option<Reservation>> {
        Ok(self.reservation(id))
    }

    async fn list(&self, filter: &ReservationFilter) -> AppResult<Vec<Reservation>> {
        let mut found: Vec<Reservation> = self
            .reservations
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn insert(&self, new: &NewReservation) -> AppResult<Reservation> {
        Self::injected(&self.fail_reservation_writes, "reservation write")?;
        let reservation = Reservation {
            id: self.next_id(),
            reserver_name: new.reserver_name.clone(),
            reserver_id: new.reserver_id.clone(),
            reserver_role: new.reserver_role,
            book_name: new.book_name.clone(),
            book_sr_no: new.book_sr_no.clone(),
            book_id: new.book_id,
            status: new.status,
            handled_by: new.handled_by,
            created_at: new.created_at,
            updated_at: None,
        };
        self.reservations.lock().unwrap().push(reservation.clone());
        Ok(reservation)
    }

    async fn update(&self, id: i32, update: &ReservationUpdate) -> AppResult<Reservation> {
        Self::injected(&self.fail_reservation_writes, "reservation write")?;
        let mut reservations = self.reservations.lock().unwrap();
        let reservation = reservations
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))?;
        reservation.status = update.status;
        if update.book_id.is_some() {
            reservation.book_id = update.book_id;
        }
        if update.handled_by.is_some() {
            reservation.handled_by = update.handled_by;
        }
        reservation.updated_at = Some(update.updated_at);
        Ok(reservation.clone())
    }

    async fn delete(&self, id: i32) -> AppResult<()> {
        Self::injected(&self.fail_reservation_writes, "reservation write")?;
        let mut reservations = self.reservations.lock().unwrap();
        let before = reservations.len();
        reservations.retain(|r| r.id != id);
        if reservations.len() == before {
            return Err(AppError::NotFound(format!("Reservation with id {} not found", id)));
        }
        Ok(())
    }

    async fn delete_pending_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut reservations = self.reservations.lock().unwrap();
        let before = reservations.len();
        reservations.retain(|r| !(r.is_pending() && r.created_at <= cutoff));
        Ok((before - reservations.len()) as u64)
    }
}
