//! Reservation model, lifecycle states and expiry arithmetic

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::book::{Book, BookSummary};

/// Reservation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    /// Set outside this server; kept and displayed only
    Completed,
    /// Archived cancellation of a confirmed loan
    Deleted,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Deleted => "deleted",
        }
    }

    /// Statuses shown in the completed/archive view
    pub fn archived() -> [ReservationStatus; 2] {
        [ReservationStatus::Completed, ReservationStatus::Deleted]
    }

    /// Statuses shown in the active reservations view
    pub fn active() -> [ReservationStatus; 3] {
        [
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::Completed,
        ]
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(ReservationStatus::Pending),
            "confirmed" => Ok(ReservationStatus::Confirmed),
            "completed" => Ok(ReservationStatus::Completed),
            "deleted" => Ok(ReservationStatus::Deleted),
            _ => Err(format!("Invalid reservation status: {}", s)),
        }
    }
}

impl_pg_text_enum!(ReservationStatus);

/// Who is borrowing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReserverRole {
    Student,
    Teacher,
}

impl ReserverRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReserverRole::Student => "student",
            ReserverRole::Teacher => "teacher",
        }
    }
}

impl std::str::FromStr for ReserverRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(ReserverRole::Student),
            "teacher" => Ok(ReserverRole::Teacher),
            _ => Err(format!("Invalid reserver role: {}", s)),
        }
    }
}

impl_pg_text_enum!(ReserverRole);

/// Reservation model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    pub id: i32,
    pub reserver_name: String,
    /// External student/teacher identifier (not unique)
    pub reserver_id: String,
    pub reserver_role: ReserverRole,
    /// Book name copied at reservation time
    pub book_name: String,
    /// Serial number used to resolve the book when confirming
    pub book_sr_no: String,
    /// Set on confirmation; afterwards the relation to the book
    pub book_id: Option<Uuid>,
    pub status: ReservationStatus,
    /// Staff user who last moved the reservation through the lifecycle
    pub handled_by: Option<i32>,
    /// Reservation date
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Reservation {
    pub fn is_pending(&self) -> bool {
        self.status == ReservationStatus::Pending
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == ReservationStatus::Confirmed
    }

    /// Whether this reservation points at `book`.
    ///
    /// Confirmed reservations carry the stable `book_id`; the serial number is
    /// only consulted when no id has been recorded yet.
    pub fn references(&self, book: &Book) -> bool {
        match self.book_id {
            Some(book_id) => book_id == book.book_id,
            None => book.sr_no.as_deref() == Some(self.book_sr_no.as_str()),
        }
    }
}

/// Fields for a new reservation row
#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub reserver_name: String,
    pub reserver_id: String,
    pub reserver_role: ReserverRole,
    pub book_name: String,
    pub book_sr_no: String,
    pub book_id: Option<Uuid>,
    pub status: ReservationStatus,
    pub handled_by: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle update applied to an existing reservation
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationUpdate {
    pub status: ReservationStatus,
    /// `None` leaves the stored book id untouched
    pub book_id: Option<Uuid>,
    pub handled_by: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

/// Store-level filter; every `Some` field narrows the result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationFilter {
    /// Empty means any status
    pub statuses: Vec<ReservationStatus>,
    pub reserver_id: Option<String>,
    pub reserver_role: Option<ReserverRole>,
    pub book_id: Option<Uuid>,
    pub book_sr_no: Option<String>,
    /// Case-insensitive match on reserver name, reserver id or book name
    pub search: Option<String>,
}

impl ReservationFilter {
    pub fn with_statuses(statuses: &[ReservationStatus]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            ..Default::default()
        }
    }

    /// Confirmed reservations held by one reserver
    pub fn confirmed_for_reserver(reserver_id: &str) -> Self {
        Self {
            statuses: vec![ReservationStatus::Confirmed],
            reserver_id: Some(reserver_id.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, reservation: &Reservation) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&reservation.status) {
            return false;
        }
        if let Some(ref reserver_id) = self.reserver_id {
            if &reservation.reserver_id != reserver_id {
                return false;
            }
        }
        if let Some(role) = self.reserver_role {
            if reservation.reserver_role != role {
                return false;
            }
        }
        if let Some(book_id) = self.book_id {
            if reservation.book_id != Some(book_id) {
                return false;
            }
        }
        if let Some(ref sr_no) = self.book_sr_no {
            if &reservation.book_sr_no != sr_no {
                return false;
            }
        }
        if let Some(ref search) = self.search {
            let needle = search.to_lowercase();
            let hit = reservation.reserver_name.to_lowercase().contains(&needle)
                || reservation.reserver_id.to_lowercase().contains(&needle)
                || reservation.book_name.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Reservation list query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ReservationQuery {
    pub status: Option<ReservationStatus>,
    pub role: Option<ReserverRole>,
    /// Search in reserver name, reserver id and book name
    pub search: Option<String>,
}

/// Create reservation request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateReservation {
    #[validate(length(min = 1, message = "Reserver name is required"))]
    pub reserver_name: String,
    #[validate(length(min = 1, message = "Reserver id is required"))]
    pub reserver_id: String,
    pub reserver_role: ReserverRole,
    #[validate(length(min = 1, message = "Book serial number is required"))]
    pub book_sr_no: String,
}

/// Direct allocation of a book to a reserver
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AllocateBook {
    #[validate(length(min = 1, message = "Reserver name is required"))]
    pub reserver_name: String,
    #[validate(length(min = 1, message = "Reserver id is required"))]
    pub reserver_id: String,
    pub reserver_role: ReserverRole,
    /// Allocate even if the reserver already holds a confirmed reservation
    #[serde(default)]
    pub force: bool,
}

/// Time left before a pending reservation expires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "TimeRemainingBody")]
pub enum TimeRemaining {
    Expired,
    Remaining { hours: i64, minutes: i64, seconds: i64 },
}

impl TimeRemaining {
    pub fn is_expired(&self) -> bool {
        matches!(self, TimeRemaining::Expired)
    }
}

/// Wire shape of [`TimeRemaining`]: `{expired: true}` or `{expired: false, hours, minutes, seconds}`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TimeRemainingBody {
    pub expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<i64>,
}

impl From<TimeRemaining> for TimeRemainingBody {
    fn from(value: TimeRemaining) -> Self {
        match value {
            TimeRemaining::Expired => TimeRemainingBody {
                expired: true,
                hours: None,
                minutes: None,
                seconds: None,
            },
            TimeRemaining::Remaining {
                hours,
                minutes,
                seconds,
            } => TimeRemainingBody {
                expired: false,
                hours: Some(hours),
                minutes: Some(minutes),
                seconds: Some(seconds),
            },
        }
    }
}

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;

/// Remaining validity of a reservation created at `created_at`.
///
/// Expired once `now - created_at >= max_age`. Hours are not rolled over
/// into days.
pub fn time_remaining(created_at: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> TimeRemaining {
    let remaining = max_age - (now - created_at);
    let ms = remaining.num_milliseconds();
    if ms <= 0 {
        return TimeRemaining::Expired;
    }

    TimeRemaining::Remaining {
        hours: ms / MS_PER_HOUR,
        minutes: (ms % MS_PER_HOUR) / MS_PER_MINUTE,
        seconds: (ms % MS_PER_MINUTE) / MS_PER_SECOND,
    }
}

/// Reservation with the book it resolves to and, while pending, its countdown
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReservationDetails {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub book: Option<BookSummary>,
    #[schema(value_type = Option<TimeRemainingBody>)]
    pub time_remaining: Option<TimeRemaining>,
}

/// Result of confirming a reservation or allocating a book directly
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Allocation {
    pub reservation: Reservation,
    pub book: BookSummary,
    /// True when `force` skipped an existing confirmed reservation of the same reserver
    pub overrode_conflict: bool,
}

/// Result of cancelling a reservation
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CancelOutcome {
    /// A confirmed reservation was kept as `deleted`
    Archived {
        reservation: Reservation,
        /// False when the held book could no longer be found or is still
        /// held by another confirmed reservation
        book_released: bool,
    },
    /// A reservation that never held a book was removed
    Removed { id: i32 },
}

/// Result of flipping an allocated book back to Available
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReleaseOutcome {
    pub book: BookSummary,
    /// Confirmed reservations archived while releasing
    pub archived_reservations: Vec<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SweepReport {
    pub removed: u64,
    pub max_age_hours: i64,
}

/// Disagreements between book statuses and the confirmed reservations
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ConsistencyReport {
    /// Allocated books no confirmed reservation points at
    pub orphaned_allocations: Vec<BookSummary>,
    /// Confirmed reservations whose book is still Available
    pub unallocated_loans: Vec<Reservation>,
    /// Confirmed reservations whose book no longer exists
    pub unresolved: Vec<Reservation>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.orphaned_allocations.is_empty()
            && self.unallocated_loans.is_empty()
            && self.unresolved.is_empty()
    }
}

/// Book statuses rewritten by a repair run
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct RepairReport {
    pub released_books: Vec<i32>,
    pub allocated_books: Vec<i32>,
    /// Left for an operator: the book they reference is gone
    pub unresolved_reservations: Vec<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hours_ago: i64, minutes_ago: i64, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(hours_ago) - Duration::minutes(minutes_ago)
    }

    #[test]
    fn test_time_remaining_before_expiry() {
        let now = Utc::now();
        let remaining = time_remaining(at(23, 10, now), now, Duration::hours(24));
        assert_eq!(
            remaining,
            TimeRemaining::Remaining {
                hours: 0,
                minutes: 50,
                seconds: 0
            }
        );
    }

    #[test]
    fn test_time_remaining_expired() {
        let now = Utc::now();
        assert!(time_remaining(at(25, 0, now), now, Duration::hours(24)).is_expired());
        // exactly at the threshold counts as expired
        assert!(time_remaining(at(24, 0, now), now, Duration::hours(24)).is_expired());
    }

    #[test]
    fn test_time_remaining_hours_exceed_a_day() {
        let now = Utc::now();
        let remaining = time_remaining(now - Duration::seconds(90), now, Duration::hours(48));
        assert_eq!(
            remaining,
            TimeRemaining::Remaining {
                hours: 47,
                minutes: 58,
                seconds: 30
            }
        );
    }

    #[test]
    fn test_time_remaining_wire_shape() {
        let expired = serde_json::to_value(TimeRemaining::Expired).unwrap();
        assert_eq!(expired, serde_json::json!({ "expired": true }));

        let left = serde_json::to_value(TimeRemaining::Remaining {
            hours: 3,
            minutes: 2,
            seconds: 1,
        })
        .unwrap();
        assert_eq!(
            left,
            serde_json::json!({ "expired": false, "hours": 3, "minutes": 2, "seconds": 1 })
        );
    }

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            ReservationStatus::Pending,
            ReservationStatus::Confirmed,
            ReservationStatus::Completed,
            ReservationStatus::Deleted,
        ] {
            assert_eq!(status.as_str().parse::<ReservationStatus>(), Ok(status));
        }
        assert!("archived".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn test_filter_matches_search_case_insensitive() {
        let reservation = Reservation {
            id: 1,
            reserver_name: "Meera Iyer".to_string(),
            reserver_id: "STU-042".to_string(),
            reserver_role: ReserverRole::Student,
            book_name: "Compiler Design".to_string(),
            book_sr_no: "CS-101".to_string(),
            book_id: None,
            status: ReservationStatus::Pending,
            handled_by: None,
            created_at: Utc::now(),
            updated_at: None,
        };

        let filter = ReservationFilter {
            search: Some("compiler".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&reservation));

        let filter = ReservationFilter {
            statuses: vec![ReservationStatus::Confirmed],
            ..Default::default()
        };
        assert!(!filter.matches(&reservation));

        let filter = ReservationFilter {
            reserver_role: Some(ReserverRole::Teacher),
            ..Default::default()
        };
        assert!(!filter.matches(&reservation));
    }
}
