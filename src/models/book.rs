//! Book (catalog) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Circulation status of a book copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum BookStatus {
    Available,
    Allocated,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Available => "Available",
            BookStatus::Allocated => "Allocated",
        }
    }
}

impl std::str::FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(BookStatus::Available),
            "allocated" => Ok(BookStatus::Allocated),
            _ => Err(format!("Invalid book status: {}", s)),
        }
    }
}

impl_pg_text_enum!(BookStatus);

/// Book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    /// Stable identifier referenced by confirmed reservations
    pub book_id: Uuid,
    /// Serial number assigned to the physical copy
    pub sr_no: Option<String>,
    pub name: String,
    pub author: Option<String>,
    pub department: String,
    pub edition: Option<String>,
    pub status: BookStatus,
    pub uploaded_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Book {
    pub fn is_allocated(&self) -> bool {
        self.status == BookStatus::Allocated
    }

    pub fn summary(&self) -> BookSummary {
        BookSummary {
            id: self.id,
            book_id: self.book_id,
            sr_no: self.sr_no.clone(),
            name: self.name.clone(),
            author: self.author.clone(),
            department: self.department.clone(),
            status: self.status,
        }
    }
}

/// Short book representation attached to reservations
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookSummary {
    pub id: i32,
    pub book_id: Uuid,
    pub sr_no: Option<String>,
    pub name: String,
    pub author: Option<String>,
    pub department: String,
    pub status: BookStatus,
}

/// Reserver currently holding a book
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookHolder {
    pub reservation_id: i32,
    pub reserver_name: String,
    pub reserver_id: String,
}

/// Book with the confirmed reservations that hold it
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookDetails {
    #[serde(flatten)]
    pub book: Book,
    pub holders: Vec<BookHolder>,
}

/// Book query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Filter by status (Available / Allocated)
    pub status: Option<BookStatus>,
    /// Filter by department (case-insensitive)
    pub department: Option<String>,
    /// Search in name and author
    pub search: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl BookQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(50).clamp(1, 1000)
    }

    /// Rows to skip; pages past the end saturate instead of overflowing
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.per_page())
    }
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Book name is required"))]
    pub name: String,
    pub author: Option<String>,
    #[validate(length(min = 1, message = "Department is required"))]
    pub department: String,
    pub edition: Option<String>,
    pub sr_no: Option<String>,
}

/// Update book request. Status is owned by the reservation ledger.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Book name cannot be empty"))]
    pub name: Option<String>,
    pub author: Option<String>,
    #[validate(length(min = 1, message = "Department cannot be empty"))]
    pub department: Option<String>,
    pub edition: Option<String>,
    pub sr_no: Option<String>,
}

/// One page of the catalog
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookList {
    pub books: Vec<BookDetails>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

/// Result of removing a department's books
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DepartmentDeletion {
    pub department: String,
    pub deleted: u64,
    /// Allocated books left in place
    pub skipped_allocated: i64,
}

/// Trim and drop empty optional text, matching how the dashboard forms submit blanks
pub fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_status_parse() {
        assert_eq!("Available".parse::<BookStatus>(), Ok(BookStatus::Available));
        assert_eq!("allocated".parse::<BookStatus>(), Ok(BookStatus::Allocated));
        assert!("borrowed".parse::<BookStatus>().is_err());
    }

    #[test]
    fn test_query_pagination_bounds() {
        let query = BookQuery {
            page: Some(0),
            per_page: Some(5000),
            ..Default::default()
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.per_page(), 1000);
        assert_eq!(BookQuery::default().per_page(), 50);
        assert_eq!(BookQuery::default().offset(), 0);
    }

    #[test]
    fn test_offset_of_huge_page_saturates() {
        let query = BookQuery {
            page: Some(i64::MAX),
            per_page: Some(1000),
            ..Default::default()
        };
        assert_eq!(query.offset(), i64::MAX);

        let query = BookQuery {
            page: Some(3),
            per_page: Some(20),
            ..Default::default()
        };
        assert_eq!(query.offset(), 40);
    }

    #[test]
    fn test_normalize_optional() {
        assert_eq!(normalize_optional(Some("  SR-12 ".to_string())), Some("SR-12".to_string()));
        assert_eq!(normalize_optional(Some("   ".to_string())), None);
        assert_eq!(normalize_optional(None), None);
    }
}
