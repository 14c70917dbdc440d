//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::{contains_pattern, BookStore};
use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery, BookStatus, CreateBook, UpdateBook},
};

const BOOK_COLUMNS: &str = r#"
    id, book_id, sr_no, name, author, department, edition, status,
    uploaded_by, created_at, updated_at
"#;

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Book> {
        self.fetch_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn fetch_by_id(&self, id: i32) -> AppResult<Option<Book>> {
        let query = format!("SELECT {} FROM books WHERE id = $1", BOOK_COLUMNS);
        let book = sqlx::query_as::<_, Book>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    /// Search books with optional filters and pagination, newest first
    pub async fn search(&self, query: &BookQuery) -> AppResult<(Vec<Book>, i64)> {
        let per_page = query.per_page();
        let offset = query.offset();

        let department = query
            .department
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(contains_pattern);

        let mut conditions = Vec::new();
        if query.status.is_some() {
            conditions.push(format!("status = ${}", conditions.len() + 1));
        }
        if department.is_some() {
            conditions.push(format!(
                "LOWER(TRIM(department)) = LOWER(${})",
                conditions.len() + 1
            ));
        }
        if search.is_some() {
            let idx = conditions.len() + 1;
            conditions.push(format!(
                "(name ILIKE ${0} ESCAPE '\\' OR author ILIKE ${0} ESCAPE '\\')",
                idx
            ));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let count_q = format!("SELECT COUNT(*) FROM books {}", where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_q);
        if let Some(status) = query.status { count_builder = count_builder.bind(status); }
        if let Some(dept) = department { count_builder = count_builder.bind(dept); }
        if let Some(ref s) = search { count_builder = count_builder.bind(s); }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_q = format!(
            "SELECT {} FROM books {} ORDER BY created_at DESC, id DESC LIMIT {} OFFSET {}",
            BOOK_COLUMNS, where_clause, per_page, offset
        );
        let mut builder = sqlx::query_as::<_, Book>(&select_q);
        if let Some(status) = query.status { builder = builder.bind(status); }
        if let Some(dept) = department { builder = builder.bind(dept); }
        if let Some(ref s) = search { builder = builder.bind(s); }

        let books = builder.fetch_all(&self.pool).await?;
        Ok((books, total))
    }

    /// Create a new book; it always enters the catalog as Available
    pub async fn create(&self, book: &CreateBook, uploaded_by: Option<i32>) -> AppResult<Book> {
        let query = format!(
            r#"
            INSERT INTO books (name, author, department, edition, sr_no, status, uploaded_by, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING {}
            "#,
            BOOK_COLUMNS
        );
        let created = sqlx::query_as::<_, Book>(&query)
            .bind(book.name.trim())
            .bind(&book.author)
            .bind(book.department.trim())
            .bind(&book.edition)
            .bind(&book.sr_no)
            .bind(BookStatus::Available)
            .bind(uploaded_by)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    /// Update descriptive fields of a book
    pub async fn update(&self, id: i32, book: &UpdateBook) -> AppResult<Book> {
        let query = format!(
            r#"
            UPDATE books SET
                name = COALESCE($2, name),
                author = COALESCE($3, author),
                department = COALESCE($4, department),
                edition = COALESCE($5, edition),
                sr_no = COALESCE($6, sr_no),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            BOOK_COLUMNS
        );
        sqlx::query_as::<_, Book>(&query)
            .bind(id)
            .bind(book.name.as_deref().map(str::trim))
            .bind(&book.author)
            .bind(book.department.as_deref().map(str::trim))
            .bind(&book.edition)
            .bind(&book.sr_no)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Delete a book
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }

    /// Whether another book already uses this serial number
    pub async fn sr_no_taken(&self, sr_no: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM books WHERE sr_no = $1 AND ($2::int IS NULL OR id <> $2))",
        )
        .bind(sr_no)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    /// Distinct departments present in the catalog
    pub async fn departments(&self) -> AppResult<Vec<String>> {
        let departments = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT TRIM(department) FROM books WHERE TRIM(department) <> '' ORDER BY 1",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(departments)
    }

    /// Delete every Available book of a department.
    ///
    /// Returns (deleted, allocated books left in place).
    pub async fn delete_available_in_department(&self, department: &str) -> AppResult<(u64, i64)> {
        let deleted = sqlx::query(
            "DELETE FROM books WHERE LOWER(TRIM(department)) = LOWER($1) AND status = $2",
        )
        .bind(department.trim())
        .bind(BookStatus::Available)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let skipped: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM books WHERE LOWER(TRIM(department)) = LOWER($1) AND status = $2",
        )
        .bind(department.trim())
        .bind(BookStatus::Allocated)
        .fetch_one(&self.pool)
        .await?;

        Ok((deleted, skipped))
    }

    /// Count books, optionally restricted to one status
    pub async fn count(&self, status: Option<BookStatus>) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM books WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Most recently added books
    pub async fn recent(&self, limit: i64) -> AppResult<Vec<Book>> {
        let query = format!(
            "SELECT {} FROM books ORDER BY created_at DESC, id DESC LIMIT $1",
            BOOK_COLUMNS
        );
        let books = sqlx::query_as::<_, Book>(&query)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }
}

#[async_trait]
impl BookStore for BooksRepository {
    async fn get(&self, id: i32) -> AppResult<Option<Book>> {
        self.fetch_by_id(id).await
    }

    async fn find_by_sr_no(&self, sr_no: &str) -> AppResult<Option<Book>> {
        let query = format!("SELECT {} FROM books WHERE sr_no = $1", BOOK_COLUMNS);
        let book = sqlx::query_as::<_, Book>(&query)
            .bind(sr_no)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn find_by_book_id(&self, book_id: Uuid) -> AppResult<Option<Book>> {
        let query = format!("SELECT {} FROM books WHERE book_id = $1", BOOK_COLUMNS);
        let book = sqlx::query_as::<_, Book>(&query)
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(book)
    }

    async fn list_by_status(&self, status: BookStatus) -> AppResult<Vec<Book>> {
        let query = format!("SELECT {} FROM books WHERE status = $1 ORDER BY id", BOOK_COLUMNS);
        let books = sqlx::query_as::<_, Book>(&query)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    async fn set_status(&self, id: i32, status: BookStatus) -> AppResult<()> {
        let result = sqlx::query("UPDATE books SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        Ok(())
    }
}
