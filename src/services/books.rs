//! Book catalog service

use std::collections::HashMap;

use validator::Validate;

use super::notifier::{ChangeAction, ChangeNotifier, ChangeTable};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{
            normalize_optional, Book, BookDetails, BookHolder, BookList, BookQuery, CreateBook,
            DepartmentDeletion, UpdateBook,
        },
        user::Actor,
    },
    repository::{books::BooksRepository, reservations::ReservationsRepository},
};

#[derive(Clone)]
pub struct BooksService {
    books: BooksRepository,
    reservations: ReservationsRepository,
    notifier: ChangeNotifier,
}

impl BooksService {
    pub fn new(
        books: BooksRepository,
        reservations: ReservationsRepository,
        notifier: ChangeNotifier,
    ) -> Self {
        Self {
            books,
            reservations,
            notifier,
        }
    }

    /// Search the catalog; each book lists who currently holds it
    pub async fn list(&self, query: &BookQuery) -> AppResult<BookList> {
        let (books, total) = self.books.search(query).await?;
        let books = self.with_holders(books).await?;
        Ok(BookList {
            books,
            total,
            page: query.page(),
            per_page: query.per_page(),
        })
    }

    pub async fn get(&self, id: i32) -> AppResult<BookDetails> {
        let book = self.books.get_by_id(id).await?;
        let mut details = self.with_holders(vec![book]).await?;
        details
            .pop()
            .ok_or_else(|| AppError::Internal(format!("Book {} vanished while loading", id)))
    }

    /// Add a book to the catalog; it starts Available
    pub async fn create(&self, actor: &Actor, book: CreateBook) -> AppResult<Book> {
        book.validate()?;

        let book = CreateBook {
            name: book.name.trim().to_string(),
            author: normalize_optional(book.author),
            department: book.department.trim().to_string(),
            edition: normalize_optional(book.edition),
            sr_no: normalize_optional(book.sr_no),
        };
        if let Some(ref sr_no) = book.sr_no {
            if self.books.sr_no_taken(sr_no, None).await? {
                return Err(AppError::Conflict(format!(
                    "A book with serial number {} already exists",
                    sr_no
                )));
            }
        }

        let created = self.books.create(&book, actor.user_id).await?;
        self.notifier
            .publish(ChangeTable::Books, ChangeAction::Insert, Some(created.id));
        tracing::info!("{} added book {} ({})", actor.username, created.id, created.name);
        Ok(created)
    }

    /// Update descriptive fields; status only moves through the reservation ledger
    pub async fn update(&self, actor: &Actor, id: i32, book: UpdateBook) -> AppResult<Book> {
        book.validate()?;

        let book = UpdateBook {
            name: normalize_optional(book.name),
            author: normalize_optional(book.author),
            department: normalize_optional(book.department),
            edition: normalize_optional(book.edition),
            sr_no: normalize_optional(book.sr_no),
        };
        if let Some(ref sr_no) = book.sr_no {
            if self.books.sr_no_taken(sr_no, Some(id)).await? {
                return Err(AppError::Conflict(format!(
                    "A book with serial number {} already exists",
                    sr_no
                )));
            }
        }

        let updated = self.books.update(id, &book).await?;
        self.notifier
            .publish(ChangeTable::Books, ChangeAction::Update, Some(id));
        tracing::info!("{} updated book {}", actor.username, id);
        Ok(updated)
    }

    /// Delete a book that is not currently allocated
    pub async fn delete(&self, actor: &Actor, id: i32) -> AppResult<()> {
        let book = self.books.get_by_id(id).await?;
        if book.is_allocated() {
            return Err(AppError::BusinessRule(format!(
                "\"{}\" is allocated; release it before deleting",
                book.name
            )));
        }

        self.books.delete(id).await?;
        self.notifier
            .publish(ChangeTable::Books, ChangeAction::Delete, Some(id));
        tracing::info!("{} deleted book {} ({})", actor.username, id, book.name);
        Ok(())
    }

    pub async fn departments(&self) -> AppResult<Vec<String>> {
        self.books.departments().await
    }

    /// Delete the Available books of a department, leaving allocated ones
    pub async fn delete_department(&self, actor: &Actor, department: &str) -> AppResult<DepartmentDeletion> {
        let department = department.trim();
        if department.is_empty() {
            return Err(AppError::Validation("Department is required".to_string()));
        }

        let (deleted, skipped_allocated) =
            self.books.delete_available_in_department(department).await?;
        if deleted > 0 {
            self.notifier
                .publish(ChangeTable::Books, ChangeAction::Delete, None);
        }
        tracing::info!(
            "{} deleted {} books of {} ({} allocated kept)",
            actor.username,
            deleted,
            department,
            skipped_allocated
        );

        Ok(DepartmentDeletion {
            department: department.to_string(),
            deleted,
            skipped_allocated,
        })
    }

    async fn with_holders(&self, books: Vec<Book>) -> AppResult<Vec<BookDetails>> {
        let ids: Vec<_> = books.iter().map(|b| b.book_id).collect();

        let mut holders: HashMap<_, Vec<BookHolder>> = HashMap::new();
        for (book_id, holder) in self.reservations.confirmed_holders(&ids).await? {
            holders.entry(book_id).or_default().push(holder);
        }

        Ok(books
            .into_iter()
            .map(|book| BookDetails {
                holders: holders.remove(&book.book_id).unwrap_or_default(),
                book,
            })
            .collect())
    }
}
