//! Book catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookDetails, BookList, BookQuery, CreateBook, DepartmentDeletion, UpdateBook},
        reservation::{AllocateBook, Allocation, ReleaseOutcome},
    },
};

use super::AuthenticatedUser;

/// List books with filters and pagination
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookQuery),
    responses(
        (status = 200, description = "Page of books with their holders", body = BookList),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<BookList>> {
    let books = state.services.books.list(&query).await?;
    Ok(Json(books))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = BookDetails),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BookDetails>> {
    let book = state.services.books.get(id).await?;
    Ok(Json(book))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Serial number already used")
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(book): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    claims.require_admin()?;

    let created = state.services.books.create(&claims.actor(), book).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a book's descriptive fields
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Serial number already used")
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(book): Json<UpdateBook>,
) -> AppResult<Json<Book>> {
    claims.require_admin()?;

    let updated = state.services.books.update(&claims.actor(), id, book).await?;
    Ok(Json(updated))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found"),
        (status = 422, description = "Book is allocated")
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    claims.require_admin()?;

    state.services.books.delete(&claims.actor(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List the departments present in the catalog
#[utoipa::path(
    get,
    path = "/books/departments",
    tag = "books",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Department names", body = Vec<String>)
    )
)]
pub async fn list_departments(
    State(state): State<crate::AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<Vec<String>>> {
    let departments = state.services.books.departments().await?;
    Ok(Json(departments))
}

/// Delete every Available book of a department
#[utoipa::path(
    delete,
    path = "/books/departments/{department}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("department" = String, Path, description = "Department name (case-insensitive)")
    ),
    responses(
        (status = 200, description = "Books deleted", body = DepartmentDeletion),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn delete_department(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(department): Path<String>,
) -> AppResult<Json<DepartmentDeletion>> {
    claims.require_admin()?;

    let result = state
        .services
        .books
        .delete_department(&claims.actor(), &department)
        .await?;
    Ok(Json(result))
}

/// Allocate an Available book directly to a reserver
#[utoipa::path(
    post,
    path = "/books/{id}/allocate",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = AllocateBook,
    responses(
        (status = 200, description = "Book allocated", body = Allocation),
        (status = 409, description = "Reserver already holds a book; retry with force"),
        (status = 422, description = "Book already allocated"),
        (status = 500, description = "Reservation recorded but book status not updated")
    )
)]
pub async fn allocate_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<AllocateBook>,
) -> AppResult<Json<Allocation>> {
    let allocation = state
        .services
        .reservations
        .allocate_book(&claims.actor(), id, request)
        .await?;
    Ok(Json(allocation))
}

/// Mark a book Available again, archiving the reservations holding it
#[utoipa::path(
    post,
    path = "/books/{id}/release",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book released", body = ReleaseOutcome),
        (status = 404, description = "Book not found")
    )
)]
pub async fn release_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ReleaseOutcome>> {
    let outcome = state
        .services
        .reservations
        .release_book(&claims.actor(), id)
        .await?;
    Ok(Json(outcome))
}
