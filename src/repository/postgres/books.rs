//! Books repository for database operations

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookStatus, StatusCount},
    repository::{like_pattern, BookStore, BOOK_ON_LOAN},
};

const DUPLICATE_ISBN: &str = "A book with this ISBN already exists";

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookStore for BooksRepository {
    /// Get book by ID
    async fn find_by_id(&self, id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
    }

    async fn list_all(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>("SELECT * FROM books ORDER BY title, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    async fn search(&self, query: &str) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT * FROM books
            WHERE title ILIKE $1 OR author ILIKE $1 OR isbn ILIKE $1
            ORDER BY title, id
            "#,
        )
        .bind(like_pattern(query))
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn create(&self, book: &Book) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (
                id, title, author, isbn, category, status, description,
                published_year, publisher, cover_image, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.category)
        .bind(book.status)
        .bind(&book.description)
        .bind(book.published_year)
        .bind(&book.publisher)
        .bind(&book.cover_image)
        .bind(book.created_at)
        .bind(book.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_store(e, DUPLICATE_ISBN))
    }

    async fn update(&self, book: &Book, status: Option<BookStatus>) -> AppResult<Book> {
        let updated = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = $2, author = $3, isbn = $4, category = $5,
                description = $6, published_year = $7, publisher = $8,
                updated_at = $9, status = COALESCE($10, status)
            WHERE id = $1 AND ($10::text IS NULL OR status <> $11)
            RETURNING *
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.category)
        .bind(&book.description)
        .bind(book.published_year)
        .bind(&book.publisher)
        .bind(book.updated_at)
        .bind(status)
        .bind(BookStatus::Issued)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_store(e, DUPLICATE_ISBN))?;

        match updated {
            Some(book) => Ok(book),
            None => {
                // Either missing or currently issued
                self.find_by_id(book.id).await?;
                Err(AppError::Conflict(BOOK_ON_LOAN.to_string()))
            }
        }
    }

    async fn delete(&self, id: Uuid) -> AppResult<Book> {
        let deleted = sqlx::query_as::<_, Book>(
            "DELETE FROM books WHERE id = $1 AND status <> $2 RETURNING *",
        )
        .bind(id)
        .bind(BookStatus::Issued)
        .fetch_optional(&self.pool)
        .await?;

        match deleted {
            Some(book) => Ok(book),
            None => {
                // Either missing or currently issued
                self.find_by_id(id).await?;
                Err(AppError::Conflict(
                    "Cannot delete a book that is currently issued".to_string(),
                ))
            }
        }
    }

    async fn set_cover(&self, id: Uuid, path: &str) -> AppResult<Book> {
        sqlx::query_as::<_, Book>(
            "UPDATE books SET cover_image = $2, updated_at = $3 WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(path)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
    }

    async fn count_by_status(&self) -> AppResult<Vec<StatusCount>> {
        let rows = sqlx::query_as::<_, (BookStatus, i64)>(
            "SELECT status, COUNT(*) FROM books GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect())
    }

    async fn recent(&self, limit: i64) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            "SELECT * FROM books ORDER BY created_at DESC, id LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }
}
