//! Book (catalog) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};

use super::{optional_text, required_text};

/// Circulation status of a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum BookStatus {
    Available,
    Issued,
    Reserved,
}

impl BookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookStatus::Available => "Available",
            BookStatus::Issued => "Issued",
            BookStatus::Reserved => "Reserved",
        }
    }
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "available" => Ok(BookStatus::Available),
            "issued" => Ok(BookStatus::Issued),
            "reserved" => Ok(BookStatus::Reserved),
            _ => Err(format!("Invalid book status: {}", s)),
        }
    }
}

super::text_column!(BookStatus);

/// Book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub category: String,
    pub status: BookStatus,
    pub description: Option<String>,
    pub published_year: Option<i32>,
    pub publisher: Option<String>,
    /// Retrievable path of the uploaded cover image
    pub cover_image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Short book representation embedded in borrowing views
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookSummary {
    pub id: Uuid,
    pub title: String,
    pub author: String,
}

impl From<&Book> for BookSummary {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
        }
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Book title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author name is required"))]
    pub author: String,
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    /// Initial status; only `Available` and `Reserved` are accepted
    pub status: Option<BookStatus>,
    pub description: Option<String>,
    #[validate(range(min = 0, max = 9999, message = "Invalid published year"))]
    pub published_year: Option<i32>,
    pub publisher: Option<String>,
}

/// Update book request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0, max = 9999, message = "Invalid published year"))]
    pub published_year: Option<i32>,
    pub publisher: Option<String>,
    /// Shelf status; only `Available` and `Reserved` may be set, and never on an issued book
    pub status: Option<BookStatus>,
}

/// Normalize an ISBN for storage and uniqueness checks
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

impl CreateBook {
    /// Validate and produce a new book record
    pub fn into_book(self, now: DateTime<Utc>) -> AppResult<Book> {
        self.validate()?;

        let status = self.status.unwrap_or(BookStatus::Available);
        if status == BookStatus::Issued {
            return Err(AppError::Validation(
                "A book cannot be created as Issued".to_string(),
            ));
        }

        let isbn = normalize_isbn(&self.isbn);
        if isbn.is_empty() {
            return Err(AppError::Validation("ISBN is required".to_string()));
        }

        Ok(Book {
            id: Uuid::new_v4(),
            title: required_text(&self.title, "Book title")?,
            author: required_text(&self.author, "Author name")?,
            isbn,
            category: required_text(&self.category, "Category")?,
            status,
            description: optional_text(self.description),
            published_year: self.published_year,
            publisher: optional_text(self.publisher),
            cover_image: None,
            created_at: now,
            updated_at: now,
        })
    }
}

impl UpdateBook {
    /// Apply the provided fields onto an existing record
    pub fn apply(self, book: &mut Book, now: DateTime<Utc>) -> AppResult<()> {
        self.validate()?;

        if let Some(status) = self.status {
            if status == BookStatus::Issued {
                return Err(AppError::Validation(
                    "A book can only be issued through a borrowing".to_string(),
                ));
            }
            book.status = status;
        }

        if let Some(title) = self.title {
            book.title = required_text(&title, "Book title")?;
        }
        if let Some(author) = self.author {
            book.author = required_text(&author, "Author name")?;
        }
        if let Some(isbn) = self.isbn {
            let isbn = normalize_isbn(&isbn);
            if isbn.is_empty() {
                return Err(AppError::Validation("ISBN is required".to_string()));
            }
            book.isbn = isbn;
        }
        if let Some(category) = self.category {
            book.category = required_text(&category, "Category")?;
        }
        if self.description.is_some() {
            book.description = optional_text(self.description);
        }
        if self.published_year.is_some() {
            book.published_year = self.published_year;
        }
        if self.publisher.is_some() {
            book.publisher = optional_text(self.publisher);
        }
        book.updated_at = now;
        Ok(())
    }
}

/// Book count per status
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusCount {
    pub status: BookStatus,
    pub count: i64,
}
