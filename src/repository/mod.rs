//! Repository layer: store traits and their backends
//!
//! Services only see the traits. `postgres` is the production backend and
//! `memory` keeps everything in process for development and tests.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookStatus, StatusCount},
        borrowing::{Borrowing, BorrowingDetails, BorrowingQuery, BorrowingStats, ReturnOutcome},
        member::{Member, TypeCount},
        user::User,
    },
};

/// Catalog store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Book>;
    async fn list_all(&self) -> AppResult<Vec<Book>>;
    /// Case-insensitive match on title, author or ISBN
    async fn search(&self, query: &str) -> AppResult<Vec<Book>>;
    async fn create(&self, book: &Book) -> AppResult<Book>;
    /// Persist descriptive fields, leaving the cover untouched. A requested
    /// shelf status is only written while the stored book is not issued;
    /// otherwise nothing is written and `Conflict` is returned.
    async fn update(&self, book: &Book, status: Option<BookStatus>) -> AppResult<Book>;
    /// Delete a book that is not currently issued
    async fn delete(&self, id: Uuid) -> AppResult<Book>;
    async fn set_cover(&self, id: Uuid, path: &str) -> AppResult<Book>;
    async fn count_by_status(&self) -> AppResult<Vec<StatusCount>>;
    async fn recent(&self, limit: i64) -> AppResult<Vec<Book>>;
}

/// Membership store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MemberStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Member>;
    async fn list_all(&self) -> AppResult<Vec<Member>>;
    /// Case-insensitive match on name, email or phone
    async fn search(&self, query: &str) -> AppResult<Vec<Member>>;
    async fn create(&self, member: &Member) -> AppResult<Member>;
    /// Persist contact fields and tier. The active loan count is left untouched.
    async fn update(&self, member: &Member) -> AppResult<Member>;
    /// Delete a member without active loans
    async fn delete(&self, id: Uuid) -> AppResult<Member>;
    async fn count_by_type(&self) -> AppResult<Vec<TypeCount>>;
    async fn recent(&self, limit: i64) -> AppResult<Vec<Member>>;
}

/// Borrowing ledger
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BorrowingStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Borrowing>;
    async fn find_details(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<BorrowingDetails>;
    async fn list(&self, query: &BorrowingQuery, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>>;
    /// Active entries due before `now`
    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>>;

    /// Record a new loan as one atomic unit: the book goes from Available to
    /// Issued, the member's count goes up while below `max_active_loans`, and
    /// the entry is inserted. Nothing is written if any step is refused.
    async fn issue(&self, borrowing: &Borrowing, max_active_loans: i32) -> AppResult<Borrowing>;

    /// Close an active loan as one atomic unit: the entry becomes returned,
    /// the book Available and the member's count goes down, floored at zero.
    /// A missing book or member is tolerated and reported in the outcome.
    async fn complete_return(
        &self,
        id: Uuid,
        returned_at: DateTime<Utc>,
        fine: Decimal,
    ) -> AppResult<ReturnOutcome>;

    async fn stats(&self, now: DateTime<Utc>) -> AppResult<BorrowingStats>;
}

/// User account store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<User>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn create(&self, user: &User) -> AppResult<User>;
}

/// Main repository struct holding one handle per store
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookStore>,
    pub members: Arc<dyn MemberStore>,
    pub borrowings: Arc<dyn BorrowingStore>,
    pub users: Arc<dyn UserStore>,
    pool: Option<Pool<Postgres>>,
}

impl Repository {
    /// Create a repository backed by the given database pool
    pub fn postgres(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(postgres::BooksRepository::new(pool.clone())),
            members: Arc::new(postgres::MembersRepository::new(pool.clone())),
            borrowings: Arc::new(postgres::BorrowingsRepository::new(pool.clone())),
            users: Arc::new(postgres::UsersRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Create a repository holding all data in process
    pub fn in_memory() -> Self {
        let store = Arc::new(memory::MemoryStore::default());
        Self {
            books: store.clone(),
            members: store.clone(),
            borrowings: store.clone(),
            users: store,
            pool: None,
        }
    }

    /// Assemble a repository from individual stores
    pub fn from_stores(
        books: Arc<dyn BookStore>,
        members: Arc<dyn MemberStore>,
        borrowings: Arc<dyn BorrowingStore>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            books,
            members,
            borrowings,
            users,
            pool: None,
        }
    }

    /// Check that the backing database answers
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

/// Build an ILIKE pattern matching `query` anywhere, escaping wildcards
pub(crate) fn like_pattern(query: &str) -> String {
    let escaped = query
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub(crate) const BOOK_ON_LOAN: &str = "Cannot change a book that is currently issued";

/// Case-insensitive substring match used by the memory backend
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}
