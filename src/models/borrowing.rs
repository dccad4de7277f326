//! Borrowing (loan ledger) model and fine policy
//!
//! A borrowing is persisted as either `active` or `returned`. Whether an
//! active loan is overdue depends on the time it is looked at, so overdue is
//! computed on read and never stored.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{book::BookSummary, member::MemberSummary};
use crate::config::LoansConfig;

/// Persisted status of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    Active,
    Returned,
}

impl BorrowingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowingStatus::Active => "active",
            BorrowingStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for BorrowingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BorrowingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(BorrowingStatus::Active),
            "returned" => Ok(BorrowingStatus::Returned),
            _ => Err(format!("Invalid borrowing status: {}", s)),
        }
    }
}

super::text_column!(BorrowingStatus);

/// Ledger entry from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Borrowing {
    pub id: Uuid,
    pub book_id: Uuid,
    pub member_id: Uuid,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
    pub fine: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Borrowing {
    /// New active entry borrowed at `now`
    pub fn new(book_id: Uuid, member_id: Uuid, due_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            book_id,
            member_id,
            borrowed_at: now,
            due_at,
            returned_at: None,
            status: BorrowingStatus::Active,
            fine: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BorrowingStatus::Active
    }

    /// Active and past its due date at `now`
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.due_at < now
    }

    /// Mark as returned at `returned_at` with the given fine
    pub fn mark_returned(&mut self, returned_at: DateTime<Utc>, fine: Decimal) {
        self.status = BorrowingStatus::Returned;
        self.returned_at = Some(returned_at);
        self.fine = fine;
        self.updated_at = returned_at;
    }
}

/// Whole days elapsed from `due_at` to `at`, never negative
pub fn days_late(due_at: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    (at - due_at).num_days().max(0)
}

/// Borrowing rules: loan limit per member and daily fine rate
#[derive(Debug, Clone, PartialEq)]
pub struct LoanPolicy {
    pub max_active_loans: i32,
    pub fine_per_day: Decimal,
}

impl LoanPolicy {
    /// Fine owed for a loan due at `due_at` and returned at `returned_at`
    pub fn fine_for(&self, due_at: DateTime<Utc>, returned_at: DateTime<Utc>) -> Decimal {
        Decimal::from(days_late(due_at, returned_at)) * self.fine_per_day
    }
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self::from(&LoansConfig::default())
    }
}

impl From<&LoansConfig> for LoanPolicy {
    fn from(config: &LoansConfig) -> Self {
        Self {
            max_active_loans: config.max_active_loans,
            fine_per_day: config.fine_per_day,
        }
    }
}

/// Borrowing with book and member summaries for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BorrowingDetails {
    #[serde(flatten)]
    pub borrowing: Borrowing,
    /// `None` when the book has since been deleted
    pub book: Option<BookSummary>,
    /// `None` when the member has since been deleted
    pub member: Option<MemberSummary>,
    pub is_overdue: bool,
    /// Whole days past due, so 0 during the first day of an overdue loan
    pub days_overdue: i64,
}

impl BorrowingDetails {
    pub fn new(
        borrowing: Borrowing,
        book: Option<BookSummary>,
        member: Option<MemberSummary>,
        now: DateTime<Utc>,
    ) -> Self {
        let is_overdue = borrowing.is_overdue(now);
        let days_overdue = if is_overdue {
            days_late(borrowing.due_at, now)
        } else {
            0
        };
        Self {
            borrowing,
            book,
            member,
            is_overdue,
            days_overdue,
        }
    }
}

/// Ledger listing filter
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BorrowingQuery {
    pub member_id: Option<Uuid>,
    pub book_id: Option<Uuid>,
    pub status: Option<BorrowingStatus>,
}

impl BorrowingQuery {
    pub fn matches(&self, borrowing: &Borrowing) -> bool {
        self.member_id.map_or(true, |id| borrowing.member_id == id)
            && self.book_id.map_or(true, |id| borrowing.book_id == id)
            && self.status.map_or(true, |s| borrowing.status == s)
    }
}

/// Issue request (borrow a book)
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct IssueBorrowing {
    #[serde(alias = "bookId")]
    pub book_id: Uuid,
    #[serde(alias = "memberId")]
    pub member_id: Uuid,
    /// Must be in the future
    #[serde(alias = "dueDate")]
    pub due_date: DateTime<Utc>,
}

/// Result of the atomic return write
#[derive(Debug, Clone)]
pub struct ReturnOutcome {
    pub borrowing: Borrowing,
    /// Title of the released book, `None` if the book no longer exists
    pub book_title: Option<String>,
    /// Name of the released member, `None` if the member no longer exists
    pub member_name: Option<String>,
}

/// Ledger aggregate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BorrowingStats {
    pub total_borrowings: i64,
    pub active_borrowings: i64,
    pub overdue_borrowings: i64,
    pub returned_borrowings: i64,
    /// Sum of fines over returned entries
    pub total_fines: Decimal,
}
