//! Borrowings repository for database operations
//!
//! Issue and return each run in a single transaction. Rows are locked in a
//! fixed order (ledger entry, book, member) so concurrent issue and return
//! requests on the same book serialize instead of deadlocking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, Pool, Postgres, Row};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{BookStatus, BookSummary},
        borrowing::{
            Borrowing, BorrowingDetails, BorrowingQuery, BorrowingStats, BorrowingStatus,
            ReturnOutcome,
        },
        member::MemberSummary,
    },
    repository::BorrowingStore,
};

const DETAILS_SELECT: &str = r#"
    SELECT br.*,
           b.title AS book_title, b.author AS book_author,
           m.name AS member_name, m.email AS member_email
    FROM borrowings br
    LEFT JOIN books b ON b.id = br.book_id
    LEFT JOIN members m ON m.id = br.member_id
"#;

/// Ledger row joined with book and member summaries
#[derive(Debug, FromRow)]
struct BorrowingRow {
    #[sqlx(flatten)]
    borrowing: Borrowing,
    book_title: Option<String>,
    book_author: Option<String>,
    member_name: Option<String>,
    member_email: Option<String>,
}

impl BorrowingRow {
    fn into_details(self, now: DateTime<Utc>) -> BorrowingDetails {
        let book = match (self.book_title, self.book_author) {
            (Some(title), Some(author)) => Some(BookSummary {
                id: self.borrowing.book_id,
                title,
                author,
            }),
            _ => None,
        };
        let member = match (self.member_name, self.member_email) {
            (Some(name), Some(email)) => Some(MemberSummary {
                id: self.borrowing.member_id,
                name,
                email,
            }),
            _ => None,
        };
        BorrowingDetails::new(self.borrowing, book, member, now)
    }
}

#[derive(Clone)]
pub struct BorrowingsRepository {
    pool: Pool<Postgres>,
}

impl BorrowingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BorrowingStore for BorrowingsRepository {
    /// Get borrowing by ID
    async fn find_by_id(&self, id: Uuid) -> AppResult<Borrowing> {
        sqlx::query_as::<_, Borrowing>("SELECT * FROM borrowings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Borrowing record not found".to_string()))
    }

    async fn find_details(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<BorrowingDetails> {
        let query = format!("{} WHERE br.id = $1", DETAILS_SELECT);
        sqlx::query_as::<_, BorrowingRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|row| row.into_details(now))
            .ok_or_else(|| AppError::NotFound("Borrowing record not found".to_string()))
    }

    async fn list(&self, query: &BorrowingQuery, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>> {
        let sql = format!(
            r#"{}
            WHERE ($1::uuid IS NULL OR br.member_id = $1)
              AND ($2::uuid IS NULL OR br.book_id = $2)
              AND ($3::text IS NULL OR br.status = $3)
            ORDER BY br.borrowed_at DESC, br.id
            "#,
            DETAILS_SELECT
        );
        let rows = sqlx::query_as::<_, BorrowingRow>(&sql)
            .bind(query.member_id)
            .bind(query.book_id)
            .bind(query.status)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| row.into_details(now)).collect())
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>> {
        let sql = format!(
            "{} WHERE br.status = $1 AND br.due_at < $2 ORDER BY br.due_at, br.id",
            DETAILS_SELECT
        );
        let rows = sqlx::query_as::<_, BorrowingRow>(&sql)
            .bind(BorrowingStatus::Active)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|row| row.into_details(now)).collect())
    }

    async fn issue(&self, borrowing: &Borrowing, max_active_loans: i32) -> AppResult<Borrowing> {
        let mut tx = self.pool.begin().await?;

        let book_status: Option<BookStatus> =
            sqlx::query_scalar("SELECT status FROM books WHERE id = $1 FOR UPDATE")
                .bind(borrowing.book_id)
                .fetch_optional(&mut *tx)
                .await?;
        match book_status {
            None => return Err(AppError::NotFound("Book not found".to_string())),
            Some(BookStatus::Available) => {}
            Some(_) => return Err(AppError::BookUnavailable(borrowing.book_id)),
        }

        let active_loans: Option<i32> =
            sqlx::query_scalar("SELECT active_loans FROM members WHERE id = $1 FOR UPDATE")
                .bind(borrowing.member_id)
                .fetch_optional(&mut *tx)
                .await?;
        match active_loans {
            None => return Err(AppError::NotFound("Member not found".to_string())),
            Some(n) if n >= max_active_loans => {
                return Err(AppError::BorrowLimitReached {
                    member_id: borrowing.member_id,
                    limit: max_active_loans,
                })
            }
            Some(_) => {}
        }

        let created = sqlx::query_as::<_, Borrowing>(
            r#"
            INSERT INTO borrowings (
                id, book_id, member_id, borrowed_at, due_at, returned_at,
                status, fine, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(borrowing.id)
        .bind(borrowing.book_id)
        .bind(borrowing.member_id)
        .bind(borrowing.borrowed_at)
        .bind(borrowing.due_at)
        .bind(borrowing.returned_at)
        .bind(borrowing.status)
        .bind(borrowing.fine)
        .bind(borrowing.created_at)
        .bind(borrowing.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            // One-active-loan-per-book index
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::BookUnavailable(borrowing.book_id)
            }
            _ => AppError::Database(e),
        })?;

        sqlx::query("UPDATE books SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(borrowing.book_id)
            .bind(BookStatus::Issued)
            .bind(borrowing.borrowed_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE members SET active_loans = active_loans + 1, updated_at = $2 WHERE id = $1",
        )
        .bind(borrowing.member_id)
        .bind(borrowing.borrowed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(created)
    }

    async fn complete_return(
        &self,
        id: Uuid,
        returned_at: DateTime<Utc>,
        fine: Decimal,
    ) -> AppResult<ReturnOutcome> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, Borrowing>(
            "SELECT * FROM borrowings WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Borrowing record not found".to_string()))?;

        if !current.is_active() {
            return Err(AppError::Conflict("Book has already been returned".to_string()));
        }

        let borrowing = sqlx::query_as::<_, Borrowing>(
            r#"
            UPDATE borrowings
            SET status = $2, returned_at = $3, fine = $4, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(BorrowingStatus::Returned)
        .bind(returned_at)
        .bind(fine)
        .fetch_one(&mut *tx)
        .await?;

        let book_title: Option<String> = sqlx::query(
            "UPDATE books SET status = $2, updated_at = $3 WHERE id = $1 RETURNING title",
        )
        .bind(borrowing.book_id)
        .bind(BookStatus::Available)
        .bind(returned_at)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| row.get("title"));

        let member_name: Option<String> = sqlx::query(
            r#"
            UPDATE members
            SET active_loans = GREATEST(active_loans - 1, 0), updated_at = $2
            WHERE id = $1
            RETURNING name
            "#,
        )
        .bind(borrowing.member_id)
        .bind(returned_at)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| row.get("name"));

        tx.commit().await?;

        Ok(ReturnOutcome {
            borrowing,
            book_title,
            member_name,
        })
    }

    async fn stats(&self, now: DateTime<Utc>) -> AppResult<BorrowingStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'active') AS active,
                   COUNT(*) FILTER (WHERE status = 'active' AND due_at < $1) AS overdue,
                   COUNT(*) FILTER (WHERE status = 'returned') AS returned,
                   COALESCE(SUM(fine) FILTER (WHERE status = 'returned'), 0) AS total_fines
            FROM borrowings
            "#,
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(BorrowingStats {
            total_borrowings: row.get("total"),
            active_borrowings: row.get("active"),
            overdue_borrowings: row.get("overdue"),
            returned_borrowings: row.get("returned"),
            total_fines: row.get("total_fines"),
        })
    }
}
