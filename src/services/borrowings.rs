//! Borrowing service: issue, return, overdue view and ledger statistics

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::BookStatus,
        borrowing::{
            Borrowing, BorrowingDetails, BorrowingQuery, BorrowingStats, IssueBorrowing,
            LoanPolicy,
        },
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct BorrowingService {
    repository: Repository,
    policy: LoanPolicy,
}

impl BorrowingService {
    pub fn new(repository: Repository, policy: LoanPolicy) -> Self {
        Self { repository, policy }
    }

    /// Issue a book to a member
    pub async fn issue_book(&self, request: IssueBorrowing) -> AppResult<Borrowing> {
        self.issue_book_at(request, Utc::now()).await
    }

    /// Issue a book to a member, as seen at `now`
    pub async fn issue_book_at(&self, request: IssueBorrowing, now: DateTime<Utc>) -> AppResult<Borrowing> {
        if request.due_date <= now {
            return Err(AppError::Validation("Due date must be in the future".to_string()));
        }

        let book = self.repository.books.find_by_id(request.book_id).await?;
        if book.status != BookStatus::Available {
            return Err(AppError::BookUnavailable(book.id));
        }

        let member = self.repository.members.find_by_id(request.member_id).await?;
        if member.active_loans >= self.policy.max_active_loans {
            return Err(AppError::BorrowLimitReached {
                member_id: member.id,
                limit: self.policy.max_active_loans,
            });
        }

        // The store re-checks both conditions atomically, so a concurrent
        // request that got here first makes this one fail without writing.
        let borrowing = Borrowing::new(book.id, member.id, request.due_date, now);
        let borrowing = self
            .repository
            .borrowings
            .issue(&borrowing, self.policy.max_active_loans)
            .await?;

        tracing::info!(
            borrowing_id = %borrowing.id,
            "Book borrowed: {} by {}",
            book.title,
            member.name
        );

        Ok(borrowing)
    }

    /// Return a borrowed book
    pub async fn return_book(&self, borrowing_id: Uuid) -> AppResult<Borrowing> {
        self.return_book_at(borrowing_id, Utc::now()).await
    }

    /// Return a borrowed book at `returned_at`, charging the overdue fine
    pub async fn return_book_at(&self, borrowing_id: Uuid, returned_at: DateTime<Utc>) -> AppResult<Borrowing> {
        let current = self.repository.borrowings.find_by_id(borrowing_id).await?;
        if !current.is_active() {
            return Err(AppError::Conflict("Book has already been returned".to_string()));
        }

        let fine = self.policy.fine_for(current.due_at, returned_at);
        let outcome = self
            .repository
            .borrowings
            .complete_return(borrowing_id, returned_at, fine)
            .await?;

        if outcome.book_title.is_none() {
            tracing::warn!(
                borrowing_id = %borrowing_id,
                book_id = %outcome.borrowing.book_id,
                "Returned borrowing references a missing book"
            );
        }
        if outcome.member_name.is_none() {
            tracing::warn!(
                borrowing_id = %borrowing_id,
                member_id = %outcome.borrowing.member_id,
                "Returned borrowing references a missing member"
            );
        }

        tracing::info!(
            borrowing_id = %borrowing_id,
            fine = %outcome.borrowing.fine,
            "Book returned: {} by {}",
            outcome.book_title.as_deref().unwrap_or("<deleted book>"),
            outcome.member_name.as_deref().unwrap_or("<deleted member>")
        );

        Ok(outcome.borrowing)
    }

    /// Get one borrowing with book and member summaries
    pub async fn get(&self, borrowing_id: Uuid) -> AppResult<BorrowingDetails> {
        self.repository
            .borrowings
            .find_details(borrowing_id, Utc::now())
            .await
    }

    /// List borrowings matching the filter
    pub async fn list(&self, query: &BorrowingQuery) -> AppResult<Vec<BorrowingDetails>> {
        self.repository.borrowings.list(query, Utc::now()).await
    }

    /// Active borrowings past their due date
    pub async fn list_overdue(&self) -> AppResult<Vec<BorrowingDetails>> {
        self.list_overdue_at(Utc::now()).await
    }

    pub async fn list_overdue_at(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>> {
        self.repository.borrowings.list_overdue(now).await
    }

    /// Borrowing history of a member
    pub async fn member_history(&self, member_id: Uuid) -> AppResult<Vec<BorrowingDetails>> {
        // Verify member exists
        self.repository.members.find_by_id(member_id).await?;
        let query = BorrowingQuery {
            member_id: Some(member_id),
            ..Default::default()
        };
        self.list(&query).await
    }

    /// Counts by status and total fines collected
    pub async fn stats(&self) -> AppResult<BorrowingStats> {
        self.stats_at(Utc::now()).await
    }

    pub async fn stats_at(&self, now: DateTime<Utc>) -> AppResult<BorrowingStats> {
        self.repository.borrowings.stats(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use rust_decimal::Decimal;

    use crate::{
        models::{
            book::{Book, CreateBook},
            borrowing::BorrowingStatus,
            member::{CreateMember, Member},
        },
        repository::{MockBookStore, MockBorrowingStore, MockMemberStore, MockUserStore},
    };

    fn policy() -> LoanPolicy {
        LoanPolicy {
            max_active_loans: 3,
            fine_per_day: Decimal::ONE,
        }
    }

    fn new_book(isbn: &str) -> Book {
        CreateBook {
            title: format!("Book {}", isbn),
            author: "Author".to_string(),
            isbn: isbn.to_string(),
            category: "Fiction".to_string(),
            status: None,
            description: None,
            published_year: None,
            publisher: None,
        }
        .into_book(Utc::now())
        .unwrap()
    }

    fn new_member(email: &str) -> Member {
        CreateMember {
            name: "Member".to_string(),
            email: email.to_string(),
            phone: "555-0100".to_string(),
            membership_type: None,
            address: None,
            date_of_birth: None,
        }
        .into_member(Utc::now())
        .unwrap()
    }

    struct Fixture {
        repository: Repository,
        service: BorrowingService,
    }

    impl Fixture {
        fn new() -> Self {
            let repository = Repository::in_memory();
            let service = BorrowingService::new(repository.clone(), policy());
            Self { repository, service }
        }

        async fn book(&self, isbn: &str) -> Book {
            self.repository.books.create(&new_book(isbn)).await.unwrap()
        }

        async fn member(&self, email: &str) -> Member {
            self.repository.members.create(&new_member(email)).await.unwrap()
        }

        async fn book_status(&self, id: Uuid) -> BookStatus {
            self.repository.books.find_by_id(id).await.unwrap().status
        }

        async fn loans(&self, id: Uuid) -> i32 {
            self.repository.members.find_by_id(id).await.unwrap().active_loans
        }

        /// Book status and member counts agree with the ledger
        async fn assert_counters_consistent(&self) {
            let all = self
                .repository
                .borrowings
                .list(&BorrowingQuery::default(), Utc::now())
                .await
                .unwrap();
            for book in self.repository.books.list_all().await.unwrap() {
                let active = all
                    .iter()
                    .filter(|d| d.borrowing.book_id == book.id && d.borrowing.is_active())
                    .count();
                assert!(active <= 1);
                assert_eq!(book.status == BookStatus::Issued, active == 1);
            }
            for member in self.repository.members.list_all().await.unwrap() {
                let active = all
                    .iter()
                    .filter(|d| d.borrowing.member_id == member.id && d.borrowing.is_active())
                    .count();
                assert_eq!(member.active_loans as usize, active);
                assert!(member.active_loans <= 3);
            }
        }
    }

    fn issue(book: &Book, member: &Member, due: DateTime<Utc>) -> IssueBorrowing {
        IssueBorrowing {
            book_id: book.id,
            member_id: member.id,
            due_date: due,
        }
    }

    #[tokio::test]
    async fn test_issue_then_late_return() {
        let fx = Fixture::new();
        let book = fx.book("111").await;
        let member = fx.member("reader@example.com").await;
        let now = Utc::now();

        let borrowing = fx
            .service
            .issue_book_at(issue(&book, &member, now + Duration::days(1)), now)
            .await
            .unwrap();
        assert_eq!(borrowing.status, BorrowingStatus::Active);
        assert_eq!(borrowing.borrowed_at, now);
        assert_eq!(fx.book_status(book.id).await, BookStatus::Issued);
        assert_eq!(fx.loans(member.id).await, 1);
        fx.assert_counters_consistent().await;

        let returned = fx
            .service
            .return_book_at(borrowing.id, now + Duration::days(4))
            .await
            .unwrap();
        assert_eq!(returned.status, BorrowingStatus::Returned);
        assert_eq!(returned.fine, Decimal::from(3));
        assert_eq!(returned.returned_at, Some(now + Duration::days(4)));
        assert_eq!(fx.book_status(book.id).await, BookStatus::Available);
        assert_eq!(fx.loans(member.id).await, 0);
        fx.assert_counters_consistent().await;
    }

    #[tokio::test]
    async fn test_on_time_return_has_no_fine() {
        let fx = Fixture::new();
        let book = fx.book("111").await;
        let member = fx.member("reader@example.com").await;
        let now = Utc::now();

        let borrowing = fx
            .service
            .issue_book_at(issue(&book, &member, now + Duration::days(14)), now)
            .await
            .unwrap();
        let returned = fx
            .service
            .return_book_at(borrowing.id, now + Duration::days(3))
            .await
            .unwrap();
        assert_eq!(returned.fine, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_issue_unavailable_book() {
        let fx = Fixture::new();
        let book = fx.book("111").await;
        let first = fx.member("first@example.com").await;
        let second = fx.member("second@example.com").await;
        let now = Utc::now();

        fx.service
            .issue_book_at(issue(&book, &first, now + Duration::days(7)), now)
            .await
            .unwrap();
        let err = fx
            .service
            .issue_book_at(issue(&book, &second, now + Duration::days(7)), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BookUnavailable(id) if id == book.id));
        assert_eq!(fx.loans(second.id).await, 0);
        fx.assert_counters_consistent().await;
    }

    #[tokio::test]
    async fn test_issue_reserved_book_is_unavailable() {
        let fx = Fixture::new();
        let mut reserved = new_book("222");
        reserved.status = BookStatus::Reserved;
        let book = fx.repository.books.create(&reserved).await.unwrap();
        let member = fx.member("reader@example.com").await;
        let now = Utc::now();

        let err = fx
            .service
            .issue_book_at(issue(&book, &member, now + Duration::days(7)), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BookUnavailable(_)));
    }

    #[tokio::test]
    async fn test_issue_limit_exceeded_writes_nothing() {
        let fx = Fixture::new();
        let member = fx.member("reader@example.com").await;
        let now = Utc::now();

        for isbn in ["1", "2", "3"] {
            let book = fx.book(isbn).await;
            fx.service
                .issue_book_at(issue(&book, &member, now + Duration::days(7)), now)
                .await
                .unwrap();
        }
        assert_eq!(fx.loans(member.id).await, 3);

        let fourth = fx.book("4").await;
        let err = fx
            .service
            .issue_book_at(issue(&fourth, &member, now + Duration::days(7)), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BorrowLimitReached { limit: 3, .. }));

        assert_eq!(fx.book_status(fourth.id).await, BookStatus::Available);
        assert_eq!(fx.loans(member.id).await, 3);
        let ledger = fx.service.list(&BorrowingQuery::default()).await.unwrap();
        assert_eq!(ledger.len(), 3);
        fx.assert_counters_consistent().await;
    }

    #[tokio::test]
    async fn test_issue_missing_records() {
        let fx = Fixture::new();
        let book = fx.book("111").await;
        let member = fx.member("reader@example.com").await;
        let due = Utc::now() + Duration::days(7);

        let missing_book = IssueBorrowing {
            book_id: Uuid::new_v4(),
            member_id: member.id,
            due_date: due,
        };
        assert!(matches!(
            fx.service.issue_book(missing_book).await,
            Err(AppError::NotFound(_))
        ));

        let missing_member = IssueBorrowing {
            book_id: book.id,
            member_id: Uuid::new_v4(),
            due_date: due,
        };
        assert!(matches!(
            fx.service.issue_book(missing_member).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(fx.book_status(book.id).await, BookStatus::Available);
    }

    #[tokio::test]
    async fn test_due_date_must_be_in_future() {
        let fx = Fixture::new();
        let book = fx.book("111").await;
        let member = fx.member("reader@example.com").await;
        let now = Utc::now();

        let err = fx
            .service
            .issue_book_at(issue(&book, &member, now - Duration::hours(1)), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_double_return_is_rejected() {
        let fx = Fixture::new();
        let book = fx.book("111").await;
        let member = fx.member("reader@example.com").await;
        let now = Utc::now();

        let borrowing = fx
            .service
            .issue_book_at(issue(&book, &member, now + Duration::days(1)), now)
            .await
            .unwrap();
        let first = fx
            .service
            .return_book_at(borrowing.id, now + Duration::days(3))
            .await
            .unwrap();

        let err = fx
            .service
            .return_book_at(borrowing.id, now + Duration::days(10))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stored = fx.repository.borrowings.find_by_id(borrowing.id).await.unwrap();
        assert_eq!(stored.fine, first.fine);
        assert_eq!(fx.loans(member.id).await, 0);
    }

    #[tokio::test]
    async fn test_return_unknown_borrowing() {
        let fx = Fixture::new();
        let err = fx.service.return_book(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_issue_same_book() {
        let fx = Fixture::new();
        let book = fx.book("111").await;
        let first = fx.member("first@example.com").await;
        let second = fx.member("second@example.com").await;
        let due = Utc::now() + Duration::days(7);

        let a = {
            let service = fx.service.clone();
            let request = issue(&book, &first, due);
            tokio::spawn(async move { service.issue_book(request).await })
        };
        let b = {
            let service = fx.service.clone();
            let request = issue(&book, &second, due);
            tokio::spawn(async move { service.issue_book(request).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(AppError::BookUnavailable(_)))));

        assert_eq!(fx.loans(first.id).await + fx.loans(second.id).await, 1);
        fx.assert_counters_consistent().await;
    }

    #[tokio::test]
    async fn test_concurrent_issues_respect_limit() {
        let fx = Fixture::new();
        let member = fx.member("reader@example.com").await;
        let due = Utc::now() + Duration::days(7);

        let mut handles = Vec::new();
        for i in 0..6 {
            let book = fx.book(&format!("isbn-{}", i)).await;
            let service = fx.service.clone();
            let request = issue(&book, &member, due);
            handles.push(tokio::spawn(async move { service.issue_book(request).await }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(matches!(e, AppError::BorrowLimitReached { .. })),
            }
        }
        assert_eq!(successes, 3);
        assert_eq!(fx.loans(member.id).await, 3);
        fx.assert_counters_consistent().await;
    }

    #[tokio::test]
    async fn test_overdue_is_a_read_time_view() {
        let fx = Fixture::new();
        let member = fx.member("reader@example.com").await;
        let late_book = fx.book("1").await;
        let current_book = fx.book("2").await;
        let now = Utc::now();

        let late = fx
            .service
            .issue_book_at(issue(&late_book, &member, now + Duration::days(1)), now)
            .await
            .unwrap();
        fx.service
            .issue_book_at(issue(&current_book, &member, now + Duration::days(10)), now)
            .await
            .unwrap();

        assert!(fx.service.list_overdue_at(now).await.unwrap().is_empty());

        let later = now + Duration::days(3);
        let overdue = fx.service.list_overdue_at(later).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].borrowing.id, late.id);
        assert!(overdue[0].is_overdue);
        assert_eq!(overdue[0].days_overdue, 2);
        // Still persisted as active
        assert_eq!(overdue[0].borrowing.status, BorrowingStatus::Active);
        assert_eq!(overdue[0].book.as_ref().unwrap().title, late_book.title);
    }

    #[tokio::test]
    async fn test_stats() {
        let fx = Fixture::new();
        let member = fx.member("reader@example.com").await;
        let now = Utc::now();

        let mut ids = Vec::new();
        for isbn in ["1", "2", "3"] {
            let book = fx.book(isbn).await;
            let b = fx
                .service
                .issue_book_at(issue(&book, &member, now + Duration::days(1)), now)
                .await
                .unwrap();
            ids.push(b.id);
        }
        fx.service.return_book_at(ids[0], now + Duration::days(3)).await.unwrap();
        fx.service.return_book_at(ids[1], now + Duration::days(6)).await.unwrap();

        let stats = fx.service.stats_at(now + Duration::days(2)).await.unwrap();
        assert_eq!(
            stats,
            BorrowingStats {
                total_borrowings: 3,
                active_borrowings: 1,
                overdue_borrowings: 1,
                returned_borrowings: 2,
                total_fines: Decimal::from(7),
            }
        );
    }

    #[tokio::test]
    async fn test_member_history_requires_member() {
        let fx = Fixture::new();
        let err = fx.service.member_history(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    fn mocked(
        books: MockBookStore,
        members: MockMemberStore,
        borrowings: MockBorrowingStore,
    ) -> BorrowingService {
        let repository = Repository::from_stores(
            Arc::new(books),
            Arc::new(members),
            Arc::new(borrowings),
            Arc::new(MockUserStore::new()),
        );
        BorrowingService::new(repository, policy())
    }

    #[tokio::test]
    async fn test_limit_checked_before_ledger_write() {
        let book = new_book("111");
        let mut member = new_member("reader@example.com");
        member.active_loans = 3;

        let mut books = MockBookStore::new();
        let found_book = book.clone();
        books
            .expect_find_by_id()
            .returning(move |_| Ok(found_book.clone()));
        let mut members = MockMemberStore::new();
        let found_member = member.clone();
        members
            .expect_find_by_id()
            .returning(move |_| Ok(found_member.clone()));
        let mut borrowings = MockBorrowingStore::new();
        borrowings.expect_issue().times(0);

        let service = mocked(books, members, borrowings);
        let err = service
            .issue_book(issue(&book, &member, Utc::now() + Duration::days(7)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BorrowLimitReached { .. }));
    }

    #[tokio::test]
    async fn test_store_race_loss_is_reported() {
        let book = new_book("111");
        let member = new_member("reader@example.com");

        let mut books = MockBookStore::new();
        let found_book = book.clone();
        books
            .expect_find_by_id()
            .returning(move |_| Ok(found_book.clone()));
        let mut members = MockMemberStore::new();
        let found_member = member.clone();
        members
            .expect_find_by_id()
            .returning(move |_| Ok(found_member.clone()));
        let mut borrowings = MockBorrowingStore::new();
        let book_id = book.id;
        borrowings
            .expect_issue()
            .times(1)
            .returning(move |_, _| Err(AppError::BookUnavailable(book_id)));

        let service = mocked(books, members, borrowings);
        let err = service
            .issue_book(issue(&book, &member, Utc::now() + Duration::days(7)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BookUnavailable(_)));
    }
}
