//! In-process backend
//!
//! All collections live behind one async mutex, so every store call,
//! including the multi-record issue and return writes, is atomic with
//! respect to every other call.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookStatus, BookSummary, StatusCount},
        borrowing::{Borrowing, BorrowingDetails, BorrowingQuery, BorrowingStats, ReturnOutcome},
        member::{Member, MemberSummary, TypeCount},
        user::User,
    },
    repository::{contains_ci, BookStore, BorrowingStore, MemberStore, UserStore, BOOK_ON_LOAN},
};

#[derive(Default)]
struct MemoryState {
    books: HashMap<Uuid, Book>,
    members: HashMap<Uuid, Member>,
    borrowings: HashMap<Uuid, Borrowing>,
    users: HashMap<Uuid, User>,
}

impl MemoryState {
    fn book(&self, id: Uuid) -> AppResult<&Book> {
        self.books
            .get(&id)
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
    }

    fn member(&self, id: Uuid) -> AppResult<&Member> {
        self.members
            .get(&id)
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))
    }

    fn borrowing(&self, id: Uuid) -> AppResult<&Borrowing> {
        self.borrowings
            .get(&id)
            .ok_or_else(|| AppError::NotFound("Borrowing record not found".to_string()))
    }

    fn isbn_taken(&self, isbn: &str, except: Uuid) -> bool {
        self.books.values().any(|b| b.isbn == isbn && b.id != except)
    }

    fn email_taken(&self, email: &str, except: Uuid) -> bool {
        self.members.values().any(|m| m.email == email && m.id != except)
    }

    fn details(&self, borrowing: &Borrowing, now: DateTime<Utc>) -> BorrowingDetails {
        BorrowingDetails::new(
            borrowing.clone(),
            self.books.get(&borrowing.book_id).map(BookSummary::from),
            self.members.get(&borrowing.member_id).map(MemberSummary::from),
            now,
        )
    }

    fn collect_details<F>(&self, now: DateTime<Utc>, filter: F) -> Vec<BorrowingDetails>
    where
        F: Fn(&Borrowing) -> bool,
    {
        let mut rows: Vec<&Borrowing> = self.borrowings.values().filter(|b| filter(b)).collect();
        rows.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at).then(a.id.cmp(&b.id)));
        rows.into_iter().map(|b| self.details(b, now)).collect()
    }
}

/// Store keeping books, members, borrowings and users in memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

fn sorted_books(mut books: Vec<Book>) -> Vec<Book> {
    books.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
    books
}

fn sorted_members(mut members: Vec<Member>) -> Vec<Member> {
    members.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    members
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Book> {
        let state = self.state.lock().await;
        state.book(id).cloned()
    }

    async fn list_all(&self) -> AppResult<Vec<Book>> {
        let state = self.state.lock().await;
        Ok(sorted_books(state.books.values().cloned().collect()))
    }

    async fn search(&self, query: &str) -> AppResult<Vec<Book>> {
        let state = self.state.lock().await;
        let found = state
            .books
            .values()
            .filter(|b| {
                contains_ci(&b.title, query) || contains_ci(&b.author, query) || contains_ci(&b.isbn, query)
            })
            .cloned()
            .collect();
        Ok(sorted_books(found))
    }

    async fn create(&self, book: &Book) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        if state.isbn_taken(&book.isbn, book.id) {
            return Err(AppError::Conflict("A book with this ISBN already exists".to_string()));
        }
        state.books.insert(book.id, book.clone());
        Ok(book.clone())
    }

    async fn update(&self, book: &Book, status: Option<BookStatus>) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        if state.isbn_taken(&book.isbn, book.id) {
            return Err(AppError::Conflict("A book with this ISBN already exists".to_string()));
        }
        let stored = state
            .books
            .get_mut(&book.id)
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;
        if let Some(status) = status {
            if stored.status == BookStatus::Issued {
                return Err(AppError::Conflict(BOOK_ON_LOAN.to_string()));
            }
            stored.status = status;
        }
        stored.title = book.title.clone();
        stored.author = book.author.clone();
        stored.isbn = book.isbn.clone();
        stored.category = book.category.clone();
        stored.description = book.description.clone();
        stored.published_year = book.published_year;
        stored.publisher = book.publisher.clone();
        stored.updated_at = book.updated_at;
        Ok(stored.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        if state.book(id)?.status == BookStatus::Issued {
            return Err(AppError::Conflict(
                "Cannot delete a book that is currently issued".to_string(),
            ));
        }
        state
            .books
            .remove(&id)
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))
    }

    async fn set_cover(&self, id: Uuid, path: &str) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        let book = state
            .books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Book not found".to_string()))?;
        book.cover_image = Some(path.to_string());
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn count_by_status(&self) -> AppResult<Vec<StatusCount>> {
        let state = self.state.lock().await;
        let mut counts: HashMap<BookStatus, i64> = HashMap::new();
        for book in state.books.values() {
            *counts.entry(book.status).or_default() += 1;
        }
        let mut counts: Vec<StatusCount> = counts
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect();
        counts.sort_by_key(|c| c.status.as_str());
        Ok(counts)
    }

    async fn recent(&self, limit: i64) -> AppResult<Vec<Book>> {
        let state = self.state.lock().await;
        let mut books: Vec<Book> = state.books.values().cloned().collect();
        books.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        books.truncate(limit.max(0) as usize);
        Ok(books)
    }
}

#[async_trait]
impl MemberStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Member> {
        let state = self.state.lock().await;
        state.member(id).cloned()
    }

    async fn list_all(&self) -> AppResult<Vec<Member>> {
        let state = self.state.lock().await;
        Ok(sorted_members(state.members.values().cloned().collect()))
    }

    async fn search(&self, query: &str) -> AppResult<Vec<Member>> {
        let state = self.state.lock().await;
        let found = state
            .members
            .values()
            .filter(|m| {
                contains_ci(&m.name, query) || contains_ci(&m.email, query) || contains_ci(&m.phone, query)
            })
            .cloned()
            .collect();
        Ok(sorted_members(found))
    }

    async fn create(&self, member: &Member) -> AppResult<Member> {
        let mut state = self.state.lock().await;
        if state.email_taken(&member.email, member.id) {
            return Err(AppError::Conflict("A member with this email already exists".to_string()));
        }
        state.members.insert(member.id, member.clone());
        Ok(member.clone())
    }

    async fn update(&self, member: &Member) -> AppResult<Member> {
        let mut state = self.state.lock().await;
        if state.email_taken(&member.email, member.id) {
            return Err(AppError::Conflict("A member with this email already exists".to_string()));
        }
        let stored = state
            .members
            .get_mut(&member.id)
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;
        stored.name = member.name.clone();
        stored.email = member.email.clone();
        stored.phone = member.phone.clone();
        stored.membership_type = member.membership_type;
        stored.address = member.address.clone();
        stored.date_of_birth = member.date_of_birth;
        stored.updated_at = member.updated_at;
        Ok(stored.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<Member> {
        let mut state = self.state.lock().await;
        if state.member(id)?.active_loans > 0 {
            return Err(AppError::Conflict(
                "Cannot delete a member with active loans".to_string(),
            ));
        }
        state
            .members
            .remove(&id)
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))
    }

    async fn count_by_type(&self) -> AppResult<Vec<TypeCount>> {
        let state = self.state.lock().await;
        let mut counts = HashMap::new();
        for member in state.members.values() {
            *counts.entry(member.membership_type).or_insert(0i64) += 1;
        }
        let mut counts: Vec<TypeCount> = counts
            .into_iter()
            .map(|(membership_type, count)| TypeCount { membership_type, count })
            .collect();
        counts.sort_by_key(|c| c.membership_type.as_str());
        Ok(counts)
    }

    async fn recent(&self, limit: i64) -> AppResult<Vec<Member>> {
        let state = self.state.lock().await;
        let mut members: Vec<Member> = state.members.values().cloned().collect();
        members.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        members.truncate(limit.max(0) as usize);
        Ok(members)
    }
}

#[async_trait]
impl BorrowingStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Borrowing> {
        let state = self.state.lock().await;
        state.borrowing(id).cloned()
    }

    async fn find_details(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<BorrowingDetails> {
        let state = self.state.lock().await;
        let borrowing = state.borrowing(id)?;
        Ok(state.details(borrowing, now))
    }

    async fn list(&self, query: &BorrowingQuery, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>> {
        let state = self.state.lock().await;
        Ok(state.collect_details(now, |b| query.matches(b)))
    }

    async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>> {
        let state = self.state.lock().await;
        let mut rows = state.collect_details(now, |b| b.is_overdue(now));
        rows.sort_by(|a, b| {
            a.borrowing
                .due_at
                .cmp(&b.borrowing.due_at)
                .then(a.borrowing.id.cmp(&b.borrowing.id))
        });
        Ok(rows)
    }

    async fn issue(&self, borrowing: &Borrowing, max_active_loans: i32) -> AppResult<Borrowing> {
        let mut state = self.state.lock().await;

        // Check everything before touching anything
        if state.book(borrowing.book_id)?.status != BookStatus::Available {
            return Err(AppError::BookUnavailable(borrowing.book_id));
        }
        if state.member(borrowing.member_id)?.active_loans >= max_active_loans {
            return Err(AppError::BorrowLimitReached {
                member_id: borrowing.member_id,
                limit: max_active_loans,
            });
        }

        state.borrowings.insert(borrowing.id, borrowing.clone());
        if let Some(book) = state.books.get_mut(&borrowing.book_id) {
            book.status = BookStatus::Issued;
            book.updated_at = borrowing.borrowed_at;
        }
        if let Some(member) = state.members.get_mut(&borrowing.member_id) {
            member.active_loans += 1;
            member.updated_at = borrowing.borrowed_at;
        }

        Ok(borrowing.clone())
    }

    async fn complete_return(
        &self,
        id: Uuid,
        returned_at: DateTime<Utc>,
        fine: Decimal,
    ) -> AppResult<ReturnOutcome> {
        let mut state = self.state.lock().await;

        let entry = state
            .borrowings
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("Borrowing record not found".to_string()))?;
        if !entry.is_active() {
            return Err(AppError::Conflict("Book has already been returned".to_string()));
        }
        entry.mark_returned(returned_at, fine);
        let borrowing = entry.clone();

        let book_title = state.books.get_mut(&borrowing.book_id).map(|book| {
            book.status = BookStatus::Available;
            book.updated_at = returned_at;
            book.title.clone()
        });
        let member_name = state.members.get_mut(&borrowing.member_id).map(|member| {
            member.active_loans = (member.active_loans - 1).max(0);
            member.updated_at = returned_at;
            member.name.clone()
        });

        Ok(ReturnOutcome {
            borrowing,
            book_title,
            member_name,
        })
    }

    async fn stats(&self, now: DateTime<Utc>) -> AppResult<BorrowingStats> {
        let state = self.state.lock().await;
        let mut stats = BorrowingStats::default();
        for borrowing in state.borrowings.values() {
            stats.total_borrowings += 1;
            if borrowing.is_active() {
                stats.active_borrowings += 1;
                if borrowing.is_overdue(now) {
                    stats.overdue_borrowings += 1;
                }
            } else {
                stats.returned_borrowings += 1;
                stats.total_fines += borrowing.fine;
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<User> {
        let state = self.state.lock().await;
        state
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        let email = email.to_lowercase();
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn create(&self, user: &User) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        state.users.insert(user.id, user.clone());
        Ok(user.clone())
    }
}
