//! Dashboard aggregates over catalog and membership

use crate::{error::AppResult, models::dashboard::DashboardStats, repository::Repository};

const RECENT_LIMIT: i64 = 5;

#[derive(Clone)]
pub struct DashboardService {
    repository: Repository,
}

impl DashboardService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn stats(&self) -> AppResult<DashboardStats> {
        let (books_by_status, members_by_type, recent_books, recent_members) = tokio::try_join!(
            self.repository.books.count_by_status(),
            self.repository.members.count_by_type(),
            self.repository.books.recent(RECENT_LIMIT),
            self.repository.members.recent(RECENT_LIMIT),
        )?;

        Ok(DashboardStats {
            total_books: books_by_status.iter().map(|c| c.count).sum(),
            books_by_status,
            total_members: members_by_type.iter().map(|c| c.count).sum(),
            members_by_type,
            recent_books,
            recent_members,
        })
    }
}
