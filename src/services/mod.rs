//! Business logic services

pub mod auth;
pub mod borrowings;
pub mod catalog;
pub mod covers;
pub mod dashboard;
pub mod members;

use crate::{config::AppConfig, models::borrowing::LoanPolicy, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub catalog: catalog::CatalogService,
    pub members: members::MembersService,
    pub borrowings: borrowings::BorrowingService,
    pub dashboard: dashboard::DashboardService,
    pub covers: covers::CoverStorage,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        let covers = covers::CoverStorage::new(&config.uploads);
        Self {
            auth: auth::AuthService::new(repository.clone(), config.auth.clone()),
            catalog: catalog::CatalogService::new(repository.clone(), covers.clone()),
            members: members::MembersService::new(repository.clone()),
            borrowings: borrowings::BorrowingService::new(
                repository.clone(),
                LoanPolicy::from(&config.loans),
            ),
            dashboard: dashboard::DashboardService::new(repository.clone()),
            covers,
            repository,
        }
    }

    /// Readiness check on the underlying store
    pub async fn ping(&self) -> crate::error::AppResult<()> {
        self.repository.ping().await
    }
}
