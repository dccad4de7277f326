//! Membership service

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::member::{CreateMember, Member, UpdateMember},
    repository::Repository,
};

#[derive(Clone)]
pub struct MembersService {
    repository: Repository,
}

impl MembersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list_members(&self) -> AppResult<Vec<Member>> {
        self.repository.members.list_all().await
    }

    pub async fn get_member(&self, id: Uuid) -> AppResult<Member> {
        self.repository.members.find_by_id(id).await
    }

    /// Search by name, email or phone
    pub async fn search_members(&self, query: &str) -> AppResult<Vec<Member>> {
        if query.trim().is_empty() {
            return Err(AppError::Validation("Search query is required".to_string()));
        }
        self.repository.members.search(query).await
    }

    pub async fn create_member(&self, request: CreateMember) -> AppResult<Member> {
        let member = request.into_member(Utc::now())?;
        let member = self.repository.members.create(&member).await?;
        tracing::info!(member_id = %member.id, "Member created: {}", member.name);
        Ok(member)
    }

    pub async fn update_member(&self, id: Uuid, request: UpdateMember) -> AppResult<Member> {
        let mut member = self.repository.members.find_by_id(id).await?;
        request.apply(&mut member, Utc::now())?;
        let member = self.repository.members.update(&member).await?;
        tracing::info!(member_id = %member.id, "Member updated: {}", member.name);
        Ok(member)
    }

    /// Delete a member without active loans
    pub async fn delete_member(&self, id: Uuid) -> AppResult<()> {
        let member = self.repository.members.delete(id).await?;
        tracing::info!(member_id = %member.id, "Member deleted: {}", member.name);
        Ok(())
    }
}
