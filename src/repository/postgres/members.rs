//! Members repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::member::{Member, MembershipType, TypeCount},
    repository::{like_pattern, MemberStore},
};

const DUPLICATE_EMAIL: &str = "A member with this email already exists";

#[derive(Clone)]
pub struct MembersRepository {
    pool: Pool<Postgres>,
}

impl MembersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MemberStore for MembersRepository {
    /// Get member by ID
    async fn find_by_id(&self, id: Uuid) -> AppResult<Member> {
        sqlx::query_as::<_, Member>("SELECT * FROM members WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))
    }

    async fn list_all(&self) -> AppResult<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>("SELECT * FROM members ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?;
        Ok(members)
    }

    async fn search(&self, query: &str) -> AppResult<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>(
            r#"
            SELECT * FROM members
            WHERE name ILIKE $1 OR email ILIKE $1 OR phone ILIKE $1
            ORDER BY name, id
            "#,
        )
        .bind(like_pattern(query))
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }

    async fn create(&self, member: &Member) -> AppResult<Member> {
        sqlx::query_as::<_, Member>(
            r#"
            INSERT INTO members (
                id, name, email, phone, membership_type, active_loans,
                join_date, address, date_of_birth, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(member.id)
        .bind(&member.name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(member.membership_type)
        .bind(member.active_loans)
        .bind(member.join_date)
        .bind(&member.address)
        .bind(member.date_of_birth)
        .bind(member.created_at)
        .bind(member.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_store(e, DUPLICATE_EMAIL))
    }

    async fn update(&self, member: &Member) -> AppResult<Member> {
        sqlx::query_as::<_, Member>(
            r#"
            UPDATE members SET
                name = $2, email = $3, phone = $4, membership_type = $5,
                address = $6, date_of_birth = $7, updated_at = $8
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(member.id)
        .bind(&member.name)
        .bind(&member.email)
        .bind(&member.phone)
        .bind(member.membership_type)
        .bind(&member.address)
        .bind(member.date_of_birth)
        .bind(member.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::from_store(e, DUPLICATE_EMAIL))?
        .ok_or_else(|| AppError::NotFound("Member not found".to_string()))
    }

    async fn delete(&self, id: Uuid) -> AppResult<Member> {
        let deleted = sqlx::query_as::<_, Member>(
            "DELETE FROM members WHERE id = $1 AND active_loans = 0 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match deleted {
            Some(member) => Ok(member),
            None => {
                self.find_by_id(id).await?;
                Err(AppError::Conflict(
                    "Cannot delete a member with active loans".to_string(),
                ))
            }
        }
    }

    async fn count_by_type(&self) -> AppResult<Vec<TypeCount>> {
        let rows = sqlx::query_as::<_, (MembershipType, i64)>(
            "SELECT membership_type, COUNT(*) FROM members GROUP BY membership_type ORDER BY membership_type",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(membership_type, count)| TypeCount { membership_type, count })
            .collect())
    }

    async fn recent(&self, limit: i64) -> AppResult<Vec<Member>> {
        let members = sqlx::query_as::<_, Member>(
            "SELECT * FROM members ORDER BY created_at DESC, id LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(members)
    }
}
