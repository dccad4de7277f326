//! Member model and related types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppResult;

use super::{optional_text, required_text};

/// Membership tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
pub enum MembershipType {
    #[default]
    Regular,
    Premium,
    Student,
}

impl MembershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipType::Regular => "Regular",
            MembershipType::Premium => "Premium",
            MembershipType::Student => "Student",
        }
    }
}

impl std::fmt::Display for MembershipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MembershipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "regular" => Ok(MembershipType::Regular),
            "premium" => Ok(MembershipType::Premium),
            "student" => Ok(MembershipType::Student),
            _ => Err(format!("Invalid membership type: {}", s)),
        }
    }
}

super::text_column!(MembershipType);

/// Member model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Member {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub membership_type: MembershipType,
    /// Number of active loans, maintained by the borrowing workflow
    pub active_loans: i32,
    pub join_date: DateTime<Utc>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Short member representation embedded in borrowing views
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MemberSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

impl From<&Member> for MemberSummary {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id,
            name: member.name.clone(),
            email: member.email.clone(),
        }
    }
}

/// Create member request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateMember {
    #[validate(length(min = 1, message = "Member name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Phone number is required"))]
    pub phone: String,
    pub membership_type: Option<MembershipType>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

/// Update member request. The active loan count is not client-writable.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateMember {
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub membership_type: Option<MembershipType>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl CreateMember {
    /// Validate and produce a new member record with no loans
    pub fn into_member(mut self, now: DateTime<Utc>) -> AppResult<Member> {
        self.email = normalize_email(&self.email);
        self.validate()?;

        Ok(Member {
            id: Uuid::new_v4(),
            name: required_text(&self.name, "Member name")?,
            email: self.email,
            phone: required_text(&self.phone, "Phone number")?,
            membership_type: self.membership_type.unwrap_or_default(),
            active_loans: 0,
            join_date: now,
            address: optional_text(self.address),
            date_of_birth: self.date_of_birth,
            created_at: now,
            updated_at: now,
        })
    }
}

impl UpdateMember {
    /// Apply the provided fields onto an existing record
    pub fn apply(mut self, member: &mut Member, now: DateTime<Utc>) -> AppResult<()> {
        self.email = self.email.as_deref().map(normalize_email);
        self.validate()?;

        if let Some(name) = self.name {
            member.name = required_text(&name, "Member name")?;
        }
        if let Some(email) = self.email {
            member.email = email;
        }
        if let Some(phone) = self.phone {
            member.phone = required_text(&phone, "Phone number")?;
        }
        if let Some(membership_type) = self.membership_type {
            member.membership_type = membership_type;
        }
        if self.address.is_some() {
            member.address = optional_text(self.address);
        }
        if self.date_of_birth.is_some() {
            member.date_of_birth = self.date_of_birth;
        }
        member.updated_at = now;
        Ok(())
    }
}

/// Member count per membership tier
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TypeCount {
    pub membership_type: MembershipType,
    pub count: i64,
}
