//! Dashboard aggregates

use serde::Serialize;
use utoipa::ToSchema;

use super::{
    book::{Book, StatusCount},
    member::{Member, TypeCount},
};

/// Catalog and membership overview
#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    pub total_books: i64,
    pub books_by_status: Vec<StatusCount>,
    pub total_members: i64,
    pub members_by_type: Vec<TypeCount>,
    /// Most recently added books
    pub recent_books: Vec<Book>,
    /// Most recently registered members
    pub recent_members: Vec<Member>,
}
