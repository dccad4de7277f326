//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, borrowings, dashboard, health, members};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Library API",
        version = "1.0.0",
        description = "Library management REST API: catalog, members and borrowing ledger",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api", description = "API")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::me,
        // Books
        books::list_books,
        books::get_book,
        books::search_books,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::upload_cover,
        // Members
        members::list_members,
        members::get_member,
        members::search_members,
        members::create_member,
        members::update_member,
        members::delete_member,
        // Borrowings
        borrowings::list_borrowings,
        borrowings::get_borrowing,
        borrowings::member_borrowings,
        borrowings::overdue_borrowings,
        borrowings::borrowing_stats,
        borrowings::issue_book,
        borrowings::return_book,
        // Dashboard
        dashboard::get_stats,
    ),
    components(
        schemas(
            // Auth
            crate::models::user::User,
            crate::models::user::Role,
            crate::models::user::RegisterRequest,
            crate::models::user::LoginRequest,
            crate::models::user::AuthResponse,
            // Books
            crate::models::book::Book,
            crate::models::book::BookStatus,
            crate::models::book::BookSummary,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::StatusCount,
            books::CoverUploadForm,
            // Members
            crate::models::member::Member,
            crate::models::member::MembershipType,
            crate::models::member::MemberSummary,
            crate::models::member::CreateMember,
            crate::models::member::UpdateMember,
            crate::models::member::TypeCount,
            // Borrowings
            crate::models::borrowing::Borrowing,
            crate::models::borrowing::BorrowingStatus,
            crate::models::borrowing::BorrowingDetails,
            crate::models::borrowing::IssueBorrowing,
            crate::models::borrowing::BorrowingStats,
            // Dashboard
            crate::models::dashboard::DashboardStats,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "books", description = "Catalog management"),
        (name = "members", description = "Member management"),
        (name = "borrowings", description = "Issue, return and overdue tracking"),
        (name = "dashboard", description = "Statistics")
    )
)]
pub struct ApiDoc;

/// Registers the bearer token scheme referenced by secured paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
