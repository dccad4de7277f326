//! API handlers and router for the library REST endpoints

pub mod auth;
pub mod books;
pub mod borrowings;
pub mod dashboard;
pub mod health;
pub mod members;
pub mod openapi;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts},
    http::request::Parts,
    routing::{get, post, put},
    Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::user::UserClaims,
    services::covers::UPLOADS_ROUTE,
    AppState,
};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    AppError::Authentication("Not authorized to access this route".to_string())
                })?;

        let claims = state.services.auth.decode_token(bearer.token())?;

        Ok(AuthenticatedUser(claims))
    }
}

/// JSON body extractor whose rejections use the API error body
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Parse a path id, reporting malformed values as validation errors
pub(crate) fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("Invalid id: {}", raw)))
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let max_upload = state.services.covers.max_file_size();
    let uploads_dir = state.services.covers.directory().to_path_buf();

    let api = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        // Books (catalog)
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/search/:query", get(books::search_books))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route(
            "/books/:id/cover",
            post(books::upload_cover).layer(DefaultBodyLimit::max(max_upload + 64 * 1024)),
        )
        // Members
        .route("/members", get(members::list_members).post(members::create_member))
        .route("/members/search/:query", get(members::search_members))
        .route(
            "/members/:id",
            get(members::get_member)
                .put(members::update_member)
                .delete(members::delete_member),
        )
        .route("/members/:id/borrowings", get(borrowings::member_borrowings))
        // Borrowings
        .route(
            "/borrowings",
            get(borrowings::list_borrowings).post(borrowings::issue_book),
        )
        .route("/borrowings/overdue", get(borrowings::overdue_borrowings))
        .route("/borrowings/stats", get(borrowings::borrowing_stats))
        .route("/borrowings/:id", get(borrowings::get_borrowing))
        .route("/borrowings/:id/return", put(borrowings::return_book))
        // Dashboard
        .route("/dashboard/stats", get(dashboard::get_stats))
        .with_state(state);

    // OpenAPI documentation
    let openapi = openapi::create_openapi_router();

    Router::new()
        .nest("/api", api)
        .nest_service(UPLOADS_ROUTE, ServeDir::new(uploads_dir))
        .merge(openapi)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
