//! API tests running the full router in process on the memory backend

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use library_server::{api, config::AppConfig, repository::Repository, AppState};

struct TestApp {
    app: Router,
    _uploads: TempDir,
}

impl TestApp {
    fn new() -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "api-test-secret".to_string();
        config.uploads.directory = uploads.path().to_string_lossy().into_owned();

        let state = AppState::new(config, Repository::in_memory());
        Self {
            app: api::router(state),
            _uploads: uploads,
        }
    }

    async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    async fn register(&self, email: &str, role: &str) -> String {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({
                    "name": "Test User",
                    "email": email,
                    "password": "secret123",
                    "role": role
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["token"].as_str().unwrap().to_string()
    }

    async fn staff(&self) -> String {
        self.register("librarian@example.com", "librarian").await
    }

    async fn create_book(&self, token: &str, isbn: &str) -> Value {
        let (status, body) = self
            .post(
                "/api/books",
                Some(token),
                json!({
                    "title": format!("Book {}", isbn),
                    "author": "Ursula K. Le Guin",
                    "isbn": isbn,
                    "category": "Fiction"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }

    async fn create_member(&self, token: &str, email: &str) -> Value {
        let (status, body) = self
            .post(
                "/api/members",
                Some(token),
                json!({
                    "name": "Reader",
                    "email": email,
                    "phone": "555-0100",
                    "membership_type": "Student"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }
}

fn due_in(duration: Duration) -> String {
    (Utc::now() + duration).to_rfc3339()
}

#[tokio::test]
async fn test_health_check() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.get("/api/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_login_and_me() {
    let app = TestApp::new();
    app.register("reader@example.com", "member").await;

    let (status, body) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "Reader@Example.com", "password": "secret123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["user"].get("password_hash").is_none());
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app.get("/api/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "reader@example.com");
    assert_eq!(body["role"], "member");

    let (status, body) = app
        .post(
            "/api/auth/login",
            None,
            json!({ "email": "reader@example.com", "password": "wrong-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "status": "error", "message": "Invalid credentials" }));
}

#[tokio::test]
async fn test_access_control() {
    let app = TestApp::new();
    let member_token = app.register("reader@example.com", "member").await;

    // Public catalog reads
    let (status, body) = app.get("/api/books", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    // Token required
    let (status, body) = app.get("/api/members", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");

    let (status, _) = app.get("/api/members", Some("garbage")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/api/members", Some(&member_token)).await;
    assert_eq!(status, StatusCode::OK);

    // Staff required
    let (status, body) = app
        .post(
            "/api/books",
            Some(&member_token),
            json!({ "title": "T", "author": "A", "isbn": "1", "category": "C" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(
        body["message"],
        "User role member is not authorized to access this route"
    );

    let (status, _) = app.get("/api/dashboard/stats", Some(&member_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_book_crud() {
    let app = TestApp::new();
    let token = app.staff().await;

    let book = app.create_book(&token, "978-0-441-01340-5").await;
    assert_eq!(book["status"], "Available");
    assert_eq!(book["isbn"], "9780441013405");
    let id = book["id"].as_str().unwrap();

    let (status, body) = app.get(&format!("/api/books/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Book 978-0-441-01340-5");

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/api/books/{}", id),
            Some(&token),
            Some(json!({ "title": "The Left Hand of Darkness" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "The Left Hand of Darkness");

    let (status, body) = app.get("/api/books/search/left%20hand", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/books/{}", id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app.get(&format!("/api/books/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "status": "error", "message": "Book not found" }));
}

#[tokio::test]
async fn test_validation_errors() {
    let app = TestApp::new();
    let token = app.staff().await;
    app.create_book(&token, "111").await;

    let (status, body) = app
        .post(
            "/api/books",
            Some(&token),
            json!({ "title": "Dup", "author": "A", "isbn": "111", "category": "C" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "A book with this ISBN already exists");

    let (status, body) = app
        .post(
            "/api/books",
            Some(&token),
            json!({ "title": "", "author": "A", "isbn": "222", "category": "C" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Book title is required");

    let (status, body) = app.get("/api/books/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, body) = app
        .post(
            "/api/members",
            Some(&token),
            json!({ "name": "Bad", "email": "not-an-email", "phone": "1" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid email format");
}

#[tokio::test]
async fn test_issue_and_return_flow() {
    let app = TestApp::new();
    let token = app.staff().await;
    let book = app.create_book(&token, "111").await;
    let member = app.create_member(&token, "reader@example.com").await;
    let book_id = book["id"].as_str().unwrap();
    let member_id = member["id"].as_str().unwrap();

    // camelCase field names are accepted
    let (status, borrowing) = app
        .post(
            "/api/borrowings",
            Some(&token),
            json!({ "bookId": book_id, "memberId": member_id, "dueDate": due_in(Duration::days(14)) }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", borrowing);
    assert_eq!(borrowing["status"], "active");
    let borrowing_id = borrowing["id"].as_str().unwrap();

    let (_, book_after) = app.get(&format!("/api/books/{}", book_id), None).await;
    assert_eq!(book_after["status"], "Issued");
    let (_, member_after) = app
        .get(&format!("/api/members/{}", member_id), Some(&token))
        .await;
    assert_eq!(member_after["active_loans"], 1);

    // Same book cannot be issued twice
    let other = app.create_member(&token, "other@example.com").await;
    let (status, body) = app
        .post(
            "/api/borrowings",
            Some(&token),
            json!({
                "book_id": book_id,
                "member_id": other["id"],
                "due_date": due_in(Duration::days(14))
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        format!("Book {} is not available for borrowing", book_id)
    );

    let (status, details) = app
        .get(&format!("/api/borrowings/{}", borrowing_id), Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["book"]["id"], book_id);
    assert_eq!(details["member"]["email"], "reader@example.com");
    assert_eq!(details["is_overdue"], false);

    let (status, history) = app
        .get(&format!("/api/members/{}/borrowings", member_id), Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (status, returned) = app
        .request(
            Method::PUT,
            &format!("/api/borrowings/{}/return", borrowing_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["status"], "returned");
    assert!(returned["returned_at"].is_string());

    let (_, book_after) = app.get(&format!("/api/books/{}", book_id), None).await;
    assert_eq!(book_after["status"], "Available");
    let (_, member_after) = app
        .get(&format!("/api/members/{}", member_id), Some(&token))
        .await;
    assert_eq!(member_after["active_loans"], 0);

    // Second return is rejected
    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/api/borrowings/{}/return", borrowing_id),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Book has already been returned");

    let (status, stats) = app.get("/api/borrowings/stats", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_borrowings"], 1);
    assert_eq!(stats["returned_borrowings"], 1);
    assert_eq!(stats["active_borrowings"], 0);
}

#[tokio::test]
async fn test_reserved_book_released_by_update() {
    let app = TestApp::new();
    let token = app.staff().await;
    let member = app.create_member(&token, "reader@example.com").await;

    let (status, book) = app
        .post(
            "/api/books",
            Some(&token),
            json!({
                "title": "The Dispossessed",
                "author": "Ursula K. Le Guin",
                "isbn": "333",
                "category": "Fiction",
                "status": "Reserved"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", book);
    assert_eq!(book["status"], "Reserved");
    let book_uri = format!("/api/books/{}", book["id"].as_str().unwrap());

    let issue = json!({
        "book_id": book["id"],
        "member_id": member["id"],
        "due_date": due_in(Duration::days(7))
    });
    let (status, _) = app.post("/api/borrowings", Some(&token), issue.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(
            Method::PUT,
            &book_uri,
            Some(&token),
            Some(json!({ "status": "Issued" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");

    let (status, body) = app
        .request(
            Method::PUT,
            &book_uri,
            Some(&token),
            Some(json!({ "status": "Available" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["status"], "Available");

    let (status, body) = app.post("/api/borrowings", Some(&token), issue).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    // An issued book keeps its status until it is returned
    let (status, body) = app
        .request(
            Method::PUT,
            &book_uri,
            Some(&token),
            Some(json!({ "status": "Available" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot change a book that is currently issued");

    let (_, body) = app.get(&book_uri, None).await;
    assert_eq!(body["status"], "Issued");
}

#[tokio::test]
async fn test_borrow_limit() {
    let app = TestApp::new();
    let token = app.staff().await;
    let member = app.create_member(&token, "reader@example.com").await;

    for isbn in ["1", "2", "3", "4"] {
        let book = app.create_book(&token, isbn).await;
        let (status, body) = app
            .post(
                "/api/borrowings",
                Some(&token),
                json!({
                    "book_id": book["id"],
                    "member_id": member["id"],
                    "due_date": due_in(Duration::days(7))
                }),
            )
            .await;
        if isbn == "4" {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(
                body["message"],
                "Member has reached maximum borrowing limit (3)"
            );
        } else {
            assert_eq!(status, StatusCode::CREATED);
        }
    }

    let (_, all) = app.get("/api/borrowings", Some(&token)).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    let (status, active) = app
        .get("/api/borrowings?status=active", Some(&token))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active.as_array().unwrap().len(), 3);

    // A member with loans cannot be deleted
    let (status, body) = app
        .request(
            Method::DELETE,
            &format!("/api/members/{}", member["id"].as_str().unwrap()),
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Cannot delete a member with active loans");
}

#[tokio::test]
async fn test_overdue_listing() {
    let app = TestApp::new();
    let token = app.staff().await;
    let book = app.create_book(&token, "111").await;
    let member = app.create_member(&token, "reader@example.com").await;

    let (status, _) = app
        .post(
            "/api/borrowings",
            Some(&token),
            json!({
                "book_id": book["id"],
                "member_id": member["id"],
                "due_date": due_in(Duration::seconds(1))
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, overdue) = app.get("/api/borrowings/overdue", Some(&token)).await;
    assert_eq!(overdue, json!([]));

    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;

    let (status, overdue) = app.get("/api/borrowings/overdue", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    let overdue = overdue.as_array().unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0]["is_overdue"], true);
    assert_eq!(overdue[0]["status"], "active");

    let (_, stats) = app.get("/api/borrowings/stats", Some(&token)).await;
    assert_eq!(stats["overdue_borrowings"], 1);
}

#[tokio::test]
async fn test_past_due_date_rejected() {
    let app = TestApp::new();
    let token = app.staff().await;
    let book = app.create_book(&token, "111").await;
    let member = app.create_member(&token, "reader@example.com").await;

    let (status, body) = app
        .post(
            "/api/borrowings",
            Some(&token),
            json!({
                "book_id": book["id"],
                "member_id": member["id"],
                "due_date": due_in(Duration::days(-1))
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Due date must be in the future");
}

#[tokio::test]
async fn test_dashboard_stats() {
    let app = TestApp::new();
    let token = app.staff().await;
    app.create_book(&token, "1").await;
    app.create_book(&token, "2").await;
    app.create_member(&token, "reader@example.com").await;

    let (status, body) = app.get("/api/dashboard/stats", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_books"], 2);
    assert_eq!(body["total_members"], 1);
    assert_eq!(body["recent_books"].as_array().unwrap().len(), 2);
    assert_eq!(body["members_by_type"][0]["membership_type"], "Student");
}

#[tokio::test]
async fn test_unknown_borrowing() {
    let app = TestApp::new();
    let token = app.staff().await;

    let (status, body) = app
        .request(
            Method::PUT,
            "/api/borrowings/00000000-0000-0000-0000-000000000000/return",
            Some(&token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Borrowing record not found");
}
