//! Authentication service: account registration, login and token issuance

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        member::normalize_email,
        user::{AuthResponse, LoginRequest, RegisterRequest, User, UserClaims},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Create an account and return a token for it
    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        let mut request = request;
        request.email = normalize_email(&request.email);
        request.name = request.name.trim().to_string();
        request.validate()?;

        let role = request.role.unwrap_or_default();
        if role.is_staff() && !self.config.allow_role_selection {
            return Err(AppError::Authorization(
                "Staff accounts cannot be self-registered".to_string(),
            ));
        }

        if self.repository.users.find_by_email(&request.email).await?.is_some() {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            name: request.name,
            email: request.email,
            password_hash: self.hash_password(&request.password)?,
            role,
            created_at: Utc::now(),
        };
        let user = self.repository.users.create(&user).await?;

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");

        self.respond_with_token(user)
    }

    /// Authenticate by email and password
    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        request.validate()?;

        let user = self
            .repository
            .users
            .find_by_email(&normalize_email(&request.email))
            .await?
            .ok_or_else(invalid_credentials)?;

        if !self.verify_password(&user, &request.password)? {
            return Err(invalid_credentials());
        }

        self.respond_with_token(user)
    }

    /// Account behind a validated token
    pub async fn current_user(&self, claims: &UserClaims) -> AppResult<User> {
        self.repository.users.find_by_id(claims.sub).await.map_err(|e| match e {
            AppError::NotFound(_) => {
                AppError::Authentication("User no longer exists".to_string())
            }
            other => other,
        })
    }

    /// Decode and validate a bearer token
    pub fn decode_token(&self, token: &str) -> AppResult<UserClaims> {
        UserClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|_| AppError::Authentication("Invalid or expired token".to_string()))
    }

    fn respond_with_token(&self, user: User) -> AppResult<AuthResponse> {
        let claims = UserClaims::new(&user, Utc::now(), self.config.jwt_expiration_hours);
        let token = claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))?;

        Ok(AuthResponse {
            token,
            token_type: "Bearer".to_string(),
            user,
        })
    }

    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }
}

fn invalid_credentials() -> AppError {
    AppError::Authentication("Invalid credentials".to_string())
}
