//! Data models for the library server

pub mod book;
pub mod borrowing;
pub mod dashboard;
pub mod member;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookStatus};
pub use borrowing::{Borrowing, BorrowingDetails, BorrowingStatus, LoanPolicy};
pub use member::{Member, MembershipType};
pub use user::{Role, User, UserClaims};

/// Store a string-like enum in a TEXT column through its `as_str`/`FromStr` pair
macro_rules! text_column {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s: &str = sqlx::Decode::<sqlx::Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

pub(crate) use text_column;

/// Trim a required text field, rejecting blank values
pub(crate) fn required_text(value: &str, field: &str) -> crate::error::AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::error::AppError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional text field, mapping blank values to `None`
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
