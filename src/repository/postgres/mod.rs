//! PostgreSQL backend

mod books;
mod borrowings;
mod members;
mod users;

pub use books::BooksRepository;
pub use borrowings::BorrowingsRepository;
pub use members::MembersRepository;
pub use users::UsersRepository;
