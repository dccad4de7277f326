//! Catalog service: book records and their covers

use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::book::{Book, CreateBook, UpdateBook},
    repository::Repository,
};

use super::covers::{CoverStorage, CoverUpload};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    covers: CoverStorage,
}

impl CatalogService {
    pub fn new(repository: Repository, covers: CoverStorage) -> Self {
        Self { repository, covers }
    }

    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.repository.books.list_all().await
    }

    pub async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        self.repository.books.find_by_id(id).await
    }

    /// Search by title, author or ISBN
    pub async fn search_books(&self, query: &str) -> AppResult<Vec<Book>> {
        if query.trim().is_empty() {
            return Err(AppError::Validation("Search query is required".to_string()));
        }
        self.repository.books.search(query).await
    }

    pub async fn create_book(&self, request: CreateBook) -> AppResult<Book> {
        let book = request.into_book(Utc::now())?;
        let book = self.repository.books.create(&book).await?;
        tracing::info!(book_id = %book.id, "Book created: {}", book.title);
        Ok(book)
    }

    pub async fn update_book(&self, id: Uuid, request: UpdateBook) -> AppResult<Book> {
        let mut book = self.repository.books.find_by_id(id).await?;
        let status = request.status;
        request.apply(&mut book, Utc::now())?;
        let book = self.repository.books.update(&book, status).await?;
        tracing::info!(book_id = %book.id, "Book updated: {}", book.title);
        Ok(book)
    }

    /// Delete a book that is not on loan
    pub async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        let book = self.repository.books.delete(id).await?;
        if let Some(cover) = &book.cover_image {
            self.covers.remove(cover).await;
        }
        tracing::info!(book_id = %book.id, "Book deleted: {}", book.title);
        Ok(())
    }

    /// Store an uploaded cover and attach it to the book
    pub async fn upload_cover(&self, id: Uuid, upload: CoverUpload) -> AppResult<Book> {
        let previous = self.repository.books.find_by_id(id).await?.cover_image;

        let path = self.covers.store(&upload).await?;
        let book = match self.repository.books.set_cover(id, &path).await {
            Ok(book) => book,
            Err(e) => {
                self.covers.remove(&path).await;
                return Err(e);
            }
        };

        if let Some(old) = previous.filter(|old| *old != path) {
            self.covers.remove(&old).await;
        }
        tracing::info!(book_id = %book.id, "Cover uploaded: {}", path);
        Ok(book)
    }
}
