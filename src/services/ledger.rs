//! Inventory ledger: copy accounting per book

use std::sync::Arc;

use validator::Validate;

use crate::{
    clock::Clock,
    config::LendingConfig,
    error::{AppError, AppResult, ConflictKind},
    models::{Book, NewBook, RecordScope},
    repository::{LendingStore, LendingTransaction},
    services::instrument::{traced, with_transient_retry, Operation},
};

/// Take one copy off the shelf
pub fn take_copy(book: &mut Book) -> AppResult<()> {
    if book.available_copies <= 0 {
        return Err(AppError::Conflict(ConflictKind::OutOfStock));
    }
    book.available_copies -= 1;
    Ok(())
}

/// Put one copy back, never above capacity.
///
/// A release past capacity can only come from corrupted counts, so it is capped
/// rather than reported.
pub fn put_back_copy(book: &mut Book) {
    book.available_copies = (book.available_copies + 1).min(book.total_copies);
}

/// Change capacity while keeping the number of copies on loan
pub fn resize(book: &mut Book, total_copies: i32) {
    let on_loan = book.copies_on_loan().max(0);
    book.total_copies = total_copies;
    book.available_copies = (total_copies - on_loan).clamp(0, total_copies);
}

#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn LendingStore>,
    clock: Arc<dyn Clock>,
    config: LendingConfig,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn LendingStore>, clock: Arc<dyn Clock>, config: LendingConfig) -> Self {
        Self { store, clock, config }
    }

    /// Register a book; every copy starts on the shelf
    pub async fn register_book(&self, book: NewBook) -> AppResult<Book> {
        traced(Operation::RegisterBook, async {
            book.validate()?;
            let book = self.store.insert_book(&book, self.clock.now()).await?;
            tracing::info!(book_id = book.id, copies = book.total_copies, "Book registered");
            Ok(book)
        })
        .await
    }

    /// Get a book that has not been deleted
    pub async fn get_book(&self, book_id: i64) -> AppResult<Book> {
        self.store
            .get_book(book_id, RecordScope::ActiveOnly)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))
    }

    /// Change `total_copies`, re-clamping `available_copies`
    pub async fn set_total_copies(&self, book_id: i64, total_copies: i32) -> AppResult<Book> {
        traced(Operation::SetTotalCopies, async {
            if total_copies < 1 {
                return Err(AppError::Validation("A book needs at least one copy".to_string()));
            }
            with_transient_retry(Operation::SetTotalCopies, self.config.max_transaction_retries, move || {
                self.try_set_total_copies(book_id, total_copies)
            })
            .await
        })
        .await
    }

    async fn try_set_total_copies(&self, book_id: i64, total_copies: i32) -> AppResult<Book> {
        let mut tx = self.store.begin().await?;
        let mut book = tx
            .lock_book(book_id, RecordScope::ActiveOnly)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        resize(&mut book, total_copies);
        book.updated_at = self.clock.now();
        tx.update_book_copies(&book).await?;
        tx.commit().await?;

        Ok(book)
    }

    /// Decrement `available_copies` inside the caller's transaction.
    ///
    /// `book` must have been read through [`LendingTransaction::lock_book`] on `tx`.
    pub async fn reserve_copy(&self, tx: &mut dyn LendingTransaction, book: &mut Book) -> AppResult<()> {
        take_copy(book)?;
        book.updated_at = self.clock.now();
        tx.update_book_copies(book).await
    }

    /// Increment `available_copies` inside the caller's transaction
    pub async fn release_copy(&self, tx: &mut dyn LendingTransaction, book: &mut Book) -> AppResult<()> {
        if book.available_copies >= book.total_copies {
            tracing::warn!(book_id = book.id, "Release of a copy beyond capacity, capping");
        }
        put_back_copy(book);
        book.updated_at = self.clock.now();
        tx.update_book_copies(book).await
    }
}
