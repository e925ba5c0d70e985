//! Lending state machine: borrow and return transactions
//!
//! ```text
//! Borrowed ──sweep──> Overdue
//!    │                   │
//!    └──────return───────┴──> Returned (terminal)
//! ```

use std::sync::Arc;

use chrono::Duration;

use crate::{
    clock::Clock,
    config::LendingConfig,
    error::{AppError, AppResult, ConflictKind},
    models::{BorrowingRecord, BorrowingRecordView, BorrowingStatus, NewBorrowingRecord, NewPatron, Patron, RecordScope},
    repository::LendingStore,
    services::{
        instrument::{traced, with_transient_retry, Operation},
        ledger::InventoryLedger,
    },
};

#[derive(Clone)]
pub struct LendingService {
    store: Arc<dyn LendingStore>,
    ledger: InventoryLedger,
    clock: Arc<dyn Clock>,
    config: LendingConfig,
}

impl LendingService {
    pub fn new(
        store: Arc<dyn LendingStore>,
        ledger: InventoryLedger,
        clock: Arc<dyn Clock>,
        config: LendingConfig,
    ) -> Self {
        Self { store, ledger, clock, config }
    }

    fn loan_period(&self) -> Duration {
        Duration::days(self.config.loan_period_days)
    }

    /// Lend a copy of a book to a patron
    pub async fn borrow(&self, book_id: i64, patron_id: i64, notes: &str) -> AppResult<BorrowingRecord> {
        traced(Operation::Borrow, async {
            with_transient_retry(Operation::Borrow, self.config.max_transaction_retries, move || {
                self.try_borrow(book_id, patron_id, notes)
            })
            .await
        })
        .await
    }

    async fn try_borrow(&self, book_id: i64, patron_id: i64, notes: &str) -> AppResult<BorrowingRecord> {
        let mut tx = self.store.begin().await?;

        // Row lock on the book serializes every borrow and return of it
        let mut book = tx
            .lock_book(book_id, RecordScope::ActiveOnly)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        let patron = tx
            .get_patron(patron_id, RecordScope::ActiveOnly)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Patron with id {} not found", patron_id)))?;

        if !patron.active {
            return Err(AppError::Conflict(ConflictKind::PatronInactive));
        }

        if tx
            .find_record(book.id, patron.id, &BorrowingStatus::ACTIVE)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(ConflictKind::DuplicateLoan));
        }

        self.ledger.reserve_copy(&mut *tx, &mut book).await?;

        let now = self.clock.now();
        let record = tx
            .insert_record(&NewBorrowingRecord {
                book_id: book.id,
                patron_id: patron.id,
                borrow_date: now,
                due_date: now + self.loan_period(),
                status: BorrowingStatus::Borrowed,
                notes: notes.to_string(),
            })
            .await?;

        tx.commit().await?;

        tracing::info!(
            record_id = record.id,
            book_id,
            patron_id,
            available = book.available_copies,
            due_date = %record.due_date,
            "Book borrowed"
        );
        Ok(record)
    }

    /// Close the active loan of a book by a patron
    pub async fn return_book(&self, book_id: i64, patron_id: i64, notes: &str) -> AppResult<BorrowingRecord> {
        traced(Operation::Return, async {
            with_transient_retry(Operation::Return, self.config.max_transaction_retries, move || {
                self.try_return(book_id, patron_id, notes)
            })
            .await
        })
        .await
    }

    async fn try_return(&self, book_id: i64, patron_id: i64, notes: &str) -> AppResult<BorrowingRecord> {
        let mut tx = self.store.begin().await?;

        // Deleted books and deactivated or deleted patrons can still close their loans
        let mut book = tx
            .lock_book(book_id, RecordScope::IncludeDeleted)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        tx.get_patron(patron_id, RecordScope::IncludeDeleted)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Patron with id {} not found", patron_id)))?;

        let mut record = tx
            .find_record(book.id, patron_id, &BorrowingStatus::RETURNABLE)
            .await?
            .ok_or(AppError::Conflict(ConflictKind::NoActiveLoan))?;

        let now = self.clock.now();
        record.status = BorrowingStatus::Returned;
        record.return_date = Some(now);
        record.updated_at = now;
        record.append_return_notes(notes);
        tx.update_record(&record).await?;

        self.ledger.release_copy(&mut *tx, &mut book).await?;

        tx.commit().await?;

        tracing::info!(
            record_id = record.id,
            book_id,
            patron_id,
            available = book.available_copies,
            "Book returned"
        );
        Ok(record)
    }

    /// Get a borrowing record with its computed overdue flag
    pub async fn get_record(&self, record_id: i64) -> AppResult<BorrowingRecordView> {
        let record = self
            .store
            .get_record(record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Borrowing record with id {} not found", record_id)))?;
        Ok(BorrowingRecordView::new(record, self.clock.now()))
    }

    /// Active loans of a patron, newest first
    pub async fn patron_loans(&self, patron_id: i64) -> AppResult<Vec<BorrowingRecordView>> {
        self.store
            .get_patron(patron_id, RecordScope::IncludeDeleted)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Patron with id {} not found", patron_id)))?;

        let now = self.clock.now();
        let records = self.store.patron_records(patron_id, &BorrowingStatus::ACTIVE).await?;
        Ok(records.into_iter().map(|r| BorrowingRecordView::new(r, now)).collect())
    }

    /// Unreturned loans past their due date, swept or not
    pub async fn overdue_records(&self) -> AppResult<Vec<BorrowingRecordView>> {
        let now = self.clock.now();
        let records = self.store.overdue_records(now).await?;
        Ok(records.into_iter().map(|r| BorrowingRecordView::new(r, now)).collect())
    }

    /// Count active loans
    pub async fn count_active(&self) -> AppResult<i64> {
        self.store.count_records(&BorrowingStatus::ACTIVE).await
    }

    /// Count loans past their due date
    pub async fn count_overdue(&self) -> AppResult<i64> {
        self.store.count_overdue(self.clock.now()).await
    }

    /// Enroll a patron; new patrons are active
    pub async fn register_patron(&self, patron: NewPatron) -> AppResult<Patron> {
        validator::Validate::validate(&patron)?;
        self.store.insert_patron(&patron, self.clock.now()).await
    }

    /// Activate or deactivate a patron. Existing loans are not affected.
    pub async fn set_patron_active(&self, patron_id: i64, active: bool) -> AppResult<Patron> {
        self.store
            .set_patron_active(patron_id, active)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Patron with id {} not found", patron_id)))
    }
}
