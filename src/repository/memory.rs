//! In-process storage with the same transactional guarantees as PostgreSQL.
//!
//! A transaction holds the store-wide mutex and works on a private copy of
//! the state; commit swaps the copy in, drop discards it. Every transaction
//! is therefore serializable.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{IdentityStore, LendingStore, LendingTransaction};
use crate::{
    error::{AppError, AppResult, ConflictKind},
    models::{
        AccountLockState, Book, BorrowingRecord, BorrowingStatus, Identity, NewBook, NewBorrowingRecord, NewPatron,
        Patron, RecordScope,
    },
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    books: BTreeMap<i64, Book>,
    patrons: BTreeMap<i64, Patron>,
    records: BTreeMap<i64, BorrowingRecord>,
    identities: BTreeMap<i64, Identity>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn book(&self, book_id: i64, scope: RecordScope) -> Option<Book> {
        self.books
            .get(&book_id)
            .filter(|b| scope.admits(b.is_deleted()))
            .cloned()
    }

    fn patron(&self, patron_id: i64, scope: RecordScope) -> Option<Patron> {
        self.patrons
            .get(&patron_id)
            .filter(|p| scope.admits(p.is_deleted()))
            .cloned()
    }

    fn identity_mut(&mut self, identity_id: i64) -> Option<&mut Identity> {
        self.identities.get_mut(&identity_id)
    }
}

/// Shared in-memory store; clones see the same data
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tombstone a book
    pub async fn soft_delete_book(&self, book_id: i64, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock().await;
        match state.books.get_mut(&book_id) {
            Some(book) => {
                book.deleted_at = Some(now);
                true
            }
            None => false,
        }
    }

    /// Write a record's fields as-is, bypassing the lending state machine
    pub async fn overwrite_record(&self, record: BorrowingRecord) {
        self.state.lock().await.records.insert(record.id, record);
    }
}

#[async_trait]
impl LendingStore for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn LendingTransaction>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn insert_book(&self, book: &NewBook, now: DateTime<Utc>) -> AppResult<Book> {
        let mut state = self.state.lock().await;
        if state.books.values().any(|b| b.isbn == book.isbn) {
            return Err(AppError::Validation("Book with this ISBN already exists".to_string()));
        }
        let id = state.next_id();
        let book = Book {
            id,
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            total_copies: book.total_copies,
            available_copies: book.total_copies,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        state.books.insert(id, book.clone());
        Ok(book)
    }

    async fn insert_patron(&self, patron: &NewPatron, now: DateTime<Utc>) -> AppResult<Patron> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let patron = Patron {
            id,
            first_name: patron.first_name.clone(),
            last_name: patron.last_name.clone(),
            email: patron.email.clone(),
            member_id: patron.member_id.clone(),
            active: true,
            deleted_at: None,
            created_at: now,
        };
        state.patrons.insert(id, patron.clone());
        Ok(patron)
    }

    async fn set_patron_active(&self, patron_id: i64, active: bool) -> AppResult<Option<Patron>> {
        let mut state = self.state.lock().await;
        Ok(state
            .patrons
            .get_mut(&patron_id)
            .filter(|p| !p.is_deleted())
            .map(|p| {
                p.active = active;
                p.clone()
            }))
    }

    async fn get_book(&self, book_id: i64, scope: RecordScope) -> AppResult<Option<Book>> {
        Ok(self.state.lock().await.book(book_id, scope))
    }

    async fn get_patron(&self, patron_id: i64, scope: RecordScope) -> AppResult<Option<Patron>> {
        Ok(self.state.lock().await.patron(patron_id, scope))
    }

    async fn get_record(&self, record_id: i64) -> AppResult<Option<BorrowingRecord>> {
        Ok(self.state.lock().await.records.get(&record_id).cloned())
    }

    async fn patron_records(&self, patron_id: i64, statuses: &[BorrowingStatus]) -> AppResult<Vec<BorrowingRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<BorrowingRecord> = state
            .records
            .values()
            .filter(|r| r.patron_id == patron_id && statuses.contains(&r.status))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date).then(b.id.cmp(&a.id)));
        Ok(records)
    }

    async fn overdue_records(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowingRecord>> {
        let state = self.state.lock().await;
        let mut records: Vec<BorrowingRecord> = state
            .records
            .values()
            .filter(|r| r.status != BorrowingStatus::Returned && r.due_date < now)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.due_date.cmp(&b.due_date).then(a.id.cmp(&b.id)));
        Ok(records)
    }

    async fn count_records(&self, statuses: &[BorrowingStatus]) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state.records.values().filter(|r| statuses.contains(&r.status)).count() as i64)
    }

    async fn count_overdue(&self, now: DateTime<Utc>) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .values()
            .filter(|r| r.status != BorrowingStatus::Returned && r.due_date < now)
            .count() as i64)
    }

    async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        for record in state.records.values_mut() {
            if record.status == BorrowingStatus::Borrowed && record.due_date < now {
                record.status = BorrowingStatus::Overdue;
                record.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl LendingTransaction for MemoryTransaction {
    async fn lock_book(&mut self, book_id: i64, scope: RecordScope) -> AppResult<Option<Book>> {
        Ok(self.working.book(book_id, scope))
    }

    async fn get_patron(&mut self, patron_id: i64, scope: RecordScope) -> AppResult<Option<Patron>> {
        Ok(self.working.patron(patron_id, scope))
    }

    async fn find_record(
        &mut self,
        book_id: i64,
        patron_id: i64,
        statuses: &[BorrowingStatus],
    ) -> AppResult<Option<BorrowingRecord>> {
        Ok(self
            .working
            .records
            .values()
            .filter(|r| r.book_id == book_id && r.patron_id == patron_id && statuses.contains(&r.status))
            .max_by_key(|r| r.borrow_date)
            .cloned())
    }

    async fn update_book_copies(&mut self, book: &Book) -> AppResult<()> {
        if book.available_copies < 0 || book.available_copies > book.total_copies || book.total_copies < 1 {
            return Err(AppError::Internal(format!(
                "Copy counts out of bounds for book {}: {}/{}",
                book.id, book.available_copies, book.total_copies
            )));
        }
        let stored = self
            .working
            .books
            .get_mut(&book.id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book.id)))?;
        stored.total_copies = book.total_copies;
        stored.available_copies = book.available_copies;
        stored.updated_at = book.updated_at;
        Ok(())
    }

    async fn insert_record(&mut self, record: &NewBorrowingRecord) -> AppResult<BorrowingRecord> {
        let duplicate = record.status.is_active()
            && self.working.records.values().any(|r| {
                r.book_id == record.book_id && r.patron_id == record.patron_id && r.status.is_active()
            });
        if duplicate {
            return Err(AppError::Conflict(ConflictKind::DuplicateLoan));
        }
        let id = self.working.next_id();
        let record = BorrowingRecord {
            id,
            book_id: record.book_id,
            patron_id: record.patron_id,
            borrow_date: record.borrow_date,
            due_date: record.due_date,
            return_date: None,
            status: record.status,
            notes: record.notes.clone(),
            created_at: record.borrow_date,
            updated_at: record.borrow_date,
        };
        self.working.records.insert(id, record.clone());
        Ok(record)
    }

    async fn update_record(&mut self, record: &BorrowingRecord) -> AppResult<()> {
        let stored = self
            .working
            .records
            .get_mut(&record.id)
            .ok_or_else(|| AppError::NotFound(format!("Borrowing record with id {} not found", record.id)))?;
        stored.status = record.status;
        stored.return_date = record.return_date;
        stored.notes = record.notes.clone();
        stored.updated_at = record.updated_at;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn insert_identity(&self, email: &str, password_hash: &str) -> AppResult<Identity> {
        let mut state = self.state.lock().await;
        let email = email.to_lowercase();
        if state.identities.values().any(|i| i.email == email) {
            return Err(AppError::Validation("Identity with this email already exists".to_string()));
        }
        let id = state.next_id();
        let identity = Identity {
            id,
            email,
            password_hash: password_hash.to_string(),
            lock: AccountLockState::default(),
        };
        state.identities.insert(id, identity.clone());
        Ok(identity)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Identity>> {
        let email = email.to_lowercase();
        let state = self.state.lock().await;
        Ok(state.identities.values().find(|i| i.email == email).cloned())
    }

    async fn get_lock_state(&self, identity_id: i64) -> AppResult<Option<AccountLockState>> {
        let state = self.state.lock().await;
        Ok(state.identities.get(&identity_id).map(|i| i.lock.clone()))
    }

    async fn increment_failed_attempts(
        &self,
        identity_id: i64,
        threshold: i32,
        lock_until: DateTime<Utc>,
    ) -> AppResult<Option<AccountLockState>> {
        let mut state = self.state.lock().await;
        Ok(state.identity_mut(identity_id).map(|identity| {
            identity.lock.failed_attempts += 1;
            if identity.lock.failed_attempts >= threshold {
                identity.lock.locked_until = Some(lock_until);
            }
            identity.lock.clone()
        }))
    }

    async fn record_success(&self, identity_id: i64, ip: Option<String>) -> AppResult<Option<AccountLockState>> {
        let mut state = self.state.lock().await;
        Ok(state.identity_mut(identity_id).map(|identity| {
            if ip.is_some() {
                identity.lock.last_known_ip = ip;
            }
            if identity.lock.failed_attempts > 0 {
                identity.lock.failed_attempts = 0;
                identity.lock.locked_until = None;
            }
            identity.lock.clone()
        }))
    }
}
