//! Repository layer: storage seams and their implementations
//!
//! Services own the transaction boundary. They open a [`LendingTransaction`],
//! call repository operations on it and commit; dropping an uncommitted
//! transaction rolls everything back.

pub mod identities;
pub mod lending;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        AccountLockState, Book, BorrowingRecord, BorrowingStatus, Identity, NewBook, NewBorrowingRecord, NewPatron,
        Patron, RecordScope,
    },
};

/// Book, patron and borrowing-record storage
#[async_trait]
pub trait LendingStore: Send + Sync {
    /// Open an atomic unit of work
    async fn begin(&self) -> AppResult<Box<dyn LendingTransaction>>;

    async fn insert_book(&self, book: &NewBook, now: DateTime<Utc>) -> AppResult<Book>;

    async fn insert_patron(&self, patron: &NewPatron, now: DateTime<Utc>) -> AppResult<Patron>;

    async fn set_patron_active(&self, patron_id: i64, active: bool) -> AppResult<Option<Patron>>;

    async fn get_book(&self, book_id: i64, scope: RecordScope) -> AppResult<Option<Book>>;

    async fn get_patron(&self, patron_id: i64, scope: RecordScope) -> AppResult<Option<Patron>>;

    async fn get_record(&self, record_id: i64) -> AppResult<Option<BorrowingRecord>>;

    /// Records of a patron in any of `statuses`, newest first
    async fn patron_records(&self, patron_id: i64, statuses: &[BorrowingStatus]) -> AppResult<Vec<BorrowingRecord>>;

    /// Unreturned records whose due date is before `now`, whatever their stored status
    async fn overdue_records(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowingRecord>>;

    async fn count_records(&self, statuses: &[BorrowingStatus]) -> AppResult<i64>;

    async fn count_overdue(&self, now: DateTime<Utc>) -> AppResult<i64>;

    /// Single conditional batch write: `Borrowed` with `due_date < now` becomes `Overdue`
    async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<u64>;
}

/// Operations that must commit or roll back together
#[async_trait]
pub trait LendingTransaction: Send {
    /// Read a book and hold its row lock until commit or rollback
    async fn lock_book(&mut self, book_id: i64, scope: RecordScope) -> AppResult<Option<Book>>;

    async fn get_patron(&mut self, patron_id: i64, scope: RecordScope) -> AppResult<Option<Patron>>;

    async fn find_record(
        &mut self,
        book_id: i64,
        patron_id: i64,
        statuses: &[BorrowingStatus],
    ) -> AppResult<Option<BorrowingRecord>>;

    /// Persist `total_copies`, `available_copies` and `updated_at`
    async fn update_book_copies(&mut self, book: &Book) -> AppResult<()>;

    /// Fails with `DuplicateLoan` when the pair already has an active record
    async fn insert_record(&mut self, record: &NewBorrowingRecord) -> AppResult<BorrowingRecord>;

    /// Persist `status`, `return_date`, `notes` and `updated_at`
    async fn update_record(&mut self, record: &BorrowingRecord) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// Authenticatable identities and their lock state.
///
/// Counter mutations are atomic in the store; callers never read-modify-write.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn insert_identity(&self, email: &str, password_hash: &str) -> AppResult<Identity>;

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Identity>>;

    async fn get_lock_state(&self, identity_id: i64) -> AppResult<Option<AccountLockState>>;

    /// Add one failed attempt; set `locked_until` when the new count reaches `threshold`
    async fn increment_failed_attempts(
        &self,
        identity_id: i64,
        threshold: i32,
        lock_until: DateTime<Utc>,
    ) -> AppResult<Option<AccountLockState>>;

    /// Store the IP; when attempts were recorded, zero them and clear the lock
    async fn record_success(&self, identity_id: i64, ip: Option<String>) -> AppResult<Option<AccountLockState>>;
}

/// Main repository struct holding the storage backends
#[derive(Clone)]
pub struct Repository {
    pub lending: Arc<dyn LendingStore>,
    pub identities: Arc<dyn IdentityStore>,
}

impl Repository {
    /// Create a repository backed by PostgreSQL
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            lending: Arc::new(lending::PgLendingStore::new(pool.clone())),
            identities: Arc::new(identities::PgIdentityStore::new(pool)),
        }
    }

    /// Create a repository backed by process memory
    pub fn in_memory() -> Self {
        let store = memory::MemoryStore::new();
        Self {
            lending: Arc::new(store.clone()),
            identities: Arc::new(store),
        }
    }
}
