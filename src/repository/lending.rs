//! PostgreSQL storage for books, patrons and borrowing records

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};

use super::{LendingStore, LendingTransaction};
use crate::{
    error::AppResult,
    models::{
        Book, BorrowingRecord, BorrowingStatus, NewBook, NewBorrowingRecord, NewPatron, Patron, RecordScope,
    },
};

fn status_names(statuses: &[BorrowingStatus]) -> Vec<&'static str> {
    statuses.iter().map(|s| s.as_str()).collect()
}

fn include_deleted(scope: RecordScope) -> bool {
    scope == RecordScope::IncludeDeleted
}

#[derive(Clone)]
pub struct PgLendingStore {
    pool: Pool<Postgres>,
}

impl PgLendingStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LendingStore for PgLendingStore {
    async fn begin(&self) -> AppResult<Box<dyn LendingTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgLendingTransaction { tx }))
    }

    async fn insert_book(&self, book: &NewBook, now: DateTime<Utc>) -> AppResult<Book> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, author, isbn, total_copies, available_copies, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(book.total_copies)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(book)
    }

    async fn insert_patron(&self, patron: &NewPatron, now: DateTime<Utc>) -> AppResult<Patron> {
        let patron = sqlx::query_as::<_, Patron>(
            r#"
            INSERT INTO patrons (first_name, last_name, email, member_id, active, created_at)
            VALUES ($1, $2, $3, $4, TRUE, $5)
            RETURNING *
            "#,
        )
        .bind(&patron.first_name)
        .bind(&patron.last_name)
        .bind(&patron.email)
        .bind(&patron.member_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(patron)
    }

    async fn set_patron_active(&self, patron_id: i64, active: bool) -> AppResult<Option<Patron>> {
        let patron = sqlx::query_as::<_, Patron>(
            "UPDATE patrons SET active = $2 WHERE id = $1 AND deleted_at IS NULL RETURNING *",
        )
        .bind(patron_id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await?;

        Ok(patron)
    }

    async fn get_book(&self, book_id: i64, scope: RecordScope) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE id = $1 AND ($2 OR deleted_at IS NULL)",
        )
        .bind(book_id)
        .bind(include_deleted(scope))
        .fetch_optional(&self.pool)
        .await?;

        Ok(book)
    }

    async fn get_patron(&self, patron_id: i64, scope: RecordScope) -> AppResult<Option<Patron>> {
        let patron = sqlx::query_as::<_, Patron>(
            "SELECT * FROM patrons WHERE id = $1 AND ($2 OR deleted_at IS NULL)",
        )
        .bind(patron_id)
        .bind(include_deleted(scope))
        .fetch_optional(&self.pool)
        .await?;

        Ok(patron)
    }

    async fn get_record(&self, record_id: i64) -> AppResult<Option<BorrowingRecord>> {
        let record = sqlx::query_as::<_, BorrowingRecord>("SELECT * FROM borrowing_records WHERE id = $1")
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn patron_records(&self, patron_id: i64, statuses: &[BorrowingStatus]) -> AppResult<Vec<BorrowingRecord>> {
        let records = sqlx::query_as::<_, BorrowingRecord>(
            r#"
            SELECT * FROM borrowing_records
            WHERE patron_id = $1 AND status = ANY($2)
            ORDER BY borrow_date DESC, id DESC
            "#,
        )
        .bind(patron_id)
        .bind(status_names(statuses))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn overdue_records(&self, now: DateTime<Utc>) -> AppResult<Vec<BorrowingRecord>> {
        let records = sqlx::query_as::<_, BorrowingRecord>(
            r#"
            SELECT * FROM borrowing_records
            WHERE status <> 'returned' AND due_date < $1
            ORDER BY due_date, id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn count_records(&self, statuses: &[BorrowingStatus]) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM borrowing_records WHERE status = ANY($1)")
            .bind(status_names(statuses))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn count_overdue(&self, now: DateTime<Utc>) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM borrowing_records WHERE status <> 'returned' AND due_date < $1")
                .bind(now)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn mark_overdue(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE borrowing_records
            SET status = 'overdue', updated_at = $1
            WHERE status = 'borrowed' AND due_date < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Read-committed transaction; book rows are locked with `FOR UPDATE`
pub struct PgLendingTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LendingTransaction for PgLendingTransaction {
    async fn lock_book(&mut self, book_id: i64, scope: RecordScope) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE id = $1 AND ($2 OR deleted_at IS NULL) FOR UPDATE",
        )
        .bind(book_id)
        .bind(include_deleted(scope))
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(book)
    }

    async fn get_patron(&mut self, patron_id: i64, scope: RecordScope) -> AppResult<Option<Patron>> {
        let patron = sqlx::query_as::<_, Patron>(
            "SELECT * FROM patrons WHERE id = $1 AND ($2 OR deleted_at IS NULL)",
        )
        .bind(patron_id)
        .bind(include_deleted(scope))
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(patron)
    }

    async fn find_record(
        &mut self,
        book_id: i64,
        patron_id: i64,
        statuses: &[BorrowingStatus],
    ) -> AppResult<Option<BorrowingRecord>> {
        let record = sqlx::query_as::<_, BorrowingRecord>(
            r#"
            SELECT * FROM borrowing_records
            WHERE book_id = $1 AND patron_id = $2 AND status = ANY($3)
            ORDER BY borrow_date DESC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(book_id)
        .bind(patron_id)
        .bind(status_names(statuses))
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn update_book_copies(&mut self, book: &Book) -> AppResult<()> {
        sqlx::query("UPDATE books SET total_copies = $2, available_copies = $3, updated_at = $4 WHERE id = $1")
            .bind(book.id)
            .bind(book.total_copies)
            .bind(book.available_copies)
            .bind(book.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn insert_record(&mut self, record: &NewBorrowingRecord) -> AppResult<BorrowingRecord> {
        // The partial unique index turns a concurrent duplicate into DuplicateLoan
        let record = sqlx::query_as::<_, BorrowingRecord>(
            r#"
            INSERT INTO borrowing_records
                (book_id, patron_id, borrow_date, due_date, status, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $3, $3)
            RETURNING *
            "#,
        )
        .bind(record.book_id)
        .bind(record.patron_id)
        .bind(record.borrow_date)
        .bind(record.due_date)
        .bind(record.status)
        .bind(&record.notes)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn update_record(&mut self, record: &BorrowingRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE borrowing_records
            SET status = $2, return_date = $3, notes = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.status)
        .bind(record.return_date)
        .bind(&record.notes)
        .bind(record.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
