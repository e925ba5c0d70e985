//! Borrowing record model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::enums::BorrowingStatus;

/// Borrowing record from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct BorrowingRecord {
    pub id: i64,
    pub book_id: i64,
    pub patron_id: i64,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BorrowingRecord {
    /// Read-time overdue flag, independent of the stored `Overdue` status
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != BorrowingStatus::Returned && now > self.due_date
    }

    /// Append return notes without losing what was written at borrow time
    pub fn append_return_notes(&mut self, notes: &str) {
        if notes.is_empty() {
            return;
        }
        if !self.notes.is_empty() {
            self.notes.push('\n');
        }
        self.notes.push_str("Return notes: ");
        self.notes.push_str(notes);
    }
}

/// Row to insert when a loan starts
#[derive(Debug, Clone)]
pub struct NewBorrowingRecord {
    pub book_id: i64,
    pub patron_id: i64,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub status: BorrowingStatus,
    pub notes: String,
}

/// Borrowing record with computed fields for display
#[derive(Debug, Clone, Serialize)]
pub struct BorrowingRecordView {
    #[serde(flatten)]
    pub record: BorrowingRecord,
    pub is_overdue: bool,
}

impl BorrowingRecordView {
    pub fn new(record: BorrowingRecord, now: DateTime<Utc>) -> Self {
        let is_overdue = record.is_overdue(now);
        Self { record, is_overdue }
    }
}
