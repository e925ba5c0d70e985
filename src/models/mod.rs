//! Data models for the lending engine

pub mod book;
pub mod borrowing;
pub mod enums;
pub mod identity;
pub mod patron;

// Re-export commonly used types
pub use book::{Book, NewBook};
pub use borrowing::{BorrowingRecord, BorrowingRecordView, NewBorrowingRecord};
pub use enums::{BorrowingStatus, RecordScope};
pub use identity::{AccountLockState, Identity, LockStatus};
pub use patron::{NewPatron, Patron};
