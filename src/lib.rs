//! Lending engine for a library backend
//!
//! Owns the parts of lending where concurrent requests can corrupt shared
//! state: copy inventory accounting, the borrowing-record state machine with
//! its overdue sweep, duplicate-loan prevention and account lockout.

pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
