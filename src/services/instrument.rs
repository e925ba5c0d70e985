//! Interceptor chain wrapped around every public service operation.
//!
//! Each call gets a fresh call id and a tracing span, then passes through
//! call logging, timing and business-transaction logging in that order.

use std::{future::Future, time::Duration};

use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Calls slower than this are reported at warn level
pub const SLOW_CALL_THRESHOLD: Duration = Duration::from_millis(500);

/// Public operations of the lending engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    RegisterBook,
    SetTotalCopies,
    Borrow,
    Return,
    SweepOverdue,
    CheckLock,
    RecordFailedLogin,
    RecordSuccessfulLogin,
    RegisterIdentity,
    Login,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::RegisterBook => "register_book",
            Operation::SetTotalCopies => "set_total_copies",
            Operation::Borrow => "borrow",
            Operation::Return => "return_book",
            Operation::SweepOverdue => "sweep_overdue",
            Operation::CheckLock => "check_lock",
            Operation::RecordFailedLogin => "record_failed_login",
            Operation::RecordSuccessfulLogin => "record_successful_login",
            Operation::RegisterIdentity => "register_identity",
            Operation::Login => "login",
        }
    }

    /// Audit label for operations that are business transactions
    pub fn transaction_type(&self) -> Option<&'static str> {
        match self {
            Operation::Borrow => Some("BOOK_BORROW"),
            Operation::Return => Some("BOOK_RETURN"),
            Operation::SweepOverdue => Some("OVERDUE_SWEEP"),
            Operation::SetTotalCopies => Some("INVENTORY_ADJUST"),
            Operation::Login => Some("LOGIN"),
            _ => None,
        }
    }
}

/// Run `fut` as `operation` through the interceptor chain
pub async fn traced<T, F>(operation: Operation, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    let call_id = Uuid::new_v4();
    let span = tracing::info_span!("service_call", %call_id, operation = operation.name());

    async move {
        tracing::debug!("ENTER");
        let started = Instant::now();
        let result = fut.await;
        log_call(&result);
        log_timing(operation, started.elapsed());
        log_transaction(operation, &result);
        result
    }
    .instrument(span)
    .await
}

fn is_domain_error(err: &AppError) -> bool {
    matches!(
        err,
        AppError::NotFound(_)
            | AppError::Conflict(_)
            | AppError::Locked { .. }
            | AppError::Authentication(_)
            | AppError::Validation(_)
    )
}

fn log_call<T>(result: &AppResult<T>) {
    match result {
        Ok(_) => tracing::debug!("EXIT: success"),
        Err(e) if is_domain_error(e) => tracing::info!(error = %e, code = e.code() as u32, "EXIT: rejected"),
        Err(e) => tracing::error!(error = %e, "EXIT: failed"),
    }
}

fn log_timing(operation: Operation, elapsed: Duration) {
    let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
    if elapsed > SLOW_CALL_THRESHOLD {
        tracing::warn!(elapsed_ms, "Slow execution of {}", operation.name());
    } else {
        tracing::debug!(elapsed_ms, "Execution time");
    }
}

fn log_transaction<T>(operation: Operation, result: &AppResult<T>) {
    let Some(kind) = operation.transaction_type() else {
        return;
    };
    match result {
        Ok(_) => tracing::info!(transaction = kind, "Transaction committed"),
        Err(e) => tracing::info!(transaction = kind, error = %e, "Transaction rolled back"),
    }
}

/// Re-run `attempt` while it fails with a transient storage error.
///
/// Domain errors are returned on first occurrence.
pub async fn with_transient_retry<T, F, Fut>(operation: Operation, max_retries: u32, mut attempt: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Err(e) if e.is_retryable() && retries < max_retries => {
                retries += 1;
                tracing::warn!(operation = operation.name(), retry = retries, error = %e, "Transient failure, retrying");
                tokio::time::sleep(Duration::from_millis(10 * u64::from(retries))).await;
            }
            other => return other,
        }
    }
}
