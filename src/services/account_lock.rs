//! Account lockout policy: failed-login counting and lock windows

use std::{net::IpAddr, sync::Arc};

use chrono::Duration;

use crate::{
    clock::Clock,
    config::SecurityConfig,
    error::{AppError, AppResult},
    models::{AccountLockState, LockStatus},
    repository::IdentityStore,
    services::instrument::{traced, Operation},
};

#[derive(Clone)]
pub struct AccountLockPolicy {
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    config: SecurityConfig,
}

fn no_such_identity(identity_id: i64) -> AppError {
    AppError::NotFound(format!("Identity with id {} not found", identity_id))
}

impl AccountLockPolicy {
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>, config: SecurityConfig) -> Self {
        Self { store, clock, config }
    }

    /// Whether the identity is locked, with minutes left rounded up.
    ///
    /// Callers must check this before verifying credentials.
    pub async fn check_lock(&self, identity_id: i64) -> AppResult<LockStatus> {
        traced(Operation::CheckLock, async {
            let state = self
                .store
                .get_lock_state(identity_id)
                .await?
                .ok_or_else(|| no_such_identity(identity_id))?;
            Ok(state.status_at(self.clock.now()))
        })
        .await
    }

    /// Count a failed login; the attempt reaching the threshold starts a lock window.
    ///
    /// The counter is kept when the lock is set and only cleared by a successful login.
    pub async fn record_failed_attempt(&self, identity_id: i64) -> AppResult<AccountLockState> {
        traced(Operation::RecordFailedLogin, async {
            let lock_until = self.clock.now() + Duration::minutes(self.config.lock_minutes);
            let state = self
                .store
                .increment_failed_attempts(identity_id, self.config.max_failed_attempts, lock_until)
                .await?
                .ok_or_else(|| no_such_identity(identity_id))?;

            if state.failed_attempts >= self.config.max_failed_attempts {
                tracing::warn!(
                    identity_id,
                    failed_attempts = state.failed_attempts,
                    "Account locked due to too many failed attempts"
                );
            } else {
                tracing::info!(identity_id, failed_attempts = state.failed_attempts, "Failed login recorded");
            }
            Ok(state)
        })
        .await
    }

    /// Remember the client IP and clear any failed attempts and lock
    pub async fn record_successful_attempt(&self, identity_id: i64, ip: Option<IpAddr>) -> AppResult<AccountLockState> {
        traced(Operation::RecordSuccessfulLogin, async {
            self.store
                .record_success(identity_id, ip.map(|ip| ip.to_string()))
                .await?
                .ok_or_else(|| no_such_identity(identity_id))
        })
        .await
    }
}
