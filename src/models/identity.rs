//! Authenticatable identity and its lockout state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Failed-login counter and lock window attached to an identity
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, FromRow)]
pub struct AccountLockState {
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_known_ip: Option<String>,
}

impl AccountLockState {
    /// Lock status as seen at `now`; remaining minutes are rounded up
    pub fn status_at(&self, now: DateTime<Utc>) -> LockStatus {
        match self.locked_until {
            Some(until) if until > now => {
                let remaining_ms = (until - now).num_milliseconds();
                // Less than a millisecond left still reads as one minute
                LockStatus {
                    locked: true,
                    minutes_remaining: ((remaining_ms + 59_999) / 60_000).max(1),
                }
            }
            _ => LockStatus::unlocked(),
        }
    }
}

/// Answer of a lock check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockStatus {
    pub locked: bool,
    pub minutes_remaining: i64,
}

impl LockStatus {
    pub fn unlocked() -> Self {
        Self { locked: false, minutes_remaining: 0 }
    }
}

/// Identity record from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Identity {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub lock: AccountLockState,
}
