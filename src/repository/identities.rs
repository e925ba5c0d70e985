//! PostgreSQL storage for identities and their lock state

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use super::IdentityStore;
use crate::{
    error::AppResult,
    models::{AccountLockState, Identity},
};

#[derive(Clone)]
pub struct PgIdentityStore {
    pool: Pool<Postgres>,
}

impl PgIdentityStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn insert_identity(&self, email: &str, password_hash: &str) -> AppResult<Identity> {
        let identity = sqlx::query_as::<_, Identity>(
            r#"
            INSERT INTO identities (email, password_hash)
            VALUES (LOWER($1), $2)
            RETURNING id, email, password_hash, failed_attempts, locked_until, last_known_ip
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(identity)
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Identity>> {
        let identity = sqlx::query_as::<_, Identity>(
            r#"
            SELECT id, email, password_hash, failed_attempts, locked_until, last_known_ip
            FROM identities
            WHERE email = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(identity)
    }

    async fn get_lock_state(&self, identity_id: i64) -> AppResult<Option<AccountLockState>> {
        let state = sqlx::query_as::<_, AccountLockState>(
            "SELECT failed_attempts, locked_until, last_known_ip FROM identities WHERE id = $1",
        )
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }

    async fn increment_failed_attempts(
        &self,
        identity_id: i64,
        threshold: i32,
        lock_until: DateTime<Utc>,
    ) -> AppResult<Option<AccountLockState>> {
        // Right-hand sides see the pre-update row, so both columns move in one statement
        let state = sqlx::query_as::<_, AccountLockState>(
            r#"
            UPDATE identities
            SET failed_attempts = failed_attempts + 1,
                locked_until = CASE WHEN failed_attempts + 1 >= $2 THEN $3 ELSE locked_until END
            WHERE id = $1
            RETURNING failed_attempts, locked_until, last_known_ip
            "#,
        )
        .bind(identity_id)
        .bind(threshold)
        .bind(lock_until)
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }

    async fn record_success(&self, identity_id: i64, ip: Option<String>) -> AppResult<Option<AccountLockState>> {
        let state = sqlx::query_as::<_, AccountLockState>(
            r#"
            UPDATE identities
            SET last_known_ip = COALESCE($2, last_known_ip),
                locked_until = CASE WHEN failed_attempts > 0 THEN NULL ELSE locked_until END,
                failed_attempts = 0
            WHERE id = $1
            RETURNING failed_attempts, locked_until, last_known_ip
            "#,
        )
        .bind(identity_id)
        .bind(ip)
        .fetch_optional(&self.pool)
        .await?;

        Ok(state)
    }
}
