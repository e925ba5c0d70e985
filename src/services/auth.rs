//! Login flow on top of the account lockout policy

use std::{net::IpAddr, sync::Arc};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::{
    error::{AppError, AppResult},
    models::Identity,
    repository::IdentityStore,
    services::{
        account_lock::AccountLockPolicy,
        instrument::{traced, Operation},
    },
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Check a password against a stored Argon2 hash
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[derive(Clone)]
pub struct AuthService {
    identities: Arc<dyn IdentityStore>,
    lock_policy: AccountLockPolicy,
}

impl AuthService {
    pub fn new(identities: Arc<dyn IdentityStore>, lock_policy: AccountLockPolicy) -> Self {
        Self { identities, lock_policy }
    }

    /// Create an identity with a hashed password
    pub async fn register_identity(&self, email: &str, password: &str) -> AppResult<Identity> {
        traced(Operation::RegisterIdentity, async {
            if password.is_empty() {
                return Err(AppError::Validation("Password is required".to_string()));
            }
            let hash = hash_password(password)?;
            self.identities.insert_identity(email, &hash).await
        })
        .await
    }

    /// Authenticate by email and password.
    ///
    /// Order matters: a locked identity is rejected before its credentials are
    /// looked at, so retries during a lock never touch the counter.
    pub async fn login(&self, email: &str, password: &str, ip: Option<IpAddr>) -> AppResult<Identity> {
        traced(Operation::Login, async {
            let mut identity = self
                .identities
                .find_by_email(email)
                .await?
                .ok_or_else(|| AppError::Authentication(INVALID_CREDENTIALS.to_string()))?;

            let status = self.lock_policy.check_lock(identity.id).await?;
            if status.locked {
                return Err(AppError::Locked {
                    minutes_remaining: status.minutes_remaining,
                });
            }

            if !verify_password(&identity.password_hash, password)? {
                self.lock_policy.record_failed_attempt(identity.id).await?;
                return Err(AppError::Authentication(INVALID_CREDENTIALS.to_string()));
            }

            identity.lock = self.lock_policy.record_successful_attempt(identity.id, ip).await?;
            Ok(identity)
        })
        .await
    }
}
