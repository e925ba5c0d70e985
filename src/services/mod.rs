//! Business logic services

pub mod account_lock;
pub mod auth;
pub mod instrument;
pub mod lending;
pub mod ledger;
pub mod sweeper;

use std::{sync::Arc, time::Duration};

use crate::{clock::Clock, config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub ledger: ledger::InventoryLedger,
    pub lending: lending::LendingService,
    pub sweeper: sweeper::OverdueSweeper,
    pub lock_policy: account_lock::AccountLockPolicy,
    pub auth: auth::AuthService,
}

impl Services {
    /// Create all services with the given repository and time source
    pub fn new(repository: Repository, config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        let ledger = ledger::InventoryLedger::new(repository.lending.clone(), clock.clone(), config.lending.clone());
        let lending = lending::LendingService::new(
            repository.lending.clone(),
            ledger.clone(),
            clock.clone(),
            config.lending.clone(),
        );
        let sweeper = sweeper::OverdueSweeper::new(
            repository.lending.clone(),
            clock.clone(),
            Duration::from_secs(config.lending.sweep_interval_secs),
        );
        let lock_policy =
            account_lock::AccountLockPolicy::new(repository.identities.clone(), clock, config.security.clone());
        let auth = auth::AuthService::new(repository.identities, lock_policy.clone());

        Self {
            ledger,
            lending,
            sweeper,
            lock_policy,
            auth,
        }
    }
}
