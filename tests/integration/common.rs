//! Shared fixtures

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use lending_engine::{
    clock::{Clock, ManualClock},
    config::AppConfig,
    models::{Book, NewBook, NewPatron, Patron},
    repository::{memory::MemoryStore, Repository},
    services::Services,
};

pub struct TestEngine {
    pub services: Services,
    pub clock: Arc<ManualClock>,
    pub store: MemoryStore,
}

pub fn engine() -> TestEngine {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 15, 9, 0, 0).unwrap()));
    let store = MemoryStore::new();
    let repository = Repository {
        lending: Arc::new(store.clone()),
        identities: Arc::new(store.clone()),
    };
    let services = Services::new(repository, &AppConfig::default(), clock.clone());
    TestEngine { services, clock, store }
}

impl TestEngine {
    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn book(&self, isbn: &str, copies: i32) -> Book {
        self.services
            .ledger
            .register_book(NewBook {
                title: format!("Title {}", isbn),
                author: "Test Author".to_string(),
                isbn: isbn.to_string(),
                total_copies: copies,
            })
            .await
            .expect("Failed to register book")
    }

    pub async fn patron(&self, member_id: &str) -> Patron {
        self.services
            .lending
            .register_patron(NewPatron {
                first_name: "John".to_string(),
                last_name: "Doe".to_string(),
                email: format!("{}@example.com", member_id.to_lowercase()),
                member_id: member_id.to_string(),
            })
            .await
            .expect("Failed to register patron")
    }

    pub async fn available(&self, book_id: i64) -> i32 {
        self.services
            .ledger
            .get_book(book_id)
            .await
            .expect("Book should exist")
            .available_copies
    }
}
