//! Shared helpers for the Postgres-backed integration tests.
//!
//! These suites run only when `DATABASE_URL` points at a disposable test
//! database (`cargo test -- --ignored`).

#![allow(dead_code)]

use config::Settings;
use maestro::Store;

pub fn settings() -> Settings {
    Settings::from_env().expect("DATABASE_URL must point at a test database")
}

pub async fn connect_store() -> Store {
    Store::connect(&settings())
        .await
        .expect("failed to connect to the test database")
}
