//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use r2d2_sqlite::SqliteConnectionManager;

use relaybot::access::PlanConfig;
use relaybot::backend::{Backend, BackendError};
use relaybot::config::Config;
use relaybot::db::{AppState, DbPool, init_schema};

/// Fixed clock for deterministic expiry arithmetic.
pub const NOW: i64 = 1_700_000_000;
pub const DAY: i64 = 86400;

/// In-memory pool. Capped at one connection: every pooled handle must see
/// the same in-memory database.
pub fn test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory();
    let pool = r2d2::Pool::builder().max_size(1).build(manager).unwrap();
    init_schema(&pool.get().unwrap()).unwrap();
    pool
}

pub fn test_plan() -> PlanConfig {
    PlanConfig::default()
}

pub fn test_config(plan: PlanConfig) -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        database_path: ":memory:".into(),
        telegram_bot_token: None,
        backend_url: None,
        backend_framework: "test".into(),
        payment_api_secret: Some("test-secret".into()),
        plan,
    }
}

pub fn test_state() -> AppState {
    test_state_with_plan(test_plan())
}

pub fn test_state_with_plan(plan: PlanConfig) -> AppState {
    AppState {
        db: test_pool(),
        config: Arc::new(test_config(plan)),
    }
}

/// Scripted backend: `Some(reply)` answers every request, `None` fails
/// with a server error.
pub struct StubBackend {
    pub reply: Option<String>,
}

impl StubBackend {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { reply: None }
    }
}

impl Backend for StubBackend {
    async fn process(&self, _input: &str, _user_id: i64) -> Result<String, BackendError> {
        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(BackendError::Status(500)),
        }
    }

    async fn reset_dialog(&self, _user_id: i64) -> bool {
        true
    }
}
