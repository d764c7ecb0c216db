#![allow(dead_code)]

// Shared test helpers: a recording executor standing in for the store, and
// tracing setup.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};

use loam::executor::{ExecuteError, StatementExecutor};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Records every statement it receives and replies with canned data
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<RecordedCall>>,
    rows: Mutex<Vec<Map<String, Value>>>,
    fail_next: Mutex<Option<ExecuteError>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Map<String, Value>>) -> Self {
        Self { rows: Mutex::new(rows), ..Self::default() }
    }

    /// Make the next execute/query call fail with the given error
    pub fn fail_next(&self, err: ExecuteError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatementExecutor for RecordingExecutor {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, ExecuteError> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall { sql: sql.to_string(), params: params.to_vec() });
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        Ok(1)
    }

    async fn query(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Map<String, Value>>, ExecuteError> {
        self.calls
            .lock()
            .unwrap()
            .push(RecordedCall { sql: sql.to_string(), params: params.to_vec() });
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        Ok(self.rows.lock().unwrap().clone())
    }
}

// optional, but keeps output tidy in tests
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}
