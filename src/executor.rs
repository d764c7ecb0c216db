// Store collaborator: the callback chains stage SQL on a Scope and run it
// through a StatementExecutor. The Postgres implementation binds JSON-typed
// parameters and converts rows back to JSON maps.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Column, PgPool, Row, TypeInfo};
use thiserror::Error;

/// Errors surfaced by a statement executor
#[derive(Debug, Error, Clone)]
pub enum ExecuteError {
    #[error("unique constraint \"{constraint}\" violated: {message}")]
    UniqueViolation { constraint: String, message: String },

    #[error("{0}")]
    Driver(String),
}

/// Runs staged statements against the underlying store. Blocking lives here;
/// the callback chain itself never blocks.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Run a statement, returning the number of affected rows
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, ExecuteError>;

    /// Run a query, returning rows as column -> value maps
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Map<String, Value>>, ExecuteError>;
}

/// Quote SQL identifier to prevent injection
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Postgres-backed executor
pub struct PgStatementExecutor {
    pool: PgPool,
}

impl PgStatementExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatementExecutor for PgStatementExecutor {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, ExecuteError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let result = query.execute(&self.pool).await.map_err(map_sqlx_error)?;
        tracing::debug!("Executed statement, {} rows affected", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Map<String, Value>>, ExecuteError> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        tracing::debug!("Query returned {} rows", rows.len());
        Ok(rows.iter().map(row_to_map).collect())
    }
}

fn map_sqlx_error(err: sqlx::Error) -> ExecuteError {
    if let sqlx::Error::Database(db_err) = &err {
        // SQLSTATE 23505: unique_violation
        if db_err.code().as_deref() == Some("23505") {
            return ExecuteError::UniqueViolation {
                constraint: db_err.constraint().unwrap_or_default().to_string(),
                message: db_err.message().to_string(),
            };
        }
    }
    ExecuteError::Driver(err.to_string())
}

fn bind_param<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(u) = n.as_u64() {
                // Postgres doesn't have u64; cast down if safe
                q.bind(u as i64)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s),
        Value::Array(_) => q,
        Value::Object(_) => q.bind(v.clone()), // JSONB
    }
}

fn row_to_map(row: &PgRow) -> Map<String, Value> {
    let mut map = Map::new();
    for column in row.columns() {
        let name = column.name();
        let value = match column.type_info().name() {
            "INT2" => row.try_get::<Option<i16>, _>(name).ok().flatten().map(Value::from),
            "INT4" => row.try_get::<Option<i32>, _>(name).ok().flatten().map(Value::from),
            "INT8" => row.try_get::<Option<i64>, _>(name).ok().flatten().map(Value::from),
            "FLOAT4" => {
                row.try_get::<Option<f32>, _>(name).ok().flatten().map(|f| Value::from(f as f64))
            }
            "FLOAT8" => row.try_get::<Option<f64>, _>(name).ok().flatten().map(Value::from),
            "BOOL" => row.try_get::<Option<bool>, _>(name).ok().flatten().map(Value::from),
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(name)
                .ok()
                .flatten()
                .map(|u| Value::String(u.to_string())),
            "TIMESTAMPTZ" | "TIMESTAMP" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name)
                .ok()
                .flatten()
                .map(|t| Value::String(t.to_rfc3339())),
            "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(name).ok().flatten(),
            _ => row.try_get::<Option<String>, _>(name).ok().flatten().map(Value::String),
        };
        map.insert(name.to_string(), value.unwrap_or(Value::Null));
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier("users"), "\"users\"");
        assert_eq!(quote_identifier("weird\"name"), "\"weird\"\"name\"");
    }
}
