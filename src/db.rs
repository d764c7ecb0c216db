// Entry point wiring an explicit callback registry and a statement executor
// into per-operation scopes. There is no global registry; every Db carries
// the instance it was constructed with.

use std::sync::Arc;

use serde_json::Value;

use crate::callback::{CallbackRegistry, Operation};
use crate::error::{SharedError, ERR_RECORD_NOT_FOUND};
use crate::executor::StatementExecutor;
use crate::model::record::Record;
use crate::model::schema::ModelSchema;
use crate::scope::Scope;

#[derive(Clone)]
pub struct Db {
    registry: Arc<CallbackRegistry>,
    executor: Arc<dyn StatementExecutor>,
}

impl Db {
    pub fn new(registry: Arc<CallbackRegistry>, executor: Arc<dyn StatementExecutor>) -> Self {
        Self { registry, executor }
    }

    pub fn registry(&self) -> &Arc<CallbackRegistry> {
        &self.registry
    }

    /// Build a scope for one operation; callers needing unscoped behavior,
    /// entity hooks, or extra conditions configure the scope before invoking
    pub fn scope(&self, operation: Operation, schema: Arc<ModelSchema>) -> Scope {
        Scope::new(operation, schema, self.registry.clone(), self.executor.clone())
    }

    /// Insert a record through the create chain, returning it with whatever
    /// the chain stamped onto it
    pub async fn create(
        &self,
        schema: Arc<ModelSchema>,
        record: Record,
    ) -> Result<Record, SharedError> {
        let mut scope = self.scope(Operation::Create, schema).with_record(record);
        scope.invoke().await?;
        Ok(scope.into_record())
    }

    /// Update matching rows through the update chain, returning the affected
    /// row count
    pub async fn update(
        &self,
        schema: Arc<ModelSchema>,
        record: Record,
        conditions: &[(&str, Value)],
    ) -> Result<u64, SharedError> {
        let mut scope = self.scope(Operation::Update, schema).with_record(record);
        for (column, value) in conditions {
            scope = scope.filter_eq(column, value.clone());
        }
        scope.invoke().await?;
        Ok(scope.rows_affected())
    }

    /// Fetch matching rows through the query chain
    pub async fn find(
        &self,
        schema: Arc<ModelSchema>,
        conditions: &[(&str, Value)],
    ) -> Result<Vec<Record>, SharedError> {
        let mut scope = self.scope(Operation::Query, schema);
        for (column, value) in conditions {
            scope = scope.filter_eq(column, value.clone());
        }
        scope.invoke().await?;
        Ok(scope.take_results().unwrap_or_default())
    }

    /// Fetch the first matching row, or the record-not-found sentinel
    pub async fn first(
        &self,
        schema: Arc<ModelSchema>,
        conditions: &[(&str, Value)],
    ) -> Result<Record, SharedError> {
        let mut records = self.find(schema, conditions).await?;
        if records.is_empty() {
            return Err(ERR_RECORD_NOT_FOUND.clone());
        }
        Ok(records.remove(0))
    }

    /// Delete matching rows through the delete chain (soft when the schema
    /// carries the mix-in), returning the affected row count
    pub async fn delete(
        &self,
        schema: Arc<ModelSchema>,
        conditions: &[(&str, Value)],
    ) -> Result<u64, SharedError> {
        let mut scope = self.scope(Operation::Delete, schema);
        for (column, value) in conditions {
            scope = scope.filter_eq(column, value.clone());
        }
        scope.invoke().await?;
        Ok(scope.rows_affected())
    }
}
