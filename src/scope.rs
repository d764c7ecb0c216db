// Execution context for one in-flight persistence operation. A scope is
// owned by exactly one invocation: hooks inspect and mutate it in chain
// order, record errors on it instead of returning them, and the final SQL
// hook stages and executes the statement it built.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::callback::{CallbackRegistry, Operation};
use crate::error::{
    DuplicateUniqueIndexError, Errors, OrmError, QueryError, SharedError, ERR_INVALID_SQL,
};
use crate::executor::{quote_identifier, ExecuteError, StatementExecutor};
use crate::model::events::{LifecycleMethod, ModelEvents};
use crate::model::mixins::COLUMN_DELETED_AT;
use crate::model::record::Record;
use crate::model::schema::ModelSchema;

pub struct Scope {
    operation: Operation,
    schema: Arc<ModelSchema>,
    registry: Arc<CallbackRegistry>,
    executor: Arc<dyn StatementExecutor>,
    record: Record,
    model: Option<Box<dyn ModelEvents>>,
    acting_user: Option<Uuid>,
    unscoped: bool,
    conditions: Vec<String>,
    sql: String,
    sql_vars: Vec<Value>,
    errors: Errors,
    rows_affected: u64,
    results: Option<Vec<Record>>,
}

impl Scope {
    pub fn new(
        operation: Operation,
        schema: Arc<ModelSchema>,
        registry: Arc<CallbackRegistry>,
        executor: Arc<dyn StatementExecutor>,
    ) -> Self {
        Self {
            operation,
            schema,
            registry,
            executor,
            record: Record::new(),
            model: None,
            acting_user: None,
            unscoped: false,
            conditions: Vec::new(),
            sql: String::new(),
            sql_vars: Vec::new(),
            errors: Errors::new(),
            rows_affected: 0,
            results: None,
        }
    }

    // === Builders (operation setup, before invoke) ===

    pub fn with_record(mut self, record: Record) -> Self {
        self.record = record;
        self
    }

    /// Attach the entity whose lifecycle methods participate in this
    /// operation
    pub fn with_model(mut self, model: Box<dyn ModelEvents>) -> Self {
        self.model = Some(model);
        self
    }

    /// Identity stamped into audit columns by the stamping hooks
    pub fn with_acting_user(mut self, user: Uuid) -> Self {
        self.acting_user = Some(user);
        self
    }

    /// Disable soft-delete behavior: queries see soft-deleted rows and
    /// deletes become physical
    pub fn unscoped(mut self) -> Self {
        self.unscoped = true;
        self
    }

    /// Add an equality condition on a column, binding the value
    pub fn filter_eq(mut self, column: &str, value: Value) -> Self {
        let placeholder = self.add_to_vars(value);
        self.conditions.push(format!("{} = {}", quote_identifier(column), placeholder));
        self
    }

    /// Add a pre-rendered condition fragment
    pub fn filter_raw(mut self, fragment: impl Into<String>) -> Self {
        self.conditions.push(fragment.into());
        self
    }

    // === Accessors ===

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn table(&self) -> &str {
        self.schema.table()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.schema.has_column(column)
    }

    pub fn is_unscoped(&self) -> bool {
        self.unscoped
    }

    pub fn acting_user(&self) -> Option<Uuid> {
        self.acting_user
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    pub fn results(&self) -> Option<&[Record]> {
        self.results.as_deref()
    }

    pub fn take_results(&mut self) -> Option<Vec<Record>> {
        self.results.take()
    }

    // === Errors ===

    pub fn has_error(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn errors(&self) -> &Errors {
        &self.errors
    }

    pub fn record_error(&mut self, err: SharedError) {
        tracing::warn!("Scope error on {:?} {}: {}", self.operation, self.table(), err);
        self.errors.add(err);
    }

    // === Entity lifecycle dispatch ===

    /// Invoke the entity's lifecycle method if an entity is attached. The
    /// default trait methods are no-ops, so absence of an override is
    /// indistinguishable from an entity without the capability.
    pub fn call_method(&mut self, method: LifecycleMethod) {
        let Some(mut model) = self.model.take() else {
            return;
        };
        match method {
            LifecycleMethod::BeforeSave => model.before_save(self),
            LifecycleMethod::AfterSave => model.after_save(self),
            LifecycleMethod::BeforeCreate => model.before_create(self),
            LifecycleMethod::AfterCreate => model.after_create(self),
            LifecycleMethod::BeforeUpdate => model.before_update(self),
            LifecycleMethod::AfterUpdate => model.after_update(self),
            LifecycleMethod::BeforeDelete => model.before_delete(self),
            LifecycleMethod::AfterDelete => model.after_delete(self),
            LifecycleMethod::AfterQuery => model.after_query(self),
        }
        self.model = Some(model);
    }

    // === SQL staging ===

    /// Stage a statement for execution
    pub fn raw(&mut self, sql: impl Into<String>) {
        self.sql = sql.into();
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn sql_vars(&self) -> &[Value] {
        &self.sql_vars
    }

    /// Bind a literal into the statement, returning its placeholder
    pub fn add_to_vars(&mut self, value: Value) -> String {
        self.sql_vars.push(value);
        format!("${}", self.sql_vars.len())
    }

    /// The rendered WHERE fragment: user conditions ANDed together, plus an
    /// implicit soft-delete guard when the schema has the column and the
    /// scope is not unscoped. Empty when there is nothing to restrict.
    pub fn combined_sql(&self) -> String {
        let mut clauses = self.conditions.clone();
        if !self.unscoped && self.schema.has_column(COLUMN_DELETED_AT) {
            clauses.push(format!("{} IS NULL", quote_identifier(COLUMN_DELETED_AT)));
        }
        if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        }
    }

    // === Execution ===

    /// Run the staged statement. Failures land on the scope as query or
    /// duplicate-index errors; success records the affected row count.
    pub async fn exec(&mut self) {
        if self.has_error() {
            return;
        }
        if self.sql.trim().is_empty() {
            self.record_error(ERR_INVALID_SQL.clone());
            return;
        }
        tracing::debug!("Executing on {}: {}", self.table(), self.sql);
        match self.executor.execute(&self.sql, &self.sql_vars).await {
            Ok(rows) => self.rows_affected = rows,
            Err(err) => self.record_execute_error(err),
        }
    }

    /// Run the staged statement as a query, collecting rows into
    /// `scope.results`
    pub async fn fetch(&mut self) {
        if self.has_error() {
            return;
        }
        if self.sql.trim().is_empty() {
            self.record_error(ERR_INVALID_SQL.clone());
            return;
        }
        tracing::debug!("Querying {}: {}", self.table(), self.sql);
        match self.executor.query(&self.sql, &self.sql_vars).await {
            Ok(rows) => {
                self.results = Some(rows.into_iter().map(Record::from_row).collect());
            }
            Err(err) => self.record_execute_error(err),
        }
    }

    fn record_execute_error(&mut self, err: ExecuteError) {
        match err {
            ExecuteError::UniqueViolation { constraint, message } => {
                let cause: SharedError = Arc::new(OrmError::Database(message));
                if let Some(index) = self.schema.index_for_constraint(&constraint) {
                    let dup = DuplicateUniqueIndexError {
                        model: self.schema.name().to_string(),
                        table: self.schema.table().to_string(),
                        index: index.clone(),
                        cause,
                    };
                    self.record_error(dup.into_shared());
                } else {
                    let query =
                        QueryError::new(cause, self.sql.clone(), self.sql_vars.clone());
                    self.record_error(query.into_shared());
                }
            }
            ExecuteError::Driver(message) => {
                let cause: SharedError = Arc::new(OrmError::Database(message));
                let query = QueryError::new(cause, self.sql.clone(), self.sql_vars.clone());
                self.record_error(query.into_shared());
            }
        }
    }

    // === Chain invocation ===

    /// Resolve the callback chain for this scope's operation and run it.
    /// Remaining hooks are skipped as soon as any error lands on the scope;
    /// the accumulated errors become the operation result.
    pub async fn invoke(&mut self) -> Result<(), SharedError> {
        let chain = match self.registry.resolve(self.operation) {
            Ok(chain) => chain,
            Err(err) => {
                let shared: SharedError = Arc::new(OrmError::Callback(err));
                self.errors.add(shared.clone());
                return Err(shared);
            }
        };
        tracing::debug!(
            "Invoking {:?} chain on {} with {} callbacks",
            self.operation,
            self.table(),
            chain.len()
        );
        for entry in chain.iter() {
            if self.has_error() {
                tracing::warn!(
                    "{:?} chain on {} stopped before '{}' due to earlier errors",
                    self.operation,
                    self.table(),
                    entry.name()
                );
                break;
            }
            entry.callback().call(self).await;
        }
        match self.errors.clone().into_shared() {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}
