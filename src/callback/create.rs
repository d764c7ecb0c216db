// Built-in create chain: lifecycle guards around INSERT execution.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::callback::registry::{Callback, CallbackError, CallbackRegistry};
use crate::callback::stamp::{AuditStampCallback, UpdateTimestampsCallback, AUDIT_STAMP, UPDATE_TIMESTAMPS};
use crate::executor::quote_identifier;
use crate::model::events::LifecycleMethod;
use crate::model::mixins::COLUMN_ID;
use crate::scope::Scope;

pub const BEFORE_CREATE: &str = "loam:before_create";
pub const CREATE: &str = "loam:create";
pub const AFTER_CREATE: &str = "loam:after_create";

#[derive(Default)]
pub struct BeforeCreateCallback;

#[async_trait]
impl Callback for BeforeCreateCallback {
    async fn call(&self, scope: &mut Scope) {
        scope.call_method(LifecycleMethod::BeforeSave);
        if !scope.has_error() {
            scope.call_method(LifecycleMethod::BeforeCreate);
        }
    }
}

/// Build and execute the INSERT. Columns come from the record in sorted
/// order, restricted to what the schema actually has.
#[derive(Default)]
pub struct CreateCallback;

#[async_trait]
impl Callback for CreateCallback {
    async fn call(&self, scope: &mut Scope) {
        if scope.has_column(COLUMN_ID) {
            scope
                .record_mut()
                .set_if_empty(COLUMN_ID, Value::String(Uuid::new_v4().to_string()));
        }

        let fields: Vec<(String, Value)> = scope
            .record()
            .iter()
            .filter(|(column, _)| scope.has_column(column))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect();

        let table = quote_identifier(scope.table());
        let sql = if fields.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table)
        } else {
            let mut placeholders = Vec::with_capacity(fields.len());
            for (_, value) in &fields {
                placeholders.push(scope.add_to_vars(value.clone()));
            }
            let columns: Vec<String> =
                fields.iter().map(|(column, _)| quote_identifier(column)).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        scope.raw(sql);
        scope.exec().await;
    }
}

#[derive(Default)]
pub struct AfterCreateCallback;

#[async_trait]
impl Callback for AfterCreateCallback {
    async fn call(&self, scope: &mut Scope) {
        scope.call_method(LifecycleMethod::AfterCreate);
        if !scope.has_error() {
            scope.call_method(LifecycleMethod::AfterSave);
        }
    }
}

pub fn register_defaults(registry: &CallbackRegistry) -> Result<(), CallbackError> {
    registry.create().register(BEFORE_CREATE, BeforeCreateCallback)?;
    registry.create().before(CREATE).register(UPDATE_TIMESTAMPS, UpdateTimestampsCallback)?;
    registry
        .create()
        .before(CREATE)
        .after(UPDATE_TIMESTAMPS)
        .register(AUDIT_STAMP, AuditStampCallback)?;
    registry.create().register(CREATE, CreateCallback)?;
    registry.create().after(CREATE).register(AFTER_CREATE, AfterCreateCallback)?;
    Ok(())
}
