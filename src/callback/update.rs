// Built-in update chain: lifecycle guards around UPDATE execution.

use async_trait::async_trait;
use serde_json::Value;

use crate::callback::registry::{Callback, CallbackError, CallbackRegistry};
use crate::callback::stamp::{AuditStampCallback, UpdateTimestampsCallback, AUDIT_STAMP, UPDATE_TIMESTAMPS};
use crate::error::ERR_SINGLE_UPDATE_KEY;
use crate::executor::quote_identifier;
use crate::model::events::LifecycleMethod;
use crate::scope::Scope;

pub const BEFORE_UPDATE: &str = "loam:before_update";
pub const UPDATE: &str = "loam:update";
pub const AFTER_UPDATE: &str = "loam:after_update";

#[derive(Default)]
pub struct BeforeUpdateCallback;

#[async_trait]
impl Callback for BeforeUpdateCallback {
    async fn call(&self, scope: &mut Scope) {
        scope.call_method(LifecycleMethod::BeforeSave);
        if !scope.has_error() {
            scope.call_method(LifecycleMethod::BeforeUpdate);
        }
    }
}

/// Build and execute the UPDATE restricted by the combined WHERE fragment.
/// An update with no user conditions would rewrite the whole table, so it
/// records the single-update-key sentinel instead of executing.
#[derive(Default)]
pub struct UpdateCallback;

#[async_trait]
impl Callback for UpdateCallback {
    async fn call(&self, scope: &mut Scope) {
        if !scope.has_conditions() {
            scope.record_error(ERR_SINGLE_UPDATE_KEY.clone());
            return;
        }

        let fields: Vec<(String, Value)> = scope
            .record()
            .iter()
            .filter(|(column, _)| scope.has_column(column))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect();

        if fields.is_empty() {
            tracing::debug!("No assignable columns for update on {}, skipping", scope.table());
            return;
        }

        let table = quote_identifier(scope.table());
        let combined = scope.combined_sql();
        let mut assignments = Vec::with_capacity(fields.len());
        for (column, value) in &fields {
            let placeholder = scope.add_to_vars(value.clone());
            assignments.push(format!("{} = {}", quote_identifier(column), placeholder));
        }

        scope.raw(format!("UPDATE {} SET {} {}", table, assignments.join(", "), combined));
        scope.exec().await;
    }
}

#[derive(Default)]
pub struct AfterUpdateCallback;

#[async_trait]
impl Callback for AfterUpdateCallback {
    async fn call(&self, scope: &mut Scope) {
        scope.call_method(LifecycleMethod::AfterUpdate);
        if !scope.has_error() {
            scope.call_method(LifecycleMethod::AfterSave);
        }
    }
}

pub fn register_defaults(registry: &CallbackRegistry) -> Result<(), CallbackError> {
    registry.update().register(BEFORE_UPDATE, BeforeUpdateCallback)?;
    registry.update().before(UPDATE).register(UPDATE_TIMESTAMPS, UpdateTimestampsCallback)?;
    registry
        .update()
        .before(UPDATE)
        .after(UPDATE_TIMESTAMPS)
        .register(AUDIT_STAMP, AuditStampCallback)?;
    registry.update().register(UPDATE, UpdateCallback)?;
    registry.update().after(UPDATE).register(AFTER_UPDATE, AfterUpdateCallback)?;
    Ok(())
}
