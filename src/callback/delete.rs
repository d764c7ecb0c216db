// Built-in delete chain. Entities with a soft-delete column get an UPDATE
// stamping the deletion timestamp instead of a physical DELETE; unscoped
// scopes always delete physically.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::callback::registry::{Callback, CallbackError, CallbackRegistry};
use crate::executor::quote_identifier;
use crate::model::events::LifecycleMethod;
use crate::model::mixins::{COLUMN_DELETED_AT, COLUMN_DELETED_BY_ID};
use crate::scope::Scope;

pub const BEFORE_DELETE: &str = "loam:before_delete";
pub const DELETE: &str = "loam:delete";
pub const AFTER_DELETE: &str = "loam:after_delete";

#[derive(Default)]
pub struct BeforeDeleteCallback;

#[async_trait]
impl Callback for BeforeDeleteCallback {
    async fn call(&self, scope: &mut Scope) {
        scope.call_method(LifecycleMethod::BeforeDelete);
    }
}

#[derive(Default)]
pub struct DeleteCallback;

#[async_trait]
impl Callback for DeleteCallback {
    async fn call(&self, scope: &mut Scope) {
        let table = quote_identifier(scope.table());
        let combined = scope.combined_sql();

        let sql = if !scope.is_unscoped() && scope.has_column(COLUMN_DELETED_AT) {
            let stamp = scope.add_to_vars(Value::String(Utc::now().to_rfc3339()));
            let mut assignments =
                vec![format!("{} = {}", quote_identifier(COLUMN_DELETED_AT), stamp)];
            if scope.has_column(COLUMN_DELETED_BY_ID) {
                if let Some(user) = scope.acting_user() {
                    let actor = scope.add_to_vars(Value::String(user.to_string()));
                    assignments
                        .push(format!("{} = {}", quote_identifier(COLUMN_DELETED_BY_ID), actor));
                }
            }
            format!("UPDATE {} SET {} {}", table, assignments.join(", "), combined)
        } else {
            format!("DELETE FROM {} {}", table, combined)
        };

        scope.raw(sql.trim_end().to_string());
        scope.exec().await;
    }
}

#[derive(Default)]
pub struct AfterDeleteCallback;

#[async_trait]
impl Callback for AfterDeleteCallback {
    async fn call(&self, scope: &mut Scope) {
        scope.call_method(LifecycleMethod::AfterDelete);
    }
}

pub fn register_defaults(registry: &CallbackRegistry) -> Result<(), CallbackError> {
    registry.delete().register(BEFORE_DELETE, BeforeDeleteCallback)?;
    registry.delete().after(BEFORE_DELETE).register(DELETE, DeleteCallback)?;
    registry.delete().after(DELETE).register(AFTER_DELETE, AfterDeleteCallback)?;
    Ok(())
}
