// Built-in query chain. The combined WHERE fragment hides soft-deleted rows
// unless the scope is unscoped.

use async_trait::async_trait;

use crate::callback::registry::{Callback, CallbackError, CallbackRegistry};
use crate::executor::quote_identifier;
use crate::model::events::LifecycleMethod;
use crate::scope::Scope;

pub const QUERY: &str = "loam:query";
pub const AFTER_QUERY: &str = "loam:after_query";

#[derive(Default)]
pub struct QueryCallback;

#[async_trait]
impl Callback for QueryCallback {
    async fn call(&self, scope: &mut Scope) {
        let table = quote_identifier(scope.table());
        let combined = scope.combined_sql();
        let sql = if combined.is_empty() {
            format!("SELECT * FROM {}", table)
        } else {
            format!("SELECT * FROM {} {}", table, combined)
        };
        scope.raw(sql);
        scope.fetch().await;
    }
}

#[derive(Default)]
pub struct AfterQueryCallback;

#[async_trait]
impl Callback for AfterQueryCallback {
    async fn call(&self, scope: &mut Scope) {
        scope.call_method(LifecycleMethod::AfterQuery);
    }
}

pub fn register_defaults(registry: &CallbackRegistry) -> Result<(), CallbackError> {
    registry.query().register(QUERY, QueryCallback)?;
    registry.query().after(QUERY).register(AFTER_QUERY, AfterQueryCallback)?;
    Ok(())
}
