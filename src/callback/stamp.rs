// Stamping hooks shared by the create and update chains. Each one checks
// the schema for its columns and stays silent when the entity doesn't carry
// the mix-in.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::callback::registry::{Callback, Operation};
use crate::model::mixins::{
    COLUMN_CREATED_AT, COLUMN_CREATED_BY_ID, COLUMN_UPDATED_AT, COLUMN_UPDATED_BY_ID,
};
use crate::scope::Scope;

pub const UPDATE_TIMESTAMPS: &str = "loam:update_timestamps";
pub const AUDIT_STAMP: &str = "loam:audit_stamp";

/// Stamp `created_at` on create and `updated_at` on create and update
#[derive(Default)]
pub struct UpdateTimestampsCallback;

#[async_trait]
impl Callback for UpdateTimestampsCallback {
    async fn call(&self, scope: &mut Scope) {
        let now = Value::String(Utc::now().to_rfc3339());
        if scope.operation() == Operation::Create && scope.has_column(COLUMN_CREATED_AT) {
            scope.record_mut().set_if_empty(COLUMN_CREATED_AT, now.clone());
        }
        if scope.has_column(COLUMN_UPDATED_AT) {
            scope.record_mut().set(COLUMN_UPDATED_AT, now);
        }
    }
}

/// Stamp audit actor columns from the scope's acting user
#[derive(Default)]
pub struct AuditStampCallback;

#[async_trait]
impl Callback for AuditStampCallback {
    async fn call(&self, scope: &mut Scope) {
        let Some(user) = scope.acting_user() else {
            return;
        };
        let id = Value::String(user.to_string());
        if scope.operation() == Operation::Create && scope.has_column(COLUMN_CREATED_BY_ID) {
            scope.record_mut().set_if_empty(COLUMN_CREATED_BY_ID, id.clone());
        }
        if scope.has_column(COLUMN_UPDATED_BY_ID) {
            scope.record_mut().set(COLUMN_UPDATED_BY_ID, id);
        }
    }
}
