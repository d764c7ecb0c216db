mod common;

use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde_json::json;
use uuid::Uuid;

use loam::callback::{CallbackRegistry, Operation};
use loam::db::Db;
use loam::error::{is_error, ERR_UNADDRESSABLE};
use loam::model::events::ModelEvents;
use loam::model::schema::ModelSchema;
use loam::scope::Scope;

fn posts_schema() -> Arc<ModelSchema> {
    Arc::new(
        ModelSchema::builder("Post", "posts")
            .with_id()
            .with_timestamps()
            .with_soft_delete_audit()
            .column("title")
            .build(),
    )
}

fn plain_schema() -> Arc<ModelSchema> {
    Arc::new(ModelSchema::builder("Session", "sessions").with_id().build())
}

fn db_with(executor: Arc<common::RecordingExecutor>) -> Db {
    Db::new(Arc::new(CallbackRegistry::with_defaults()), executor)
}

#[tokio::test]
async fn delete_soft_deletes_when_the_schema_has_the_column() -> Result<()> {
    common::init_tracing();
    let executor = Arc::new(common::RecordingExecutor::new());
    let db = db_with(executor.clone());
    let id = Uuid::new_v4();

    let rows = db
        .delete(posts_schema(), &[("id", json!(id.to_string()))])
        .await
        .map_err(anyhow::Error::new)?;
    assert_eq!(rows, 1);

    let calls = executor.calls();
    assert_eq!(calls.len(), 1);
    // an UPDATE stamping deleted_at, guarded so already-deleted rows stay put
    assert_eq!(
        calls[0].sql,
        "UPDATE \"posts\" SET \"deleted_at\" = $2 WHERE \"id\" = $1 AND \"deleted_at\" IS NULL"
    );
    assert_eq!(calls[0].params[0], json!(id.to_string()));
    Ok(())
}

#[tokio::test]
async fn delete_stamps_the_deleting_actor_when_known() -> Result<()> {
    let executor = Arc::new(common::RecordingExecutor::new());
    let db = db_with(executor.clone());
    let id = Uuid::new_v4();
    let actor = Uuid::new_v4();

    let mut scope = db
        .scope(Operation::Delete, posts_schema())
        .with_acting_user(actor)
        .filter_eq("id", json!(id.to_string()));
    scope.invoke().await.map_err(anyhow::Error::new)?;

    let calls = executor.calls();
    assert_eq!(
        calls[0].sql,
        "UPDATE \"posts\" SET \"deleted_at\" = $2, \"deleted_by_id\" = $3 \
         WHERE \"id\" = $1 AND \"deleted_at\" IS NULL"
    );
    assert_eq!(calls[0].params[2], json!(actor.to_string()));
    Ok(())
}

#[tokio::test]
async fn unscoped_delete_is_physical() -> Result<()> {
    let executor = Arc::new(common::RecordingExecutor::new());
    let db = db_with(executor.clone());
    let id = Uuid::new_v4();

    let mut scope = db
        .scope(Operation::Delete, posts_schema())
        .unscoped()
        .filter_eq("id", json!(id.to_string()));
    scope.invoke().await.map_err(anyhow::Error::new)?;

    let calls = executor.calls();
    assert_eq!(calls[0].sql, "DELETE FROM \"posts\" WHERE \"id\" = $1");
    Ok(())
}

#[tokio::test]
async fn delete_is_physical_without_the_mixin() -> Result<()> {
    let executor = Arc::new(common::RecordingExecutor::new());
    let db = db_with(executor.clone());
    let id = Uuid::new_v4();

    db.delete(plain_schema(), &[("id", json!(id.to_string()))])
        .await
        .map_err(anyhow::Error::new)?;

    let calls = executor.calls();
    assert_eq!(calls[0].sql, "DELETE FROM \"sessions\" WHERE \"id\" = $1");
    Ok(())
}

#[tokio::test]
async fn query_hides_soft_deleted_rows_unless_unscoped() -> Result<()> {
    let executor = Arc::new(common::RecordingExecutor::new());
    let db = db_with(executor.clone());

    db.find(posts_schema(), &[]).await.map_err(anyhow::Error::new)?;
    let mut scope = db.scope(Operation::Query, posts_schema()).unscoped();
    scope.invoke().await.map_err(anyhow::Error::new)?;

    let calls = executor.calls();
    assert_eq!(calls[0].sql, "SELECT * FROM \"posts\" WHERE \"deleted_at\" IS NULL");
    assert_eq!(calls[1].sql, "SELECT * FROM \"posts\"");
    Ok(())
}

/// Entity whose BeforeDelete always refuses
struct RefusingModel {
    after_delete_ran: Arc<Mutex<bool>>,
}

impl ModelEvents for RefusingModel {
    fn before_delete(&mut self, scope: &mut Scope) {
        scope.record_error(ERR_UNADDRESSABLE.clone());
    }
    fn after_delete(&mut self, _scope: &mut Scope) {
        *self.after_delete_ran.lock().unwrap() = true;
    }
}

#[tokio::test]
async fn a_failing_before_delete_skips_execution_and_after_delete() {
    let executor = Arc::new(common::RecordingExecutor::new());
    let db = db_with(executor.clone());
    let after_delete_ran = Arc::new(Mutex::new(false));
    let model = RefusingModel { after_delete_ran: after_delete_ran.clone() };

    let mut scope = db
        .scope(Operation::Delete, posts_schema())
        .with_model(Box::new(model))
        .filter_eq("id", json!(Uuid::new_v4().to_string()));
    let err = scope.invoke().await.unwrap_err();

    assert!(is_error(&ERR_UNADDRESSABLE, &[err]));
    assert!(executor.calls().is_empty(), "no statement should reach the store");
    assert!(!*after_delete_ran.lock().unwrap());
}
