mod common;

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use loam::callback::CallbackRegistry;
use loam::db::Db;
use loam::error::{
    get_duplicate_unique_index_error, get_query_error, is_duplicate_unique_index_error,
    is_query_error, is_record_not_found_error, Errors, OrmError, ERR_RECORD_NOT_FOUND,
};
use loam::executor::ExecuteError;
use loam::model::record::Record;
use loam::model::schema::ModelSchema;

fn users_schema() -> Arc<ModelSchema> {
    Arc::new(
        ModelSchema::builder("User", "users")
            .with_id()
            .column("email")
            .unique_index("users_email_key", &["email"])
            .build(),
    )
}

fn db_with(executor: Arc<common::RecordingExecutor>) -> Db {
    Db::new(Arc::new(CallbackRegistry::with_defaults()), executor)
}

#[tokio::test]
async fn unique_violations_surface_as_duplicate_index_errors() {
    common::init_tracing();
    let executor = Arc::new(common::RecordingExecutor::new());
    executor.fail_next(ExecuteError::UniqueViolation {
        constraint: "users_email_key".to_string(),
        message: "duplicate key value violates unique constraint".to_string(),
    });
    let db = db_with(executor);

    let mut record = Record::new();
    record.set("email", json!("taken@example.com"));

    let err = db.create(users_schema(), record).await.unwrap_err();
    assert!(is_duplicate_unique_index_error(&[err.clone()]));
    assert!(!is_query_error(&[err.clone()]));

    let dup = get_duplicate_unique_index_error(&[err]).unwrap();
    assert_eq!(dup.index.name, "users_email_key");
    assert_eq!(dup.index.fields, vec!["email".to_string()]);
    // the message names the entity, its table, and the fields involved
    let rendered = dup.to_string();
    assert!(rendered.contains("users.User"));
    assert!(rendered.contains("[email]"));
    assert!(rendered.contains("caused by:"));
}

#[tokio::test]
async fn driver_failures_surface_as_query_errors_with_the_statement() {
    let executor = Arc::new(common::RecordingExecutor::new());
    executor.fail_next(ExecuteError::Driver("connection reset".to_string()));
    let db = db_with(executor);

    let id = Uuid::new_v4();
    let err = db.delete(users_schema(), &[("id", json!(id.to_string()))]).await.unwrap_err();
    assert!(is_query_error(&[err.clone()]));

    let query = get_query_error(&[err]).unwrap();
    assert!(query.query.starts_with("DELETE FROM \"users\""));
    assert_eq!(query.params, vec![json!(id.to_string())]);

    // Display carries the cause, the statement, and the bound values
    let rendered = query.to_string();
    assert!(rendered.contains("connection reset"));
    assert!(rendered.contains("DELETE FROM \"users\""));
    assert!(rendered.contains(&format!("$1 = '{}'", id)));
}

#[test]
fn sentinels_survive_two_levels_of_wrapping() {
    let wrapped = OrmError::wrap("fetching account", ERR_RECORD_NOT_FOUND.clone());
    let mut aggregate = Errors::new();
    aggregate.add(wrapped);
    aggregate.add(Arc::new(OrmError::Database("unrelated".to_string())));
    let outer = aggregate.into_shared().unwrap();

    assert!(is_record_not_found_error(&[outer]));
}

#[test]
fn adding_the_same_error_value_twice_keeps_the_aggregate_size() {
    let err = ERR_RECORD_NOT_FOUND.clone();
    let mut errors = Errors::new();
    errors.add(err.clone());
    errors.add(err);
    assert_eq!(errors.len(), 1);
}
