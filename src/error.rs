// ORM error model: shared error values with cause chains, multi-error
// aggregation, and kind-based lookup over everything reachable from a set
// of errors.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::Value;
use thiserror::Error;

use crate::callback::CallbackError;
use crate::model::schema::SchemaIndex;

/// Errors are shared immutably; identity comparisons are `Arc::ptr_eq`
pub type SharedError = Arc<OrmError>;

/// Record not found when looking up with conditions that matched nothing
pub static ERR_RECORD_NOT_FOUND: Lazy<SharedError> =
    Lazy::new(|| Arc::new(OrmError::RecordNotFound));
/// Invalid SQL, e.g. executing an empty staged statement
pub static ERR_INVALID_SQL: Lazy<SharedError> = Lazy::new(|| Arc::new(OrmError::InvalidSql));
/// No valid transaction to commit or roll back
pub static ERR_INVALID_TRANSACTION: Lazy<SharedError> =
    Lazy::new(|| Arc::new(OrmError::InvalidTransaction));
/// A transaction could not be started
pub static ERR_CANT_START_TRANSACTION: Lazy<SharedError> =
    Lazy::new(|| Arc::new(OrmError::CantStartTransaction));
/// Using an unaddressable value
pub static ERR_UNADDRESSABLE: Lazy<SharedError> = Lazy::new(|| Arc::new(OrmError::Unaddressable));
/// Single-row UPDATE issued without any key condition
pub static ERR_SINGLE_UPDATE_KEY: Lazy<SharedError> =
    Lazy::new(|| Arc::new(OrmError::SingleUpdateKey));

/// Closed kind tag, one per `OrmError` variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RecordNotFound,
    InvalidSql,
    InvalidTransaction,
    CantStartTransaction,
    Unaddressable,
    SingleUpdateKey,
    Context,
    Query,
    DuplicateUniqueIndex,
    Aggregate,
    Database,
    Callback,
}

#[derive(Debug, Error)]
pub enum OrmError {
    #[error("record not found")]
    RecordNotFound,
    #[error("invalid SQL")]
    InvalidSql,
    #[error("no valid transaction")]
    InvalidTransaction,
    #[error("cannot start transaction")]
    CantStartTransaction,
    #[error("using unaddressable value")]
    Unaddressable,
    #[error("single UPDATE requires a primary key value")]
    SingleUpdateKey,
    #[error("{message}")]
    Context { message: String, source: SharedError },
    #[error(transparent)]
    Query(QueryError),
    #[error(transparent)]
    DuplicateUniqueIndex(DuplicateUniqueIndexError),
    #[error(transparent)]
    Aggregate(Errors),
    #[error("database error: {0}")]
    Database(String),
    #[error(transparent)]
    Callback(#[from] CallbackError),
}

impl OrmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrmError::RecordNotFound => ErrorKind::RecordNotFound,
            OrmError::InvalidSql => ErrorKind::InvalidSql,
            OrmError::InvalidTransaction => ErrorKind::InvalidTransaction,
            OrmError::CantStartTransaction => ErrorKind::CantStartTransaction,
            OrmError::Unaddressable => ErrorKind::Unaddressable,
            OrmError::SingleUpdateKey => ErrorKind::SingleUpdateKey,
            OrmError::Context { .. } => ErrorKind::Context,
            OrmError::Query(_) => ErrorKind::Query,
            OrmError::DuplicateUniqueIndex(_) => ErrorKind::DuplicateUniqueIndex,
            OrmError::Aggregate(_) => ErrorKind::Aggregate,
            OrmError::Database(_) => ErrorKind::Database,
            OrmError::Callback(_) => ErrorKind::Callback,
        }
    }

    /// The single wrapped cause, if this error has one
    pub fn cause(&self) -> Option<&SharedError> {
        match self {
            OrmError::Context { source, .. } => Some(source),
            OrmError::Query(query) => Some(&query.cause),
            OrmError::DuplicateUniqueIndex(dup) => Some(&dup.cause),
            _ => None,
        }
    }

    /// Aggregated child errors, empty for non-aggregate values
    pub fn children(&self) -> &[SharedError] {
        match self {
            OrmError::Aggregate(errors) => errors.errors(),
            _ => &[],
        }
    }

    /// Wrap a cause with a contextual message, extending its cause chain
    pub fn wrap(message: impl Into<String>, cause: SharedError) -> SharedError {
        Arc::new(OrmError::Context { message: message.into(), source: cause })
    }
}

/// Ordered aggregate of every error recorded during one operation.
///
/// Inserting an aggregate flattens it; inserting the same error value twice
/// (same identity, not just same message) keeps one.
#[derive(Debug, Clone, Default)]
pub struct Errors {
    errors: Vec<SharedError>,
}

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error, flattening nested aggregates and de-duplicating by
    /// identity
    pub fn add(&mut self, err: SharedError) {
        if let OrmError::Aggregate(nested) = err.as_ref() {
            for child in nested.errors() {
                self.add(child.clone());
            }
            return;
        }
        if self.errors.iter().any(|existing| Arc::ptr_eq(existing, &err)) {
            return;
        }
        self.errors.push(err);
    }

    pub fn extend(&mut self, errs: impl IntoIterator<Item = SharedError>) {
        for err in errs {
            self.add(err);
        }
    }

    pub fn errors(&self) -> &[SharedError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Collapse into a single shared error: `None` when empty, the sole
    /// member when singular, an aggregate otherwise
    pub fn into_shared(self) -> Option<SharedError> {
        match self.errors.len() {
            0 | 1 => self.errors.into_iter().next(),
            _ => Some(Arc::new(OrmError::Aggregate(self))),
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for Errors {}

/// Visit every error reachable from `errs`: each value itself, its wrapped
/// cause, and any aggregated children, depth-first. Returns early when the
/// visitor returns true. Error graphs are built at construction time and are
/// acyclic, so the walk always terminates.
pub fn walk_err<F>(visit: &mut F, errs: &[SharedError]) -> bool
where
    F: FnMut(&SharedError) -> bool,
{
    for err in errs {
        if visit(err) {
            return true;
        }
        if let Some(cause) = err.cause() {
            if walk_err(visit, std::slice::from_ref(cause)) {
                return true;
            }
        }
        let children = err.children();
        if !children.is_empty() && walk_err(visit, children) {
            return true;
        }
    }
    false
}

/// True if `expected` is reachable, by identity, from any of `errs`
pub fn is_error(expected: &SharedError, errs: &[SharedError]) -> bool {
    walk_err(&mut |err| Arc::ptr_eq(err, expected), errs)
}

/// First reachable error of the given kind
pub fn error_by_kind(kind: ErrorKind, errs: &[SharedError]) -> Option<SharedError> {
    let mut found = None;
    walk_err(
        &mut |err| {
            if err.kind() == kind {
                found = Some(err.clone());
                true
            } else {
                false
            }
        },
        errs,
    );
    found
}

pub fn is_record_not_found_error(errs: &[SharedError]) -> bool {
    error_by_kind(ErrorKind::RecordNotFound, errs).is_some()
}

pub fn is_query_error(errs: &[SharedError]) -> bool {
    error_by_kind(ErrorKind::Query, errs).is_some()
}

pub fn is_duplicate_unique_index_error(errs: &[SharedError]) -> bool {
    error_by_kind(ErrorKind::DuplicateUniqueIndex, errs).is_some()
}

/// First reachable query error, with its payload
pub fn get_query_error(errs: &[SharedError]) -> Option<QueryError> {
    error_by_kind(ErrorKind::Query, errs).and_then(|err| match err.as_ref() {
        OrmError::Query(query) => Some(query.clone()),
        _ => None,
    })
}

/// First reachable duplicate-unique-index error, with its payload
pub fn get_duplicate_unique_index_error(errs: &[SharedError]) -> Option<DuplicateUniqueIndexError> {
    error_by_kind(ErrorKind::DuplicateUniqueIndex, errs).and_then(|err| match err.as_ref() {
        OrmError::DuplicateUniqueIndex(dup) => Some(dup.clone()),
        _ => None,
    })
}

/// A failed query: the statement text, its bound arguments, and the
/// underlying cause
#[derive(Debug, Clone)]
pub struct QueryError {
    pub query: String,
    pub params: Vec<Value>,
    pub cause: SharedError,
}

impl QueryError {
    pub fn new(cause: SharedError, query: impl Into<String>, params: Vec<Value>) -> Self {
        Self { query: query.into(), params, cause }
    }

    pub fn into_shared(self) -> SharedError {
        Arc::new(OrmError::Query(self))
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", self.cause, self.query)?;
        if !self.params.is_empty() {
            let rendered: Vec<String> = self
                .params
                .iter()
                .enumerate()
                .map(|(i, value)| format!("${} = {}", i + 1, render_sql_value(value)))
                .collect();
            write!(f, " [{}]", rendered.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// A violated unique index: which schema index was hit and why
#[derive(Debug, Clone)]
pub struct DuplicateUniqueIndexError {
    pub model: String,
    pub table: String,
    pub index: SchemaIndex,
    pub cause: SharedError,
}

impl DuplicateUniqueIndexError {
    pub fn into_shared(self) -> SharedError {
        Arc::new(OrmError::DuplicateUniqueIndex(self))
    }
}

impl fmt::Display for DuplicateUniqueIndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "duplicate unique index of {}.{} [{}] caused by: {}",
            self.table,
            self.model,
            self.index.fields.join(", "),
            self.cause
        )
    }
}

impl std::error::Error for DuplicateUniqueIndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

/// Render a bound argument the way the driver would see it
pub(crate) fn render_sql_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn add_flattens_and_dedupes_by_identity() {
        let a = ERR_RECORD_NOT_FOUND.clone();
        let b: SharedError = Arc::new(OrmError::Database("boom".into()));
        // a distinct value with an equal message is not a duplicate
        let c: SharedError = Arc::new(OrmError::Database("boom".into()));

        let mut inner = Errors::new();
        inner.add(a.clone());
        inner.add(b.clone());

        let mut errs = Errors::new();
        errs.add(Arc::new(OrmError::Aggregate(inner)));
        errs.add(a.clone());
        errs.add(b);
        errs.add(c);
        assert_eq!(errs.len(), 3);
        assert!(is_error(&a, errs.errors()));
    }

    #[test]
    fn display_joins_messages() {
        let mut errs = Errors::new();
        errs.add(ERR_RECORD_NOT_FOUND.clone());
        errs.add(ERR_INVALID_SQL.clone());
        assert_eq!(errs.to_string(), "record not found; invalid SQL");
    }

    #[test]
    fn sentinel_reachable_through_nested_wrapping() {
        let wrapped = OrmError::wrap("deleting user", ERR_RECORD_NOT_FOUND.clone());
        let mut inner = Errors::new();
        inner.add(wrapped);
        let outer: SharedError = Arc::new(OrmError::Aggregate(inner));

        assert!(is_record_not_found_error(&[outer.clone()]));
        assert!(is_error(&ERR_RECORD_NOT_FOUND, &[outer]));
    }

    #[test]
    fn walk_stops_early() {
        let mut errs = Errors::new();
        errs.add(ERR_RECORD_NOT_FOUND.clone());
        errs.add(ERR_INVALID_SQL.clone());

        let mut visited = 0;
        walk_err(
            &mut |_| {
                visited += 1;
                true
            },
            errs.errors(),
        );
        assert_eq!(visited, 1);
    }

    #[test]
    fn query_error_renders_query_and_args() {
        let cause: SharedError = Arc::new(OrmError::Database("syntax error".into()));
        let err = QueryError::new(
            cause,
            "SELECT * FROM \"users\" WHERE \"name\" = $1 AND \"age\" > $2",
            vec![json!("O'Brien"), json!(30)],
        );
        let rendered = err.to_string();
        assert!(rendered.contains("syntax error"));
        assert!(rendered.contains("SELECT * FROM \"users\""));
        assert!(rendered.contains("$1 = 'O''Brien'"));
        assert!(rendered.contains("$2 = 30"));
    }

    #[test]
    fn duplicate_index_message_names_entity_and_fields() {
        let err = DuplicateUniqueIndexError {
            model: "User".into(),
            table: "users".into(),
            index: SchemaIndex {
                name: "users_email_key".into(),
                unique: true,
                fields: vec!["email".into()],
            },
            cause: Arc::new(OrmError::Database("duplicate key value".into())),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("users.User"));
        assert!(rendered.contains("[email]"));
        assert!(rendered.contains("caused by: database error: duplicate key value"));
    }
}
