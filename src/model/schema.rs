// Compiled entity schema: the column and index set hooks query at runtime.
// Hooks never reflect over entity structs; they ask "does this schema have
// column X" and act accordingly.

use std::collections::BTreeSet;

use crate::model::mixins::{
    AUDIT_COLUMNS, COLUMN_DELETED_AT, COLUMN_DELETED_BY_ID, COLUMN_ID, TIMESTAMP_COLUMNS,
};

/// A (possibly unique) index over a set of columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIndex {
    pub name: String,
    pub unique: bool,
    pub fields: Vec<String>,
}

/// Compiled schema for one mapped entity
#[derive(Debug, Clone)]
pub struct ModelSchema {
    name: String,
    table: String,
    columns: BTreeSet<String>,
    indexes: Vec<SchemaIndex>,
}

impl ModelSchema {
    pub fn builder(name: impl Into<String>, table: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            name: name.into(),
            table: table.into(),
            columns: BTreeSet::new(),
            indexes: Vec::new(),
        }
    }

    /// Entity type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mapped table name
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.as_str())
    }

    pub fn indexes(&self) -> &[SchemaIndex] {
        &self.indexes
    }

    /// Look up the index behind a database constraint name
    pub fn index_for_constraint(&self, constraint: &str) -> Option<&SchemaIndex> {
        self.indexes.iter().find(|ix| ix.name == constraint)
    }
}

pub struct SchemaBuilder {
    name: String,
    table: String,
    columns: BTreeSet<String>,
    indexes: Vec<SchemaIndex>,
}

impl SchemaBuilder {
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.columns.insert(name.into());
        self
    }

    pub fn columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.columns.insert(name.into());
        }
        self
    }

    pub fn with_id(self) -> Self {
        self.column(COLUMN_ID)
    }

    pub fn with_timestamps(self) -> Self {
        self.columns(TIMESTAMP_COLUMNS.iter().copied())
    }

    pub fn with_audit(self) -> Self {
        self.columns(AUDIT_COLUMNS.iter().copied())
    }

    /// Add the soft-delete timestamp column and its lookup index
    pub fn with_soft_delete(mut self) -> Self {
        let index_name = format!("ix_{}_{}", self.table, COLUMN_DELETED_AT);
        self.indexes.push(SchemaIndex {
            name: index_name,
            unique: false,
            fields: vec![COLUMN_DELETED_AT.to_string()],
        });
        self.column(COLUMN_DELETED_AT)
    }

    /// Soft delete plus the deleting-actor column
    pub fn with_soft_delete_audit(self) -> Self {
        self.with_soft_delete().column(COLUMN_DELETED_BY_ID)
    }

    pub fn index(mut self, name: impl Into<String>, fields: &[&str]) -> Self {
        self.indexes.push(SchemaIndex {
            name: name.into(),
            unique: false,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn unique_index(mut self, name: impl Into<String>, fields: &[&str]) -> Self {
        self.indexes.push(SchemaIndex {
            name: name.into(),
            unique: true,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        });
        self
    }

    pub fn build(self) -> ModelSchema {
        ModelSchema {
            name: self.name,
            table: self.table,
            columns: self.columns,
            indexes: self.indexes,
        }
    }
}
