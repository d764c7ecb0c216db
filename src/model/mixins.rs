// Reusable field bundles for mapped entities. The structs are inert data;
// the behavior that reads and stamps these columns lives in the callback
// chains, keyed off schema capability checks rather than the struct types.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const COLUMN_ID: &str = "id";
pub const COLUMN_CREATED_AT: &str = "created_at";
pub const COLUMN_UPDATED_AT: &str = "updated_at";
pub const COLUMN_CREATED_BY_ID: &str = "created_by_id";
pub const COLUMN_UPDATED_BY_ID: &str = "updated_by_id";
pub const COLUMN_DELETED_AT: &str = "deleted_at";
pub const COLUMN_DELETED_BY_ID: &str = "deleted_by_id";

pub const TIMESTAMP_COLUMNS: &[&str] = &[COLUMN_CREATED_AT, COLUMN_UPDATED_AT];
pub const AUDIT_COLUMNS: &[&str] = &[COLUMN_CREATED_BY_ID, COLUMN_UPDATED_BY_ID];
pub const SOFT_DELETE_COLUMNS: &[&str] = &[COLUMN_DELETED_AT, COLUMN_DELETED_BY_ID];

/// Audit and soft-delete columns combined
pub static AUDITED_SD_COLUMNS: Lazy<Vec<&'static str>> =
    Lazy::new(|| AUDIT_COLUMNS.iter().chain(SOFT_DELETE_COLUMNS.iter()).copied().collect());

/// Row creation/modification timestamps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timestamps {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Soft-delete marker column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftDelete {
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SoftDelete {
    /// Check if the row has been soft deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Soft delete plus the identity that performed it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SoftDeleteAudited {
    #[serde(flatten)]
    pub soft_delete: SoftDelete,
    pub deleted_by_id: Option<Uuid>,
}

impl SoftDeleteAudited {
    pub fn set_deleted_by(&mut self, deleted_by: Uuid) {
        self.deleted_by_id = Some(deleted_by);
    }

    pub fn deleted_by(&self) -> Option<Uuid> {
        self.deleted_by_id
    }
}

/// Creation/modification actor identities
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Audited {
    pub created_by_id: Option<Uuid>,
    pub updated_by_id: Option<Uuid>,
}

/// Full audit bundle: actor identities plus audited soft delete
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditedSd {
    #[serde(flatten)]
    pub audited: Audited,
    #[serde(flatten)]
    pub soft_delete: SoftDeleteAudited,
}

/// Base model: primary key plus timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: Uuid,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl Model {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4(), timestamps: Timestamps::default() }
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

/// Base model with the full audit bundle attached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditedSdModel {
    #[serde(flatten)]
    pub model: Model,
    #[serde(flatten)]
    pub audit: AuditedSd,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::record::Record;

    #[test]
    fn mixins_flatten_to_column_names() {
        let model = AuditedSdModel::default();
        let rec = Record::from_model(&model).unwrap();
        for column in [COLUMN_ID, COLUMN_CREATED_AT, COLUMN_UPDATED_AT] {
            assert!(rec.contains(column), "missing column {}", column);
        }
        for column in AUDITED_SD_COLUMNS.iter() {
            assert!(rec.contains(column), "missing column {}", column);
        }
    }

    #[test]
    fn soft_delete_state() {
        let mut sd = SoftDeleteAudited::default();
        assert!(!sd.soft_delete.is_deleted());

        sd.soft_delete.deleted_at = Some(Utc::now());
        let actor = Uuid::new_v4();
        sd.set_deleted_by(actor);
        assert!(sd.soft_delete.is_deleted());
        assert_eq!(sd.deleted_by(), Some(actor));
    }
}
