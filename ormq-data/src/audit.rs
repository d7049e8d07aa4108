//! Audit records and the per-row mutation lifecycle.
//!
//! A mutation starts as a [`PendingMutation`] (operation known, statement not
//! yet run). Once the statement has executed inside the session's
//! transaction, the post-flush values are attached and it becomes an
//! [`AuditEntry`], which the backend writes to [`AUDIT_TABLE`] in that same
//! transaction. Commit makes both durable; rollback discards both.

use crate::entity::Entity;
use crate::error::DataError;
use crate::value::{Record, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::str::FromStr;

pub const AUDIT_TABLE: &str = "audit_logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            other => Err(format!("unknown audit operation '{other}'")),
        }
    }
}

/// A staged mutation of one table; no statement has run yet.
#[derive(Debug, Clone, Copy)]
#[must_use = "a pending mutation records nothing until it is flushed"]
pub struct PendingMutation {
    table: &'static str,
    operation: Operation,
}

impl PendingMutation {
    pub fn new(table: &'static str, operation: Operation) -> Self {
        Self { table, operation }
    }

    pub fn of<T: Entity>(operation: Operation) -> Self {
        Self::new(T::table_name(), operation)
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Attach the flushed row. `only` restricts the snapshot to the changed
    /// columns; `None` keeps every serialized field.
    ///
    /// A changed column missing from the serialized row (a renamed or
    /// skipped field) is recorded with the value that was written.
    pub fn flushed<T: Entity>(
        self,
        entity: &T,
        only: Option<&Record>,
    ) -> Result<AuditEntry, DataError> {
        let mut changes = snapshot(entity)?;
        if let Some(changed) = only {
            let mut delta = serde_json::Map::with_capacity(changed.len());
            for (column, written) in changed.iter() {
                let value = changes.remove(column).unwrap_or_else(|| written.to_json());
                delta.insert(column.to_string(), value);
            }
            changes = delta;
        }
        Ok(AuditEntry {
            table_name: self.table,
            entity_id: entity.id().to_string(),
            operation: self.operation,
            changes,
            recorded_at: Utc::now(),
        })
    }
}

/// A flushed mutation awaiting the outcome of its transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub table_name: &'static str,
    pub entity_id: String,
    pub operation: Operation,
    pub changes: serde_json::Map<String, serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Row payload for [`AUDIT_TABLE`].
    pub fn to_record(&self) -> Record {
        Record::new()
            .set("table_name", self.table_name)
            .set("entity_id", self.entity_id.clone())
            .set("operation", self.operation.as_str())
            .set(
                "changes",
                Value::Json(serde_json::Value::Object(self.changes.clone())),
            )
            .set("recorded_at", self.recorded_at)
    }
}

/// Serialize an entity into its field map.
pub fn snapshot<T: Entity>(
    entity: &T,
) -> Result<serde_json::Map<String, serde_json::Value>, DataError> {
    match serde_json::to_value(entity) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(DataError::Other(format!(
            "{} row serialized to {other} instead of an object",
            T::table_name()
        ))),
        Err(err) => Err(DataError::Other(format!(
            "{} row snapshot failed: {err}",
            T::table_name()
        ))),
    }
}

/// One persisted audit record. Append-only: the façade refuses to mutate it.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub table_name: String,
    pub entity_id: String,
    pub operation: String,
    pub changes: Json<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn operation(&self) -> Option<Operation> {
        self.operation.parse().ok()
    }

    pub fn change(&self, field: &str) -> Option<&serde_json::Value> {
        self.changes.0.get(field)
    }
}

impl Entity for AuditLog {
    type Id = i64;

    fn table_name() -> &'static str {
        AUDIT_TABLE
    }

    fn id_column() -> &'static str {
        "id"
    }

    fn columns() -> &'static [&'static str] {
        &[
            "id",
            "table_name",
            "entity_id",
            "operation",
            "changes",
            "recorded_at",
        ]
    }

    fn id(&self) -> &i64 {
        &self.id
    }

    fn soft_delete_column() -> Option<&'static str> {
        None
    }

    fn audited() -> bool {
        false
    }

    fn read_only() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Note {
        id: i64,
        title: String,
        is_deleted: bool,
    }

    impl Entity for Note {
        type Id = i64;
        fn table_name() -> &'static str {
            "notes"
        }
        fn id_column() -> &'static str {
            "id"
        }
        fn columns() -> &'static [&'static str] {
            &["id", "title", "is_deleted"]
        }
        fn id(&self) -> &i64 {
            &self.id
        }
    }

    #[test]
    fn test_insert_snapshot_keeps_all_fields() {
        let note = Note {
            id: 7,
            title: "hello".into(),
            is_deleted: false,
        };
        let entry = PendingMutation::of::<Note>(Operation::Insert).flushed(&note, None).unwrap();
        assert_eq!(entry.table_name, "notes");
        assert_eq!(entry.entity_id, "7");
        assert_eq!(entry.changes.len(), 3);
        assert_eq!(entry.changes["id"], serde_json::json!(7));
    }

    #[test]
    fn test_update_snapshot_is_restricted_to_changes() {
        let note = Note {
            id: 7,
            title: "renamed".into(),
            is_deleted: false,
        };
        let changed = Record::new().set("title", "renamed");
        let entry = PendingMutation::of::<Note>(Operation::Update).flushed(&note, Some(&changed)).unwrap();
        assert_eq!(entry.operation, Operation::Update);
        assert_eq!(entry.changes.len(), 1);
        assert_eq!(entry.changes["title"], serde_json::json!("renamed"));
    }

    #[derive(Serialize)]
    struct Labelled {
        id: i64,
        #[serde(rename = "label")]
        title: String,
    }

    impl Entity for Labelled {
        type Id = i64;
        fn table_name() -> &'static str {
            "labels"
        }
        fn id_column() -> &'static str {
            "id"
        }
        fn columns() -> &'static [&'static str] {
            &["id", "title"]
        }
        fn id(&self) -> &i64 {
            &self.id
        }
    }

    #[test]
    fn test_update_delta_keeps_columns_absent_from_serialization() {
        let row = Labelled {
            id: 3,
            title: "new".into(),
        };
        let changed = Record::new().set("title", "new");
        let entry = PendingMutation::of::<Labelled>(Operation::Update)
            .flushed(&row, Some(&changed))
            .unwrap();
        assert_eq!(entry.changes.len(), 1);
        assert_eq!(entry.changes["title"], serde_json::json!("new"));
    }

    struct Unserializable {
        id: i64,
    }

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refused"))
        }
    }

    impl Entity for Unserializable {
        type Id = i64;
        fn table_name() -> &'static str {
            "broken"
        }
        fn id_column() -> &'static str {
            "id"
        }
        fn columns() -> &'static [&'static str] {
            &["id"]
        }
        fn id(&self) -> &i64 {
            &self.id
        }
    }

    #[test]
    fn test_snapshot_failure_is_an_error() {
        let err = PendingMutation::of::<Unserializable>(Operation::Insert)
            .flushed(&Unserializable { id: 1 }, None)
            .unwrap_err();
        assert!(matches!(err, DataError::Other(msg) if msg.contains("refused")));
    }

    #[test]
    fn test_entry_record_shape() {
        let note = Note {
            id: 1,
            title: "t".into(),
            is_deleted: true,
        };
        let record = PendingMutation::of::<Note>(Operation::Delete)
            .flushed(&note, None)
            .unwrap()
            .to_record();
        let cols: Vec<_> = record.columns().collect();
        assert_eq!(
            cols,
            vec!["changes", "entity_id", "operation", "recorded_at", "table_name"]
        );
        assert_eq!(record.get("operation"), Some(&Value::Text("delete".into())));
    }

    #[test]
    fn test_operation_round_trip_names() {
        for op in [Operation::Insert, Operation::Update, Operation::Delete] {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("upsert".parse::<Operation>().is_err());
    }
}
