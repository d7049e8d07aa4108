use crate::value::Value;
use serde::Serialize;

/// Default name of the soft-delete flag column.
pub const SOFT_DELETE_COLUMN: &str = "is_deleted";

/// Trait representing a persisted entity: table name, id column, column list
/// and the soft-delete / timestamp / audit conventions the façade applies.
///
/// Entities are `Serialize` so that audit snapshots can be taken from them;
/// row decoding goes through `sqlx::FromRow`. Snapshots are keyed by
/// serialized field name, so fields should serialize under their column
/// name. An update delta falls back to the written value for a changed
/// column the snapshot does not contain.
///
/// # Example
///
/// ```ignore
/// #[derive(Serialize, sqlx::FromRow)]
/// struct Person { id: i64, name: String, is_deleted: bool }
///
/// impl Entity for Person {
///     type Id = i64;
///     fn table_name() -> &'static str { "people" }
///     fn id_column() -> &'static str { "id" }
///     fn columns() -> &'static [&'static str] { &["id", "name", "is_deleted"] }
///     fn id(&self) -> &i64 { &self.id }
/// }
/// ```
pub trait Entity: Serialize + Send + Sync + Unpin + 'static {
    type Id: Clone + Into<Value> + ToString + Send + Sync + 'static;

    fn table_name() -> &'static str;
    fn id_column() -> &'static str;
    fn columns() -> &'static [&'static str];
    fn id(&self) -> &Self::Id;

    /// Column holding the soft-delete flag, `None` for entities that are only
    /// ever physically deleted.
    fn soft_delete_column() -> Option<&'static str> {
        Some(SOFT_DELETE_COLUMN)
    }

    /// Stamped with the current time on `create`.
    fn created_at_column() -> Option<&'static str> {
        None
    }

    /// Stamped with the current time on `create` and every update.
    fn updated_at_column() -> Option<&'static str> {
        None
    }

    /// Whether mutations of this entity produce audit records.
    fn audited() -> bool {
        true
    }

    /// Read-only entities reject every mutation through the façade.
    fn read_only() -> bool {
        false
    }

    fn has_column(column: &str) -> bool {
        Self::columns().contains(&column)
    }
}
