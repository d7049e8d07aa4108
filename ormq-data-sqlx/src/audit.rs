//! Audit step of the write path.
//!
//! Every mutating façade operation calls [`AuditTrail::flush`] right after
//! its statement has run, on the same session. The audit row is therefore
//! part of the mutating transaction: it commits with it or vanishes with it.

use crate::backend::Backend;
use crate::error::SqlxErrorExt;
use crate::session::Session;
use ormq_data::{AuditEntry, DataError, Entity, PendingMutation, Record, SqlBuilder, AUDIT_TABLE};

/// Writes audit records for one entity type.
#[derive(Debug, Clone, Copy)]
pub struct AuditTrail {
    enabled: bool,
}

impl AuditTrail {
    /// Trail for `T`, honouring the entity's own opt-out.
    pub fn for_entity<T: Entity>(enabled: bool) -> Self {
        Self {
            enabled: enabled && T::audited(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Capture the flushed row and write its audit record. `only` restricts
    /// the recorded changes to the given columns.
    pub async fn flush<T, DB>(
        &self,
        session: &mut Session<DB>,
        pending: PendingMutation,
        entity: &T,
        only: Option<&Record>,
    ) -> Result<(), DataError>
    where
        T: Entity,
        DB: Backend,
    {
        if !self.enabled {
            return Ok(());
        }
        let entry = pending.flushed(entity, only)?;
        write_entry(session, entry).await
    }
}

/// Insert `entry` into the audit table and keep it in the session journal.
pub async fn write_entry<DB: Backend>(
    session: &mut Session<DB>,
    entry: AuditEntry,
) -> Result<(), DataError> {
    let stmt = SqlBuilder::new(AUDIT_TABLE, DB::DIALECT).append(&entry.to_record())?;
    DB::execute(session.conn(), stmt)
        .await
        .map_err(|e| e.into_data_error())?;
    tracing::trace!(
        table = entry.table_name,
        entity_id = %entry.entity_id,
        operation = %entry.operation,
        "Audit record written"
    );
    session.record(entry);
    Ok(())
}
