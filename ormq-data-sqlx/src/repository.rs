use crate::audit::AuditTrail;
use crate::backend::Backend;
use crate::error::SqlxErrorExt;
use crate::session::{Session, SessionProvider};
use chrono::Utc;
use ormq_data::validation::check_columns;
use ormq_data::{
    DataError, Entity, FieldError, Filter, Operation, Order, Page, PageRequest, PendingMutation,
    Predicate, Query, Record, Repository, SqlBuilder, Validator,
};
use sqlx::FromRow;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// CRUD façade for one entity type.
///
/// Every operation comes in two forms: `op(..)` acquires its own session and
/// commits it, `op_in(&mut session, ..)` runs inside a session owned by the
/// caller (for instance one handed out by
/// [`SessionProvider::transactional`]). Each mutated row gets its audit
/// record in the same session.
///
/// Soft-deleted rows are invisible to reads unless the query opts in with
/// `include_deleted`. Updates skip them unless the provider was configured
/// with `soft_delete.include_in_updates` or the filter opts in. Deletes
/// remove them too.
///
/// # Example
///
/// ```ignore
/// let repo = CrudRepository::<Person, Sqlite>::new(provider.clone())
///     .with_validator(Schema::<NewPerson>::new());
///
/// let amrah = repo
///     .create(Record::new().set("name", "Amrah").set("country", "AZ"))
///     .await?;
/// let azerbaijanis = repo.select_all(Predicate::eq("country", "AZ")).await?;
/// repo.soft_delete(Predicate::eq("id", amrah.id)).await?;
/// ```
pub struct CrudRepository<T, DB: Backend> {
    provider: SessionProvider<DB>,
    validator: Option<Arc<dyn Validator>>,
    audit: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T, DB: Backend> Clone for CrudRepository<T, DB> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            validator: self.validator.clone(),
            audit: self.audit,
            _marker: PhantomData,
        }
    }
}

impl<T, DB> CrudRepository<T, DB>
where
    T: Entity + for<'r> FromRow<'r, DB::Row>,
    DB: Backend,
{
    pub fn new(provider: SessionProvider<DB>) -> Self {
        Self {
            provider,
            validator: None,
            audit: true,
            _marker: PhantomData,
        }
    }

    /// Validate create/update payloads with `validator` before any statement.
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Skip audit records for mutations made through this repository.
    pub fn without_audit(mut self) -> Self {
        self.audit = false;
        self
    }

    pub fn provider(&self) -> &SessionProvider<DB> {
        &self.provider
    }

    /// SQL builder for the entity's table.
    pub fn query(&self) -> SqlBuilder {
        SqlBuilder::new(T::table_name(), DB::DIALECT)
    }

    // ── Create ──────────────────────────────────────────────────────────

    pub async fn create(&self, data: Record) -> Result<T, DataError> {
        let mut session = self.provider.begin().await?;
        let entity = self.create_in(&mut session, data).await?;
        session.commit().await?;
        Ok(entity)
    }

    /// Insert one row and return it as stored, generated columns included.
    pub async fn create_in(&self, session: &mut Session<DB>, data: Record) -> Result<T, DataError> {
        self.ensure_writable()?;
        self.check_create(&data).map_err(DataError::Validation)?;
        self.insert_row(session, data).await
    }

    pub async fn bulk_create(&self, items: Vec<Record>) -> Result<Vec<T>, DataError> {
        let mut session = self.provider.begin().await?;
        let created = self.bulk_create_in(&mut session, items).await?;
        session.commit().await?;
        Ok(created)
    }

    /// Insert every payload or none: all payloads are checked before the
    /// first statement runs.
    pub async fn bulk_create_in(
        &self,
        session: &mut Session<DB>,
        items: Vec<Record>,
    ) -> Result<Vec<T>, DataError> {
        self.ensure_writable()?;
        check_batch(items.iter(), |data| self.check_create(data))?;
        let mut created = Vec::with_capacity(items.len());
        for data in items {
            created.push(self.insert_row(session, data).await?);
        }
        tracing::debug!(table = T::table_name(), rows = created.len(), "Bulk created rows");
        Ok(created)
    }

    // ── Read ────────────────────────────────────────────────────────────

    pub async fn find_one(&self, query: impl Into<Query>) -> Result<Option<T>, DataError> {
        let mut session = self.provider.begin().await?;
        let found = self.find_one_in(&mut session, query).await?;
        session.commit().await?;
        Ok(found)
    }

    /// First match in query order, if any.
    pub async fn find_one_in(
        &self,
        session: &mut Session<DB>,
        query: impl Into<Query>,
    ) -> Result<Option<T>, DataError> {
        let query = query.into();
        let stmt = self.query().select(
            &self.read_scope(&query.filter),
            &self.ordering(&query.order),
            Some(1),
            query.offset,
        )?;
        let rows: Vec<T> = DB::fetch_all(session.conn(), stmt)
            .await
            .map_err(|e| e.into_data_error())?;
        Ok(rows.into_iter().next())
    }

    pub async fn select_one(&self, query: impl Into<Query>) -> Result<T, DataError> {
        let mut session = self.provider.begin().await?;
        let found = self.select_one_in(&mut session, query).await?;
        session.commit().await?;
        Ok(found)
    }

    /// Like [`find_one_in`](Self::find_one_in) but a missing row is `NotFound`.
    pub async fn select_one_in(
        &self,
        session: &mut Session<DB>,
        query: impl Into<Query>,
    ) -> Result<T, DataError> {
        self.find_one_in(session, query).await?.ok_or_else(|| {
            DataError::NotFound(format!("No {} row matches the query", T::table_name()))
        })
    }

    pub async fn select_all(&self, query: impl Into<Query>) -> Result<Vec<T>, DataError> {
        let mut session = self.provider.begin().await?;
        let rows = self.select_all_in(&mut session, query).await?;
        session.commit().await?;
        Ok(rows)
    }

    /// Every match, ordered by the query's terms or by id.
    pub async fn select_all_in(
        &self,
        session: &mut Session<DB>,
        query: impl Into<Query>,
    ) -> Result<Vec<T>, DataError> {
        let query = query.into();
        let stmt = self.query().select(
            &self.read_scope(&query.filter),
            &self.ordering(&query.order),
            query.limit,
            query.offset,
        )?;
        let rows: Vec<T> = DB::fetch_all(session.conn(), stmt)
            .await
            .map_err(|e| e.into_data_error())?;
        tracing::debug!(table = T::table_name(), rows = rows.len(), "Selected rows");
        Ok(rows)
    }

    pub async fn find_by_id(&self, id: &T::Id) -> Result<Option<T>, DataError> {
        self.find_one(Predicate::eq(T::id_column(), id.clone())).await
    }

    pub async fn find_by_id_in(
        &self,
        session: &mut Session<DB>,
        id: &T::Id,
    ) -> Result<Option<T>, DataError> {
        self.find_one_in(session, Predicate::eq(T::id_column(), id.clone()))
            .await
    }

    pub async fn count(&self, filter: impl Into<Filter>) -> Result<u64, DataError> {
        let mut session = self.provider.begin().await?;
        let total = self.count_in(&mut session, filter).await?;
        session.commit().await?;
        Ok(total)
    }

    /// Number of visible matches; soft-deleted rows only count when the
    /// filter includes them.
    pub async fn count_in(
        &self,
        session: &mut Session<DB>,
        filter: impl Into<Filter>,
    ) -> Result<u64, DataError> {
        self.count_matching(session, &self.read_scope(&filter.into()))
            .await
    }

    pub async fn exists(&self, filter: impl Into<Filter>) -> Result<bool, DataError> {
        Ok(self.count(filter).await? > 0)
    }

    pub async fn exists_in(
        &self,
        session: &mut Session<DB>,
        filter: impl Into<Filter>,
    ) -> Result<bool, DataError> {
        Ok(self.count_in(session, filter).await? > 0)
    }

    pub async fn select_with_pagination(
        &self,
        page: u64,
        per_page: u64,
        query: impl Into<Query>,
    ) -> Result<Page<T>, DataError> {
        let mut session = self.provider.begin().await?;
        let result = self
            .select_with_pagination_in(&mut session, page, per_page, query)
            .await?;
        session.commit().await?;
        Ok(result)
    }

    /// One 1-based page of matches plus the total match count, both read in
    /// `session`. The query's own limit and offset are ignored.
    pub async fn select_with_pagination_in(
        &self,
        session: &mut Session<DB>,
        page: u64,
        per_page: u64,
        query: impl Into<Query>,
    ) -> Result<Page<T>, DataError> {
        let request = PageRequest::new(page, per_page)?;
        let query = query.into();
        let predicate = self.read_scope(&query.filter);

        let total = self.count_matching(session, &predicate).await?;
        let items: Vec<T> = match request.offset() {
            Some(offset) if offset < total => {
                let stmt = self.query().select(
                    &predicate,
                    &self.ordering(&query.order),
                    Some(request.limit()),
                    Some(offset),
                )?;
                DB::fetch_all(session.conn(), stmt)
                    .await
                    .map_err(|e| e.into_data_error())?
            }
            _ => Vec::new(),
        };
        tracing::debug!(
            table = T::table_name(),
            page = request.page,
            rows = items.len(),
            total,
            "Selected page"
        );
        Ok(Page::new(items, &request, total))
    }

    // ── Update ──────────────────────────────────────────────────────────

    pub async fn update(&self, data: Record, filter: impl Into<Filter>) -> Result<u64, DataError> {
        let mut session = self.provider.begin().await?;
        let affected = self.update_in(&mut session, data, filter).await?;
        session.commit().await?;
        Ok(affected)
    }

    /// Apply `data` to every match and return the number of rows changed.
    pub async fn update_in(
        &self,
        session: &mut Session<DB>,
        data: Record,
        filter: impl Into<Filter>,
    ) -> Result<u64, DataError> {
        self.ensure_writable()?;
        self.check_update(&data).map_err(DataError::Validation)?;
        let predicate = self.update_scope(&filter.into());
        self.update_rows(session, data, predicate).await
    }

    pub async fn bulk_update(&self, items: Vec<(Record, Filter)>) -> Result<u64, DataError> {
        let mut session = self.provider.begin().await?;
        let affected = self.bulk_update_in(&mut session, items).await?;
        session.commit().await?;
        Ok(affected)
    }

    /// Apply each `(changes, filter)` pair in order; all payloads are checked
    /// before the first statement.
    pub async fn bulk_update_in(
        &self,
        session: &mut Session<DB>,
        items: Vec<(Record, Filter)>,
    ) -> Result<u64, DataError> {
        self.ensure_writable()?;
        check_batch(items.iter().map(|(data, _)| data), |data| {
            self.check_update(data)
        })?;
        let mut affected = 0;
        for (data, filter) in items {
            let predicate = self.update_scope(&filter);
            affected += self.update_rows(session, data, predicate).await?;
        }
        Ok(affected)
    }

    pub async fn soft_delete(&self, filter: impl Into<Filter>) -> Result<u64, DataError> {
        let mut session = self.provider.begin().await?;
        let affected = self.soft_delete_in(&mut session, filter).await?;
        session.commit().await?;
        Ok(affected)
    }

    /// Flag every active match as deleted. Rows already deleted are left
    /// alone and produce no audit record.
    pub async fn soft_delete_in(
        &self,
        session: &mut Session<DB>,
        filter: impl Into<Filter>,
    ) -> Result<u64, DataError> {
        self.set_deleted(session, filter.into(), true).await
    }

    pub async fn restore(&self, filter: impl Into<Filter>) -> Result<u64, DataError> {
        let mut session = self.provider.begin().await?;
        let affected = self.restore_in(&mut session, filter).await?;
        session.commit().await?;
        Ok(affected)
    }

    /// Clear the deleted flag on every soft-deleted match.
    pub async fn restore_in(
        &self,
        session: &mut Session<DB>,
        filter: impl Into<Filter>,
    ) -> Result<u64, DataError> {
        self.set_deleted(session, filter.into(), false).await
    }

    // ── Delete ──────────────────────────────────────────────────────────

    pub async fn delete(&self, filter: impl Into<Filter>) -> Result<u64, DataError> {
        let mut session = self.provider.begin().await?;
        let affected = self.delete_in(&mut session, filter).await?;
        session.commit().await?;
        Ok(affected)
    }

    /// Physically remove every match, soft-deleted rows included unless the
    /// filter excludes them.
    pub async fn delete_in(
        &self,
        session: &mut Session<DB>,
        filter: impl Into<Filter>,
    ) -> Result<u64, DataError> {
        self.ensure_writable()?;
        let predicate = self.scoped(&filter.into(), true);
        self.delete_rows(session, predicate).await
    }

    pub async fn bulk_delete(&self, filters: Vec<Filter>) -> Result<u64, DataError> {
        let mut session = self.provider.begin().await?;
        let affected = self.bulk_delete_in(&mut session, filters).await?;
        session.commit().await?;
        Ok(affected)
    }

    pub async fn bulk_delete_in(
        &self,
        session: &mut Session<DB>,
        filters: Vec<Filter>,
    ) -> Result<u64, DataError> {
        self.ensure_writable()?;
        let mut affected = 0;
        for filter in filters {
            let predicate = self.scoped(&filter, true);
            affected += self.delete_rows(session, predicate).await?;
        }
        Ok(affected)
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn trail(&self) -> AuditTrail {
        AuditTrail::for_entity::<T>(self.audit && self.provider.audit_enabled())
    }

    fn ensure_writable(&self) -> Result<(), DataError> {
        if T::read_only() {
            return Err(DataError::ReadOnly(T::table_name()));
        }
        Ok(())
    }

    fn check_create(&self, data: &Record) -> Result<(), Vec<FieldError>> {
        check_columns(data, T::columns())?;
        match &self.validator {
            Some(validator) => validator.validate_create(data),
            None => Ok(()),
        }
    }

    fn check_update(&self, changes: &Record) -> Result<(), Vec<FieldError>> {
        if changes.is_empty() {
            return Err(vec![FieldError::new("data", "update payload is empty")]);
        }
        check_columns(changes, T::columns())?;
        if changes.contains(T::id_column()) {
            return Err(vec![FieldError::new(
                T::id_column(),
                "primary key cannot be updated",
            )]);
        }
        match &self.validator {
            Some(validator) => validator.validate_update(changes),
            None => Ok(()),
        }
    }

    /// Filter predicate plus the soft-delete condition, unless deleted rows
    /// are included (per call, or by `default_include`).
    fn scoped(&self, filter: &Filter, default_include: bool) -> Predicate {
        let include = filter.include_deleted.unwrap_or(default_include);
        match T::soft_delete_column() {
            Some(column) if !include => filter.predicate.clone().and(Predicate::eq(column, false)),
            _ => filter.predicate.clone(),
        }
    }

    fn read_scope(&self, filter: &Filter) -> Predicate {
        self.scoped(filter, false)
    }

    fn update_scope(&self, filter: &Filter) -> Predicate {
        self.scoped(filter, self.provider.include_deleted_in_updates())
    }

    fn ordering(&self, order: &[Order]) -> Vec<Order> {
        if order.is_empty() {
            vec![Order::asc(T::id_column())]
        } else {
            order.to_vec()
        }
    }

    async fn count_matching(
        &self,
        session: &mut Session<DB>,
        predicate: &Predicate,
    ) -> Result<u64, DataError> {
        let stmt = self.query().count(predicate)?;
        let total = DB::fetch_count(session.conn(), stmt)
            .await
            .map_err(|e| e.into_data_error())?;
        row_count(T::table_name(), total)
    }

    async fn insert_row(&self, session: &mut Session<DB>, data: Record) -> Result<T, DataError> {
        let pending = PendingMutation::of::<T>(Operation::Insert);
        let stmt = self.query().insert(&stamp_insert::<T>(data))?;
        let rows: Vec<T> = DB::fetch_all(session.conn(), stmt)
            .await
            .map_err(|e| e.into_data_error())?;
        let entity = rows.into_iter().next().ok_or_else(|| {
            DataError::Other(format!("INSERT into {} returned no row", T::table_name()))
        })?;
        self.trail().flush(session, pending, &entity, None).await?;
        tracing::debug!(table = T::table_name(), id = %entity.id().to_string(), "Created row");
        Ok(entity)
    }

    /// Update the rows matching the already-scoped `predicate`.
    async fn update_rows(
        &self,
        session: &mut Session<DB>,
        data: Record,
        predicate: Predicate,
    ) -> Result<u64, DataError> {
        let changes = stamp_update::<T>(data);
        let trail = self.trail();
        if !trail.is_enabled() {
            let stmt = self.query().update(&changes, &predicate)?;
            let affected = DB::execute(session.conn(), stmt)
                .await
                .map_err(|e| e.into_data_error())?;
            tracing::debug!(table = T::table_name(), rows = affected, "Updated rows");
            return Ok(affected);
        }

        let stmt = self.query().update_returning(&changes, &predicate)?;
        let updated: Vec<T> = DB::fetch_all(session.conn(), stmt)
            .await
            .map_err(|e| e.into_data_error())?;
        for row in &updated {
            let pending = PendingMutation::of::<T>(Operation::Update);
            trail.flush(session, pending, row, Some(&changes)).await?;
        }
        let affected = updated.len() as u64;
        tracing::debug!(table = T::table_name(), rows = affected, "Updated rows");
        Ok(affected)
    }

    async fn set_deleted(
        &self,
        session: &mut Session<DB>,
        filter: Filter,
        deleted: bool,
    ) -> Result<u64, DataError> {
        self.ensure_writable()?;
        let column = T::soft_delete_column().ok_or_else(|| {
            DataError::invalid(T::table_name(), "entity has no soft-delete column")
        })?;
        let predicate = filter.predicate.and(Predicate::eq(column, !deleted));
        self.update_rows(session, Record::new().set(column, deleted), predicate)
            .await
    }

    /// Delete the rows matching the already-scoped `predicate`.
    async fn delete_rows(
        &self,
        session: &mut Session<DB>,
        predicate: Predicate,
    ) -> Result<u64, DataError> {
        let trail = self.trail();
        if !trail.is_enabled() {
            let stmt = self.query().delete(&predicate)?;
            let affected = DB::execute(session.conn(), stmt)
                .await
                .map_err(|e| e.into_data_error())?;
            tracing::debug!(table = T::table_name(), rows = affected, "Deleted rows");
            return Ok(affected);
        }

        let stmt = self.query().delete_returning(&predicate)?;
        let deleted: Vec<T> = DB::fetch_all(session.conn(), stmt)
            .await
            .map_err(|e| e.into_data_error())?;
        for row in &deleted {
            let pending = PendingMutation::of::<T>(Operation::Delete);
            trail.flush(session, pending, row, None).await?;
        }
        let affected = deleted.len() as u64;
        tracing::debug!(table = T::table_name(), rows = affected, "Deleted rows");
        Ok(affected)
    }
}

/// Defaults applied to a create payload after validation.
fn stamp_insert<T: Entity>(mut data: Record) -> Record {
    let now = Utc::now();
    for column in [T::created_at_column(), T::updated_at_column()]
        .into_iter()
        .flatten()
    {
        if !data.contains(column) {
            data.insert(column, now);
        }
    }
    if let Some(column) = T::soft_delete_column() {
        if !data.contains(column) {
            data.insert(column, false);
        }
    }
    data
}

fn stamp_update<T: Entity>(mut changes: Record) -> Record {
    if let Some(column) = T::updated_at_column() {
        if !changes.contains(column) {
            changes.insert(column, Utc::now());
        }
    }
    changes
}

/// A `COUNT(*)` result as an unsigned total.
fn row_count(table: &str, total: i64) -> Result<u64, DataError> {
    u64::try_from(total)
        .map_err(|_| DataError::Other(format!("COUNT on {table} returned {total}")))
}

/// Check every payload, prefixing field errors with the payload's index.
fn check_batch<'a>(
    payloads: impl Iterator<Item = &'a Record>,
    check: impl Fn(&Record) -> Result<(), Vec<FieldError>>,
) -> Result<(), DataError> {
    let mut errors = Vec::new();
    for (index, payload) in payloads.enumerate() {
        if let Err(field_errors) = check(payload) {
            errors.extend(field_errors.into_iter().map(|err| {
                FieldError::new(format!("[{index}].{}", err.field), err.message)
            }));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(DataError::Validation(errors))
    }
}

impl<T, DB> Repository<T> for CrudRepository<T, DB>
where
    T: Entity + for<'r> FromRow<'r, DB::Row>,
    DB: Backend,
{
    fn find_by_id(&self, id: &T::Id) -> impl Future<Output = Result<Option<T>, DataError>> + Send {
        CrudRepository::find_by_id(self, id)
    }

    fn find_all(&self) -> impl Future<Output = Result<Vec<T>, DataError>> + Send {
        self.select_all(Query::all())
    }

    fn find_all_paged(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Page<T>, DataError>> + Send {
        self.select_with_pagination(request.page, request.per_page, Query::all())
    }

    fn count(&self) -> impl Future<Output = Result<u64, DataError>> + Send {
        CrudRepository::count(self, Filter::all())
    }

    fn delete_by_id(&self, id: &T::Id) -> impl Future<Output = Result<bool, DataError>> + Send {
        let filter = Filter::new(Predicate::eq(T::id_column(), id.clone()));
        async move { self.delete(filter).await.map(|affected| affected > 0) }
    }
}
