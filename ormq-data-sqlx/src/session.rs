//! Scoped sessions and the provider that hands them out.
//!
//! A [`Session`] wraps one `sqlx` transaction and the audit entries flushed
//! inside it. It is exclusively owned by the call path that acquired it and
//! ends in exactly one of three ways:
//! - [`Session::commit`]: the mutations and their audit rows become durable
//! - [`Session::rollback`]: both are discarded
//! - drop (error path, panic, cancelled future): `sqlx` rolls back

use crate::backend::Backend;
use crate::error::SqlxErrorExt;
use futures_util::future::BoxFuture;
use ormq_data::{AuditEntry, DataConfig, DataError, Statement, AUDIT_TABLE};
use sqlx::pool::PoolOptions;
use sqlx::{Pool, Transaction};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// One unit of work against the database.
pub struct Session<DB: Backend> {
    tx: Transaction<'static, DB>,
    journal: Vec<AuditEntry>,
}

impl<DB: Backend> std::fmt::Debug for Session<DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("journal", &self.journal)
            .finish_non_exhaustive()
    }
}

impl<DB: Backend> Session<DB> {
    fn new(tx: Transaction<'static, DB>) -> Self {
        Self {
            tx,
            journal: Vec::new(),
        }
    }

    /// Returns a mutable reference to the underlying connection.
    pub fn conn(&mut self) -> &mut DB::Connection {
        &mut *self.tx
    }

    /// Audit entries flushed in this session and awaiting its outcome.
    pub fn pending_audit(&self) -> &[AuditEntry] {
        &self.journal
    }

    pub(crate) fn record(&mut self, entry: AuditEntry) {
        self.journal.push(entry);
    }

    pub async fn commit(self) -> Result<(), DataError> {
        let Session { tx, journal } = self;
        tx.commit().await.map_err(DataError::transaction)?;
        tracing::debug!(audit_records = journal.len(), "Session committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<(), DataError> {
        let Session { tx, journal } = self;
        tx.rollback().await.map_err(DataError::transaction)?;
        tracing::debug!(discarded_audit_records = journal.len(), "Session rolled back");
        Ok(())
    }
}

struct ProviderInner<DB: Backend> {
    pool: OnceLock<Pool<DB>>,
    audit_enabled: bool,
    include_deleted_in_updates: bool,
}

/// Hands out scoped sessions from a pool injected once.
///
/// Cheap to clone; every clone shares the same pool. Pass it explicitly to
/// the repositories that need it:
///
/// ```ignore
/// let config = DataConfig::load("dev")?;
/// let provider = SessionProvider::<Sqlite>::connect(&config).await?;
/// provider.install_audit_table().await?;
/// let people = CrudRepository::<Person, Sqlite>::new(provider.clone());
/// ```
pub struct SessionProvider<DB: Backend> {
    inner: Arc<ProviderInner<DB>>,
}

impl<DB: Backend> Clone for SessionProvider<DB> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<DB: Backend> SessionProvider<DB> {
    /// An uninitialized provider; every session request fails with
    /// `NotInitialized` until [`init`](Self::init) is called.
    pub fn new(config: &DataConfig) -> Self {
        Self::build(OnceLock::new(), config)
    }

    /// A provider that is initialized with an existing pool.
    pub fn with_pool(pool: Pool<DB>, config: &DataConfig) -> Self {
        Self::build(OnceLock::from(pool), config)
    }

    /// Build the pool from `database.*` settings.
    pub async fn connect(config: &DataConfig) -> Result<Self, DataError> {
        let db = &config.database;
        let pool = PoolOptions::<DB>::new()
            .max_connections(db.max_connections)
            .min_connections(db.min_connections)
            .acquire_timeout(Duration::from_secs(db.acquire_timeout_secs))
            .connect(&db.url)
            .await
            .map_err(|e| e.into_data_error())?;
        tracing::info!(
            dialect = ?DB::DIALECT,
            max_connections = db.max_connections,
            "Connected session provider"
        );
        Ok(Self::with_pool(pool, config))
    }

    fn build(pool: OnceLock<Pool<DB>>, config: &DataConfig) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                pool,
                audit_enabled: config.audit.enabled,
                include_deleted_in_updates: config.soft_delete.include_in_updates,
            }),
        }
    }

    /// Install the session factory. Only the first call succeeds.
    pub fn init(&self, pool: Pool<DB>) -> Result<(), DataError> {
        self.inner
            .pool
            .set(pool)
            .map_err(|_| DataError::AlreadyInitialized)?;
        tracing::info!(dialect = ?DB::DIALECT, "Session provider initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.pool.get().is_some()
    }

    pub fn pool(&self) -> Result<&Pool<DB>, DataError> {
        self.inner.pool.get().ok_or(DataError::NotInitialized)
    }

    pub fn audit_enabled(&self) -> bool {
        self.inner.audit_enabled
    }

    /// Whether updates touch soft-deleted rows when the filter does not say.
    pub fn include_deleted_in_updates(&self) -> bool {
        self.inner.include_deleted_in_updates
    }

    /// Begin a new scoped session.
    pub async fn begin(&self) -> Result<Session<DB>, DataError> {
        let tx = self.pool()?.begin().await.map_err(DataError::transaction)?;
        Ok(Session::new(tx))
    }

    /// Create the audit table if it does not exist yet.
    pub async fn install_audit_table(&self) -> Result<(), DataError> {
        let mut session = self.begin().await?;
        DB::execute(session.conn(), Statement::raw(DB::AUDIT_TABLE_DDL))
            .await
            .map_err(|e| e.into_data_error())?;
        session.commit().await?;
        tracing::info!(table = AUDIT_TABLE, "Audit table installed");
        Ok(())
    }

    /// Run `unit` inside one session.
    ///
    /// Commits when the unit returns `Ok`. On `Err` the session is rolled
    /// back and the unit's error is returned unchanged; a failing rollback is
    /// logged and does not replace it.
    ///
    /// ```ignore
    /// let repo = people.clone();
    /// provider
    ///     .transactional(move |session| {
    ///         async move {
    ///             let p = repo.create_in(session, payload).await?;
    ///             repo.update_in(session, changes, Predicate::eq("id", p.id)).await?;
    ///             Ok::<_, DataError>(p)
    ///         }
    ///         .boxed()
    ///     })
    ///     .await?;
    /// ```
    pub async fn transactional<R, E, F>(&self, unit: F) -> Result<R, E>
    where
        F: for<'s> FnOnce(&'s mut Session<DB>) -> BoxFuture<'s, Result<R, E>>,
        E: From<DataError>,
    {
        let mut session = self.begin().await?;
        match unit(&mut session).await {
            Ok(value) => {
                session.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = session.rollback().await {
                    tracing::error!(error = %rollback_err, "Rollback failed after unit of work error");
                }
                Err(err)
            }
        }
    }
}
