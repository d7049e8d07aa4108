use crate::entity::Entity;
use crate::error::DataError;
use crate::page::{Page, PageRequest};
use std::future::Future;

/// Generic async repository trait for id-based access.
///
/// Uses RPITIT (return-position `impl Trait` in traits), no `async-trait` needed.
/// Reads only see rows that are not soft-deleted.
pub trait Repository<T>: Send + Sync
where
    T: Entity,
{
    fn find_by_id(&self, id: &T::Id) -> impl Future<Output = Result<Option<T>, DataError>> + Send;
    fn find_all(&self) -> impl Future<Output = Result<Vec<T>, DataError>> + Send;
    fn find_all_paged(
        &self,
        request: &PageRequest,
    ) -> impl Future<Output = Result<Page<T>, DataError>> + Send;
    fn count(&self) -> impl Future<Output = Result<u64, DataError>> + Send;
    /// Physically delete the row; `false` when no row had that id.
    fn delete_by_id(&self, id: &T::Id) -> impl Future<Output = Result<bool, DataError>> + Send;
}
