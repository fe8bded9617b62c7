use crate::error::StoreError;
use crate::grant::Grant;
use crate::types::SubjectId;
use async_trait::async_trait;

/// Durable mapping of subject to active grant.
///
/// Mutating calls must be persisted before they return `Ok`. Iteration follows
/// insertion order. Callers are expected to serialize writers; the
/// [`Engine`](crate::Engine) does this with a single lock.
#[async_trait]
pub trait GrantStore: Send + Sync {
    /// Returns the grant held by a subject, if any.
    async fn get(&self, subject: &SubjectId) -> std::result::Result<Option<Grant>, StoreError>;

    /// Inserts or replaces the grant for a subject.
    async fn put(&self, subject: SubjectId, grant: Grant) -> std::result::Result<(), StoreError>;

    /// Removes and returns the grant for a subject.
    async fn remove(&self, subject: &SubjectId)
    -> std::result::Result<Option<Grant>, StoreError>;

    /// Returns every grant in insertion order.
    async fn all(&self) -> std::result::Result<Vec<(SubjectId, Grant)>, StoreError>;
}
