use async_trait::async_trait;

use crate::Result;

/// Soft-delete capability for repositories whose rows are never physically
/// removed.
///
/// Soft-deleted entities are hidden from [`SoftDelete::find_active`] but can
/// be brought back with [`SoftDelete::restore`].
#[async_trait]
pub trait SoftDelete: Send + Sync {
    type Id: Send + Sync;
    type Entity: Send;

    /// Loads the entity unless it is soft-deleted.
    async fn find_active(&self, id: Self::Id) -> Result<Option<Self::Entity>>;

    /// Marks the entity deleted. Returns `false` if it does not exist.
    async fn soft_delete(&self, id: Self::Id) -> Result<bool>;

    /// Clears the deleted mark. Returns `false` if it does not exist.
    async fn restore(&self, id: Self::Id) -> Result<bool>;
}
