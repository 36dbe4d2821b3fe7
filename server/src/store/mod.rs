//! Persistence collaborators for trips and overlays.
//!
//! Every backend exposes the same [`Collection`] shape: full-replace `save`,
//! single-item `add`/`edit`/`remove`, and an order-only `reorder`.

pub mod file;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use passport_shared::{Overlay, Trip};
use serde::Serialize;
use serde::de::DeserializeOwned;

pub use file::FileCollection;
pub use memory::MemoryCollection;
pub use postgres::PgCollection;

pub const TRIPS_COLLECTION: &str = "trips";
pub const OVERLAYS_COLLECTION: &str = "overlays";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("document already exists: {0}")]
    AlreadyExists(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// A document kept in a [`Collection`].
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> &str;

    fn order(&self) -> Option<i32> {
        None
    }

    fn set_order(&mut self, _order: Option<i32>) {}
}

impl Record for Trip {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Overlay {
    fn id(&self) -> &str {
        Overlay::id(self)
    }

    fn order(&self) -> Option<i32> {
        Overlay::order(self)
    }

    fn set_order(&mut self, order: Option<i32>) {
        Overlay::set_order(self, order);
    }
}

#[async_trait]
pub trait Collection<T: Record>: Send + Sync {
    async fn load(&self) -> Result<Vec<T>, StoreError>;

    /// Replace the whole collection.
    async fn save(&self, items: &[T]) -> Result<(), StoreError>;

    async fn add(&self, item: &T) -> Result<(), StoreError>;

    async fn edit(&self, item: &T) -> Result<(), StoreError>;

    async fn remove(&self, id: &str) -> Result<(), StoreError>;

    /// Persist only the `order` of each listed item.
    async fn reorder(&self, items: &[T]) -> Result<(), StoreError>;
}

pub type SharedCollection<T> = Arc<dyn Collection<T>>;

// Vec-backed semantics shared by the memory and file backends.

pub(crate) fn add_item<T: Record>(items: &mut Vec<T>, item: &T) -> Result<(), StoreError> {
    if items.iter().any(|existing| existing.id() == item.id()) {
        return Err(StoreError::AlreadyExists(item.id().to_owned()));
    }
    items.push(item.clone());
    Ok(())
}

pub(crate) fn edit_item<T: Record>(items: &mut [T], item: &T) -> Result<(), StoreError> {
    let slot = items
        .iter_mut()
        .find(|existing| existing.id() == item.id())
        .ok_or_else(|| StoreError::NotFound(item.id().to_owned()))?;
    *slot = item.clone();
    Ok(())
}

pub(crate) fn remove_item<T: Record>(items: &mut Vec<T>, id: &str) -> Result<(), StoreError> {
    let index = items
        .iter()
        .position(|existing| existing.id() == id)
        .ok_or_else(|| StoreError::NotFound(id.to_owned()))?;
    items.remove(index);
    Ok(())
}

pub(crate) fn reorder_items<T: Record>(items: &mut [T], changes: &[T]) -> Result<(), StoreError> {
    if let Some(missing) = changes
        .iter()
        .find(|change| !items.iter().any(|existing| existing.id() == change.id()))
    {
        return Err(StoreError::NotFound(missing.id().to_owned()));
    }
    for change in changes {
        if let Some(slot) = items.iter_mut().find(|existing| existing.id() == change.id()) {
            slot.set_order(change.order());
        }
    }
    Ok(())
}
