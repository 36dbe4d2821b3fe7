use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Collection, Record, StoreError, add_item, edit_item, remove_item, reorder_items};

/// In-memory collection for tests and throwaway sessions.
#[derive(Debug)]
pub struct MemoryCollection<T> {
    items: RwLock<Vec<T>>,
    writes: AtomicU64,
    fail_writes: AtomicBool,
    fail_loads: AtomicBool,
}

impl<T: Record> MemoryCollection<T> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Vec::new()),
            writes: AtomicU64::new(0),
            fail_writes: AtomicBool::new(false),
            fail_loads: AtomicBool::new(false),
        }
    }

    pub fn with_items(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
            ..Self::new()
        }
    }

    /// Number of successful write calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Make every subsequent write fail with `Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Make every subsequent load fail with `Unavailable`.
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Relaxed);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store is read-only".to_string()));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

impl<T: Record> Default for MemoryCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Record> Collection<T> for MemoryCollection<T> {
    async fn load(&self) -> Result<Vec<T>, StoreError> {
        if self.fail_loads.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(self.items.read().await.clone())
    }

    async fn save(&self, items: &[T]) -> Result<(), StoreError> {
        self.check_writable()?;
        *self.items.write().await = items.to_vec();
        self.record_write();
        Ok(())
    }

    async fn add(&self, item: &T) -> Result<(), StoreError> {
        self.check_writable()?;
        add_item(&mut *self.items.write().await, item)?;
        self.record_write();
        Ok(())
    }

    async fn edit(&self, item: &T) -> Result<(), StoreError> {
        self.check_writable()?;
        edit_item(&mut self.items.write().await, item)?;
        self.record_write();
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        remove_item(&mut *self.items.write().await, id)?;
        self.record_write();
        Ok(())
    }

    async fn reorder(&self, items: &[T]) -> Result<(), StoreError> {
        self.check_writable()?;
        reorder_items(&mut self.items.write().await, items)?;
        self.record_write();
        Ok(())
    }
}
