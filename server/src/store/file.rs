use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{Collection, Record, StoreError, add_item, edit_item, remove_item, reorder_items};

/// Embedded local store: one JSON array file per collection.
///
/// A missing file loads as an empty collection. Writes go through a temp
/// file and a rename so readers never observe a half-written array.
pub struct FileCollection<T> {
    path: PathBuf,
    /// Serializes read-modify-write cycles on the file.
    lock: Mutex<()>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> FileCollection<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            _marker: PhantomData,
        }
    }

    /// `<root>/<owner>/<collection>.json`.
    pub fn in_dir(root: &Path, owner: &str, collection: &str) -> Self {
        Self::new(root.join(owner).join(format!("{collection}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_items(&self) -> Result<Vec<T>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_items(&self, items: &[T]) -> Result<(), StoreError> {
        let Some(dir) = self.path.parent() else {
            return Err(StoreError::Unavailable(format!(
                "store path has no parent directory: {}",
                self.path.display()
            )));
        };
        tokio::fs::create_dir_all(dir).await?;

        let content = serde_json::to_string_pretty(items)?;
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("collection");
        let tmp_path = dir.join(format!(".{file_name}.tmp"));

        let written = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp_path, &self.path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn modify<F>(&self, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Vec<T>) -> Result<(), StoreError> + Send,
    {
        let _guard = self.lock.lock().await;
        let mut items = self.read_items().await?;
        apply(&mut items)?;
        self.write_items(&items).await
    }
}

#[async_trait]
impl<T: Record> Collection<T> for FileCollection<T> {
    async fn load(&self) -> Result<Vec<T>, StoreError> {
        let _guard = self.lock.lock().await;
        self.read_items().await
    }

    async fn save(&self, items: &[T]) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.write_items(items).await
    }

    async fn add(&self, item: &T) -> Result<(), StoreError> {
        self.modify(|items| add_item(items, item)).await
    }

    async fn edit(&self, item: &T) -> Result<(), StoreError> {
        self.modify(|items| edit_item(items, item)).await
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.modify(|items| remove_item(items, id)).await
    }

    async fn reorder(&self, changes: &[T]) -> Result<(), StoreError> {
        self.modify(|items| reorder_items(items, changes)).await
    }
}

#[cfg(test)]
mod tests {
    use passport_shared::{Overlay, Trip};

    use super::FileCollection;
    use crate::store::tests::{exercise_overlay_reorder, exercise_trip_contract, trip};
    use crate::store::{Collection, StoreError, TRIPS_COLLECTION};

    #[tokio::test]
    async fn file_collection_satisfies_contract() {
        let dir = tempfile::tempdir().expect("tempdir");
        let trips = FileCollection::<Trip>::in_dir(dir.path(), "guest", TRIPS_COLLECTION);
        exercise_trip_contract(&trips).await;

        let overlays = FileCollection::<Overlay>::new(dir.path().join("overlays.json"));
        exercise_overlay_reorder(&overlays).await;
    }

    #[tokio::test]
    async fn saved_file_is_a_camel_case_json_array() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileCollection::<Trip>::in_dir(dir.path(), "guest", TRIPS_COLLECTION);
        store.save(&[trip("a", &["NL"])]).await.expect("save");

        assert_eq!(store.path(), dir.path().join("guest").join("trips.json"));
        let raw = std::fs::read_to_string(store.path()).expect("read file");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value[0]["countryCodes"][0], "NL");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("guest"))
            .expect("list dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trips.json");
        // A non-empty directory where the file should go makes the final step fail.
        std::fs::create_dir_all(path.join("blocker")).expect("create blocking dir");
        let store = FileCollection::<Trip>::new(path);

        assert!(matches!(
            store.save(&[trip("a", &["NL"])]).await,
            Err(StoreError::Io(_))
        ));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .expect("list dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_surfaces_serialization_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trips.json");
        std::fs::write(&path, "{not json").expect("write corrupt file");
        let store = FileCollection::<Trip>::new(path);
        assert!(matches!(
            store.load().await,
            Err(StoreError::Serialization(_))
        ));
    }
}
