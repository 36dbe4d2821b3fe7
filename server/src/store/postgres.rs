use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::PgPool;

use super::{Collection, Record, StoreError};

/// Remote per-user document collection backed by `user_documents`.
///
/// Each document is one JSONB row keyed by `(owner_id, collection, doc_id)`.
/// `position` mirrors the caller's list order so `load` returns documents in
/// the order they were saved.
pub struct PgCollection<T> {
    pool: PgPool,
    owner_id: String,
    collection: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> PgCollection<T> {
    pub fn new(pool: PgPool, owner_id: impl Into<String>, collection: &'static str) -> Self {
        Self {
            pool,
            owner_id: owner_id.into(),
            collection,
            _marker: PhantomData,
        }
    }

    fn sql_err(e: sqlx::Error) -> StoreError {
        StoreError::Database(e.to_string())
    }

    fn encode(item: &T) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::to_value(item)?)
    }

    async fn next_position(&self) -> Result<i32, StoreError> {
        let max: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(position) FROM user_documents WHERE owner_id = $1 AND collection = $2",
        )
        .bind(&self.owner_id)
        .bind(self.collection)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::sql_err)?;
        Ok(max.map_or(0, |position| position + 1))
    }
}

#[async_trait]
impl<T: Record> Collection<T> for PgCollection<T> {
    async fn load(&self) -> Result<Vec<T>, StoreError> {
        let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
            "SELECT data FROM user_documents \
             WHERE owner_id = $1 AND collection = $2 \
             ORDER BY position, doc_id",
        )
        .bind(&self.owner_id)
        .bind(self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::sql_err)?;

        rows.into_iter()
            .map(|(data,)| serde_json::from_value(data).map_err(StoreError::from))
            .collect()
    }

    async fn save(&self, items: &[T]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(Self::sql_err)?;

        sqlx::query("DELETE FROM user_documents WHERE owner_id = $1 AND collection = $2")
            .bind(&self.owner_id)
            .bind(self.collection)
            .execute(&mut *tx)
            .await
            .map_err(Self::sql_err)?;

        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO user_documents (owner_id, collection, doc_id, position, data) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&self.owner_id)
            .bind(self.collection)
            .bind(item.id())
            .bind(position as i32)
            .bind(Self::encode(item)?)
            .execute(&mut *tx)
            .await
            .map_err(Self::sql_err)?;
        }

        tx.commit().await.map_err(Self::sql_err)
    }

    async fn add(&self, item: &T) -> Result<(), StoreError> {
        let position = self.next_position().await?;
        let result = sqlx::query(
            "INSERT INTO user_documents (owner_id, collection, doc_id, position, data) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (owner_id, collection, doc_id) DO NOTHING",
        )
        .bind(&self.owner_id)
        .bind(self.collection)
        .bind(item.id())
        .bind(position)
        .bind(Self::encode(item)?)
        .execute(&self.pool)
        .await
        .map_err(Self::sql_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(item.id().to_owned()));
        }
        Ok(())
    }

    async fn edit(&self, item: &T) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE user_documents SET data = $4, updated_at = now() \
             WHERE owner_id = $1 AND collection = $2 AND doc_id = $3",
        )
        .bind(&self.owner_id)
        .bind(self.collection)
        .bind(item.id())
        .bind(Self::encode(item)?)
        .execute(&self.pool)
        .await
        .map_err(Self::sql_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(item.id().to_owned()));
        }
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "DELETE FROM user_documents WHERE owner_id = $1 AND collection = $2 AND doc_id = $3",
        )
        .bind(&self.owner_id)
        .bind(self.collection)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Self::sql_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }

    async fn reorder(&self, items: &[T]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(Self::sql_err)?;

        for item in items {
            let order = item.order().map(serde_json::Value::from);
            let result = sqlx::query(
                "UPDATE user_documents \
                 SET data = CASE WHEN $4::jsonb IS NULL THEN data - 'order' \
                                 ELSE jsonb_set(data, '{order}', $4::jsonb) END, \
                     updated_at = now() \
                 WHERE owner_id = $1 AND collection = $2 AND doc_id = $3",
            )
            .bind(&self.owner_id)
            .bind(self.collection)
            .bind(item.id())
            .bind(order)
            .execute(&mut *tx)
            .await
            .map_err(Self::sql_err)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound(item.id().to_owned()));
            }
        }

        tx.commit().await.map_err(Self::sql_err)
    }
}
