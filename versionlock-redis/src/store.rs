use std::collections::HashMap;

use async_trait::async_trait;
use redis::{AsyncCommands, RedisError};
use versionlock::{Commit, Fields, StoreError};

/// Error types returned by the [`versionlock::Store`] implementation
/// on the [`Store`] type.
///
/// Every variant is handed to callers wrapped in a [`versionlock::StoreError`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error returned when a dedicated connection for a transaction
    /// could not be established.
    #[error("failed to open a transaction connection to Redis: {0}")]
    Connect(#[source] RedisError),

    /// Error returned when `WATCH` failed.
    #[error("failed to watch keys: {0}")]
    Watch(#[source] RedisError),

    /// Error returned when `HGETALL` failed.
    #[error("failed to read hash fields from Redis: {0}")]
    Read(#[source] RedisError),

    /// Error returned when an unconditional `HSET` failed.
    #[error("failed to write hash fields to Redis: {0}")]
    Write(#[source] RedisError),

    /// Error returned when the `MULTI`/`EXEC` block failed for reasons
    /// other than a watched key being modified.
    #[error("failed to execute transaction: {0}")]
    Exec(#[source] RedisError),

    /// Error returned when `UNWATCH` failed.
    #[error("failed to unwatch keys: {0}")]
    Unwatch(#[source] RedisError),
}

impl From<Error> for StoreError {
    fn from(err: Error) -> Self {
        anyhow::Error::from(err).into()
    }
}

/// Keeps only the requested fields of a whole `HGETALL` reply.
///
/// Redis never stores empty hashes, so an empty reply means the key is absent.
fn select(entry: HashMap<String, String>, fields: &[&str]) -> Option<Fields> {
    if entry.is_empty() {
        return None;
    }

    Some(
        entry
            .into_iter()
            .filter(|(name, _)| fields.contains(&name.as_str()))
            .collect(),
    )
}

fn into_items(fields: Fields) -> Vec<(String, String)> {
    fields.into_iter().collect()
}

/// Redis backend implementation for [`versionlock::Store`] trait.
#[derive(Clone)]
pub struct Store {
    pub(crate) client: redis::Client,
    pub(crate) conn: redis::aio::MultiplexedConnection,
}

#[async_trait]
impl versionlock::Store for Store {
    type Transaction = Transaction;

    async fn get_fields(&self, id: &str, fields: &[&str]) -> Result<Option<Fields>, StoreError> {
        let mut conn = self.conn.clone();
        let entry: HashMap<String, String> = conn.hgetall(id).await.map_err(Error::Read)?;

        Ok(select(entry, fields))
    }

    async fn set_fields(&self, id: &str, fields: Fields) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let items = into_items(fields);

        conn.hset_multiple::<_, _, _, ()>(id, &items)
            .await
            .map_err(Error::Write)?;

        Ok(())
    }

    async fn watch(&self, ids: &[&str]) -> Result<Self::Transaction, StoreError> {
        let mut conn = self
            .client
            .get_async_connection()
            .await
            .map_err(Error::Connect)?;

        redis::cmd("WATCH")
            .arg(ids)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(Error::Watch)?;

        Ok(Transaction { conn })
    }
}

/// Optimistic transaction opened by the Redis [`Store`], owning a dedicated
/// connection with `WATCH` in effect.
pub struct Transaction {
    conn: redis::aio::Connection,
}

#[async_trait]
impl versionlock::Transaction for Transaction {
    async fn get_fields(
        &mut self,
        id: &str,
        fields: &[&str],
    ) -> Result<Option<Fields>, StoreError> {
        let entry: HashMap<String, String> = self.conn.hgetall(id).await.map_err(Error::Read)?;

        Ok(select(entry, fields))
    }

    async fn commit(mut self, id: &str, fields: Fields) -> Result<Commit, StoreError> {
        let items = into_items(fields);

        // EXEC replies nil when a watched key has been modified.
        let reply: Option<()> = redis::pipe()
            .atomic()
            .hset_multiple(id, &items)
            .ignore()
            .query_async(&mut self.conn)
            .await
            .map_err(Error::Exec)?;

        Ok(match reply {
            Some(()) => Commit::Applied,
            None => {
                tracing::debug!(id, "redis transaction aborted, watched key changed");
                Commit::ConditionFailed
            },
        })
    }

    async fn discard(mut self) -> Result<(), StoreError> {
        redis::cmd("UNWATCH")
            .query_async::<_, ()>(&mut self.conn)
            .await
            .map_err(Error::Unwatch)?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn entry(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn empty_replies_are_absent_keys() {
        assert_eq!(None, select(HashMap::new(), &["stock", "version"]));
    }

    #[test]
    fn only_requested_fields_are_kept() {
        let selected = select(
            entry(&[("stock", "50"), ("version", "1"), ("sku", "917")]),
            &["stock", "version"],
        );

        assert_eq!(Some(entry(&[("stock", "50"), ("version", "1")])), selected);
    }

    #[test]
    fn existing_keys_without_requested_fields_are_present() {
        let selected = select(entry(&[("sku", "917")]), &["stock"]);

        assert_eq!(Some(HashMap::new()), selected);
    }
}
