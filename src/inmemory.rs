//! Contains the [`InMemory`] implementation of the [`store::Store`] trait,
//! backed by a thread-safe [`std::collections::HashMap`].
//!
//! Every entry carries a revision number, bumped on each write; a
//! [`Transaction`] remembers the revisions of the keys it watches and
//! applies its write only if none of them moved.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::store::{self, Commit, Fields, StoreError};

#[derive(Debug, Default)]
struct Entry {
    fields: Fields,
    revision: u64,
}

#[derive(Debug, Default)]
struct InMemoryBackend {
    entries: HashMap<String, Entry>,
}

impl InMemoryBackend {
    fn get_fields(&self, id: &str, fields: &[&str]) -> Option<Fields> {
        self.entries.get(id).map(|entry| {
            fields
                .iter()
                .filter_map(|name| {
                    entry
                        .fields
                        .get(*name)
                        .map(|value| ((*name).to_owned(), value.clone()))
                })
                .collect()
        })
    }

    fn set_fields(&mut self, id: &str, fields: Fields) {
        let entry = self.entries.entry(id.to_owned()).or_default();
        entry.fields.extend(fields);
        entry.revision += 1;
    }

    fn revision(&self, id: &str) -> u64 {
        // NOTE: absent keys are at revision zero, so creating a watched key
        // is detected like any other write.
        self.entries.get(id).map_or(0, |entry| entry.revision)
    }
}

/// In-memory implementation of [`store::Store`] trait,
/// backed by a thread-safe [`std::collections::HashMap`].
///
/// Cloning an `InMemory` store returns a new handle to the same data.
#[derive(Debug, Clone, Default)]
pub struct InMemory {
    backend: Arc<RwLock<InMemoryBackend>>,
}

impl InMemory {
    /// Returns a copy of all the fields stored at `id`, if any.
    pub fn snapshot(&self, id: &str) -> Option<Fields> {
        self.backend
            .read()
            .entries
            .get(id)
            .map(|entry| entry.fields.clone())
    }
}

#[async_trait]
impl store::Store for InMemory {
    type Transaction = Transaction;

    async fn get_fields(&self, id: &str, fields: &[&str]) -> Result<Option<Fields>, StoreError> {
        Ok(self.backend.read().get_fields(id, fields))
    }

    async fn set_fields(&self, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.backend.write().set_fields(id, fields);
        Ok(())
    }

    async fn watch(&self, ids: &[&str]) -> Result<Self::Transaction, StoreError> {
        let watched = {
            let backend = self.backend.read();
            ids.iter()
                .map(|id| ((*id).to_owned(), backend.revision(id)))
                .collect()
        };

        Ok(Transaction {
            backend: Arc::clone(&self.backend),
            watched,
        })
    }
}

/// Optimistic transaction opened by [`InMemory`].
#[derive(Debug)]
pub struct Transaction {
    backend: Arc<RwLock<InMemoryBackend>>,
    watched: Vec<(String, u64)>,
}

#[async_trait]
impl store::Transaction for Transaction {
    async fn get_fields(
        &mut self,
        id: &str,
        fields: &[&str],
    ) -> Result<Option<Fields>, StoreError> {
        Ok(self.backend.read().get_fields(id, fields))
    }

    async fn commit(self, id: &str, fields: Fields) -> Result<Commit, StoreError> {
        let mut backend = self.backend.write();

        let untouched = self
            .watched
            .iter()
            .all(|(key, revision)| backend.revision(key) == *revision);

        if !untouched {
            return Ok(Commit::ConditionFailed);
        }

        backend.set_fields(id, fields);

        Ok(Commit::Applied)
    }

    async fn discard(self) -> Result<(), StoreError> {
        Ok(())
    }
}
