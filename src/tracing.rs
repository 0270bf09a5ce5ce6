//! Module containing some extension traits to support code instrumentation
//! using the `tracing` crate.

use async_trait::async_trait;
use tracing::instrument;

use crate::store::{self, Commit, Fields, StoreError};

/// [`store::Store`] type wrapper that provides instrumentation
/// features through the `tracing` crate.
#[derive(Debug, Clone)]
pub struct InstrumentedStore<S> {
    store: S,
}

impl<S> InstrumentedStore<S> {
    /// Returns the wrapped [`store::Store`].
    pub fn into_inner(self) -> S {
        self.store
    }
}

#[async_trait]
impl<S> store::Store for InstrumentedStore<S>
where
    S: store::Store,
{
    type Transaction = InstrumentedTransaction<S::Transaction>;

    #[instrument(name = "store::Store.get_fields", ret, err, skip(self))]
    async fn get_fields(&self, id: &str, fields: &[&str]) -> Result<Option<Fields>, StoreError> {
        self.store.get_fields(id, fields).await
    }

    #[instrument(name = "store::Store.set_fields", err, skip(self))]
    async fn set_fields(&self, id: &str, fields: Fields) -> Result<(), StoreError> {
        self.store.set_fields(id, fields).await
    }

    #[instrument(name = "store::Store.watch", err, skip(self))]
    async fn watch(&self, ids: &[&str]) -> Result<Self::Transaction, StoreError> {
        self.store
            .watch(ids)
            .await
            .map(|tx| InstrumentedTransaction { tx })
    }
}

/// [`store::Transaction`] type wrapper that provides instrumentation
/// features through the `tracing` crate.
#[derive(Debug)]
pub struct InstrumentedTransaction<T> {
    tx: T,
}

#[async_trait]
impl<T> store::Transaction for InstrumentedTransaction<T>
where
    T: store::Transaction,
{
    #[instrument(name = "store::Transaction.get_fields", ret, err, skip(self))]
    async fn get_fields(
        &mut self,
        id: &str,
        fields: &[&str],
    ) -> Result<Option<Fields>, StoreError> {
        self.tx.get_fields(id, fields).await
    }

    #[instrument(name = "store::Transaction.commit", ret, err, skip(self))]
    async fn commit(self, id: &str, fields: Fields) -> Result<Commit, StoreError> {
        self.tx.commit(id, fields).await
    }

    #[instrument(name = "store::Transaction.discard", err, skip(self))]
    async fn discard(self) -> Result<(), StoreError> {
        self.tx.discard().await
    }
}

/// Extension trait for any [`store::Store`] type to provide
/// instrumentation features through the `tracing` crate.
pub trait StoreExt: store::Store + Sized {
    /// Returns an instrumented version of the [`store::Store`] instance.
    fn with_tracing(self) -> InstrumentedStore<Self> {
        InstrumentedStore { store: self }
    }
}

impl<S> StoreExt for S where S: store::Store {}
