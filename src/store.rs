//! Contains the capability interface an external key-value store must offer
//! to host versioned records.
//!
//! The store is consumed through two traits:
//!
//! * [`Store`], the shared handle, used for plain reads, unconditional
//!   writes and to open an optimistic [`Transaction`],
//! * [`Transaction`], a transactional read handle that enqueues a single
//!   multi-field write, applied only if none of the watched keys changed
//!   since the watch began.

use std::collections::HashMap;

use async_trait::async_trait;

/// Field-to-value mapping of a single entry in the store.
pub type Fields = HashMap<String, String>;

/// Error returned by a [`Store`] or [`Transaction`] implementation when the
/// underlying store could not serve the request (e.g. connectivity or protocol failures).
#[derive(Debug, thiserror::Error)]
#[error("store returned an error: {0}")]
pub struct StoreError(#[from] anyhow::Error);

/// Outcome of [`Transaction::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// The write has been applied atomically.
    Applied,
    /// At least one watched key changed since the watch began,
    /// so the write has been discarded by the store.
    ConditionFailed,
}

/// Shared handle to an external key-value store.
///
/// Implementations must be safe to use from many tasks at once: callers
/// share one handle and never assume exclusive access to it.
#[async_trait]
pub trait Store: Send + Sync {
    /// Transaction type opened by [`Store::watch`].
    type Transaction: Transaction;

    /// Reads the specified fields of the entry at `id`.
    ///
    /// Returns `None` when no entry exists at `id`. Requested fields
    /// missing from an existing entry are simply absent from the result.
    async fn get_fields(&self, id: &str, fields: &[&str]) -> Result<Option<Fields>, StoreError>;

    /// Writes the specified fields to the entry at `id`, unconditionally.
    async fn set_fields(&self, id: &str, fields: Fields) -> Result<(), StoreError>;

    /// Begins an optimistic transaction watching the specified keys.
    async fn watch(&self, ids: &[&str]) -> Result<Self::Transaction, StoreError>;
}

/// An optimistic transaction opened through [`Store::watch`].
///
/// The transaction ends with either [`Transaction::commit`] or
/// [`Transaction::discard`].
#[async_trait]
pub trait Transaction: Send {
    /// Reads the specified fields of the entry at `id`, from inside the transaction.
    async fn get_fields(&mut self, id: &str, fields: &[&str])
        -> Result<Option<Fields>, StoreError>;

    /// Writes all the specified fields to the entry at `id` in a single atomic
    /// operation, only if none of the watched keys changed since the watch began.
    async fn commit(self, id: &str, fields: Fields) -> Result<Commit, StoreError>;

    /// Abandons the transaction without writing anything.
    async fn discard(self) -> Result<(), StoreError>;
}
