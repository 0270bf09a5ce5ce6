//! Module containing the [`Accessor`], translating between the raw fields
//! held by a [`Store`] and the [`Record`] abstraction.

use std::fmt::Debug;
use std::marker::PhantomData;

use crate::record::{CorruptRecordError, Layout, Payload, Record};
use crate::store::{Store, StoreError};
use crate::version;

/// All possible errors returned by [`Accessor::fetch`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Error returned when no record exists at the requested id.
    #[error("failed to fetch record '{0}': not found")]
    NotFound(String),
    /// Error returned when the stored fields cannot be read back as a [`Record`].
    #[error("failed to fetch record: {0}")]
    Corrupt(#[from] CorruptRecordError),
    /// Error returned when the underlying [`Store`] has failed.
    #[error("failed to fetch record, an error occurred: {0}")]
    Store(#[from] StoreError),
}

/// Reads and writes versioned [`Record`]s through a [`Store`] handle.
///
/// The `Accessor` performs no retries: every failure is returned
/// to the caller as soon as it happens.
#[derive(Debug, Clone)]
pub struct Accessor<S, P = i64> {
    store: S,
    layout: Layout,
    payload: PhantomData<fn() -> P>,
}

impl<S, P> Accessor<S, P>
where
    S: Store,
    P: Payload,
{
    /// Creates a new `Accessor` using the [`Layout::default`] field names.
    pub fn new(store: S) -> Self {
        Self::with_layout(store, Layout::default())
    }

    /// Creates a new `Accessor` using the specified field names.
    pub fn with_layout(store: S, layout: Layout) -> Self {
        Self {
            store,
            layout,
            payload: PhantomData,
        }
    }

    /// Returns the [`Layout`] records are stored with.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns the [`Store`] handle used by this `Accessor`.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Reads the current payload and version of the record at `id`.
    #[tracing::instrument(name = "Accessor::fetch", level = "debug", skip(self), err)]
    pub async fn fetch(&self, id: &str) -> Result<Record<P>, FetchError> {
        let fields = self
            .store
            .get_fields(id, &self.layout.field_names())
            .await?
            .ok_or_else(|| FetchError::NotFound(id.to_owned()))?;

        Ok(self.layout.decode(id, &fields)?)
    }

    /// Writes a new record at `id`, holding `initial_payload` at
    /// [`version::INITIAL`].
    ///
    /// Any existing record at `id` is overwritten: this is meant for
    /// provisioning, and must not be used to update records concurrently.
    #[tracing::instrument(name = "Accessor::create", level = "debug", skip(self), err)]
    pub async fn create(&self, id: &str, initial_payload: P) -> Result<(), StoreError> {
        self.store
            .set_fields(id, self.layout.encode(&initial_payload, version::INITIAL))
            .await
    }
}

#[allow(clippy::semicolon_if_nothing_returned)] // False positives :shrugs:
#[cfg(test)]
mod test {
    use super::*;
    use crate::inmemory::InMemory;
    use crate::record::Corruption;
    use crate::store::Fields;

    const ID: &str = "product:917:stock";

    #[tokio::test]
    async fn create_then_fetch_returns_the_initial_record() {
        let accessor = Accessor::<_, i64>::with_layout(InMemory::default(), Layout::new("stock").unwrap());

        accessor.create(ID, 50).await.expect("create should not fail");

        let record = accessor.fetch(ID).await.expect("fetch should not fail");

        assert_eq!(
            Record {
                id: ID.to_owned(),
                payload: 50,
                version: 1,
            },
            record
        );
    }

    #[tokio::test]
    async fn create_overwrites_an_existing_record() {
        let accessor = Accessor::<_, i64>::new(InMemory::default());

        accessor.create(ID, 50).await.unwrap();
        accessor
            .store()
            .set_fields(ID, accessor.layout().encode(&12_i64, 7))
            .await
            .unwrap();
        accessor.create(ID, 20).await.unwrap();

        let record = accessor.fetch(ID).await.unwrap();

        assert_eq!((20, 1), (record.payload, record.version));
    }

    #[tokio::test]
    async fn fetching_an_absent_record_fails_with_not_found() {
        let accessor = Accessor::<_, i64>::new(InMemory::default());

        let err = accessor.fetch(ID).await.expect_err("nothing was created");

        assert!(matches!(err, FetchError::NotFound(id) if id == ID));
    }

    #[tokio::test]
    async fn fetching_a_corrupt_record_fails_loudly() {
        let store = InMemory::default();
        let accessor = Accessor::<_, i64>::with_layout(store.clone(), Layout::new("stock").unwrap());

        let mut fields = Fields::new();
        fields.insert("stock".to_owned(), "50".to_owned());
        fields.insert("version".to_owned(), "one".to_owned());
        store.set_fields(ID, fields).await.unwrap();

        let err = accessor.fetch(ID).await.expect_err("the version is malformed");

        match err {
            FetchError::Corrupt(err) => {
                assert_eq!("version", err.field);
                assert_eq!(Corruption::Malformed("one".to_owned()), err.reason);
            },
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn fetching_a_record_with_missing_fields_fails_loudly() {
        let store = InMemory::default();
        let accessor = Accessor::<_, i64>::with_layout(store.clone(), Layout::new("stock").unwrap());

        let mut fields = Fields::new();
        fields.insert("version".to_owned(), "3".to_owned());
        store.set_fields(ID, fields).await.unwrap();

        let err = accessor.fetch(ID).await.expect_err("the payload is missing");

        assert!(matches!(
            err,
            FetchError::Corrupt(CorruptRecordError { reason: Corruption::Missing, .. })
        ));
    }
}
