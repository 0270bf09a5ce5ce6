//! `versionlock` implements Optimistic Concurrency Control for
//! read-modify-write updates of records stored in an external key-value store.
//!
//! ## Records and versions
//!
//! A [`Record`] carries an application payload and a [`Version`], which
//! starts at [`version::INITIAL`] and is incremented by exactly one on every
//! successful commit. The [`Accessor`] reads and provisions records through a
//! [`Store`] handle, refusing to return records whose fields are missing or
//! malformed.
//!
//! ## Updating records
//!
//! The [`Coordinator`] applies a [`Transform`] to the latest payload of a
//! record, using the store's watch and conditional commit primitive to detect
//! concurrent writers. Conflicts are retried according to a bounded
//! [`RetryPolicy`]; every other failure is returned right away.
//!
//! ```no_run
//! use versionlock::{Adjust, Coordinator, InMemory, Layout, UpdateIntent};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = Coordinator::<_, i64>::with_layout(InMemory::default(), Layout::new("stock")?);
//! coordinator.accessor().create("product:917:stock", 50).await?;
//!
//! let snapshot = coordinator.accessor().fetch("product:917:stock").await?;
//! let committed = coordinator.update(UpdateIntent::new(snapshot, Adjust(-5))).await?;
//!
//! assert_eq!(45, committed.record.payload);
//! assert_eq!(2, committed.record.version);
//! # Ok(())
//! # }
//! ```
//!
//! ## Stores
//!
//! [`InMemory`] is provided for tests and single-process use; the
//! `versionlock-redis` crate implements the [`Store`] trait on Redis.

#![deny(unsafe_code, unused_qualifications, trivial_casts)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod accessor;
pub mod cancel;
pub mod coordinator;
pub mod inmemory;
pub mod record;
pub mod retry;
pub mod store;
pub mod tracing;
pub mod transform;
pub mod version;

pub use crate::accessor::{Accessor, FetchError};
pub use crate::cancel::{cancellation, CancelHandle, CancelToken};
pub use crate::coordinator::{Committed, Coordinator, UpdateError, UpdateIntent};
pub use crate::inmemory::InMemory;
pub use crate::record::{CorruptRecordError, Corruption, Layout, LayoutError, Payload, Record};
pub use crate::retry::{Backoff, RetryPolicy};
pub use crate::store::{Commit, Fields, Store, StoreError, Transaction};
pub use crate::tracing::StoreExt;
pub use crate::transform::{Adjust, BusinessRuleError, Transform};
pub use crate::version::{ConflictError, Version};
