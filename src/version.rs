//! Contains the types necessary for Optimistic Locking through versioning.

/// A version used for Optimistic Locking.
///
/// Every [Record][crate::record::Record] carries one: it starts at [`INITIAL`]
/// and is incremented by exactly one on each successful commit.
pub type Version = u64;

/// Version assigned to a freshly created [Record][crate::record::Record].
pub const INITIAL: Version = 1;

/// This error is returned by a single update attempt when a concurrent
/// modification of the record has been detected.
///
/// A `ConflictError` is recovered by the [Coordinator][crate::coordinator::Coordinator]
/// through a retry, and only surfaced once every attempt has been spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConflictError {
    /// The version read inside the transaction is not the one the
    /// snapshot was taken at: another writer committed in between.
    #[error("conflict error detected, expected version was: {expected}, found: {actual}")]
    VersionMismatch {
        /// The [Version] the caller's snapshot was taken at.
        expected: Version,

        /// The [Version] found in the store, which mismatch caused this error.
        actual: Version,
    },

    /// The store refused the conditional commit, since the watched record
    /// changed between the transactional read and the write.
    #[error("conflict error detected, watched record changed before commit")]
    CommitConditionFailed,
}
