//! Module containing the [`Coordinator`], applying a [`Transform`] to a
//! versioned [`Record`] under concurrent contention through
//! Optimistic Concurrency Control.
//!
//! ## Update cycle
//!
//! Every attempt of [`Coordinator::update`] runs inside an optimistic
//! transaction of the underlying [`Store`]:
//!
//! 1. the record id is watched,
//! 2. the record is read again from inside the transaction,
//! 3. the version read is compared with the version of the caller's
//!    snapshot: a mismatch means another writer committed in between,
//! 4. the [`Transform`] is applied to the payload just read, never to the
//!    caller's stale payload,
//! 5. the new payload and the incremented version are committed together,
//!    on condition that the watched record did not change since step 1.
//!
//! The version check and the commit condition are two independent checks:
//! the former detects writes that happened after the caller read the
//! record, the latter closes the window between the transactional read
//! and the write. Either failure is a [`ConflictError`], recovered by
//! retrying with a fresh transaction up to the [`RetryPolicy`] bound.
//!
//! The `Coordinator` holds no lock: all mutual exclusion is delegated to
//! the [`Store`] conditional commit.

use crate::accessor::{Accessor, FetchError};
use crate::cancel::CancelToken;
use crate::record::{CorruptRecordError, Corruption, Layout, Payload, Record};
use crate::retry::RetryPolicy;
use crate::store::{Commit, Store, StoreError, Transaction};
use crate::transform::{BusinessRuleError, Transform};
use crate::version::{ConflictError, Version};

/// A caller's in-flight update request: the [`Record`] snapshot it read,
/// and the [`Transform`] to apply to it.
///
/// Consumed by [`Coordinator::update`].
#[derive(Debug, Clone)]
pub struct UpdateIntent<T, P = i64> {
    record: Record<P>,
    transform: T,
}

impl<T, P> UpdateIntent<T, P> {
    /// Creates a new intent to apply `transform` to the `record` snapshot.
    pub fn new(record: Record<P>, transform: T) -> Self {
        Self { record, transform }
    }

    /// The snapshot the caller read.
    pub fn record(&self) -> &Record<P> {
        &self.record
    }
}

/// Outcome of a successful [`Coordinator::update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed<P = i64> {
    /// The record as committed, holding the new payload and version.
    pub record: Record<P>,

    /// Number of attempts the update took, counting the successful one.
    pub attempts: u32,
}

/// All possible errors returned by [`Coordinator::update`].
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// Error returned when every attempt allowed by the [`RetryPolicy`]
    /// ended with a conflict.
    ///
    /// The stored record is left as the last successful committer wrote it:
    /// callers may issue a brand-new update from a fresh fetch, or give up.
    #[error("failed to update record after {attempts} attempts: {last}")]
    ConflictExhausted {
        /// Number of attempts spent.
        attempts: u32,
        /// The conflict that ended the last attempt.
        #[source]
        last: ConflictError,
    },
    /// Error returned when the [`Transform`] rejected the latest state of the
    /// record on the last allowed attempt.
    #[error("failed to update record: {0}")]
    BusinessRule(#[from] BusinessRuleError),
    /// Error returned when the record does not exist in the store.
    #[error("failed to update record '{0}': not found")]
    NotFound(String),
    /// Error returned when the stored record cannot be read back.
    #[error("failed to update record: {0}")]
    Corrupt(#[from] CorruptRecordError),
    /// Error returned when the underlying [`Store`] has failed.
    #[error("failed to update record, an error occurred: {0}")]
    Store(#[from] StoreError),
    /// Error returned when the update has been cancelled between two attempts.
    #[error("update cancelled after {attempts} attempts")]
    Cancelled {
        /// Number of attempts spent before the cancellation.
        attempts: u32,
    },
}

impl From<FetchError> for UpdateError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound(id) => UpdateError::NotFound(id),
            FetchError::Corrupt(err) => UpdateError::Corrupt(err),
            FetchError::Store(err) => UpdateError::Store(err),
        }
    }
}

/// Reason why a single attempt did not commit.
#[derive(Debug)]
enum AttemptError<P> {
    /// Recovered through a retry. `latest` holds the record read inside the
    /// attempt, when it is still the freshest known state.
    Conflict {
        conflict: ConflictError,
        latest: Option<Record<P>>,
    },
    /// Re-evaluated against the latest state on the next attempt.
    Rejected {
        rule: BusinessRuleError,
        latest: Record<P>,
    },
    /// Surfaced right away.
    Fatal(UpdateError),
}

impl<P> From<StoreError> for AttemptError<P> {
    fn from(err: StoreError) -> Self {
        AttemptError::Fatal(err.into())
    }
}

impl<P> From<FetchError> for AttemptError<P> {
    fn from(err: FetchError) -> Self {
        AttemptError::Fatal(err.into())
    }
}

/// First check: the record must still be at the snapshot version.
fn check_version<P>(snapshot: &Record<P>, current: &Record<P>) -> Result<(), ConflictError> {
    if current.version == snapshot.version {
        Ok(())
    } else {
        Err(ConflictError::VersionMismatch {
            expected: snapshot.version,
            actual: current.version,
        })
    }
}

/// Second check: the store must have accepted the conditional write.
fn check_commit(outcome: Commit) -> Result<(), ConflictError> {
    match outcome {
        Commit::Applied => Ok(()),
        Commit::ConditionFailed => Err(ConflictError::CommitConditionFailed),
    }
}

/// The version to commit after `current`. A record already at the last
/// representable version cannot be updated again, and is reported as corrupt.
fn next_version<P>(layout: &Layout, current: &Record<P>) -> Result<Version, CorruptRecordError> {
    current.version.checked_add(1).ok_or_else(|| CorruptRecordError {
        id: current.id.clone(),
        field: layout.field_names()[1].to_owned(),
        reason: Corruption::Malformed(current.version.to_string()),
    })
}

/// Ends the transaction without writing, returning the reason why.
async fn abandon<Tx, P>(tx: Tx, reason: AttemptError<P>) -> AttemptError<P>
where
    Tx: Transaction,
{
    if let Err(err) = tx.discard().await {
        tracing::debug!(error = %err, "failed to discard transaction");
    }

    reason
}

/// Applies [`Transform`]s to versioned [`Record`]s with Optimistic Concurrency
/// Control, retrying on conflicts according to a [`RetryPolicy`].
///
/// Cloning a `Coordinator` is cheap as long as the [`Store`] handle is, and
/// every clone can run updates concurrently with the others.
#[derive(Debug, Clone)]
pub struct Coordinator<S, P = i64> {
    accessor: Accessor<S, P>,
    policy: RetryPolicy,
}

impl<S, P> From<Accessor<S, P>> for Coordinator<S, P> {
    fn from(accessor: Accessor<S, P>) -> Self {
        Self {
            accessor,
            policy: RetryPolicy::default(),
        }
    }
}

impl<S, P> Coordinator<S, P>
where
    S: Store,
    P: Payload,
{
    /// Creates a new `Coordinator` using the [`Layout::default`] field names
    /// and the [`RetryPolicy::default`].
    pub fn new(store: S) -> Self {
        Accessor::new(store).into()
    }

    /// Creates a new `Coordinator` using the specified field names
    /// and the [`RetryPolicy::default`].
    pub fn with_layout(store: S, layout: Layout) -> Self {
        Accessor::with_layout(store, layout).into()
    }

    /// Replaces the [`RetryPolicy`] used by [`Coordinator::update`].
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the [`RetryPolicy`] in use.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the [`Accessor`] sharing this `Coordinator` store handle and layout.
    pub fn accessor(&self) -> &Accessor<S, P> {
        &self.accessor
    }

    /// Applies the intent's [`Transform`] to the latest payload of its record,
    /// as long as nobody else committed since the intent's snapshot was read.
    ///
    /// On conflict the update is retried, validating against the freshest
    /// state of the record, until the [`RetryPolicy`] runs out of attempts.
    pub async fn update<T>(&self, intent: UpdateIntent<T, P>) -> Result<Committed<P>, UpdateError>
    where
        T: Transform<P>,
    {
        self.update_until(intent, CancelToken::never()).await
    }

    /// Same as [`Coordinator::update`], but stops before the next attempt
    /// once the `cancel` token fires.
    ///
    /// An attempt that is already committing is never interrupted, so a
    /// cancelled update either committed entirely or not at all.
    #[tracing::instrument(
        name = "Coordinator::update",
        skip_all,
        fields(id = %intent.record.id, version = intent.record.version),
        err
    )]
    pub async fn update_until<T>(
        &self,
        intent: UpdateIntent<T, P>,
        mut cancel: CancelToken,
    ) -> Result<Committed<P>, UpdateError>
    where
        T: Transform<P>,
    {
        let UpdateIntent {
            record: mut snapshot,
            transform,
        } = intent;

        let mut attempts = self.policy.attempts();

        loop {
            if cancel.is_cancelled() {
                return Err(UpdateError::Cancelled {
                    attempts: attempts.spent(),
                });
            }

            let attempt = attempts.begin();

            let stale = match self.attempt(&snapshot, &transform).await {
                Ok(record) => {
                    tracing::debug!(attempt, version = record.version, "record updated");
                    return Ok(Committed {
                        record,
                        attempts: attempt,
                    });
                },
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Conflict { conflict, latest }) => {
                    tracing::debug!(attempt, %conflict, "conflict detected");

                    if attempts.exhausted() {
                        tracing::warn!(attempts = attempt, %conflict, "update ran out of attempts");
                        return Err(UpdateError::ConflictExhausted {
                            attempts: attempt,
                            last: conflict,
                        });
                    }

                    match latest {
                        Some(latest) => {
                            snapshot = latest;
                            false
                        },
                        None => true,
                    }
                },
                Err(AttemptError::Rejected { rule, latest }) => {
                    tracing::debug!(attempt, %rule, "update rejected by business rule");

                    if attempts.exhausted() {
                        tracing::warn!(attempts = attempt, %rule, "update ran out of attempts");
                        return Err(UpdateError::BusinessRule(rule));
                    }

                    snapshot = latest;
                    false
                },
            };

            tokio::select! {
                _ = tokio::time::sleep(self.policy.backoff().delay(attempt)) => {},
                _ = cancel.cancelled() => {
                    return Err(UpdateError::Cancelled { attempts: attempt });
                },
            }

            if stale {
                snapshot = self.accessor.fetch(&snapshot.id).await?;
            }
        }
    }

    /// Fetches the latest state of the record at `id`, and applies
    /// `transform` to it through [`Coordinator::update`].
    pub async fn fetch_and_update<T>(&self, id: &str, transform: T) -> Result<Committed<P>, UpdateError>
    where
        T: Transform<P>,
    {
        let record = self.accessor.fetch(id).await?;
        self.update(UpdateIntent::new(record, transform)).await
    }

    async fn attempt<T>(&self, snapshot: &Record<P>, transform: &T) -> Result<Record<P>, AttemptError<P>>
    where
        T: Transform<P>,
    {
        let id = snapshot.id.as_str();
        let layout = self.accessor.layout();

        let mut tx = self.accessor.store().watch(&[id]).await?;

        let current = match read(&mut tx, layout, id).await {
            Ok(current) => current,
            Err(err) => return Err(abandon(tx, err.into()).await),
        };

        if let Err(conflict) = check_version(snapshot, &current) {
            let reason = AttemptError::Conflict {
                conflict,
                latest: Some(current),
            };
            return Err(abandon(tx, reason).await);
        }

        let version = match next_version(layout, &current) {
            Ok(version) => version,
            Err(err) => return Err(abandon(tx, AttemptError::Fatal(err.into())).await),
        };

        let payload = match transform.apply(&current.payload) {
            Ok(payload) => payload,
            Err(rule) => {
                let reason = AttemptError::Rejected {
                    rule,
                    latest: current,
                };
                return Err(abandon(tx, reason).await);
            },
        };

        let next = Record {
            id: current.id,
            payload,
            version,
        };

        let outcome = tx
            .commit(id, layout.encode(&next.payload, next.version))
            .await?;

        check_commit(outcome).map_err(|conflict| AttemptError::Conflict {
            conflict,
            latest: None,
        })?;

        Ok(next)
    }
}

async fn read<Tx, P>(tx: &mut Tx, layout: &Layout, id: &str) -> Result<Record<P>, FetchError>
where
    Tx: Transaction,
    P: Payload,
{
    let fields = tx
        .get_fields(id, &layout.field_names())
        .await?
        .ok_or_else(|| FetchError::NotFound(id.to_owned()))?;

    Ok(layout.decode(id, &fields)?)
}

#[allow(clippy::semicolon_if_nothing_returned)] // False positives :shrugs:
#[cfg(test)]
mod test {
    use std::num::NonZeroU32;
    use std::time::Duration;

    use super::*;
    use crate::inmemory::InMemory;
    use crate::retry::Backoff;
    use crate::store::Fields;
    use crate::transform::Adjust;

    const ID: &str = "product:917:stock";

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(
            NonZeroU32::new(max_attempts).unwrap(),
            Backoff::Fixed(Duration::from_millis(1)),
        )
    }

    #[test]
    fn version_check_detects_intervening_writes() {
        let snapshot = Record {
            id: ID.to_owned(),
            payload: 50,
            version: 1,
        };
        let current = Record {
            version: 2,
            ..snapshot.clone()
        };

        assert_eq!(Ok(()), check_version(&snapshot, &snapshot));
        assert_eq!(
            Err(ConflictError::VersionMismatch {
                expected: 1,
                actual: 2,
            }),
            check_version(&snapshot, &current)
        );
    }

    #[test]
    fn commit_check_maps_condition_failures_to_conflicts() {
        assert_eq!(Ok(()), check_commit(Commit::Applied));
        assert_eq!(
            Err(ConflictError::CommitConditionFailed),
            check_commit(Commit::ConditionFailed)
        );
    }

    #[tokio::test]
    async fn update_commits_the_transformed_payload_with_the_next_version() {
        let coordinator =
            Coordinator::<_, i64>::with_layout(InMemory::default(), Layout::new("stock").unwrap());
        coordinator.accessor().create(ID, 50).await.unwrap();

        let snapshot = coordinator.accessor().fetch(ID).await.unwrap();
        let committed = coordinator
            .update(UpdateIntent::new(snapshot, Adjust(-5)))
            .await
            .expect("update should not fail");

        assert_eq!(1, committed.attempts);
        assert_eq!((45, 2), (committed.record.payload, committed.record.version));
        assert_eq!(committed.record, coordinator.accessor().fetch(ID).await.unwrap());
    }

    #[tokio::test]
    async fn stale_snapshot_is_rebased_on_retry() {
        let coordinator = Coordinator::<_, i64>::new(InMemory::default()).retry_policy(policy(3));
        coordinator.accessor().create(ID, 50).await.unwrap();

        let client_a = coordinator.accessor().fetch(ID).await.unwrap();
        let client_b = coordinator.accessor().fetch(ID).await.unwrap();

        let a = coordinator
            .update(UpdateIntent::new(client_a, Adjust(-5)))
            .await
            .unwrap();
        let b = coordinator
            .update(UpdateIntent::new(client_b, Adjust(-10)))
            .await
            .unwrap();

        assert_eq!((45, 2, 1), (a.record.payload, a.record.version, a.attempts));
        assert_eq!((35, 3, 2), (b.record.payload, b.record.version, b.attempts));
    }

    #[tokio::test]
    async fn single_attempt_policy_surfaces_the_version_conflict() {
        let coordinator = Coordinator::<_, i64>::new(InMemory::default()).retry_policy(policy(1));
        coordinator.accessor().create(ID, 50).await.unwrap();

        let stale = coordinator.accessor().fetch(ID).await.unwrap();
        coordinator.fetch_and_update(ID, Adjust(-1)).await.unwrap();

        let err = coordinator
            .update(UpdateIntent::new(stale, Adjust(-1)))
            .await
            .expect_err("the snapshot is stale and no retry is allowed");

        assert!(matches!(
            err,
            UpdateError::ConflictExhausted {
                attempts: 1,
                last: ConflictError::VersionMismatch {
                    expected: 1,
                    actual: 2
                },
            }
        ));
    }

    #[tokio::test]
    async fn business_rule_rejection_is_never_committed() {
        let coordinator = Coordinator::<_, i64>::new(InMemory::default()).retry_policy(policy(3));
        coordinator.accessor().create(ID, 4).await.unwrap();

        let err = coordinator
            .fetch_and_update(ID, Adjust(-5))
            .await
            .expect_err("4 - 5 is below zero");

        assert!(matches!(err, UpdateError::BusinessRule(_)));

        let record = coordinator.accessor().fetch(ID).await.unwrap();
        assert_eq!((4, 1), (record.payload, record.version));
    }

    #[tokio::test]
    async fn updating_an_absent_record_fails_with_not_found() {
        let coordinator = Coordinator::<_, i64>::new(InMemory::default());

        let snapshot = Record {
            id: ID.to_owned(),
            payload: 1,
            version: 1,
        };

        let err = coordinator
            .update(UpdateIntent::new(snapshot, Adjust(-1)))
            .await
            .expect_err("the record was never created");

        assert!(matches!(err, UpdateError::NotFound(id) if id == ID));
    }

    #[test]
    fn next_version_refuses_to_wrap_around() {
        let layout = Layout::default();
        let current = Record {
            id: ID.to_owned(),
            payload: 10,
            version: Version::MAX,
        };

        assert_eq!(
            Err(CorruptRecordError {
                id: ID.to_owned(),
                field: "version".to_owned(),
                reason: Corruption::Malformed(Version::MAX.to_string()),
            }),
            next_version(&layout, &current)
        );
        assert_eq!(
            Ok(3),
            next_version(
                &layout,
                &Record {
                    version: 2,
                    ..current
                }
            )
        );
    }

    #[tokio::test]
    async fn record_at_the_last_version_is_not_updated() {
        let store = InMemory::default();
        let coordinator = Coordinator::<_, i64>::new(store.clone()).retry_policy(policy(3));

        let mut fields = Fields::new();
        fields.insert("payload".to_owned(), "10".to_owned());
        fields.insert("version".to_owned(), Version::MAX.to_string());
        store.set_fields(ID, fields).await.unwrap();

        let err = coordinator
            .fetch_and_update(ID, Adjust(-1))
            .await
            .expect_err("the version cannot be incremented");

        assert!(matches!(
            err,
            UpdateError::Corrupt(ref corrupt) if corrupt.field == "version"
        ));

        let record = coordinator.accessor().fetch(ID).await.unwrap();
        assert_eq!((10, Version::MAX), (record.payload, record.version));
    }
}
