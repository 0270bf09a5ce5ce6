//! Redis backend implementation for the [`versionlock`] crate.
//!
//! ## Store
//!
//! `versionlock-redis` supports the [`versionlock::Store`] trait through
//! the [`Store`] type:
//!
//! * every record is a Redis hash, addressed by the record id,
//! * plain reads and unconditional writes go through a shared
//!   multiplexed connection,
//! * every optimistic transaction opens a dedicated connection, since the
//!   `WATCH` state of a Redis connection would otherwise leak between callers,
//! * commits are issued as `MULTI`/`HSET`/`EXEC`: a nil `EXEC` reply means a
//!   watched key changed, and is reported as [`versionlock::Commit::ConditionFailed`].

mod store;

pub use store::*;

use redis::RedisResult;

/// Builder type for the [`Store`] type.
///
/// The same builder instance can be used to build multiple [`Store`] instances.
#[derive(Clone)]
pub struct Builder {
    client: redis::Client,
}

impl Builder {
    /// Creates a new builder instance using the specified Redis client.
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Builds a new [`Store`] instance.
    ///
    /// This method returns an `std::future::Future` completing after a
    /// connection with Redis is successfully established.
    pub async fn build_store(&self) -> RedisResult<Store> {
        Ok(Store {
            client: self.client.clone(),
            conn: self.client.get_multiplexed_async_connection().await?,
        })
    }
}
