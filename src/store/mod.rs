//! Key-value backends for session records and the per-user session index.

pub mod memory;

#[cfg(feature = "redis-store")]
pub mod redis;

use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Encoding failed with: {0}")]
    Encode(String),

    #[error("Decoding failed with: {0}")]
    Decode(String),

    #[error("{0}")]
    Backend(String),
}

#[cfg(feature = "redis-store")]
impl From<fred::error::Error> for Error {
    fn from(err: fred::error::Error) -> Self {
        Error::Backend(err.to_string())
    }
}

/// The capability a key-value store must offer to hold sessions.
///
/// Records are opaque byte blobs addressed by string keys. The list
/// operations are only used when sessions are indexed by user.
pub trait KvStore: Clone + Send + Sync + 'static {
    /// Gets the value stored at `key`, if any.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, Error>> + Send;

    /// Sets `key` to `value`, overwriting any previous value.
    ///
    /// `ttl_secs` of `None` keeps the record until it is deleted. `Some(0)`
    /// means the record is already expired and must not be readable afterwards.
    fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl_secs: Option<u64>,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Deletes `key`. Returns `true` if something was deleted.
    fn del(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Pushes `member` onto the head of the list at `key`.
    fn lpush(&self, key: &str, member: &str) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes occurrences of `member` from the list at `key`.
    ///
    /// A `count` of `0` removes every occurrence, a positive count removes
    /// that many from the head and a negative count that many from the tail.
    fn lrem(
        &self,
        key: &str,
        count: i64,
        member: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;

    /// Returns the list elements between `start` and `stop`, both inclusive.
    ///
    /// Negative indices count from the end, so `(0, -1)` is the whole list.
    fn lrange(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> impl Future<Output = Result<Vec<String>, Error>> + Send;

    /// Sets `key` and moves `member` to the head of the list at `index_key`.
    ///
    /// `member` appears in the list once, even if it was already there. The
    /// default runs the commands one after the other. Stores able to run
    /// them atomically should override this.
    fn set_indexed(
        &self,
        key: &str,
        value: &[u8],
        ttl_secs: Option<u64>,
        index_key: &str,
        member: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send {
        async move {
            self.set(key, value, ttl_secs).await?;
            self.lrem(index_key, 0, member).await?;
            self.lpush(index_key, member).await
        }
    }

    /// Removes `member` from the list at `index_key` and deletes `key`.
    ///
    /// The default runs the two commands one after the other. Stores able to
    /// run them atomically should override this.
    fn del_indexed(
        &self,
        key: &str,
        index_key: &str,
        member: &str,
    ) -> impl Future<Output = Result<bool, Error>> + Send {
        async move {
            self.lrem(index_key, 0, member).await?;
            self.del(key).await
        }
    }
}

#[cfg(feature = "json")]
pub fn serialize_value<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(value).map_err(|e| Error::Encode(e.to_string()))
}

#[cfg(feature = "json")]
pub fn deserialize_value<T: DeserializeOwned>(value: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(value).map_err(|e| Error::Decode(e.to_string()))
}

#[cfg(all(feature = "messagepack", not(feature = "json")))]
pub fn serialize_value<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    rmp_serde::to_vec_named(value).map_err(|e| Error::Encode(e.to_string()))
}

#[cfg(all(feature = "messagepack", not(feature = "json")))]
pub fn deserialize_value<T: DeserializeOwned>(value: &[u8]) -> Result<T, Error> {
    rmp_serde::from_slice(value).map_err(|e| Error::Decode(e.to_string()))
}
