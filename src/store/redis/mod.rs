mod lua;

use crate::store::redis::lua::{
    DEL_INDEXED_SCRIPT, DEL_INDEXED_SCRIPT_HASH, SET_INDEXED_SCRIPT, SET_INDEXED_SCRIPT_HASH,
};
use crate::store::{Error, KvStore};
use fred::clients::Pool;
use fred::interfaces::{KeysInterface, ListInterface, LuaInterface};
use fred::types::{Expiration, Value};
use std::{fmt::Debug, sync::Arc};
use tokio::sync::OnceCell;

/// A redis session store implementation.
///
/// Each session record is a plain string key so that it can carry its own
/// TTL. The per-user index is a Redis list.
///
/// Writing a record together with its index entry, and removing both, run as
/// Lua scripts, so neither sequence can be observed half-done.
#[derive(Clone, Debug)]
pub struct RedisStore<C: KeysInterface + ListInterface + LuaInterface + Clone + Send + Sync = Pool>
{
    client: Arc<C>,
}

impl<C> RedisStore<C>
where
    C: KeysInterface + ListInterface + LuaInterface + Clone + Send + Sync,
{
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Returns the remaining time to live of `key` in seconds.
    ///
    /// `-2` if the key does not exist and `-1` if it has no expiry.
    pub async fn ttl(&self, key: &str) -> Result<i64, Error> {
        Ok(self.client.ttl::<i64, _>(key).await?)
    }
}

impl<C> KvStore for RedisStore<C>
where
    C: KeysInterface + ListInterface + LuaInterface + Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.client.get::<Option<Vec<u8>>, _>(key).await?)
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> Result<(), Error> {
        let expiration = ttl_secs.map(|seconds| match seconds {
            0 => Expiration::PX(1),
            seconds => Expiration::EX(seconds as i64),
        });

        let _: () = self
            .client
            .set(key, Value::Bytes(value.to_vec().into()), expiration, None, false)
            .await?;

        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, Error> {
        let deleted: i64 = self.client.del(key).await?;
        Ok(deleted > 0)
    }

    async fn lpush(&self, key: &str, member: &str) -> Result<(), Error> {
        let _: i64 = self.client.lpush(key, member).await?;
        Ok(())
    }

    async fn lrem(&self, key: &str, count: i64, member: &str) -> Result<(), Error> {
        let _: i64 = self.client.lrem(key, count, member).await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, Error> {
        Ok(self.client.lrange::<Vec<String>, _>(key, start, stop).await?)
    }

    async fn set_indexed(
        &self,
        key: &str,
        value: &[u8],
        ttl_secs: Option<u64>,
        index_key: &str,
        member: &str,
    ) -> Result<(), Error> {
        let hash = script_hash(&self.client, &SET_INDEXED_SCRIPT_HASH, SET_INDEXED_SCRIPT).await?;

        let args: Vec<Value> = vec![
            Value::Bytes(value.to_vec().into()),
            Value::Integer(ttl_secs.map(|seconds| seconds as i64).unwrap_or(-1)),
            member.into(),
        ];

        let _: i64 = self
            .client
            .evalsha(hash, vec![key, index_key], args)
            .await?;

        Ok(())
    }

    async fn del_indexed(&self, key: &str, index_key: &str, member: &str) -> Result<bool, Error> {
        let hash = script_hash(&self.client, &DEL_INDEXED_SCRIPT_HASH, DEL_INDEXED_SCRIPT).await?;

        let deleted: i64 = self
            .client
            .evalsha(hash, vec![key, index_key], member)
            .await?;

        Ok(deleted > 0)
    }
}

async fn script_hash<'a, C>(
    client: &Arc<C>,
    once_cell: &'a OnceCell<String>,
    script: &str,
) -> Result<&'a String, Error>
where
    C: LuaInterface + Send + Sync,
{
    let hash = once_cell
        .get_or_try_init(|| async {
            let hash = fred::util::sha1_hash(script);
            if !client.script_exists::<bool, _>(&hash).await? {
                let _: () = client.script_load(script).await?;
            }
            Ok::<String, fred::error::Error>(hash)
        })
        .await?;

    Ok(hash)
}
