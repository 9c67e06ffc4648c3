use crate::store::{Error, KvStore};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Entry {
    Value(Vec<u8>),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct StoredEntry {
    entry: Entry,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_live(&self) -> bool {
        self.expires_at
            .map(|expires| expires > Instant::now())
            .unwrap_or(true)
    }
}

/// An in-memory key-value store.
///
/// It follows the Redis semantics the session managers rely on: keys hold
/// either a value or a list, lists disappear once empty, and keys with a
/// TTL become invisible as soon as it runs out.
///
/// Clones share the same underlying data.
///
/// ### Note
///
/// Do not use this in a production environment.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<DashMap<String, StoredEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the remaining time to live of `key` in seconds, rounded up.
    ///
    /// Mirrors the Redis `TTL` command: `-2` if the key does not exist and
    /// `-1` if it exists without an expiry.
    pub fn ttl(&self, key: &str) -> i64 {
        match self.data.get(key) {
            Some(stored) if stored.is_live() => match stored.expires_at {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    remaining.as_millis().div_ceil(1000) as i64
                }
                None => -1,
            },
            _ => -2,
        }
    }

    /// Returns the number of live keys.
    pub fn len(&self) -> usize {
        self.cleanup_expired();
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cleanup_expired(&self) {
        self.data.retain(|_, stored| stored.is_live());
    }
}

impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        self.cleanup_expired();

        match self.data.get(key) {
            Some(stored) if stored.is_live() => match &stored.entry {
                Entry::Value(bytes) => Ok(Some(bytes.clone())),
                Entry::List(_) => Err(wrong_type(key)),
            },
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> Result<(), Error> {
        self.cleanup_expired();

        let expires_at = ttl_secs.map(|seconds| Instant::now() + Duration::from_secs(seconds));
        self.data.insert(
            key.to_string(),
            StoredEntry {
                entry: Entry::Value(value.to_vec()),
                expires_at,
            },
        );

        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, Error> {
        Ok(self
            .data
            .remove(key)
            .is_some_and(|(_, stored)| stored.is_live()))
    }

    async fn lpush(&self, key: &str, member: &str) -> Result<(), Error> {
        self.cleanup_expired();

        let mut stored = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| StoredEntry {
                entry: Entry::List(VecDeque::new()),
                expires_at: None,
            });

        match &mut stored.entry {
            Entry::List(list) => {
                list.push_front(member.to_string());
                Ok(())
            }
            Entry::Value(_) => Err(wrong_type(key)),
        }
    }

    async fn lrem(&self, key: &str, count: i64, member: &str) -> Result<(), Error> {
        self.cleanup_expired();

        let emptied = {
            let Some(mut stored) = self.data.get_mut(key) else {
                return Ok(());
            };
            let Entry::List(list) = &mut stored.entry else {
                return Err(wrong_type(key));
            };
            remove_members(list, count, member);
            list.is_empty()
        };

        // Empty lists do not exist.
        if emptied {
            self.data
                .remove_if(key, |_, stored| matches!(&stored.entry, Entry::List(list) if list.is_empty()));
        }

        Ok(())
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, Error> {
        self.cleanup_expired();

        let Some(stored) = self.data.get(key) else {
            return Ok(Vec::new());
        };
        let Entry::List(list) = &stored.entry else {
            return Err(wrong_type(key));
        };

        Ok(match range_bounds(list.len(), start, stop) {
            Some((start, stop)) => list.range(start..=stop).cloned().collect(),
            None => Vec::new(),
        })
    }
}

fn wrong_type(key: &str) -> Error {
    Error::Backend(format!(
        "WRONGTYPE operation against key `{key}` holding the wrong kind of value"
    ))
}

fn remove_members(list: &mut VecDeque<String>, count: i64, member: &str) {
    if count == 0 {
        list.retain(|m| m != member);
        return;
    }

    let mut remaining = count.unsigned_abs();
    if count > 0 {
        let mut i = 0;
        while i < list.len() && remaining > 0 {
            if list[i] == member {
                list.remove(i);
                remaining -= 1;
            } else {
                i += 1;
            }
        }
    } else {
        let mut i = list.len();
        while i > 0 && remaining > 0 {
            i -= 1;
            if list[i] == member {
                list.remove(i);
                remaining -= 1;
            }
        }
    }
}

fn range_bounds(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if start > stop || start >= len {
        return None;
    }

    Some((start as usize, stop as usize))
}
