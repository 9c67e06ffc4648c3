#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use ruts_kv::CookieOptions;
use ruts_kv::store::{Error, KvStore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TestUser {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TestSession {
    pub user: TestUser,
    pub preferences: TestPreferences,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TestPreferences {
    pub theme: String,
    pub language: String,
}

pub fn create_test_session() -> TestSession {
    TestSession {
        user: TestUser {
            id: 1,
            name: "Test User".to_string(),
        },
        preferences: TestPreferences {
            theme: "dark".to_string(),
            language: "en".to_string(),
        },
    }
}

pub fn build_cookie_options() -> CookieOptions {
    CookieOptions::build()
        .name("test_sess")
        .http_only(true)
        .same_site(cookie::SameSite::Lax)
        .secure(true)
        .max_age(15)
        .path("/")
}

/// Wraps a store and records the name of every command it receives.
#[derive(Clone, Debug)]
pub struct CountingStore<S> {
    inner: S,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl<S: KvStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: Arc::default(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls.lock().iter().filter(|c| **c == command).count()
    }

    pub fn writes(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(**c, "set" | "del" | "lpush" | "lrem"))
            .count()
    }

    pub fn reset(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, command: &'static str) {
        self.calls.lock().push(command);
    }
}

impl<S: KvStore> KvStore for CountingStore<S> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        self.record("get");
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl_secs: Option<u64>) -> Result<(), Error> {
        self.record("set");
        self.inner.set(key, value, ttl_secs).await
    }

    async fn del(&self, key: &str) -> Result<bool, Error> {
        self.record("del");
        self.inner.del(key).await
    }

    async fn lpush(&self, key: &str, member: &str) -> Result<(), Error> {
        self.record("lpush");
        self.inner.lpush(key, member).await
    }

    async fn lrem(&self, key: &str, count: i64, member: &str) -> Result<(), Error> {
        self.record("lrem");
        self.inner.lrem(key, count, member).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, Error> {
        self.record("lrange");
        self.inner.lrange(key, start, stop).await
    }
}

/// A store whose every command fails.
#[derive(Clone, Debug, Default)]
pub struct FailingStore;

fn unavailable() -> Error {
    Error::Backend("store unavailable".to_string())
}

impl KvStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, Error> {
        Err(unavailable())
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl_secs: Option<u64>) -> Result<(), Error> {
        Err(unavailable())
    }

    async fn del(&self, _key: &str) -> Result<bool, Error> {
        Err(unavailable())
    }

    async fn lpush(&self, _key: &str, _member: &str) -> Result<(), Error> {
        Err(unavailable())
    }

    async fn lrem(&self, _key: &str, _count: i64, _member: &str) -> Result<(), Error> {
        Err(unavailable())
    }

    async fn lrange(&self, _key: &str, _start: i64, _stop: i64) -> Result<Vec<String>, Error> {
        Err(unavailable())
    }
}
