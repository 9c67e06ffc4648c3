//! Session values handed to request handlers.

use std::{result, sync::Arc};

use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

mod cookie_options;
mod data;
mod id;

use crate::store;
pub use cookie_options::CookieOptions;
pub use data::SessionData;
pub use id::{Id, ParseIdError};

#[derive(Error, Debug)]
pub enum Error {
    #[error("need to provide a key-value store instance")]
    MissingStore,
    #[error("need to provide a session storage factory")]
    MissingSessionFactory,
    #[error(transparent)]
    Store(#[from] store::Error),
}

pub type Result<T> = result::Result<T, Error>;

/// A session as seen by a request handler.
///
/// Reads and writes only touch the in-memory copy. Nothing reaches the
/// store until the session is committed or destroyed, either explicitly
/// through [`CookieSessionStorage`](crate::CookieSessionStorage) or by the
/// [`SessionLayer`](crate::SessionLayer) once the response is ready.
///
/// Clones share the same state.
#[derive(Clone, Debug, Default)]
pub struct Session {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    // `None` until the session is first committed
    id: Option<Id>,
    data: SessionData,
    // set when a value is set or unset
    changed: bool,
    // set when the handler asks for the session to be destroyed
    destroyed: bool,
}

impl Session {
    /// Creates a session with the given id and data.
    pub fn new(id: Option<Id>, data: SessionData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                id,
                data,
                changed: false,
                destroyed: false,
            })),
        }
    }

    /// Returns the session ID, if the session has been committed before.
    pub fn id(&self) -> Option<Id> {
        self.inner.lock().id
    }

    /// Returns a copy of the session data.
    pub fn data(&self) -> SessionData {
        self.inner.lock().data.clone()
    }

    /// Retrieves and deserializes the value stored under `key`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        Ok(self.inner.lock().data.get(key)?)
    }

    /// Returns `true` if a value is stored under `key`.
    pub fn has(&self, key: &str) -> bool {
        self.inner.lock().data.contains_key(key)
    }

    /// Stores `value` under `key`.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.data.insert(key, value)?;
        inner.changed = true;
        Ok(())
    }

    /// Removes the value stored under `key`.
    pub fn unset(&self, key: &str) {
        let mut inner = self.inner.lock();
        if inner.data.remove(key).is_some() {
            inner.changed = true;
        }
    }

    /// Marks the session for destruction at the end of the request.
    pub fn destroy(&self) {
        self.inner.lock().destroyed = true;
    }

    /// Returns `true` if the session data changed since it was loaded or committed.
    pub fn is_changed(&self) -> bool {
        self.inner.lock().changed
    }

    /// Returns `true` if [`Session::destroy`] was called.
    pub fn is_destroyed(&self) -> bool {
        self.inner.lock().destroyed
    }

    pub(crate) fn committed(&self, id: Id) {
        let mut inner = self.inner.lock();
        inner.id = Some(id);
        inner.changed = false;
    }

    pub(crate) fn cleared(&self) {
        let mut inner = self.inner.lock();
        inner.id = None;
        inner.data = SessionData::new();
        inner.changed = false;
    }
}
