use std::ops::Deref;
use std::sync::Arc;

use crate::session::{Error, Result};
use crate::store::KvStore;
use crate::{
    CookieOptions, CookieSessionFactory, Id, IndexedSessionManager, KvSessionOptions,
    SessionData, SessionFactory, SessionManager,
};

/// A builder for a session storage backed by a [`KvStore`].
///
/// Both the store and the session factory must be provided; [`build`] and
/// [`build_indexed`] fail otherwise.
///
/// [`build`]: KvSessionStorageBuilder::build
/// [`build_indexed`]: KvSessionStorageBuilder::build_indexed
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use ruts_kv::{CookieOptions, CookieSessionFactory, KvSessionStorageBuilder};
/// use ruts_kv::store::memory::MemoryStore;
///
/// let storage = KvSessionStorageBuilder::new()
///     .store(Arc::new(MemoryStore::new()))
///     .session_factory(CookieSessionFactory)
///     .cookie(CookieOptions::build().name("session").max_age(3600))
///     .key_prefix("app:session:")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug)]
pub struct KvSessionStorageBuilder<S: KvStore, F: SessionFactory = CookieSessionFactory> {
    store: Option<Arc<S>>,
    factory: Option<F>,
    cookie_options: CookieOptions,
    options: KvSessionOptions,
}

impl<S: KvStore> Default for KvSessionStorageBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: KvStore> KvSessionStorageBuilder<S> {
    pub fn new() -> Self {
        Self {
            store: None,
            factory: None,
            cookie_options: CookieOptions::default(),
            options: KvSessionOptions::default(),
        }
    }
}

impl<S: KvStore, F: SessionFactory> KvSessionStorageBuilder<S, F> {
    /// Sets the store holding the session records.
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the factory turning the lifecycle callbacks into a session storage.
    pub fn session_factory<G: SessionFactory>(self, factory: G) -> KvSessionStorageBuilder<S, G> {
        KvSessionStorageBuilder {
            store: self.store,
            factory: Some(factory),
            cookie_options: self.cookie_options,
            options: self.options,
        }
    }

    /// Sets the session cookie options.
    pub fn cookie(mut self, cookie_options: CookieOptions) -> Self {
        self.cookie_options = cookie_options;
        self
    }

    /// Sets all key-value options at once.
    pub fn options(mut self, options: KvSessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the prefix of the session record keys. Defaults to `_session:`.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.key_prefix = prefix.into();
        self
    }

    /// Sets the prefix of the per-user session lists. Defaults to `_device:`.
    pub fn device_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.options.device_key_prefix = prefix.into();
        self
    }

    /// Persist new sessions even when they carry no data. Defaults to `false`.
    pub fn save_uninitialized(mut self, save: bool) -> Self {
        self.options.save_uninitialized = save;
        self
    }

    /// Builds a session storage without a user index.
    pub fn build(self) -> Result<F::Storage<SessionManager<S>>> {
        let (store, factory) = validate(self.store, self.factory)?;
        let manager = SessionManager::new(store, self.options);

        Ok(factory.create_session_storage(manager, self.cookie_options))
    }

    /// Builds a session storage that indexes sessions by the user returned
    /// from `pick_user_id`.
    ///
    /// Sessions for which `pick_user_id` returns `None` are not indexed.
    pub fn build_indexed<P>(
        self,
        pick_user_id: P,
    ) -> Result<Indexed<F::Storage<IndexedSessionManager<S>>, S>>
    where
        P: Fn(&SessionData) -> Option<String> + Send + Sync + 'static,
    {
        let (store, factory) = validate(self.store, self.factory)?;
        let manager = IndexedSessionManager::new(store, self.options, pick_user_id);

        Ok(Indexed {
            storage: factory.create_session_storage(manager.clone(), self.cookie_options),
            manager,
        })
    }
}

fn validate<S, F>(store: Option<Arc<S>>, factory: Option<F>) -> Result<(Arc<S>, F)> {
    let Some(store) = store else {
        tracing::error!("session storage built without a key-value store");
        return Err(Error::MissingStore);
    };
    let Some(factory) = factory else {
        tracing::error!("session storage built without a session factory");
        return Err(Error::MissingSessionFactory);
    };

    Ok((store, factory))
}

/// A session storage whose sessions are indexed by user.
///
/// Derefs to the session storage and adds the per-user operations.
#[derive(Debug)]
pub struct Indexed<T, S: KvStore> {
    storage: T,
    manager: IndexedSessionManager<S>,
}

impl<T, S: KvStore> Indexed<T, S> {
    /// Returns the session storage, e.g. to build a [`SessionLayer`](crate::SessionLayer).
    pub fn storage(&self) -> &T {
        &self.storage
    }

    pub fn manager(&self) -> &IndexedSessionManager<S> {
        &self.manager
    }

    /// Returns the data of every live session of `user_id`, most recent first.
    pub async fn list_sessions_for_user(&self, user_id: &str) -> Result<Vec<SessionData>> {
        self.manager.list_sessions_for_user(user_id).await
    }

    /// Returns the ids of every live session of `user_id`, most recent first.
    pub async fn list_session_ids_for_user(&self, user_id: &str) -> Result<Vec<Id>> {
        self.manager.list_session_ids_for_user(user_id).await
    }

    /// Destroys every session of `user_id`, returning how many were live.
    pub async fn destroy_all_for_user(&self, user_id: &str) -> Result<usize> {
        self.manager.destroy_all_for_user(user_id).await
    }
}

impl<T, S: KvStore> Deref for Indexed<T, S> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.storage
    }
}
