//! The session lifecycle on top of a [`KvStore`].
//!
//! [`SessionManager`] decides when a session id is minted, when data is
//! written and with which TTL. [`IndexedSessionManager`] additionally keeps
//! a list of session ids per user, so that every session of a user can be
//! listed or revoked.
//!
//! Writing a record and its index entry are two store commands. Unless the
//! store overrides [`KvStore::set_indexed`] and [`KvStore::del_indexed`]
//! with atomic versions, a failure between them leaves the index out of
//! step with the records. Listing tolerates this by skipping index entries
//! whose record is gone.

mod keys;

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use futures_util::future::try_join_all;
use time::OffsetDateTime;

use crate::session::{Error, Result};
use crate::store::{self, KvStore};
use crate::{Id, SessionData, SessionDataStrategy};
pub use keys::{device_key, session_key, ttl_from_expiry};

/// Picks the user a session belongs to from its data.
pub type PickUserId = Arc<dyn Fn(&SessionData) -> Option<String> + Send + Sync>;

/// Options for [`SessionManager`] and [`IndexedSessionManager`].
///
/// # Example
///
/// ```rust
/// use ruts_kv::KvSessionOptions;
///
/// let options = KvSessionOptions::build()
///     .key_prefix("app:session:")
///     .device_key_prefix("app:device:")
///     .save_uninitialized(false);
/// ```
#[derive(Clone, Debug)]
pub struct KvSessionOptions {
    /// Prefix of the session record keys.
    ///
    /// Changing it invalidates every existing session.
    pub key_prefix: String,
    /// Prefix of the per-user session id lists.
    ///
    /// Changing it loses track of every existing list.
    pub device_key_prefix: String,
    /// Persist new sessions even when they carry no data.
    pub save_uninitialized: bool,
}

impl Default for KvSessionOptions {
    fn default() -> Self {
        Self {
            key_prefix: "_session:".to_string(),
            device_key_prefix: "_device:".to_string(),
            save_uninitialized: false,
        }
    }
}

impl KvSessionOptions {
    /// Creates a new `KvSessionOptions` with default values.
    pub fn build() -> Self {
        Self::default()
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn device_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.device_key_prefix = prefix.into();
        self
    }

    pub fn save_uninitialized(mut self, save: bool) -> Self {
        self.save_uninitialized = save;
        self
    }
}

/// Stores sessions in a [`KvStore`], one record per session.
pub struct SessionManager<S: KvStore> {
    inner: Arc<Inner<S>>,
}

struct Inner<S: KvStore> {
    store: Arc<S>,
    options: KvSessionOptions,
    pick_user_id: Option<PickUserId>,
}

impl<S: KvStore> Clone for SessionManager<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: KvStore + fmt::Debug> fmt::Debug for SessionManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("store", &self.inner.store)
            .field("options", &self.inner.options)
            .field("indexed", &self.inner.pick_user_id.is_some())
            .finish()
    }
}

impl<S: KvStore> SessionManager<S> {
    pub fn new(store: Arc<S>, options: KvSessionOptions) -> Self {
        Self::with_pick_user_id(store, options, None)
    }

    fn with_pick_user_id(
        store: Arc<S>,
        options: KvSessionOptions,
        pick_user_id: Option<PickUserId>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                options,
                pick_user_id,
            }),
        }
    }

    pub fn options(&self) -> &KvSessionOptions {
        &self.inner.options
    }

    pub fn store(&self) -> &Arc<S> {
        &self.inner.store
    }

    /// Mints a new session id and persists `data` under it.
    ///
    /// Empty data is not written unless `save_uninitialized` is set; the id
    /// is returned either way and simply does not resolve to a record yet.
    #[tracing::instrument(name = "creating session in store", skip(self, data, expires))]
    pub async fn create(&self, data: &SessionData, expires: Option<OffsetDateTime>) -> Result<Id> {
        let id = Id::generate();

        if data.is_empty() && !self.inner.options.save_uninitialized {
            tracing::debug!("skipping write of an uninitialized session");
            return Ok(id);
        }

        let user_id = self.pick_user_id(data);
        self.persist(&id, data, expires, user_id.as_deref()).await?;

        Ok(id)
    }

    /// Reads the data of session `id`.
    ///
    /// A missing or malformed id yields `None` without querying the store.
    #[tracing::instrument(name = "reading session from store", skip(self))]
    pub async fn read(&self, id: Option<&str>) -> Result<Option<SessionData>> {
        match parse_id(id) {
            Some(id) => self.load(&id).await,
            None => Ok(None),
        }
    }

    /// Overwrites the data of session `id`.
    ///
    /// Unlike [`SessionManager::create`], empty data is always written. A
    /// missing or malformed id is ignored.
    #[tracing::instrument(name = "updating session in store", skip(self, data, expires))]
    pub async fn update(
        &self,
        id: Option<&str>,
        data: &SessionData,
        expires: Option<OffsetDateTime>,
    ) -> Result<()> {
        let Some(id) = parse_id(id) else {
            return Ok(());
        };

        if self.inner.pick_user_id.is_none() {
            return self.persist(&id, data, expires, None).await;
        }

        // The user of a session may change between commits, e.g. on login.
        let previous_user_id = self.load_user_id(&id).await?;
        let user_id = self.pick_user_id(data);

        if previous_user_id == user_id {
            return self.persist(&id, data, expires, None).await;
        }

        if let Some(previous_user_id) = previous_user_id {
            let device_key = self.device_key(&previous_user_id);
            self.inner
                .store
                .lrem(&device_key, 0, &id.to_string())
                .await
                .map_err(|err| {
                    tracing::error!(err = %err, "failed to remove session from user index");
                    err
                })?;
        }

        self.persist(&id, data, expires, user_id.as_deref()).await
    }

    /// Deletes session `id` along with its entry in the user index.
    ///
    /// Returns `true` if a record was deleted. Destroying an unknown
    /// session is not an error.
    #[tracing::instrument(name = "deleting session from store", skip(self))]
    pub async fn destroy(&self, id: &Id) -> Result<bool> {
        let key = self.session_key(id);

        let deleted = match self.load_user_id(id).await? {
            Some(user_id) => {
                self.inner
                    .store
                    .del_indexed(&key, &self.device_key(&user_id), &id.to_string())
                    .await
            }
            None => self.inner.store.del(&key).await,
        }
        .map_err(|err| {
            tracing::error!(err = %err, "failed to delete session from store");
            err
        })?;

        Ok(deleted)
    }

    async fn persist(
        &self,
        id: &Id,
        data: &SessionData,
        expires: Option<OffsetDateTime>,
        user_id: Option<&str>,
    ) -> Result<()> {
        let key = self.session_key(id);
        let value = store::serialize_value(data)?;
        let ttl_secs = expires.map(|expires| ttl_from_expiry(expires, OffsetDateTime::now_utc()));

        let saved = match user_id {
            Some(user_id) => {
                self.inner
                    .store
                    .set_indexed(&key, &value, ttl_secs, &self.device_key(user_id), &id.to_string())
                    .await
            }
            None => self.inner.store.set(&key, &value, ttl_secs).await,
        };

        saved.map_err(|err| {
            tracing::error!(err = %err, "failed to save session to store");
            err
        })?;

        Ok(())
    }

    async fn load(&self, id: &Id) -> Result<Option<SessionData>> {
        let value = self
            .inner
            .store
            .get(&self.session_key(id))
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "failed to get session from store");
                err
            })?;

        match value {
            Some(value) => Ok(Some(store::deserialize_value(&value)?)),
            None => Ok(None),
        }
    }

    // The user the stored record of `id` belongs to. An undecodable record
    // belongs to nobody, so that it can still be overwritten or deleted.
    async fn load_user_id(&self, id: &Id) -> Result<Option<String>> {
        if self.inner.pick_user_id.is_none() {
            return Ok(None);
        }

        match self.load(id).await {
            Ok(data) => Ok(data.and_then(|data| self.pick_user_id(&data))),
            Err(Error::Store(store::Error::Decode(err))) => {
                tracing::warn!(err = %err, "stored session could not be decoded");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn pick_user_id(&self, data: &SessionData) -> Option<String> {
        self.inner
            .pick_user_id
            .as_ref()
            .and_then(|pick| pick(data))
    }

    fn session_key(&self, id: &Id) -> String {
        session_key(&self.inner.options.key_prefix, id)
    }

    fn device_key(&self, user_id: &str) -> String {
        device_key(&self.inner.options.device_key_prefix, user_id)
    }
}

impl<S: KvStore> SessionDataStrategy for SessionManager<S> {
    async fn create_data(&self, data: &SessionData, expires: Option<OffsetDateTime>) -> Result<Id> {
        self.create(data, expires).await
    }

    async fn read_data(&self, id: Option<&str>) -> Result<Option<SessionData>> {
        self.read(id).await
    }

    async fn update_data(
        &self,
        id: Option<&str>,
        data: &SessionData,
        expires: Option<OffsetDateTime>,
    ) -> Result<()> {
        self.update(id, data, expires).await
    }

    async fn delete_data(&self, id: &Id) -> Result<()> {
        self.destroy(id).await.map(|_| ())
    }
}

/// A [`SessionManager`] that also indexes sessions by user.
///
/// Every session whose data yields a user id through the pick function is
/// pushed onto the list `<device_key_prefix><user_id>`, most recent first.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use ruts_kv::{IndexedSessionManager, KvSessionOptions};
/// use ruts_kv::store::memory::MemoryStore;
///
/// let manager = IndexedSessionManager::new(
///     Arc::new(MemoryStore::new()),
///     KvSessionOptions::default(),
///     |data| data.get::<String>("user_id").ok().flatten(),
/// );
/// ```
pub struct IndexedSessionManager<S: KvStore> {
    manager: SessionManager<S>,
}

impl<S: KvStore> Clone for IndexedSessionManager<S> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
        }
    }
}

impl<S: KvStore + fmt::Debug> fmt::Debug for IndexedSessionManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IndexedSessionManager")
            .field(&self.manager)
            .finish()
    }
}

impl<S: KvStore> Deref for IndexedSessionManager<S> {
    type Target = SessionManager<S>;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

impl<S: KvStore> IndexedSessionManager<S> {
    pub fn new<F>(store: Arc<S>, options: KvSessionOptions, pick_user_id: F) -> Self
    where
        F: Fn(&SessionData) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            manager: SessionManager::with_pick_user_id(store, options, Some(Arc::new(pick_user_id))),
        }
    }

    /// Returns the data of every live session of `user_id`, most recent first.
    ///
    /// Index entries whose record expired or was deleted are skipped, but
    /// left in the index.
    #[tracing::instrument(name = "listing sessions of user", skip(self))]
    pub async fn list_sessions_for_user(&self, user_id: &str) -> Result<Vec<SessionData>> {
        let sessions = self.live_sessions(user_id).await?;
        Ok(sessions.into_iter().map(|(_, data)| data).collect())
    }

    /// Returns the ids of every live session of `user_id`, most recent first.
    #[tracing::instrument(name = "listing session ids of user", skip(self))]
    pub async fn list_session_ids_for_user(&self, user_id: &str) -> Result<Vec<Id>> {
        let sessions = self.live_sessions(user_id).await?;
        Ok(sessions.into_iter().map(|(id, _)| id).collect())
    }

    /// Destroys every session in the index of `user_id`.
    ///
    /// Returns the number of live sessions that were deleted. Stale index
    /// entries are dropped along the way.
    #[tracing::instrument(name = "deleting sessions of user", skip(self))]
    pub async fn destroy_all_for_user(&self, user_id: &str) -> Result<usize> {
        let device_key = self.manager.device_key(user_id);
        let device_key = device_key.as_str();
        let kv = &self.manager.inner.store;
        let members = self.index_members(device_key).await?;

        let deletions = members.iter().map(|member| async move {
            let deleted = match member.parse::<Id>() {
                Ok(id) => {
                    kv.del_indexed(&self.manager.session_key(&id), device_key, member)
                        .await?
                }
                Err(_) => {
                    kv.lrem(device_key, 0, member).await?;
                    false
                }
            };
            Ok::<_, store::Error>(deleted)
        });

        let deleted = try_join_all(deletions).await.map_err(|err| {
            tracing::error!(err = %err, "failed to delete sessions of user");
            err
        })?;

        Ok(deleted.into_iter().filter(|deleted| *deleted).count())
    }

    async fn live_sessions(&self, user_id: &str) -> Result<Vec<(Id, SessionData)>> {
        let device_key = self.manager.device_key(user_id);
        let members = self.index_members(&device_key).await?;

        let lookups = members.iter().map(|member| async move {
            let Ok(id) = member.parse::<Id>() else {
                tracing::warn!(member = %member, "skipping malformed entry in user index");
                return Ok(None);
            };
            Ok::<_, Error>(self.manager.load(&id).await?.map(|data| (id, data)))
        });

        Ok(try_join_all(lookups).await?.into_iter().flatten().collect())
    }

    async fn index_members(&self, device_key: &str) -> Result<Vec<String>> {
        Ok(self
            .manager
            .inner
            .store
            .lrange(device_key, 0, -1)
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "failed to read user index");
                err
            })?)
    }
}

impl<S: KvStore> SessionDataStrategy for IndexedSessionManager<S> {
    async fn create_data(&self, data: &SessionData, expires: Option<OffsetDateTime>) -> Result<Id> {
        self.manager.create(data, expires).await
    }

    async fn read_data(&self, id: Option<&str>) -> Result<Option<SessionData>> {
        self.manager.read(id).await
    }

    async fn update_data(
        &self,
        id: Option<&str>,
        data: &SessionData,
        expires: Option<OffsetDateTime>,
    ) -> Result<()> {
        self.manager.update(id, data, expires).await
    }

    async fn delete_data(&self, id: &Id) -> Result<()> {
        self.manager.destroy(id).await.map(|_| ())
    }
}

fn parse_id(id: Option<&str>) -> Option<Id> {
    id?.parse::<Id>()
        .map_err(|err| {
            tracing::warn!(err = %err, "possibly suspicious activity: malformed session id");
        })
        .ok()
}
