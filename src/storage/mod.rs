//! Cookie-backed session storage on top of the lifecycle callbacks.

mod builder;

use std::future::Future;
use std::sync::Arc;

use cookie::Cookie;
use time::OffsetDateTime;

use crate::session::Result;
use crate::{CookieOptions, Id, Session, SessionData};
pub use builder::{Indexed, KvSessionStorageBuilder};

/// The four callbacks a session storage needs from its backend.
///
/// `create_data` runs on the first commit of a session and returns the id
/// the session gets. Later commits go through `update_data`.
pub trait SessionDataStrategy: Send + Sync + 'static {
    fn create_data(
        &self,
        data: &SessionData,
        expires: Option<OffsetDateTime>,
    ) -> impl Future<Output = Result<Id>> + Send;

    fn read_data(&self, id: Option<&str>) -> impl Future<Output = Result<Option<SessionData>>> + Send;

    fn update_data(
        &self,
        id: Option<&str>,
        data: &SessionData,
        expires: Option<OffsetDateTime>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete_data(&self, id: &Id) -> impl Future<Output = Result<()>> + Send;
}

/// Turns a [`SessionDataStrategy`] into a session storage.
pub trait SessionFactory {
    type Storage<B: SessionDataStrategy>;

    fn create_session_storage<B: SessionDataStrategy>(
        &self,
        strategy: B,
        cookie_options: CookieOptions,
    ) -> Self::Storage<B>;
}

/// The default [`SessionFactory`], producing [`CookieSessionStorage`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct CookieSessionFactory;

impl SessionFactory for CookieSessionFactory {
    type Storage<B: SessionDataStrategy> = CookieSessionStorage<B>;

    fn create_session_storage<B: SessionDataStrategy>(
        &self,
        strategy: B,
        cookie_options: CookieOptions,
    ) -> Self::Storage<B> {
        CookieSessionStorage::new(strategy, cookie_options)
    }
}

/// Keeps the session id in a cookie and the session data in a backend.
#[derive(Debug)]
pub struct CookieSessionStorage<B: SessionDataStrategy> {
    strategy: Arc<B>,
    cookie_options: CookieOptions,
}

impl<B: SessionDataStrategy> Clone for CookieSessionStorage<B> {
    fn clone(&self) -> Self {
        Self {
            strategy: Arc::clone(&self.strategy),
            cookie_options: self.cookie_options,
        }
    }
}

impl<B: SessionDataStrategy> CookieSessionStorage<B> {
    pub fn new(strategy: B, cookie_options: CookieOptions) -> Self {
        Self {
            strategy: Arc::new(strategy),
            cookie_options,
        }
    }

    pub fn strategy(&self) -> &B {
        &self.strategy
    }

    pub fn cookie_options(&self) -> &CookieOptions {
        &self.cookie_options
    }

    /// Loads the session named by the session cookie in `cookie_header`.
    ///
    /// Without a usable cookie a fresh session without an id is returned. A
    /// well-formed id that has no stored data yet, such as the id of a
    /// session that was never persisted, is kept with empty data.
    #[tracing::instrument(name = "getting session", skip(self, cookie_header))]
    pub async fn get_session(&self, cookie_header: Option<&str>) -> Result<Session> {
        let value = cookie_header.and_then(|header| self.find_cookie_value(header));
        self.load_session(value.as_deref()).await
    }

    /// Loads the session named by a raw session cookie value.
    ///
    /// A well-formed id is kept even when nothing is stored under it, so
    /// unless the cookie is signed the client can choose its session id.
    pub async fn load_session(&self, cookie_value: Option<&str>) -> Result<Session> {
        let data = self.strategy.read_data(cookie_value).await?;
        let id = cookie_value.and_then(|value| value.parse::<Id>().ok());

        Ok(Session::new(id, data.unwrap_or_default()))
    }

    /// Persists the session and returns the cookie to send back.
    ///
    /// A session without an id is created and gets the new id; otherwise its
    /// data overwrites the stored data.
    #[tracing::instrument(name = "committing session", skip(self, session))]
    pub async fn commit_session(&self, session: &Session) -> Result<Cookie<'static>> {
        let expires = self.cookie_options.expires_from(OffsetDateTime::now_utc());
        let data = session.data();

        let id = match session.id() {
            Some(id) => {
                self.strategy
                    .update_data(Some(&id.to_string()), &data, expires)
                    .await?;
                id
            }
            None => self.strategy.create_data(&data, expires).await?,
        };

        session.committed(id);

        Ok(self.cookie_options.build_cookie(&id, expires))
    }

    /// Deletes the session data and returns a cookie removing the session cookie.
    #[tracing::instrument(name = "destroying session", skip(self, session))]
    pub async fn destroy_session(&self, session: &Session) -> Result<Cookie<'static>> {
        if let Some(id) = session.id() {
            self.strategy.delete_data(&id).await?;
        }

        session.cleared();

        Ok(self.cookie_options.build_removal_cookie())
    }

    fn find_cookie_value(&self, header: &str) -> Option<String> {
        Cookie::split_parse(header)
            .filter_map(|cookie| cookie.ok())
            .find(|cookie| cookie.name() == self.cookie_options.name)
            .map(|cookie| cookie.value().to_string())
    }
}
