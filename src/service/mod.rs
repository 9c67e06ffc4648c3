//! Session management middleware for tower applications.
//!
//! This module provides [`SessionLayer`] for loading a [`Session`] before
//! a request is handled and committing or destroying it afterwards.

use http::{Request, Response};
use tower::{Layer, Service};
use tower_cookies::Cookies;

use crate::store::KvStore;
use crate::{CookieSessionStorage, Indexed, IndexedSessionManager, Session, SessionDataStrategy};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// A Tower Middleware to use [`Session`].
#[derive(Debug)]
pub struct SessionService<S, B: SessionDataStrategy> {
    inner: S,
    storage: Arc<CookieSessionStorage<B>>,
}

impl<S: Clone, B: SessionDataStrategy> Clone for SessionService<S, B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<ReqBody, ResBody, S, B> Service<Request<ReqBody>> for SessionService<S, B>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
    B: SessionDataStrategy,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    #[inline]
    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let storage = Arc::clone(&self.storage);
        // The clone may not be ready; keep the one `poll_ready` was called on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let Some(cookies) = req.extensions().get::<Cookies>().cloned() else {
                tracing::error!("cookies not found in the request extensions");
                return inner.call(req).await;
            };

            let cookie_value = cookies
                .get(storage.cookie_options().name)
                .map(|cookie| cookie.value().to_string());

            let session = storage
                .load_session(cookie_value.as_deref())
                .await
                .unwrap_or_else(|err| {
                    tracing::error!(err = %err, "failed to load session, starting a new one");
                    Session::default()
                });

            req.extensions_mut().insert(session.clone());
            let res = inner.call(req).await?;

            if session.is_destroyed() {
                match storage.destroy_session(&session).await {
                    Ok(cookie) => cookies.add(cookie),
                    Err(err) => tracing::error!(err = %err, "failed to destroy session"),
                }
            } else if session.is_changed() {
                match storage.commit_session(&session).await {
                    Ok(cookie) => cookies.add(cookie),
                    Err(err) => tracing::error!(err = %err, "failed to commit session"),
                }
            }

            Ok(res)
        })
    }
}

/// Layer to apply [`SessionService`] middleware.
///
/// The `CookieManagerLayer` from `tower_cookies` must wrap this layer.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use ruts_kv::{CookieOptions, CookieSessionFactory, KvSessionStorageBuilder, SessionLayer};
/// use ruts_kv::store::memory::MemoryStore;
///
/// let storage = KvSessionStorageBuilder::new()
///     .store(Arc::new(MemoryStore::new()))
///     .session_factory(CookieSessionFactory)
///     .cookie(CookieOptions::build().name("test_sess").max_age(60))
///     .build()
///     .unwrap();
///
/// let session_layer = SessionLayer::new(Arc::new(storage));
/// ```
#[derive(Debug)]
pub struct SessionLayer<B: SessionDataStrategy> {
    storage: Arc<CookieSessionStorage<B>>,
}

impl<B: SessionDataStrategy> Clone for SessionLayer<B> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<B: SessionDataStrategy> SessionLayer<B> {
    /// Create a new session layer.
    pub fn new(storage: Arc<CookieSessionStorage<B>>) -> Self {
        Self { storage }
    }
}

/// Builds the layer for a storage made with
/// [`KvSessionStorageBuilder::build_indexed`](crate::KvSessionStorageBuilder::build_indexed).
impl<S: KvStore> From<&Indexed<CookieSessionStorage<IndexedSessionManager<S>>, S>>
    for SessionLayer<IndexedSessionManager<S>>
{
    fn from(indexed: &Indexed<CookieSessionStorage<IndexedSessionManager<S>>, S>) -> Self {
        Self::new(Arc::new(indexed.storage().clone()))
    }
}

impl<S, B: SessionDataStrategy> Layer<S> for SessionLayer<B> {
    type Service = SessionService<S, B>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            storage: Arc::clone(&self.storage),
        }
    }
}
