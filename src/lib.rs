//! # Ruts KV: key-value session storage for Tower applications
//!
//! `ruts-kv` keeps session data in a key-value store with per-record expiry
//! and the session id in a cookie. Sessions are created lazily: nothing is
//! written until a session carries data. Optionally, sessions are indexed
//! by the user they belong to, so that every session of a user can be
//! listed or revoked.
//!
//! # Quick Start
//!
//! Here's a basic example with [Axum](https://docs.rs/axum/latest/axum/) and
//! the [`MemoryStore`](store::memory::MemoryStore).
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use axum::{Router, routing::get};
//! use ruts_kv::{CookieOptions, CookieSessionFactory, KvSessionStorageBuilder, Session, SessionLayer};
//! use ruts_kv::store::memory::MemoryStore;
//! use tower_cookies::CookieManagerLayer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let storage = KvSessionStorageBuilder::new()
//!         .store(Arc::new(MemoryStore::new()))
//!         .session_factory(CookieSessionFactory)
//!         .cookie(CookieOptions::build().name("session").max_age(3600))
//!         .build()
//!         .unwrap();
//!
//!     let app = Router::new()
//!         .route("/", get(handler))
//!         .layer(SessionLayer::new(Arc::new(storage)))
//!         .layer(CookieManagerLayer::new()); // CookieManagerLayer must be after
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//!
//! async fn handler(session: Session) -> String {
//!     let count: i32 = session.get("count").unwrap().unwrap_or(0) + 1;
//!     session.set("count", &count).unwrap();
//!     format!("You've visited this page {count} times")
//! }
//! ```
//!
//! # Sessions per user
//!
//! [`KvSessionStorageBuilder::build_indexed`] takes a function picking the
//! user id out of the session data. Every persisted session with a user id
//! is pushed to a list under `device_key_prefix + user_id`.
//!
//! ```rust
//! use std::sync::Arc;
//! use ruts_kv::{CookieSessionFactory, KvSessionStorageBuilder};
//! use ruts_kv::store::memory::MemoryStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let storage = KvSessionStorageBuilder::new()
//!     .store(Arc::new(MemoryStore::new()))
//!     .session_factory(CookieSessionFactory)
//!     .build_indexed(|data| data.get::<String>("user_id").ok().flatten())
//!     .unwrap();
//!
//! let session = storage.get_session(None).await.unwrap();
//! session.set("user_id", &"alice").unwrap();
//! storage.commit_session(&session).await.unwrap();
//!
//! let sessions = storage.list_sessions_for_user("alice").await.unwrap();
//! assert_eq!(sessions.len(), 1);
//! # }
//! ```
//!
//! # Stores
//!
//! Any [`KvStore`](store::KvStore) can back the sessions.
//!
//! ## Memory
//! A process-local store, useful for tests and single-instance deployments.
//!
//! ## Redis
//! Requires the `redis-store` feature. Record and index writes run as Lua
//! scripts, so a record and its index entry change together.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fred::clients::Client;
//! use ruts_kv::store::redis::RedisStore;
//!
//! let fred_client_or_pool = Client::default();
//! let store = RedisStore::new(Arc::new(fred_client_or_pool));
//! ```
//!
//! ## Serialization
//! Session records are encoded with one of two backends:
//!
//! - [`serde_json`](https://crates.io/crates/serde_json) (default).
//! - [`rmp-serde`](https://crates.io/crates/rmp-serde) (MessagePack), with the `messagepack` feature.
//!
//! ```toml
//! [dependencies]
//! ruts-kv = { version = "0.1.0", default-features = false, features = ["axum", "messagepack"] }
//! ```
//!
//! # Important Notes
//!
//! ## Middleware Ordering
//! The `SessionLayer` must be applied **before** the `CookieManagerLayer`.
//!
//! ## Best Practices
//!
//! - Enable HTTPS in production and keep `secure` on in the cookie options.
//! - Always set a session expiration time (`max_age`), so records expire
//!   in the store together with the cookie.

pub use cookie;

#[cfg(feature = "axum")]
mod extract;

#[cfg(feature = "redis-store")]
pub use fred;

mod manager;
pub use manager::*;

mod service;
pub use service::*;

mod session;
pub use session::*;

mod storage;
pub use storage::*;

pub mod store;

pub use tower_cookies;
