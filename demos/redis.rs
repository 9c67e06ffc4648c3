use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use fred::clients::Client;
use fred::interfaces::ClientLike;
use ruts_kv::store::redis::RedisStore;
use ruts_kv::{
    CookieOptions, CookieSessionFactory, CookieSessionStorage, Indexed, IndexedSessionManager,
    KvSessionStorageBuilder, Session, SessionData, SessionLayer,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;

type Storage = Indexed<
    CookieSessionStorage<IndexedSessionManager<RedisStore<Client>>>,
    RedisStore<Client>,
>;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct User {
    id: i64,
    name: String,
}

fn pick_user_id(data: &SessionData) -> Option<String> {
    let user: User = data.get("user").ok().flatten()?;
    Some(user.id.to_string())
}

fn routes(storage: Arc<Storage>) -> Router {
    Router::new()
        .route(
            "/count",
            get(|session: Session| async move {
                let count: i64 = session
                    .get("count")
                    .map_err(|e| e.to_string())
                    .unwrap()
                    .unwrap_or(0)
                    + 1;
                session
                    .set("count", &count)
                    .map_err(|e| e.to_string())
                    .unwrap();
                format!("visits: {count}")
            }),
        )
        .route(
            "/login",
            get(|session: Session| async move {
                let user = User {
                    id: 34895634,
                    name: String::from("John Doe"),
                };
                session
                    .set("user", &user)
                    .map_err(|e| e.to_string())
                    .unwrap();
            }),
        )
        .route(
            "/logout",
            get(|session: Session| async move {
                session.destroy();
            }),
        )
        .route(
            "/sessions",
            get(|State(storage): State<Arc<Storage>>| async move {
                let sessions = storage
                    .list_sessions_for_user("34895634")
                    .await
                    .map_err(|e| e.to_string())
                    .unwrap();
                Json(sessions)
            }),
        )
        .with_state(storage)
}

#[tokio::main]
async fn main() {
    // Set up Redis client
    let client = Client::default();
    client.init().await.unwrap();

    // Configure session options
    let cookie_options = CookieOptions::build()
        .name("session")
        .http_only(true)
        .same_site(cookie::SameSite::Lax)
        .secure(true)
        .max_age(60 * 60)
        .path("/");

    let storage = KvSessionStorageBuilder::new()
        .store(Arc::new(RedisStore::new(Arc::new(client))))
        .session_factory(CookieSessionFactory)
        .cookie(cookie_options)
        .key_prefix("demo:session:")
        .device_key_prefix("demo:device:")
        .build_indexed(pick_user_id)
        .unwrap();
    let storage = Arc::new(storage);

    // Create session layer
    let session_layer = SessionLayer::from(storage.as_ref());

    // Set up router with session management
    let app = routes(storage)
        .layer(session_layer)
        .layer(CookieManagerLayer::new());

    // Run the server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
