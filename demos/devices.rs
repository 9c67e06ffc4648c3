use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use ruts_kv::store::memory::MemoryStore;
use ruts_kv::{
    CookieOptions, CookieSessionFactory, CookieSessionStorage, Indexed, IndexedSessionManager,
    KvSessionStorageBuilder, Session, SessionLayer,
};
use serde::Serialize;
use std::sync::Arc;
use tower_cookies::CookieManagerLayer;

type Storage = Indexed<CookieSessionStorage<IndexedSessionManager<MemoryStore>>, MemoryStore>;

#[derive(Serialize)]
struct Device {
    id: String,
    agent: Option<String>,
}

async fn login(Path(user): Path<String>, session: Session) -> String {
    session
        .set("user_id", &user)
        .map_err(|e| e.to_string())
        .unwrap();
    session
        .set("agent", &format!("device-{}", rand_suffix()))
        .map_err(|e| e.to_string())
        .unwrap();
    format!("logged in as {user}")
}

async fn devices(
    Path(user): Path<String>,
    State(storage): State<Arc<Storage>>,
) -> Json<Vec<Device>> {
    let ids = storage
        .list_session_ids_for_user(&user)
        .await
        .map_err(|e| e.to_string())
        .unwrap();

    let mut devices = Vec::with_capacity(ids.len());
    for id in ids {
        let data = storage
            .manager()
            .read(Some(&id.to_string()))
            .await
            .map_err(|e| e.to_string())
            .unwrap();
        devices.push(Device {
            id: id.to_string(),
            agent: data.and_then(|data| data.get("agent").ok().flatten()),
        });
    }

    Json(devices)
}

async fn logout_everywhere(
    Path(user): Path<String>,
    State(storage): State<Arc<Storage>>,
) -> String {
    let count = storage
        .destroy_all_for_user(&user)
        .await
        .map_err(|e| e.to_string())
        .unwrap();
    format!("{count} sessions revoked")
}

fn rand_suffix() -> u32 {
    rand::random()
}

#[tokio::main]
async fn main() {
    let storage = KvSessionStorageBuilder::new()
        .store(Arc::new(MemoryStore::new()))
        .session_factory(CookieSessionFactory)
        .cookie(CookieOptions::build().name("session").max_age(24 * 60 * 60).secure(false))
        .build_indexed(|data| data.get::<String>("user_id").ok().flatten())
        .unwrap();
    let storage = Arc::new(storage);

    let app = Router::new()
        .route("/login/{user}", get(login))
        .route("/users/{user}/devices", get(devices))
        .route("/users/{user}/logout", post(logout_everywhere))
        .with_state(Arc::clone(&storage))
        .layer(SessionLayer::from(storage.as_ref()))
        .layer(CookieManagerLayer::new());

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
