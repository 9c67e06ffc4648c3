mod common;

#[cfg(test)]
mod tests {
    use super::*;

    use common::*;
    use ruts_kv::store::KvStore;
    use ruts_kv::store::memory::MemoryStore;
    use ruts_kv::{
        Error, Id, IndexedSessionManager, KvSessionOptions, SessionData, SessionManager,
        session_key,
    };
    use std::sync::Arc;
    use time::{Duration, OffsetDateTime};

    type Store = CountingStore<MemoryStore>;

    fn counting_store() -> Arc<Store> {
        Arc::new(CountingStore::new(MemoryStore::new()))
    }

    fn manager(store: &Arc<Store>, options: KvSessionOptions) -> SessionManager<Store> {
        SessionManager::new(Arc::clone(store), options)
    }

    fn indexed_manager(store: &Arc<Store>) -> IndexedSessionManager<Store> {
        IndexedSessionManager::new(Arc::clone(store), KvSessionOptions::default(), |data| {
            data.get::<String>("userRef").ok().flatten()
        })
    }

    fn data_with(key: &str, value: &str) -> SessionData {
        let mut data = SessionData::new();
        data.insert(key, &value).unwrap();
        data
    }

    fn user_data(user: &str) -> SessionData {
        let mut data = data_with("userRef", user);
        data.insert("profile", &create_test_session()).unwrap();
        data
    }

    fn stored_ttl(store: &Store, id: &Id) -> i64 {
        store.inner().ttl(&session_key("_session:", id))
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let store = counting_store();
        let manager = manager(&store, KvSessionOptions::default());

        let mut data = data_with("val", "x");
        data.insert("session", &create_test_session()).unwrap();

        let id = manager.create(&data, None).await.unwrap();
        let read = manager.read(Some(&id.to_string())).await.unwrap();
        assert_eq!(read, Some(data));

        let session: TestSession = read.unwrap().get("session").unwrap().unwrap();
        assert_eq!(session, create_test_session());
    }

    #[tokio::test]
    async fn test_empty_create_is_not_persisted() {
        let store = counting_store();
        let manager = manager(&store, KvSessionOptions::default());

        let id = manager.create(&SessionData::new(), None).await.unwrap();
        assert_eq!(id.to_string().len(), 16);
        assert_eq!(store.writes(), 0);

        let read = manager.read(Some(&id.to_string())).await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_empty_create_with_save_uninitialized() {
        let store = counting_store();
        let manager = manager(&store, KvSessionOptions::build().save_uninitialized(true));

        let id = manager.create(&SessionData::new(), None).await.unwrap();
        assert_eq!(store.writes(), 1);
        assert_eq!(store.count("set"), 1);

        let read = manager.read(Some(&id.to_string())).await.unwrap();
        assert_eq!(read, Some(SessionData::new()));
    }

    #[tokio::test]
    async fn test_update_overwrites_everything() {
        let store = counting_store();
        let manager = manager(&store, KvSessionOptions::default());

        let mut data = data_with("a", "1");
        data.insert("b", &"2").unwrap();
        let id = manager.create(&data, None).await.unwrap().to_string();

        let replacement = data_with("c", "3");
        manager.update(Some(&id), &replacement, None).await.unwrap();

        let read = manager.read(Some(&id)).await.unwrap().unwrap();
        assert_eq!(read, replacement);
        assert!(!read.contains_key("a"));
        assert!(!read.contains_key("b"));
    }

    #[tokio::test]
    async fn test_update_always_writes() {
        let store = counting_store();
        let manager = manager(&store, KvSessionOptions::default());

        let id = manager.create(&SessionData::new(), None).await.unwrap();
        assert_eq!(store.writes(), 0);

        manager
            .update(Some(&id.to_string()), &SessionData::new(), None)
            .await
            .unwrap();
        assert_eq!(store.count("set"), 1);

        let read = manager.read(Some(&id.to_string())).await.unwrap();
        assert_eq!(read, Some(SessionData::new()));
    }

    #[tokio::test]
    async fn test_expiry_becomes_ttl() {
        let store = counting_store();
        let manager = manager(&store, KvSessionOptions::default());
        let thirty_days = 30 * 24 * 60 * 60;

        let expires = OffsetDateTime::now_utc() + Duration::days(30);
        let id = manager.create(&data_with("val", "x"), Some(expires)).await.unwrap();
        let ttl = stored_ttl(&store, &id);
        assert!((thirty_days - 1..=thirty_days).contains(&ttl), "ttl was {ttl}");

        let id = manager.create(&data_with("val", "x"), None).await.unwrap();
        assert_eq!(stored_ttl(&store, &id), -1);
    }

    #[tokio::test]
    async fn test_past_expiry_is_not_readable() {
        let store = counting_store();
        let manager = manager(&store, KvSessionOptions::default());

        let expires = OffsetDateTime::now_utc() - Duration::minutes(1);
        let id = manager.create(&data_with("val", "x"), Some(expires)).await.unwrap();

        let read = manager.read(Some(&id.to_string())).await.unwrap();
        assert!(read.is_none());
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let store = counting_store();
        let manager = manager(&store, KvSessionOptions::default());

        let id = manager.create(&data_with("val", "x"), None).await.unwrap();
        assert!(manager.destroy(&id).await.unwrap());
        assert!(manager.read(Some(&id.to_string())).await.unwrap().is_none());

        assert!(!manager.destroy(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_id_is_a_no_op() {
        let store = counting_store();
        let manager = manager(&store, KvSessionOptions::default());

        assert!(manager.read(None).await.unwrap().is_none());
        manager.update(None, &data_with("val", "x"), None).await.unwrap();
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_id_is_not_looked_up() {
        let store = counting_store();
        let manager = manager(&store, KvSessionOptions::default());

        assert!(manager.read(Some("not-an-id")).await.unwrap().is_none());
        manager
            .update(Some("../../etc/passwd"), &data_with("val", "x"), None)
            .await
            .unwrap();
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end() {
        let store = counting_store();
        let manager = manager(&store, KvSessionOptions::default());

        let expires = OffsetDateTime::now_utc() + Duration::hours(1);
        let id = manager.create(&data_with("val", "x"), Some(expires)).await.unwrap();
        let id_str = id.to_string();
        assert_eq!(id_str.len(), 16);
        assert!(id_str.chars().all(|c| c.is_ascii_hexdigit()));

        let read = manager.read(Some(&id_str)).await.unwrap().unwrap();
        assert_eq!(read.get::<String>("val").unwrap().as_deref(), Some("x"));

        let ttl = stored_ttl(&store, &id);
        assert!((3599..=3600).contains(&ttl), "ttl was {ttl}");

        manager.destroy(&id).await.unwrap();
        assert!(manager.read(Some(&id_str)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_sessions_for_user() {
        let store = counting_store();
        let manager = indexed_manager(&store);

        let mut ids = Vec::new();
        for name in ["first", "second", "third"] {
            let mut data = user_data("u1");
            data.insert("name", &name).unwrap();
            ids.push(manager.create(&data, None).await.unwrap());
        }
        manager.create(&user_data("u2"), None).await.unwrap();
        manager.create(&data_with("val", "anonymous"), None).await.unwrap();

        let sessions = manager.list_sessions_for_user("u1").await.unwrap();
        let names: Vec<String> = sessions
            .iter()
            .map(|data| data.get("name").unwrap().unwrap())
            .collect();
        assert_eq!(names, ["third", "second", "first"]);

        let listed = manager.list_session_ids_for_user("u1").await.unwrap();
        assert_eq!(listed, [ids[2], ids[1], ids[0]]);

        manager.destroy(&ids[1]).await.unwrap();
        let listed = manager.list_session_ids_for_user("u1").await.unwrap();
        assert_eq!(listed, [ids[2], ids[0]]);

        let members = store.inner().lrange("_device:u1", 0, -1).await.unwrap();
        assert_eq!(members, [ids[2].to_string(), ids[0].to_string()]);
    }

    #[tokio::test]
    async fn test_list_sessions_for_unknown_user() {
        let store = counting_store();
        let manager = indexed_manager(&store);

        assert!(manager.list_sessions_for_user("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_skips_stale_entries() {
        let store = counting_store();
        let manager = indexed_manager(&store);

        let live = manager.create(&user_data("u1"), None).await.unwrap();
        let gone = manager.create(&user_data("u1"), None).await.unwrap();

        // the record disappears without going through the manager
        store
            .inner()
            .del(&session_key("_session:", &gone))
            .await
            .unwrap();
        store.inner().lpush("_device:u1", "garbage").await.unwrap();

        let listed = manager.list_session_ids_for_user("u1").await.unwrap();
        assert_eq!(listed, [live]);
    }

    #[tokio::test]
    async fn test_update_after_record_is_gone_keeps_one_index_entry() {
        let store = counting_store();
        let manager = indexed_manager(&store);

        let id = manager.create(&user_data("u1"), None).await.unwrap();
        store
            .inner()
            .del(&session_key("_session:", &id))
            .await
            .unwrap();

        manager
            .update(Some(&id.to_string()), &user_data("u1"), None)
            .await
            .unwrap();

        let members = store.inner().lrange("_device:u1", 0, -1).await.unwrap();
        assert_eq!(members, [id.to_string()]);
        assert_eq!(manager.list_sessions_for_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unindexed_session_does_not_touch_lists() {
        let store = counting_store();
        let manager = indexed_manager(&store);

        let id = manager.create(&data_with("val", "x"), None).await.unwrap();
        manager.destroy(&id).await.unwrap();

        assert_eq!(store.count("lpush"), 0);
        assert_eq!(store.count("lrem"), 0);
    }

    #[tokio::test]
    async fn test_update_moves_session_between_users() {
        let store = counting_store();
        let manager = indexed_manager(&store);

        let id = manager.create(&data_with("val", "x"), None).await.unwrap();
        let id_str = id.to_string();

        // login
        manager.update(Some(&id_str), &user_data("u1"), None).await.unwrap();
        assert_eq!(manager.list_session_ids_for_user("u1").await.unwrap(), [id]);

        // same user again: no second index entry
        manager.update(Some(&id_str), &user_data("u1"), None).await.unwrap();
        let members = store.inner().lrange("_device:u1", 0, -1).await.unwrap();
        assert_eq!(members, [id_str.clone()]);

        // switch user
        manager.update(Some(&id_str), &user_data("u2"), None).await.unwrap();
        assert!(manager.list_session_ids_for_user("u1").await.unwrap().is_empty());
        assert_eq!(manager.list_session_ids_for_user("u2").await.unwrap(), [id]);

        // logout
        manager.update(Some(&id_str), &data_with("val", "x"), None).await.unwrap();
        assert!(manager.list_session_ids_for_user("u2").await.unwrap().is_empty());
        assert!(manager.read(Some(&id_str)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_destroy_all_for_user() {
        let store = counting_store();
        let manager = indexed_manager(&store);

        let first = manager.create(&user_data("u1"), None).await.unwrap();
        let second = manager.create(&user_data("u1"), None).await.unwrap();
        let other = manager.create(&user_data("u2"), None).await.unwrap();
        store.inner().lpush("_device:u1", "garbage").await.unwrap();

        assert_eq!(manager.destroy_all_for_user("u1").await.unwrap(), 2);

        for id in [first, second] {
            assert!(manager.read(Some(&id.to_string())).await.unwrap().is_none());
        }
        assert!(store.inner().lrange("_device:u1", 0, -1).await.unwrap().is_empty());
        assert_eq!(manager.list_session_ids_for_user("u2").await.unwrap(), [other]);

        assert_eq!(manager.destroy_all_for_user("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_custom_prefixes() {
        let store = counting_store();
        let options = KvSessionOptions::build()
            .key_prefix("app:s:")
            .device_key_prefix("app:d:");
        let manager = IndexedSessionManager::new(Arc::clone(&store), options, |data| {
            data.get::<String>("userRef").ok().flatten()
        });

        let id = manager.create(&user_data("u1"), None).await.unwrap();

        let record = store.inner().get(&format!("app:s:{id}")).await.unwrap();
        assert!(record.is_some());
        let members = store.inner().lrange("app:d:u1", 0, -1).await.unwrap();
        assert_eq!(members, [id.to_string()]);
    }

    #[tokio::test]
    async fn test_undecodable_record_can_be_destroyed() {
        let store = counting_store();
        let manager = indexed_manager(&store);

        let id = Id::generate();
        let key = session_key("_session:", &id);
        store.inner().set(&key, b"\xff\xfe", None).await.unwrap();

        let read = manager.read(Some(&id.to_string())).await;
        assert!(matches!(read, Err(Error::Store(_))));

        assert!(manager.destroy(&id).await.unwrap());
        assert!(store.inner().get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_errors_are_returned() {
        let manager = IndexedSessionManager::new(
            Arc::new(FailingStore),
            KvSessionOptions::default(),
            |data| data.get::<String>("userRef").ok().flatten(),
        );

        let created = manager.create(&user_data("u1"), None).await;
        assert!(matches!(created, Err(Error::Store(_))));

        let read = manager.read(Some(&Id::generate().to_string())).await;
        assert!(matches!(read, Err(Error::Store(_))));

        let listed = manager.list_sessions_for_user("u1").await;
        assert!(matches!(listed, Err(Error::Store(_))));

        // nothing to write, nothing to fail
        let id = manager.create(&SessionData::new(), None).await;
        assert!(id.is_ok());
    }
}
