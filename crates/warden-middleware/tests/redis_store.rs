//! 需要本地 Redis：`REDIS_URL=redis://127.0.0.1/ cargo test --features redis-session -- --ignored`
#![cfg(feature = "redis-session")]

use std::sync::Arc;
use std::time::Duration;
use warden_middleware::{NewSession, RecordStore, RedisRecordStore, SessionManager};

async fn connect() -> RedisRecordStore {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    RedisRecordStore::connect(&url, Duration::from_secs(1))
        .await
        .unwrap()
}

#[tokio::test]
#[ignore]
async fn test_redis_session_lifecycle() {
    let store = Arc::new(connect().await);
    let manager = SessionManager::new(store.clone(), Duration::from_secs(60));
    let user_id = format!("redis-test-{}", warden_middleware::session::generate_session_id());

    let first = manager.create(NewSession::new(user_id.as_str())).await.unwrap();
    let second = manager.create(NewSession::new(user_id.as_str())).await.unwrap();

    assert!(manager.try_touch(&first).await.unwrap());
    let ttl = manager.remaining_ttl(&first).await.unwrap().unwrap();
    assert!(ttl <= Duration::from_secs(60));

    assert_eq!(manager.list_active_for_user(&user_id).await.unwrap().len(), 2);
    assert_eq!(manager.revoke_all_for_user(&user_id).await.unwrap(), 2);
    assert!(manager.get(&second).await.unwrap().is_none());
    assert!(!store
        .exists(&warden_middleware::session::user_index_key(&user_id))
        .await
        .unwrap());
}
