use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;
use warden_config::{AppConfig, StoreBackend};
use warden_core::system_clock;
use warden_middleware::{build_verifier, AuthGateway, MemoryRecordStore, RecordStore, SessionManager};

use crate::AppState;

/// 组装好的服务
pub struct Services {
    pub state: Arc<AppState>,
    /// 内存存储的定期清理任务
    pub purge_task: Option<JoinHandle<()>>,
}

impl Services {
    pub fn shutdown(self) {
        if let Some(task) = self.purge_task {
            task.abort();
        }
    }
}

async fn build_store(config: &AppConfig) -> Result<(Arc<dyn RecordStore>, Option<JoinHandle<()>>)> {
    match config.store.backend {
        StoreBackend::Memory => {
            let store = Arc::new(MemoryRecordStore::new());
            let task = store.spawn_purge_task(config.session.purge_interval());
            info!(
                purge_interval_secs = config.session.purge_interval_secs,
                "Using in-memory session store"
            );
            let store: Arc<dyn RecordStore> = store;
            Ok((store, Some(task)))
        }
        #[cfg(feature = "redis-session")]
        StoreBackend::Redis => {
            let url = config
                .store
                .url
                .as_deref()
                .ok_or_else(|| anyhow!("store.url is required for the redis backend"))?;
            let store = warden_middleware::RedisRecordStore::connect(url, config.store.op_timeout())
                .await?;
            info!("Using Redis session store");
            let store: Arc<dyn RecordStore> = Arc::new(store);
            Ok((store, None))
        }
        #[cfg(not(feature = "redis-session"))]
        StoreBackend::Redis => Err(anyhow!(
            "the redis store backend requires the redis-session feature"
        )),
    }
}

/// 按配置组装存储、会话管理器和认证网关
pub async fn build_state(config: &AppConfig) -> Result<Services> {
    let clock = system_clock();
    let (store, purge_task) = build_store(config).await?;

    let sessions = Arc::new(SessionManager::with_clock(
        store,
        config.session.default_ttl(),
        clock.clone(),
    ));
    let verifier = build_verifier(&config.auth, clock)?;
    let gateway = AuthGateway::new(verifier, sessions).with_heartbeat(
        config.session.heartbeat_enabled,
        config.session.heartbeat_timeout(),
    );

    Ok(Services {
        state: Arc::new(AppState::new(Arc::new(gateway))),
        purge_task,
    })
}
