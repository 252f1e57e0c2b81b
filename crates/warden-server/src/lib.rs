pub mod api;
pub mod bootstrap;
pub mod shutdown;

use std::sync::Arc;
use warden_middleware::{AuthGateway, SessionManager};

pub use api::create_router;
pub use bootstrap::{build_state, Services};

/// 路由共享状态
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub gateway: Arc<AuthGateway>,
}

impl AppState {
    pub fn new(gateway: Arc<AuthGateway>) -> Self {
        Self {
            sessions: Arc::clone(gateway.sessions()),
            gateway,
        }
    }
}
