pub(crate) mod auth;
mod handlers;
mod router;

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::core::callbacks::CallbackIngestor;
use crate::core::engine::EngineRegistry;
use crate::core::library::LibraryService;
use crate::core::quota::QuotaLedger;
use crate::core::reconcile::Reconciler;
use crate::core::store::RelayStore;

pub struct ApiServer {
    state: AppState,
}

pub struct ApiServerConfig {
    pub store: Arc<RelayStore>,
    pub quota: Arc<QuotaLedger>,
    pub engines: Arc<EngineRegistry>,
    pub reconciler: Arc<Reconciler>,
    pub ingestor: Arc<CallbackIngestor>,
    pub library: Arc<LibraryService>,
    pub api_host: String,
    pub api_port: u16,
    pub admin_token: String,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<RelayStore>,
    pub(crate) quota: Arc<QuotaLedger>,
    pub(crate) engines: Arc<EngineRegistry>,
    pub(crate) reconciler: Arc<Reconciler>,
    pub(crate) ingestor: Arc<CallbackIngestor>,
    pub(crate) library: Arc<LibraryService>,
    pub(crate) api_host: String,
    pub(crate) api_port: u16,
    pub(crate) admin_token: String,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self {
            state: AppState {
                store: config.store,
                quota: config.quota,
                engines: config.engines,
                reconciler: config.reconciler,
                ingestor: config.ingestor,
                library: config.library,
                api_host: config.api_host,
                api_port: config.api_port,
                admin_token: config.admin_token,
            },
        }
    }

    pub async fn serve(self) -> Result<()> {
        let addr = format!("{}:{}", self.state.api_host, self.state.api_port);
        let app = router::build_api_router(self.state);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("API server running at http://{addr}");
        axum::serve(listener, app).await?;
        Ok(())
    }
}
