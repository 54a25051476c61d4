use std::sync::Arc;

use crate::core::callbacks::CallbackIngestor;
use crate::core::engine::EngineRegistry;
use crate::core::library::{LibraryService, Rehoster};
use crate::core::quota::QuotaLedger;
use crate::core::reconcile::{Reconciler, UpstreamClient};
use crate::core::store::{RelayStore, test_store};
use crate::interfaces::web::AppState;

pub(crate) async fn test_state() -> AppState {
    let store = Arc::new(test_store().await);
    let client = reqwest::Client::new();
    let upstream = Arc::new(crate::core::reconcile::HttpUpstreamClient::new(
        client.clone(),
        "test-key".to_string(),
    ));
    assemble(store, EngineRegistry::new(), upstream, client)
}

pub(crate) async fn test_state_with(
    engines: EngineRegistry,
    upstream: Arc<dyn UpstreamClient>,
) -> AppState {
    let store = Arc::new(test_store().await);
    let client = reqwest::Client::new();
    assemble(store, engines, upstream, client)
}

fn assemble(
    store: Arc<RelayStore>,
    engines: EngineRegistry,
    upstream: Arc<dyn UpstreamClient>,
    client: reqwest::Client,
) -> AppState {
    AppState {
        quota: Arc::new(QuotaLedger::new(store.clone())),
        engines: Arc::new(engines),
        reconciler: Arc::new(Reconciler::new(store.clone(), upstream)),
        ingestor: Arc::new(CallbackIngestor::new(store.clone())),
        library: Arc::new(LibraryService::new(
            store.clone(),
            Rehoster::new(client, None, None),
        )),
        store,
        api_host: "127.0.0.1".to_string(),
        api_port: 8750,
        admin_token: "admin-123".to_string(),
    }
}
