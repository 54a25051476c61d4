use anyhow::Result;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use prismgen::config::AppConfig;
use prismgen::core::callbacks::CallbackIngestor;
use prismgen::core::engine::EngineRegistry;
use prismgen::core::library::{LibraryService, Rehoster};
use prismgen::core::quota::QuotaLedger;
use prismgen::core::reconcile::{HttpUpstreamClient, Reconciler};
use prismgen::core::store::RelayStore;
use prismgen::interfaces::web::{ApiServer, ApiServerConfig};

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value) }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = AppConfig::from_env()?;
    let store = Arc::new(RelayStore::new(&config.data_dir).await?);
    let client = reqwest::Client::new();

    let engines = Arc::new(EngineRegistry::from_config(&config, client.clone()));
    let quota = Arc::new(QuotaLedger::new(store.clone()));
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        Arc::new(HttpUpstreamClient::new(
            client.clone(),
            config.studio_api_key.clone(),
        )),
    ));
    let ingestor = Arc::new(CallbackIngestor::new(store.clone()));
    let library = Arc::new(LibraryService::new(
        store.clone(),
        Rehoster::new(
            client,
            non_empty(config.upload_api_url.clone()),
            non_empty(config.upload_api_key.clone()),
        ),
    ));

    info!("prismgen relay starting, data dir {:?}", config.data_dir);
    let server = ApiServer::new(ApiServerConfig {
        store,
        quota,
        engines,
        reconciler,
        ingestor,
        library,
        api_host: config.api_host.clone(),
        api_port: config.api_port,
        admin_token: config.admin_token.clone(),
    });
    server.serve().await
}
