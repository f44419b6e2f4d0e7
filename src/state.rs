use std::sync::Arc;

use crate::core::{AppPaths, Settings};
use crate::ingest::chunker::ChunkConfig;
use crate::ingest::IngestService;
use crate::llm::{LlmClient, OpenAiClient};
use crate::query::QueryEngine;
use crate::store::{SqliteVectorStore, VectorStoreGateway};

/// Shared application state handed to every request handler.
pub struct AppState {
    pub settings: Settings,
    pub paths: AppPaths,
    pub gateway: Arc<VectorStoreGateway>,
    pub ingest: IngestService,
    pub query: QueryEngine,
}

impl AppState {
    pub async fn initialize() -> anyhow::Result<Arc<Self>> {
        let paths = AppPaths::new();
        let settings = Settings::from_env();

        let store = SqliteVectorStore::open(paths.db_path.clone()).await?;
        let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(
            settings.llm_base_url.clone(),
            settings.llm_api_key.clone(),
            settings.chat_model.clone(),
            settings.embedding_model.clone(),
        ));

        let gateway = Arc::new(VectorStoreGateway::new(Arc::new(store), llm.clone()));
        let ingest = IngestService::new(
            gateway.clone(),
            ChunkConfig {
                size: settings.chunk_size,
                overlap: settings.chunk_overlap,
            },
        );
        let query = QueryEngine::new(gateway.clone(), llm);

        tracing::info!(db = %paths.db_path.display(), "application state initialized");

        Ok(Arc::new(Self {
            settings,
            paths,
            gateway,
            ingest,
            query,
        }))
    }
}
