use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::ingest::{IngestionPipeline, filename_of};
use crate::models::{AssistantRef, ChatMessage, IndexedFile, VectorStoreRef};
use crate::session::ConversationSession;
use crate::store::StoreManager;
use crate::transport::Provider;

/// Process-wide context object owning the deployment's remote handles, the
/// file registry, and the current conversation session. An explicit value
/// rather than ambient state, so multiple deployments and tests can run in
/// isolation.
pub struct Orchestrator {
    config: Arc<Config>,
    provider: Arc<dyn Provider>,
    store_manager: StoreManager,
    pipeline: IngestionPipeline,
    assistant: AssistantRef,
    store: VectorStoreRef,
    files: HashMap<String, IndexedFile>,
    session: Option<ConversationSession>,
}

impl Orchestrator {
    /// Initialization order is fixed: ensure vector store, ensure assistant,
    /// bind the assistant's retrieval tool to the store. The session is
    /// created lazily on the first chat interaction.
    pub async fn init(config: Arc<Config>, provider: Arc<dyn Provider>) -> Result<Self> {
        let store_manager = StoreManager::new(provider.clone());

        let store = store_manager
            .ensure_vector_store(&config.assistant.store_name)
            .await?;
        let assistant = store_manager
            .ensure_assistant(
                &config.assistant.name,
                &config.assistant.model,
                &config.assistant.instructions,
            )
            .await?;
        let assistant = store_manager.bind(&assistant, &store).await?;

        tracing::info!(
            "Orchestrator ready: assistant {} bound to store {}",
            assistant.id,
            store.id
        );

        let pipeline = IngestionPipeline::new(provider.clone(), config.poll.clone());
        Ok(Self {
            config,
            provider,
            store_manager,
            pipeline,
            assistant,
            store,
            files: HashMap::new(),
            session: None,
        })
    }

    /// Ingest a local file into the knowledge store and re-bind the
    /// assistant so retrieval sees the updated file set. A registry hit
    /// short-circuits without any remote call; a failed ingestion leaves the
    /// registry untouched and does not disturb chat.
    pub async fn ingest_file(&mut self, path: &Path) -> Result<IndexedFile> {
        let filename = filename_of(path)?;
        if let Some(existing) = self.files.get(&filename) {
            tracing::debug!("'{}' already in registry, skipping ingestion", filename);
            return Ok(existing.clone());
        }

        let indexed = self.pipeline.ingest(&self.store, path).await?;
        self.assistant = self.store_manager.bind(&self.assistant, &self.store).await?;
        self.files.insert(indexed.filename.clone(), indexed.clone());
        Ok(indexed)
    }

    /// Send a user message through the current session, creating the session
    /// (and its provider thread) on first use.
    pub async fn chat(&mut self, text: &str) -> Result<String> {
        let session = self.session.get_or_insert_with(|| {
            ConversationSession::new(self.provider.clone(), self.config.poll.clone())
        });
        session.send(&self.assistant.id, text).await
    }

    pub fn assistant(&self) -> &AssistantRef {
        &self.assistant
    }

    pub fn store(&self) -> &VectorStoreRef {
        &self.store
    }

    /// Local history of the current session; empty before the first chat.
    pub fn history(&self) -> &[ChatMessage] {
        self.session.as_ref().map(|s| s.history()).unwrap_or(&[])
    }

    pub fn indexed_files(&self) -> impl Iterator<Item = &IndexedFile> {
        self.files.values()
    }
}
