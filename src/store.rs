use std::sync::Arc;

use crate::error::Result;
use crate::models::{AssistantRef, VectorStoreRef};
use crate::transport::Provider;

/// Page size for the recency-ordered assistant listing used during
/// find-or-create. One deployment owns at most one assistant, so the
/// match is expected near the top of the first page.
const ASSISTANT_PAGE_LIMIT: u32 = 20;

/// Ensures the deployment's named vector store and assistant exist exactly
/// once and keeps the assistant's retrieval tool pointed at the store.
/// The only component permitted to mutate the remote assistant/store pair.
pub struct StoreManager {
    provider: Arc<dyn Provider>,
}

impl StoreManager {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    /// Find-or-create the vector store by exact name match. Repeated calls
    /// across restarts resolve to the same remote store.
    pub async fn ensure_vector_store(&self, name: &str) -> Result<VectorStoreRef> {
        let stores = self.provider.list_vector_stores().await?;
        if let Some(existing) = stores.into_iter().find(|s| s.name.as_deref() == Some(name)) {
            tracing::debug!("Reusing vector store '{}' ({})", name, existing.id);
            return Ok(VectorStoreRef {
                id: existing.id,
                name: name.to_string(),
            });
        }

        tracing::info!("Vector store '{}' not found, creating", name);
        let created = self.provider.create_vector_store(name).await?;
        Ok(VectorStoreRef {
            id: created.id,
            name: name.to_string(),
        })
    }

    /// Find-or-create the assistant by exact name match. An existing
    /// assistant gets its instructions refreshed so a prior deployment's
    /// prompt never goes stale; a missing one is created with the retrieval
    /// tool enabled.
    pub async fn ensure_assistant(
        &self,
        name: &str,
        model: &str,
        instructions: &str,
    ) -> Result<AssistantRef> {
        let assistants = self.provider.list_assistants(ASSISTANT_PAGE_LIMIT).await?;
        if let Some(existing) = assistants
            .into_iter()
            .find(|a| a.name.as_deref() == Some(name))
        {
            tracing::debug!("Reusing assistant '{}' ({})", name, existing.id);
            let updated = self
                .provider
                .update_assistant(&existing.id, Some(instructions.to_string()), None)
                .await?;
            return Ok(AssistantRef {
                id: updated.id,
                name: name.to_string(),
                model: updated.model,
            });
        }

        tracing::info!("Assistant '{}' not found, creating", name);
        let created = self
            .provider
            .create_assistant(name, model, instructions)
            .await?;
        Ok(AssistantRef {
            id: created.id,
            name: name.to_string(),
            model: created.model,
        })
    }

    /// Re-point the assistant's retrieval tool at the store. Must be called
    /// on first creation and after every successful ingestion; mutates the
    /// remote assistant configuration.
    pub async fn bind(
        &self,
        assistant: &AssistantRef,
        store: &VectorStoreRef,
    ) -> Result<AssistantRef> {
        let updated = self
            .provider
            .update_assistant(&assistant.id, None, Some(vec![store.id.clone()]))
            .await?;
        tracing::debug!("Bound assistant {} to store {}", updated.id, store.id);
        Ok(AssistantRef {
            id: updated.id,
            name: assistant.name.clone(),
            model: updated.model,
        })
    }
}
