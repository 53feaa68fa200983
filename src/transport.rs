use async_trait::async_trait;
use rand::Rng;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

#[cfg(test)]
use mockall::automock;

use crate::config::{ProviderConfig, RetryConfig};
use crate::error::{Result, SupernoteError};
use crate::models::{
    AssistantObject, FileObject, ListResponse, MessageObject, Role, RunObject, ThreadObject,
    VectorStoreFile, VectorStoreObject,
};

/// Remote surface of the conversational-AI provider. No logic lives here;
/// the components above this trait own find-or-create, idempotency, and
/// polling decisions.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Provider: Send + Sync {
    /// List assistants, most recently created first.
    async fn list_assistants(&self, limit: u32) -> Result<Vec<AssistantObject>>;
    async fn create_assistant(
        &self,
        name: &str,
        model: &str,
        instructions: &str,
    ) -> Result<AssistantObject>;
    /// Update assistant instructions and/or its retrieval tool binding.
    async fn update_assistant(
        &self,
        assistant_id: &str,
        instructions: Option<String>,
        vector_store_ids: Option<Vec<String>>,
    ) -> Result<AssistantObject>;

    async fn list_vector_stores(&self) -> Result<Vec<VectorStoreObject>>;
    async fn create_vector_store(&self, name: &str) -> Result<VectorStoreObject>;

    async fn list_store_files(&self, store_id: &str) -> Result<Vec<VectorStoreFile>>;
    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject>;
    /// Upload local file bytes with retrieval purpose.
    async fn upload_file(&self, path: &Path) -> Result<FileObject>;
    async fn attach_file(&self, store_id: &str, file_id: &str) -> Result<VectorStoreFile>;
    async fn retrieve_store_file(&self, store_id: &str, file_id: &str) -> Result<VectorStoreFile>;

    async fn create_thread(&self) -> Result<ThreadObject>;
    async fn create_message(&self, thread_id: &str, role: Role, text: &str)
    -> Result<MessageObject>;
    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<RunObject>;
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject>;
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject>;
    /// List thread messages in creation order.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<MessageObject>>;
}

const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");
const LIST_PAGE_LIMIT: u32 = 100;

/// HTTP implementation of [`Provider`] against an OpenAI-compatible
/// assistants API. Transient failures (connect/timeout, 429, 5xx) are
/// retried with exponential backoff and jitter before surfacing as
/// `ProviderUnavailable`.
pub struct HttpProvider {
    client: Client,
    api_key: String,
    base_url: String,
    retry: RetryConfig,
}

impl HttpProvider {
    pub fn new(provider: &ProviderConfig, retry: RetryConfig) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            api_key: provider.api_key.clone(),
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
    }

    /// Send a request built by `build`, retrying transient failures up to
    /// the configured attempt bound. `build` is called once per attempt so
    /// non-reusable bodies (multipart) can be reconstructed.
    async fn execute<T, F>(&self, op: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(|e| {
                            SupernoteError::unavailable(format!(
                                "{op}: failed to parse response: {e}"
                            ))
                        });
                    }

                    let retryable =
                        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable || attempts >= self.retry.max_attempts {
                        let body = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "<unreadable body>".to_string());
                        return Err(SupernoteError::unavailable(format!(
                            "{op}: HTTP {status} after {attempts} attempt(s): {body}"
                        )));
                    }
                    tracing::warn!("{}: HTTP {} on attempt {}, retrying", op, status, attempts);
                }
                Err(e) => {
                    let retryable = e.is_connect() || e.is_timeout();
                    if !retryable || attempts >= self.retry.max_attempts {
                        return Err(SupernoteError::unavailable(format!(
                            "{op}: request failed after {attempts} attempt(s): {e}"
                        )));
                    }
                    tracing::warn!("{}: send failed on attempt {}: {}, retrying", op, attempts, e);
                }
            }

            sleep(backoff_delay(&self.retry, attempts)).await;
        }
    }

    /// Fetch a list endpoint to exhaustion, following the `after` cursor
    /// across pages. Threads and stores can outgrow a single page; a
    /// truncated listing would make the reply fetch and the
    /// filename-idempotency check silently miss entries.
    async fn fetch_all<T>(&self, op: &str, base_path: &str) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let path = page_path(base_path, after.as_deref());
            let page: ListResponse<T> = self
                .execute(op, || self.request(Method::GET, &path))
                .await?;
            items.extend(page.data);
            if !page.has_more {
                return Ok(items);
            }
            match page.last_id {
                Some(id) => after = Some(id),
                // more pages claimed but no cursor to reach them
                None => {
                    tracing::warn!("{}: has_more set without last_id, stopping early", op);
                    return Ok(items);
                }
            }
        }
    }
}

/// Append the pagination cursor to an already-query-bearing list path.
fn page_path(base: &str, after: Option<&str>) -> String {
    match after {
        Some(cursor) => format!("{base}&after={cursor}"),
        None => base.to_string(),
    }
}

/// Exponential backoff with jitter, capped at the configured maximum.
fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let base = retry
        .initial_delay_ms
        .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let capped = base.min(retry.max_delay_ms) as f64;
    let jitter = 1.0 + retry.jitter_factor * rand::thread_rng().gen_range(-1.0..=1.0);
    Duration::from_millis((capped * jitter).max(0.0) as u64)
}

#[async_trait]
impl Provider for HttpProvider {
    async fn list_assistants(&self, limit: u32) -> Result<Vec<AssistantObject>> {
        let path = format!("/assistants?order=desc&limit={limit}");
        let list: ListResponse<AssistantObject> = self
            .execute("list assistants", || self.request(Method::GET, &path))
            .await?;
        Ok(list.data)
    }

    async fn create_assistant(
        &self,
        name: &str,
        model: &str,
        instructions: &str,
    ) -> Result<AssistantObject> {
        let body = json!({
            "name": name,
            "model": model,
            "instructions": instructions,
            "tools": [{"type": "file_search"}],
        });
        self.execute("create assistant", || {
            self.request(Method::POST, "/assistants").json(&body)
        })
        .await
    }

    async fn update_assistant(
        &self,
        assistant_id: &str,
        instructions: Option<String>,
        vector_store_ids: Option<Vec<String>>,
    ) -> Result<AssistantObject> {
        let mut body = serde_json::Map::new();
        if let Some(instructions) = &instructions {
            body.insert("instructions".to_string(), json!(instructions));
        }
        if let Some(ids) = &vector_store_ids {
            body.insert(
                "tool_resources".to_string(),
                json!({"file_search": {"vector_store_ids": ids}}),
            );
        }
        let body = serde_json::Value::Object(body);
        let path = format!("/assistants/{assistant_id}");
        self.execute("update assistant", || {
            self.request(Method::POST, &path).json(&body)
        })
        .await
    }

    async fn list_vector_stores(&self) -> Result<Vec<VectorStoreObject>> {
        let list: ListResponse<VectorStoreObject> = self
            .execute("list vector stores", || {
                self.request(Method::GET, "/vector_stores")
            })
            .await?;
        Ok(list.data)
    }

    async fn create_vector_store(&self, name: &str) -> Result<VectorStoreObject> {
        let body = json!({"name": name});
        self.execute("create vector store", || {
            self.request(Method::POST, "/vector_stores").json(&body)
        })
        .await
    }

    async fn list_store_files(&self, store_id: &str) -> Result<Vec<VectorStoreFile>> {
        let path = format!("/vector_stores/{store_id}/files?limit={LIST_PAGE_LIMIT}");
        self.fetch_all("list store files", &path).await
    }

    async fn retrieve_file(&self, file_id: &str) -> Result<FileObject> {
        let path = format!("/files/{file_id}");
        self.execute("retrieve file", || self.request(Method::GET, &path))
            .await
    }

    async fn upload_file(&self, path: &Path) -> Result<FileObject> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SupernoteError::Internal(format!("Path has no usable filename: {}", path.display()))
            })?
            .to_string();
        let bytes = tokio::fs::read(path).await?;

        self.execute("upload file", || {
            let form = Form::new()
                .text("purpose", "assistants")
                .part("file", Part::bytes(bytes.clone()).file_name(filename.clone()));
            self.request(Method::POST, "/files").multipart(form)
        })
        .await
    }

    async fn attach_file(&self, store_id: &str, file_id: &str) -> Result<VectorStoreFile> {
        let body = json!({"file_id": file_id});
        let path = format!("/vector_stores/{store_id}/files");
        self.execute("attach file", || {
            self.request(Method::POST, &path).json(&body)
        })
        .await
    }

    async fn retrieve_store_file(&self, store_id: &str, file_id: &str) -> Result<VectorStoreFile> {
        let path = format!("/vector_stores/{store_id}/files/{file_id}");
        self.execute("retrieve store file", || self.request(Method::GET, &path))
            .await
    }

    async fn create_thread(&self) -> Result<ThreadObject> {
        let body = json!({});
        self.execute("create thread", || {
            self.request(Method::POST, "/threads").json(&body)
        })
        .await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        role: Role,
        text: &str,
    ) -> Result<MessageObject> {
        let body = json!({"role": role.as_str(), "content": text});
        let path = format!("/threads/{thread_id}/messages");
        self.execute("create message", || {
            self.request(Method::POST, &path).json(&body)
        })
        .await
    }

    async fn create_run(&self, thread_id: &str, assistant_id: &str) -> Result<RunObject> {
        let body = json!({"assistant_id": assistant_id});
        let path = format!("/threads/{thread_id}/runs");
        self.execute("create run", || self.request(Method::POST, &path).json(&body))
            .await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject> {
        let path = format!("/threads/{thread_id}/runs/{run_id}");
        self.execute("retrieve run", || self.request(Method::GET, &path))
            .await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<RunObject> {
        let path = format!("/threads/{thread_id}/runs/{run_id}/cancel");
        self.execute("cancel run", || self.request(Method::POST, &path))
            .await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<MessageObject>> {
        let path = format!("/threads/{thread_id}/messages?order=asc&limit={LIST_PAGE_LIMIT}");
        self.fetch_all("list messages", &path).await
    }
}
