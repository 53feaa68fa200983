use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;

use crate::config::PollConfig;
use crate::error::{Result, SupernoteError};
use crate::models::{ChatMessage, MessageObject, Role, RunObject, RunStatus};
use crate::transport::Provider;

/// One user's chat lifetime: a single provider thread plus an append-only,
/// chronologically ordered local message history.
///
/// `send` takes `&mut self`, so at most one run can ever be outstanding per
/// session.
pub struct ConversationSession {
    provider: Arc<dyn Provider>,
    poll: PollConfig,
    thread_id: Option<String>,
    history: Vec<ChatMessage>,
}

impl ConversationSession {
    pub fn new(provider: Arc<dyn Provider>, poll: PollConfig) -> Self {
        Self {
            provider,
            poll,
            thread_id: None,
            history: Vec::new(),
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Create the provider thread on first use; every later call returns the
    /// same id. The thread id is immutable for the session's lifetime.
    pub async fn ensure_thread(&mut self) -> Result<String> {
        if let Some(id) = &self.thread_id {
            return Ok(id.clone());
        }
        let thread = self.provider.create_thread().await?;
        tracing::info!("Created conversation thread {}", thread.id);
        self.thread_id = Some(thread.id.clone());
        Ok(thread.id)
    }

    /// Send a user message and block until the assistant reply is available.
    ///
    /// The user message is appended to history as soon as it is accepted by
    /// the provider; on a failed or timed-out run it stays there (it was
    /// genuinely sent) and no assistant entry is appended.
    pub async fn send(&mut self, assistant_id: &str, text: &str) -> Result<String> {
        let thread_id = self.ensure_thread().await?;

        self.provider
            .create_message(&thread_id, Role::User, text)
            .await?;
        self.history.push(ChatMessage::new(Role::User, text));

        let run = self.provider.create_run(&thread_id, assistant_id).await?;
        tracing::debug!("Started run {} on thread {}", run.id, thread_id);
        let finished = self.poll_run(&thread_id, run).await?;

        if finished.status != RunStatus::Completed {
            tracing::warn!("Run {} ended with status {}", finished.id, finished.status);
            return Err(SupernoteError::RunFailed {
                status: finished.status,
            });
        }

        // The assistant may answer with several messages; keep exactly the
        // ones tagged with this run, in creation order.
        let mut messages = self.provider.list_messages(&thread_id).await?;
        messages.sort_by_key(|m| m.created_at);

        let replies: Vec<&MessageObject> = messages
            .iter()
            .filter(|m| m.run_id.as_deref() == Some(finished.id.as_str()) && m.role == "assistant")
            .collect();

        // A completed run that produced no reply tagged with its id means
        // the provider's listing or tagging cannot be trusted.
        if replies.is_empty() {
            return Err(SupernoteError::unavailable(format!(
                "run {} completed but the thread lists no assistant message for it",
                finished.id
            )));
        }

        let mut reply = String::new();
        for message in replies {
            let text = message.text();
            if !reply.is_empty() {
                reply.push_str("\n\n");
            }
            reply.push_str(&text);
            self.history.push(ChatMessage::new(Role::Assistant, text));
        }
        Ok(reply)
    }

    /// Poll the run at a fixed interval until it reaches a terminal status,
    /// bounded by the configured timeout. On expiry the remote run is
    /// cancelled (best effort) before `RunTimedOut` is raised. Statuses are
    /// validated to only move forward; a backward transition is a provider
    /// protocol violation.
    async fn poll_run(&self, thread_id: &str, mut run: RunObject) -> Result<RunObject> {
        let started = Instant::now();
        let mut last_phase = run.status.phase();

        while !run.status.is_terminal() {
            if started.elapsed() >= self.poll.timeout() {
                tracing::warn!("Run {} timed out, requesting remote cancellation", run.id);
                if let Err(e) = self.provider.cancel_run(thread_id, &run.id).await {
                    tracing::warn!("Failed to cancel run {}: {}", run.id, e);
                }
                return Err(SupernoteError::RunTimedOut {
                    waited_secs: started.elapsed().as_secs(),
                });
            }

            sleep(self.poll.interval()).await;
            let next = self.provider.retrieve_run(thread_id, &run.id).await?;
            if next.status.phase() < last_phase {
                return Err(SupernoteError::unavailable(format!(
                    "run {} status regressed from {} to {}",
                    run.id, run.status, next.status
                )));
            }
            last_phase = next.status.phase();
            run = next;
        }
        Ok(run)
    }
}
