use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a message author, on the wire and in local history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry in a session's local message history. Append-only,
/// chronologically ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: uuid::Uuid,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Handle to the deployment's single remote assistant, resolved
/// idempotently by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantRef {
    pub id: String,
    pub name: String,
    pub model: String,
}

/// Handle to the deployment's single remote knowledge store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreRef {
    pub id: String,
    pub name: String,
}

/// A file admitted into the knowledge store. The filename is the unique
/// key within the store; content hashes are deliberately not part of
/// identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedFile {
    pub file_id: String,
    pub filename: String,
}

// ---- Provider wire types ----------------------------------------------

/// Paged list envelope returned by every provider list endpoint. When
/// `has_more` is set, the next page starts after `last_id`.
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub last_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantObject {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreObject {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileObject {
    pub id: String,
    pub filename: String,
}

/// A file's membership record within a vector store. The id is the file id;
/// the status tracks remote indexing progress.
#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreFile {
    pub id: String,
    pub status: FileIndexStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileIndexStatus {
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThreadObject {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunObject {
    pub id: String,
    pub status: RunStatus,
}

/// Remote run lifecycle. Queued -> in-progress -> terminal; the provider
/// must never report a backward transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    /// Whether polling can stop. `RequiresAction` counts as terminal here:
    /// this layer enables no function tools, so a run demanding tool output
    /// can never make progress.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::RequiresAction
                | RunStatus::Cancelled
                | RunStatus::Failed
                | RunStatus::Completed
                | RunStatus::Incomplete
                | RunStatus::Expired
        )
    }

    /// Coarse lifecycle phase used to validate that reported statuses only
    /// move forward.
    pub fn phase(self) -> u8 {
        match self {
            RunStatus::Queued => 0,
            RunStatus::InProgress => 1,
            RunStatus::Cancelling => 2,
            _ => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Incomplete => "incomplete",
            RunStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageObject {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub content: Vec<MessageContent>,
    /// Unix timestamp (seconds) assigned by the provider at creation.
    pub created_at: i64,
}

impl MessageObject {
    /// Concatenated text of all text-typed content parts.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.content {
            if let Some(text) = &part.text {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(&text.value);
            }
        }
        out
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<MessageText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageText {
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_terminality() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::InProgress.is_terminal());
        assert!(!RunStatus::Cancelling.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::RequiresAction.is_terminal());
    }

    #[test]
    fn run_status_phases_move_forward() {
        assert!(RunStatus::Queued.phase() < RunStatus::InProgress.phase());
        assert!(RunStatus::InProgress.phase() < RunStatus::Completed.phase());
        assert!(RunStatus::InProgress.phase() < RunStatus::Failed.phase());
    }

    #[test]
    fn run_status_wire_names() {
        let status: RunStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, RunStatus::InProgress);
        assert_eq!(status.to_string(), "in_progress");
    }

    #[test]
    fn list_envelope_parses_pagination_cursor() {
        let page: ListResponse<FileObject> = serde_json::from_value(serde_json::json!({
            "data": [{"id": "file_1", "filename": "chapter1.pdf"}],
            "has_more": true,
            "last_id": "file_1"
        }))
        .unwrap();
        assert!(page.has_more);
        assert_eq!(page.last_id.as_deref(), Some("file_1"));

        // single-page responses may omit both fields entirely
        let page: ListResponse<FileObject> = serde_json::from_value(serde_json::json!({
            "data": []
        }))
        .unwrap();
        assert!(!page.has_more);
        assert!(page.last_id.is_none());
    }

    #[test]
    fn message_text_concatenates_text_parts() {
        let message: MessageObject = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "role": "assistant",
            "run_id": "run_1",
            "created_at": 1700000000,
            "content": [
                {"type": "text", "text": {"value": "first"}},
                {"type": "image_file"},
                {"type": "text", "text": {"value": "second"}}
            ]
        }))
        .unwrap();
        assert_eq!(message.text(), "first\nsecond");
    }
}
