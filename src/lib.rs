pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod session;
pub mod store;
pub mod transport;

pub use config::Config;
pub use error::{Result, SupernoteError};
pub use ingest::IngestionPipeline;
pub use models::{AssistantRef, ChatMessage, IndexedFile, Role, RunStatus, VectorStoreRef};
pub use orchestrator::Orchestrator;
pub use session::ConversationSession;
pub use store::StoreManager;
pub use transport::{HttpProvider, Provider};
