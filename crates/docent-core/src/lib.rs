//! All backend logic independent of how the assistant is driven (CLI or a page host).
//!
//! Documentation sources stay where the site keeps them. Docent builds a section index from
//! them (see [index]), answers questions against it (see [assistant]) and stores only config
//! and the built index in its own app data directory (see [app_data]).

pub mod app_data;
pub mod assistant;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod docs;
pub mod embeddings;
pub mod index;
pub mod index_file;
pub mod live;
pub mod ollama;
pub mod page;
pub mod prompt;
pub mod sections;
pub mod sse;
pub mod store;
pub mod watcher;

pub use app_data::{app_data_dir, default_index_path};
pub use assistant::{AskOutcome, Assistant, AssistantError, CompletionState, Submission};
pub use completion::{ChatClient, CompletionError, CompletionStream};
pub use config::{load_config, load_config_from, save_config, Config, ConfigError};
pub use conversation::{ChatMessage, Conversation, Turn};
pub use docs::{scan_docs, Doc, ScanError};
pub use embeddings::{EmbedError, Embedder, RemoteEmbedder};
pub use index::{build_and_write, build_index_file, embed_docs, BuildStats, IndexError};
pub use index_file::{read_index_file, write_index_file, EmbeddingFile, IndexFileError};
pub use live::{LiveMessage, Phase};
pub use ollama::OllamaClient;
pub use page::browsing_content;
pub use prompt::{assemble_prompt, DEFAULT_SYSTEM_PROMPT, DEFAULT_TOP_K};
pub use sections::{parse_sections, Section, DEFAULT_MAX_SECTION_CHARS};
pub use sse::{Delta, SseDecoder, StreamEvent};
pub use store::{DocumentSection, ScoredSection, StoreError, VectorIndex};
pub use watcher::{watch_docs, DocsWatcher, WatchError};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "docent-core ready"
}
