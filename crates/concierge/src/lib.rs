pub mod catalog;
pub mod classifier;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod router;
pub mod types;

// Re-export primary types for convenience
pub use catalog::{CatalogQuery, CatalogSource, HttpCatalog, Product, ProductCache, RawProduct, StaticCatalog};
pub use classifier::{AnswerSelector, ClassificationResult, ConversationContext, IntentClassifier};
pub use config::ConciergeConfig;
pub use error::{ConciergeError, Result};
pub use knowledge::{KnowledgeBase, Topic};
pub use llm::{ExternalGenerator, Generation, RemoteGenerator};
pub use router::{Analytics, ResponseRouter};
pub use types::{HistoryEntry, Response, ResponseSource, Role};
