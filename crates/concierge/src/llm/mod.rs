//! Remote generation
//!
//! The paid fallback used when the local classifier is not confident. The
//! router only sees the [`RemoteGenerator`] trait; [`ExternalGenerator`] is
//! the stock implementation for OpenAI-compatible chat completion endpoints.

pub mod external;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::HistoryEntry;

pub use external::ExternalGenerator;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generation {
    pub text: String,
    pub tokens_used: u64,
}

#[async_trait]
pub trait RemoteGenerator: Send + Sync {
    /// Generate a reply to `message` given the retained conversation.
    async fn generate(&self, message: &str, history: &[HistoryEntry]) -> Result<Generation>;
}

/// Quick token estimate (chars / 4).
pub fn estimate_tokens(text: &str) -> u64 {
    ((text.chars().count() + 3) / 4) as u64
}
