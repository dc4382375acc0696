//! Response Router
//!
//! Local classifier first, remote generator only when the local match is not
//! confident. Both paths are enriched with products from the tag cache.
//!
//! Session state (selector context, no-repeat memory, history, analytics) is
//! owned by the router instance. Each piece sits behind its own lock and no
//! lock is held across an `.await`.

pub mod analytics;
pub mod enrichment;

use chrono::Timelike;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::{Product, ProductCache};
use crate::classifier::{AnswerSelector, ConversationContext, IntentClassifier};
use crate::config::{ConciergeConfig, RouterConfig};
use crate::error::{ConciergeError, Result};
use crate::knowledge::KnowledgeBase;
use crate::llm::RemoteGenerator;
use crate::types::{HistoryEntry, Response, ResponseSource};

pub use analytics::Analytics;
pub use enrichment::{extract_tags, quick_actions_for};

const GREETING_CONFIDENCE: f64 = 0.99;
const DEFAULT_GREETING: &str = "Xin chào! Mình có thể giúp gì cho bạn hôm nay?";

pub struct ResponseRouter {
    classifier: IntentClassifier,
    cache: Arc<ProductCache>,
    generator: Arc<dyn RemoteGenerator>,
    config: RouterConfig,
    selector: Mutex<AnswerSelector>,
    history: Mutex<VecDeque<HistoryEntry>>,
    analytics: Mutex<Analytics>,
}

impl ResponseRouter {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        cache: Arc<ProductCache>,
        generator: Arc<dyn RemoteGenerator>,
        config: &ConciergeConfig,
    ) -> Self {
        Self {
            classifier: IntentClassifier::new(knowledge, config.classifier.clone()),
            cache,
            generator,
            config: config.router.clone(),
            selector: Mutex::new(AnswerSelector::new()),
            history: Mutex::new(VecDeque::with_capacity(config.router.history_limit)),
            analytics: Mutex::new(Analytics::default()),
        }
    }

    /// Replace the answer selector, e.g. with a seeded one.
    pub fn with_selector(self, selector: AnswerSelector) -> Self {
        *self.selector.lock() = selector;
        self
    }

    pub fn cache(&self) -> &Arc<ProductCache> {
        &self.cache
    }

    /// Resolve a message using the local clock for answer selection.
    pub async fn resolve(&self, message: &str) -> Result<Response> {
        self.resolve_at(message, chrono::Local::now().hour()).await
    }

    /// Remote failures and timeouts are returned as errors; catalog failures
    /// only cost the response its products.
    pub async fn resolve_at(&self, message: &str, hour: u32) -> Result<Response> {
        self.analytics.lock().record_query();

        if let Some(response) = self.greeting(message) {
            return Ok(response);
        }

        let start = Instant::now();
        let local = {
            let mut selector = self.selector.lock();
            self.classifier.classify_at(message, &mut selector, hour)
        };

        match local {
            Some(result) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                self.analytics.lock().record_local(duration_ms);
                self.push_history(message, &result.answer);

                let products = self.enrich(&result.search_tags, true).await;

                Ok(Response {
                    text: result.answer,
                    source: ResponseSource::Local,
                    confidence: Some(result.confidence),
                    topic: Some(result.topic),
                    products,
                    quick_actions: result.quick_actions,
                    duration_ms,
                    tokens_used: None,
                })
            }
            None => self.resolve_remote(message, start).await,
        }
    }

    async fn resolve_remote(&self, message: &str, start: Instant) -> Result<Response> {
        let history: Vec<HistoryEntry> = self.history.lock().iter().cloned().collect();
        let timeout = self.config.remote_timeout();

        let generation =
            match tokio::time::timeout(timeout, self.generator.generate(message, &history)).await {
                Ok(Ok(generation)) => generation,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Remote generation failed");
                    return Err(ConciergeError::Remote(e));
                }
                Err(_) => {
                    tracing::warn!(timeout_secs = timeout.as_secs(), "Remote generation timed out");
                    return Err(ConciergeError::RemoteTimeout(timeout));
                }
            };

        let duration_ms = start.elapsed().as_millis() as u64;
        self.analytics
            .lock()
            .record_remote(duration_ms, generation.tokens_used);
        self.push_history(message, &generation.text);

        let tags = extract_tags(&generation.text);
        let products = self.enrich(&tags, false).await;

        tracing::info!(
            tokens = generation.tokens_used,
            duration_ms,
            tags = ?tags,
            products = products.len(),
            "Remote response"
        );

        Ok(Response {
            text: generation.text,
            source: ResponseSource::Remote,
            confidence: None,
            topic: None,
            products,
            quick_actions: quick_actions_for(message),
            duration_ms,
            tokens_used: Some(generation.tokens_used),
        })
    }

    /// Exact greeting, or a greeting followed by a non-alphanumeric character.
    ///
    /// A bare `starts_with` would let "hi" claim "hiểu rồi" or "history" and
    /// skip classification, so the character after the greeting must end the word.
    fn is_greeting(&self, message: &str) -> bool {
        let normalized = message.trim().to_lowercase();
        self.config.greetings.iter().any(|greeting| {
            normalized
                .strip_prefix(greeting.as_str())
                .is_some_and(|rest| rest.chars().next().map_or(true, |c| !c.is_alphanumeric()))
        })
    }

    fn greeting(&self, message: &str) -> Option<Response> {
        if !self.is_greeting(message) {
            return None;
        }

        let topic = self.classifier.knowledge().topic(&self.config.greeting_topic);
        let text = topic
            .and_then(|t| t.answers.first().cloned())
            .unwrap_or_else(|| DEFAULT_GREETING.to_string());
        let quick_actions = topic.map(|t| t.quick_actions.clone()).unwrap_or_default();

        tracing::debug!("Greeting short-circuit");

        Some(Response {
            text,
            source: ResponseSource::Local,
            confidence: Some(GREETING_CONFIDENCE),
            topic: Some(self.config.greeting_topic.clone()),
            products: Vec::new(),
            quick_actions,
            duration_ms: 0,
            tokens_used: None,
        })
    }

    async fn enrich(&self, tags: &[String], fallback_to_random: bool) -> Vec<Product> {
        if tags.is_empty() {
            return Vec::new();
        }
        match self
            .cache
            .get_by_tags(tags, self.config.product_limit, fallback_to_random)
            .await
        {
            Ok(products) => products,
            Err(e) => {
                tracing::warn!(error = %e, "Product enrichment failed, responding without products");
                Vec::new()
            }
        }
    }

    fn push_history(&self, user: &str, assistant: &str) {
        let mut history = self.history.lock();
        history.push_back(HistoryEntry::user(user));
        history.push_back(HistoryEntry::assistant(assistant));
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    pub fn analytics(&self) -> Analytics {
        self.analytics.lock().clone()
    }

    pub fn reset_analytics(&self) {
        self.analytics.lock().reset();
    }

    pub fn context(&self) -> ConversationContext {
        self.selector.lock().context().clone()
    }

    /// Clears the conversation context; per-topic no-repeat memory is kept.
    pub fn reset_context(&self) {
        self.selector.lock().reset_context();
    }
}
