//! Knowledge base
//!
//! Read-only topic table the local classifier scores against. Topics keep the
//! order in which they appear in the source document; the classifier's
//! tie-break depends on it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{ConciergeError, Result};

/// A curated topic with its trigger keywords and pre-written answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub key: String,
    pub keywords: Vec<String>,
    pub answers: Vec<String>,
    /// Base weight of the topic, not a probability on its own.
    pub confidence: f64,
    pub search_tags: Vec<String>,
    pub quick_actions: Vec<String>,
}

/// On-disk shape: either `answers: [...]` or a single `answer`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopicRecord {
    keywords: Vec<String>,
    #[serde(default)]
    answers: Vec<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default = "default_topic_confidence")]
    confidence: f64,
    #[serde(default)]
    search_tags: Vec<String>,
    #[serde(default)]
    quick_actions: Vec<String>,
}

fn default_topic_confidence() -> f64 {
    0.95
}

#[derive(Debug, Default, Deserialize)]
struct KnowledgeFile {
    #[serde(default)]
    config: Value,
    #[serde(default)]
    topics: Map<String, Value>,
    #[serde(default)]
    products: Map<String, Value>,
}

/// Trimmed, lowercased, blanks dropped. A blank keyword would match every message.
fn normalize_keywords<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keywords
        .into_iter()
        .map(|k| k.as_ref().trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

impl Topic {
    /// Keywords are normalized here; use [`Topic::validate`] or
    /// [`KnowledgeBase::new`] to reject a topic left without any.
    pub fn new(key: impl Into<String>, keywords: &[&str], answers: &[&str], confidence: f64) -> Self {
        Self {
            key: key.into(),
            keywords: normalize_keywords(keywords),
            answers: answers.iter().map(|a| a.to_string()).collect(),
            confidence,
            search_tags: Vec::new(),
            quick_actions: Vec::new(),
        }
    }

    pub fn with_search_tags(mut self, tags: &[&str]) -> Self {
        self.search_tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_quick_actions(mut self, actions: &[&str]) -> Self {
        self.quick_actions = actions.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConciergeError::Knowledge(format!(
                "topic '{}' has no keywords",
                self.key
            )));
        }
        if self.answers.is_empty() {
            return Err(ConciergeError::Knowledge(format!(
                "topic '{}' has no answer",
                self.key
            )));
        }
        Ok(())
    }

    fn from_record(key: String, record: TopicRecord) -> Result<Self> {
        let answers = match record.answer {
            Some(answer) if record.answers.is_empty() => vec![answer],
            _ => record.answers,
        };

        let topic = Self {
            key,
            keywords: normalize_keywords(record.keywords),
            answers,
            confidence: record.confidence,
            search_tags: record.search_tags,
            quick_actions: record.quick_actions,
        };
        topic.validate()?;
        Ok(topic)
    }
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    topics: Vec<Topic>,
    config: Value,
    products: Map<String, Value>,
}

impl KnowledgeBase {
    pub fn new(topics: Vec<Topic>) -> Result<Self> {
        for topic in &topics {
            topic.validate()?;
        }
        Ok(Self {
            topics,
            config: Value::Null,
            products: Map::new(),
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: KnowledgeFile = serde_json::from_str(json)
            .map_err(|e| ConciergeError::Knowledge(format!("Failed to parse: {}", e)))?;

        let mut topics = Vec::with_capacity(file.topics.len());
        for (key, value) in file.topics {
            let record: TopicRecord = serde_json::from_value(value).map_err(|e| {
                ConciergeError::Knowledge(format!("topic '{}': {}", key, e))
            })?;
            topics.push(Topic::from_record(key, record)?);
        }

        tracing::debug!(topics = topics.len(), products = file.products.len(), "Knowledge base loaded");

        Ok(Self {
            topics,
            config: file.config,
            products: file.products,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConciergeError::Knowledge(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    pub fn topic(&self, key: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.key == key)
    }

    /// Free-form `config` blob from the knowledge document.
    pub fn config(&self) -> &Value {
        &self.config
    }

    /// Legacy lookup of a product record by its display name (case-insensitive).
    pub fn product_by_name(&self, name: &str) -> Option<&Value> {
        let wanted = name.trim().to_lowercase();
        self.products
            .iter()
            .find(|(display, _)| display.to_lowercase() == wanted)
            .map(|(_, record)| record)
    }
}
