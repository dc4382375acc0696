//! Local Intent Classifier
//!
//! Scores a message against the knowledge base topics by keyword overlap and
//! publishes the best match only when it clears the confidence threshold.
//! Anything below the threshold is discarded so the caller falls back to
//! remote generation.

pub mod selector;

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ClassifierConfig;
use crate::knowledge::{KnowledgeBase, Topic};

pub use selector::{AnswerSelector, ConversationContext, Sentiment, UserIntent};

const EXACT_PHRASE_BONUS: f64 = 0.08;
const EXTRA_KEYWORD_BONUS: f64 = 0.02;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub answer: String,
    pub search_tags: Vec<String>,
    pub quick_actions: Vec<String>,
    pub confidence: f64,
    /// Always `"local"`.
    pub source: String,
    pub topic: String,
    pub matched_keywords: Vec<String>,
}

/// Step function on the number of matched keywords.
fn base_confidence(matched: usize) -> f64 {
    match matched {
        0 => 0.0,
        1 => 0.70,
        2 => 0.85,
        _ => 0.90,
    }
}

struct TopicMatch<'a> {
    topic: &'a Topic,
    matched_keywords: Vec<String>,
    confidence: f64,
}

pub struct IntentClassifier {
    knowledge: Arc<KnowledgeBase>,
    config: ClassifierConfig,
}

impl IntentClassifier {
    pub fn new(knowledge: Arc<KnowledgeBase>, config: ClassifierConfig) -> Self {
        Self { knowledge, config }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Confidence for one topic given its matched keyword count.
    pub fn topic_confidence(&self, matched: usize, exact_phrase: bool, topic_weight: f64) -> f64 {
        let mut score = base_confidence(matched);
        if exact_phrase {
            score += EXACT_PHRASE_BONUS;
        }
        score += matched.saturating_sub(3) as f64 * EXTRA_KEYWORD_BONUS;
        score *= topic_weight / self.config.reference_weight;
        score.min(self.config.max_confidence)
    }

    /// Classify using the local wall clock for answer selection.
    pub fn classify(&self, message: &str, selector: &mut AnswerSelector) -> Option<ClassificationResult> {
        self.classify_at(message, selector, chrono::Local::now().hour())
    }

    pub fn classify_at(
        &self,
        message: &str,
        selector: &mut AnswerSelector,
        hour: u32,
    ) -> Option<ClassificationResult> {
        let normalized = message.trim().to_lowercase();
        if normalized.chars().count() < 2 {
            return None;
        }

        let best = self.best_match(&normalized)?;

        if best.confidence < self.config.publish_threshold {
            tracing::debug!(
                topic = %best.topic.key,
                confidence = best.confidence,
                "Local match below publish threshold, discarded"
            );
            return None;
        }

        let answer = if best.topic.answers.len() > 1 {
            selector.select(&best.topic.key, &best.topic.answers, &normalized, hour)
        } else {
            best.topic.answers.first().cloned().unwrap_or_default()
        };

        tracing::info!(
            topic = %best.topic.key,
            confidence = best.confidence,
            matched = ?best.matched_keywords,
            "Local intent match"
        );

        Some(ClassificationResult {
            answer,
            search_tags: best.topic.search_tags.clone(),
            quick_actions: best.topic.quick_actions.clone(),
            confidence: best.confidence,
            source: "local".to_string(),
            topic: best.topic.key.clone(),
            matched_keywords: best.matched_keywords,
        })
    }

    /// Highest-confidence topic. Topics are visited in knowledge base order and
    /// a later topic must strictly beat the current best, so the first one
    /// encountered wins a tie.
    fn best_match<'a>(&'a self, normalized: &str) -> Option<TopicMatch<'a>> {
        let mut best: Option<TopicMatch<'a>> = None;

        for topic in self.knowledge.topics() {
            let matched_keywords: Vec<String> = topic
                .keywords
                .iter()
                .filter(|k| {
                    let k = k.trim().to_lowercase();
                    !k.is_empty() && normalized.contains(&k)
                })
                .cloned()
                .collect();
            if matched_keywords.is_empty() {
                continue;
            }

            let exact_phrase = matched_keywords
                .iter()
                .any(|k| k.trim().to_lowercase() == normalized);
            let confidence =
                self.topic_confidence(matched_keywords.len(), exact_phrase, topic.confidence);

            if best.as_ref().map_or(true, |b| confidence > b.confidence) {
                best = Some(TopicMatch {
                    topic,
                    matched_keywords,
                    confidence,
                });
            }
        }

        best
    }
}
