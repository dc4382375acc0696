//! Smart answer selection
//!
//! Picks one of several pre-written answers for a matched topic using the
//! conversation context, the time of day and a per-topic no-repeat memory.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const MAX_RECENT_TOPICS: usize = 5;

/// Context score a candidate must beat to win outright.
const CONTEXT_WIN_SCORE: f64 = 0.5;

const NEGATIVE_MARKERS: &[&str] = &[
    "tệ", "chán", "thất vọng", "bực", "không hài lòng", "lừa", "lỗi", "hỏng",
    "bad", "terrible", "disappointed", "angry", "broken", "worst",
];
const POSITIVE_MARKERS: &[&str] = &[
    "tuyệt", "cảm ơn", "thích", "đẹp", "hay quá", "great", "thanks", "love", "awesome", "nice",
];

const BUYING_MARKERS: &[&str] = &[
    "mua", "giá", "bao nhiêu", "đặt hàng", "order", "buy", "price", "cost", "thanh toán",
];
const LEARNING_MARKERS: &[&str] = &[
    "là gì", "ý nghĩa", "tác dụng", "học", "tìm hiểu", "what is", "meaning", "learn", "how to",
];
const SUPPORT_MARKERS: &[&str] = &[
    "giúp", "hỗ trợ", "đổi trả", "bảo hành", "lỗi", "help", "support", "refund", "problem",
];

const PRICING_MARKERS: &[&str] = &["giá", "vnđ", "₫", "ưu đãi", "giảm", "price", "$", "discount"];
const EDUCATIONAL_MARKERS: &[&str] = &[
    "ý nghĩa", "năng lượng", "tác dụng", "giúp bạn", "meaning", "energy", "benefit",
];
const SUPPORTIVE_MARKERS: &[&str] = &["hỗ trợ", "liên hệ", "zalo", "hotline", "support", "contact"];
const EMPATHY_MARKERS: &[&str] = &["xin lỗi", "rất tiếc", "thông cảm", "hiểu", "sorry", "understand"];

const CRYSTAL_NAMES: &[&str] = &[
    "thạch anh", "amethyst", "citrine", "rose quartz", "obsidian", "aquamarine",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserIntent {
    Buying,
    Learning,
    Support,
    Browsing,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    /// Most recent first, at most five entries.
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
    pub user_intent: Option<UserIntent>,
}

fn contains_any(haystack: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| haystack.contains(m))
}

/// Later checks override earlier ones.
fn detect_sentiment(message: &str) -> Sentiment {
    let mut sentiment = Sentiment::Neutral;
    if contains_any(message, NEGATIVE_MARKERS) {
        sentiment = Sentiment::Negative;
    }
    if contains_any(message, POSITIVE_MARKERS) {
        sentiment = Sentiment::Positive;
    }
    sentiment
}

fn detect_intent(message: &str) -> UserIntent {
    let mut intent = UserIntent::Browsing;
    if contains_any(message, BUYING_MARKERS) {
        intent = UserIntent::Buying;
    }
    if contains_any(message, LEARNING_MARKERS) {
        intent = UserIntent::Learning;
    }
    if contains_any(message, SUPPORT_MARKERS) {
        intent = UserIntent::Support;
    }
    intent
}

/// Hour buckets: 5..11 morning, 11..17 afternoon, otherwise evening.
fn time_bucket(hour: u32) -> usize {
    match hour {
        5..=10 => 0,
        11..=16 => 1,
        _ => 2,
    }
}

pub struct AnswerSelector {
    context: ConversationContext,
    /// Survives [`AnswerSelector::reset_context`].
    last_used: HashMap<String, usize>,
    rng: StdRng,
}

impl Default for AnswerSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl AnswerSelector {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            context: ConversationContext::default(),
            last_used: HashMap::new(),
            rng,
        }
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    /// Clears topics, sentiment and intent. No-repeat memory is kept.
    pub fn reset_context(&mut self) {
        self.context = ConversationContext::default();
    }

    pub fn last_used(&self, topic_key: &str) -> Option<usize> {
        self.last_used.get(topic_key).copied()
    }

    /// Choose an answer for `topic_key`, updating context and no-repeat memory.
    pub fn select(&mut self, topic_key: &str, answers: &[String], message: &str, hour: u32) -> String {
        match answers {
            [] => return String::new(),
            [only] => return only.clone(),
            _ => {}
        }

        let message = message.trim().to_lowercase();
        self.update_context(topic_key, &message);

        let time_index = time_bucket(hour) % answers.len();
        let (context_index, context_score) = self.best_context_match(answers);
        let last = self.last_used(topic_key);
        let fresh: Vec<usize> = (0..answers.len()).filter(|i| Some(*i) != last).collect();

        let chosen = if context_score > CONTEXT_WIN_SCORE && fresh.contains(&context_index) {
            context_index
        } else if fresh.contains(&time_index) {
            time_index
        } else if let Some(&pick) = fresh.choose(&mut self.rng) {
            pick
        } else {
            let all: Vec<usize> = (0..answers.len()).collect();
            *all.choose(&mut self.rng).unwrap_or(&0)
        };

        tracing::debug!(
            topic = topic_key,
            chosen,
            time_index,
            context_index,
            context_score,
            "Answer selected"
        );

        self.last_used.insert(topic_key.to_string(), chosen);
        answers[chosen].clone()
    }

    fn update_context(&mut self, topic_key: &str, message: &str) {
        self.context.topics.insert(0, topic_key.to_string());
        self.context.topics.truncate(MAX_RECENT_TOPICS);
        self.context.sentiment = detect_sentiment(message);
        self.context.user_intent = Some(detect_intent(message));
    }

    fn context_score(&self, answer: &str) -> f64 {
        let answer = answer.to_lowercase();
        let mut score = 0.0;

        let intent_markers = match self.context.user_intent {
            Some(UserIntent::Buying) => Some(PRICING_MARKERS),
            Some(UserIntent::Learning) => Some(EDUCATIONAL_MARKERS),
            Some(UserIntent::Support) => Some(SUPPORTIVE_MARKERS),
            _ => None,
        };
        if intent_markers.is_some_and(|markers| contains_any(&answer, markers)) {
            score += 0.3;
        }

        if self.context.sentiment == Sentiment::Negative && contains_any(&answer, EMPATHY_MARKERS) {
            score += 0.2;
        }

        let recent = |key: &str| self.context.topics.iter().any(|t| t == key);
        if recent("trading") && answer.contains("tier") {
            score += 0.1;
        }
        if recent("crystals") && contains_any(&answer, CRYSTAL_NAMES) {
            score += 0.1;
        }

        score
    }

    /// Highest-scoring index; the first one wins ties.
    fn best_context_match(&self, answers: &[String]) -> (usize, f64) {
        let mut best = (0, f64::MIN);
        for (i, answer) in answers.iter().enumerate() {
            let score = self.context_score(answer);
            if score > best.1 {
                best = (i, score);
            }
        }
        best
    }
}
