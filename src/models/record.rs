//! Record types flowing between stages.
//!
//! K_i: These types are the on-disk contract between create, curate and save-as.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System prompt used when a QA pair becomes a chat conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// An ordered list of chat messages.
pub type Conversation = Vec<Message>;

/// A question-answer pair, optionally rated by curation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,

    /// Quality rating (1-10) assigned by curate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

impl QaPair {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            rating: None,
        }
    }

    /// Three-message conversation: system, user question, assistant answer.
    pub fn to_conversation(&self, system_prompt: &str) -> Conversation {
        vec![
            Message::system(system_prompt),
            Message::user(&self.question),
            Message::assistant(&self.answer),
        ]
    }
}

/// A chain-of-thought example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CotExample {
    pub question: String,
    pub reasoning: String,
    pub answer: String,
}

impl CotExample {
    pub fn to_conversation(&self) -> Conversation {
        vec![
            Message::system(
                "You are a helpful assistant that provides detailed explanations.",
            ),
            Message::user(&self.question),
            Message::assistant(format!(
                "Let me think through this step by step:\n\n{}\n\nSo the answer is: {}",
                self.reasoning, self.answer
            )),
        ]
    }
}

/// Provenance attached to created files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentMetadata {
    /// Input file the content was generated from
    pub source: String,
    /// Content type tag (qa, summary, cot, cot-enhance)
    pub content_type: String,
    /// Model that generated the content
    pub model: String,
    pub generated_at: DateTime<Utc>,
}

/// Output of `create --type qa`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaDocument {
    pub summary: String,
    pub qa_pairs: Vec<QaPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ContentMetadata>,
}

/// Output of `create --type summary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ContentMetadata>,
}

/// Output of `create --type cot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CotDocument {
    pub summary: String,
    pub cot_examples: Vec<CotExample>,
    pub conversations: Vec<Conversation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ContentMetadata>,
}

/// Output of `create --type cot-enhance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedDocument {
    pub conversations: Vec<Conversation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ContentMetadata>,
}

/// Curation statistics for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurationMetrics {
    pub total: usize,
    pub filtered: usize,
    pub retention_rate: f64,
    pub avg_score: f64,
}

impl CurationMetrics {
    /// Compute metrics from every rated pair and the kept subset.
    pub fn compute(rated: &[QaPair], kept: usize, total: usize) -> Self {
        let ratings: Vec<f64> = rated.iter().filter_map(|p| p.rating).collect();
        let avg_score = if ratings.is_empty() {
            0.0
        } else {
            let mean = ratings.iter().sum::<f64>() / ratings.len() as f64;
            (mean * 10.0).round() / 10.0
        };
        let retention_rate = if total > 0 {
            ((kept as f64 / total as f64) * 100.0).round() / 100.0
        } else {
            0.0
        };

        Self {
            total,
            filtered: kept,
            retention_rate,
            avg_score,
        }
    }
}

/// Output of curate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratedDocument {
    pub summary: String,
    pub filtered_pairs: Vec<QaPair>,
    pub conversations: Vec<Conversation>,
    pub metrics: CurationMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_omitted_when_absent() {
        let json = serde_json::to_value(QaPair::new("Q?", "A.")).unwrap();
        assert!(json.get("rating").is_none());

        let rated: QaPair =
            serde_json::from_str(r#"{"question":"Q?","answer":"A.","rating":8}"#).unwrap();
        assert_eq!(rated.rating, Some(8.0));
    }

    #[test]
    fn test_cot_conversation_shape() {
        let example = CotExample {
            question: "Why?".into(),
            reasoning: "Step 1: look.".into(),
            answer: "Because.".into(),
        };
        let conv = example.to_conversation();
        assert_eq!(conv.len(), 3);
        assert_eq!(conv[1].content, "Why?");
        assert!(conv[2].content.contains("Step 1: look."));
        assert!(conv[2].content.ends_with("So the answer is: Because."));
    }

    #[test]
    fn test_curation_metrics() {
        let mut rated = vec![QaPair::new("a", "b"), QaPair::new("c", "d")];
        rated[0].rating = Some(9.0);
        rated[1].rating = Some(6.0);
        let metrics = CurationMetrics::compute(&rated, 1, 2);
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.filtered, 1);
        assert_eq!(metrics.retention_rate, 0.5);
        assert_eq!(metrics.avg_score, 7.5);

        assert_eq!(CurationMetrics::compute(&[], 0, 0).retention_rate, 0.0);
    }
}
