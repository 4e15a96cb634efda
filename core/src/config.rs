use crate::DocType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Multipliers applied to a unit's BM25 score according to its [`DocType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldWeights {
    pub question: f64,
    pub answer: f64,
    pub question_tag: f64,
}

impl Default for FieldWeights {
    fn default() -> Self { Self { question: 1.5, answer: 1.0, question_tag: 2.0 } }
}

impl FieldWeights {
    pub fn weight(&self, doc_type: DocType) -> f64 {
        match doc_type {
            DocType::Question => self.question,
            DocType::Answer => self.answer,
            DocType::QuestionTag => self.question_tag,
        }
    }
}

/// Ranker settings. `k1` and `b` are taken as given; no range checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    pub k1: f64,
    pub b: f64,
    /// Extra multiplier for query terms that also occur in a question title.
    pub title_boost: f64,
    pub field_weights: FieldWeights,
    /// How many top questions (by raw score) get popularity/recency boosts.
    pub boost_top_n: usize,
    pub max_results: usize,
    pub answers_per_result: usize,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            k1: 1.5,
            b: 0.75,
            title_boost: 5.0,
            field_weights: FieldWeights::default(),
            boost_top_n: 20,
            max_results: 5,
            answers_per_result: 3,
        }
    }
}

impl RankerConfig {
    /// Load from a JSON file; missing keys keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let cfg = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: RankerConfig = serde_json::from_str(r#"{"k1": 1.2, "field_weights": {"answer": 0.5}}"#).unwrap();
        assert_eq!(cfg.k1, 1.2);
        assert_eq!(cfg.b, 0.75);
        assert_eq!(cfg.field_weights.answer, 0.5);
        assert_eq!(cfg.field_weights.question, 1.5);
        assert_eq!(cfg.max_results, 5);
    }
}
