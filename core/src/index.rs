use serde::{Deserialize, Serialize};
use std::fmt;

pub type DocId = u64;

/// Which indexed unit a posting belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocType {
    Question,
    Answer,
    QuestionTag,
}

impl DocType {
    pub const ALL: [DocType; 3] = [DocType::Question, DocType::Answer, DocType::QuestionTag];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Question => "question",
            DocType::Answer => "answer",
            DocType::QuestionTag => "question_tag",
        }
    }

    pub(crate) fn code(&self) -> u8 {
        match self {
            DocType::Question => 0,
            DocType::Answer => 1,
            DocType::QuestionTag => 2,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DocType::Question),
            1 => Some(DocType::Answer),
            2 => Some(DocType::QuestionTag),
            _ => None,
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Identity of an indexed unit: `(doc_id, doc_type)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocKey {
    pub doc_id: DocId,
    pub doc_type: DocType,
}

impl DocKey {
    pub fn new(doc_id: DocId, doc_type: DocType) -> Self { Self { doc_id, doc_type } }
    pub fn question(doc_id: DocId) -> Self { Self::new(doc_id, DocType::Question) }
    pub fn answer(doc_id: DocId) -> Self { Self::new(doc_id, DocType::Answer) }
}

/// One row of the inverted (or biword) index for a given term.
/// `positions` is strictly increasing and `frequency == positions.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: DocKey,
    pub frequency: u32,
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn new(doc: DocKey, positions: Vec<u32>) -> Self {
        Self { doc, frequency: positions.len() as u32, positions }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: DocId,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub view_count: u64,
    #[serde(default)]
    pub answer_count: u64,
    /// Unix seconds; 0 when unknown.
    #[serde(default)]
    pub creation_date: i64,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub is_answered: bool,
}

impl Question {
    /// Tags as stored for filtering: a JSON array string, e.g. `["rust","sled"]`.
    pub fn tag_string(&self) -> String {
        serde_json::to_string(&self.tags).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer_id: DocId,
    pub question_id: DocId,
    pub body: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub is_accepted: bool,
    #[serde(default)]
    pub creation_date: i64,
}

/// A question together with its answers, the unit produced by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionRecord {
    #[serde(flatten)]
    pub question: Question,
    #[serde(default)]
    pub answers: Vec<AnswerRecord>,
}

/// Answer as it appears nested inside a [`QuestionRecord`]; the parent id is implied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub answer_id: DocId,
    pub body: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub is_accepted: bool,
    #[serde(default)]
    pub creation_date: i64,
}

impl AnswerRecord {
    pub fn into_answer(self, question_id: DocId) -> Answer {
        Answer {
            answer_id: self.answer_id,
            question_id,
            body: self.body,
            score: self.score,
            is_accepted: self.is_accepted,
            creation_date: self.creation_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedAnswer {
    pub answer_id: DocId,
    pub body: String,
    pub score: i64,
    pub is_accepted: bool,
}

impl From<Answer> for RankedAnswer {
    fn from(a: Answer) -> Self {
        Self { answer_id: a.answer_id, body: a.body, score: a.score, is_accepted: a.is_accepted }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub question_id: DocId,
    pub title: String,
    pub body: String,
    pub link: String,
    pub score: i64,
    pub tags: Vec<String>,
    /// Weighted BM25 score before popularity/recency boosting.
    pub bm25_score: f64,
    pub boosted_score: f64,
    pub answers: Vec<RankedAnswer>,
}
