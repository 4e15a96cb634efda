//! Local question/answer search: text normalization, inverted, positional and
//! biword indexing, boolean/phrase retrieval and BM25 ranking over a
//! pluggable [`IndexStore`].

pub mod config;
pub mod index;
pub mod indexer;
pub mod persist;
pub mod query;
pub mod ranker;
pub mod tokenizer;

pub use config::{FieldWeights, RankerConfig};
pub use index::{Answer, AnswerRecord, DocId, DocKey, DocType, Posting, Question, QuestionRecord, RankedAnswer, RankedResult};
pub use indexer::{IndexFailure, IndexReport, Indexer};
pub use persist::{IndexMeta, IndexStore, SledStore};
pub use query::{ParsedQuery, QueryProcessor};
pub use ranker::{Bm25Ranker, CorpusStats, ScoredDoc, ScoredQuestion};
