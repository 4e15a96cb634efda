use crate::{Answer, DocId, DocKey, DocType, Posting, Question};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Durable storage for documents, postings and per-document statistics.
///
/// Implementations must be internally synchronized: every method takes
/// `&self`, and each single-row write is atomic on its own. Nothing beyond
/// that is promised, so callers that need multi-row consistency (a full
/// re-index, say) must serialize their writers themselves.
pub trait IndexStore: Send + Sync {
    fn get_postings(&self, term: &str) -> Result<Vec<Posting>>;
    fn get_biword_postings(&self, biword: &str) -> Result<Vec<Posting>>;
    /// Upsert keyed by `(term, doc_id, doc_type)`.
    fn insert_index_term(&self, term: &str, posting: &Posting) -> Result<()>;
    /// Upsert keyed by `(biword, doc_id, doc_type)`.
    fn insert_biword(&self, biword: &str, posting: &Posting) -> Result<()>;
    fn insert_doc_stats(&self, doc: DocKey, doc_length: u32) -> Result<()>;
    fn get_doc_stats(&self, doc: DocKey) -> Result<Option<u32>>;
    /// Number of indexed units (rows of doc stats).
    fn get_total_docs(&self) -> Result<u64>;
    /// Mean doc length over all indexed units; 0.0 when nothing is indexed.
    fn get_avg_doc_length(&self) -> Result<f64>;
    /// Drop every posting, biword posting and doc-stats row of `doc`.
    fn remove_document(&self, doc: DocKey) -> Result<()>;

    fn insert_question(&self, question: &Question) -> Result<()>;
    fn insert_answer(&self, answer: &Answer) -> Result<()>;
    fn get_question(&self, question_id: DocId) -> Result<Option<Question>>;
    /// Answers of a question, accepted first, then by score descending.
    fn get_answers(&self, question_id: DocId) -> Result<Vec<Answer>>;
    fn question_count(&self) -> Result<u64>;
    fn all_questions(&self) -> Result<Vec<Question>>;

    fn document_frequency(&self, term: &str) -> Result<usize> {
        Ok(self.get_postings(term)?.len())
    }

    fn term_exists(&self, term: &str) -> Result<bool> {
        Ok(self.document_frequency(term)? > 0)
    }

    fn flush(&self) -> Result<()> { Ok(()) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub indexed_at: String,
    pub version: u32,
}

/// Stored value of a posting row; the key carries term and document.
#[derive(Serialize, Deserialize)]
struct PostingValue {
    frequency: u32,
    positions: Vec<u32>,
}

const KEY_SEP: u8 = 0;
const DOC_KEY_LEN: usize = 9;
const FORWARD_TERM: u8 = 0;
const FORWARD_BIWORD: u8 = 1;
const META_KEY: &[u8] = b"meta";

fn encode_doc_key(doc: DocKey) -> [u8; DOC_KEY_LEN] {
    let mut out = [0u8; DOC_KEY_LEN];
    out[..8].copy_from_slice(&doc.doc_id.to_be_bytes());
    out[8] = doc.doc_type.code();
    out
}

fn decode_doc_key(bytes: &[u8]) -> Result<DocKey> {
    if bytes.len() != DOC_KEY_LEN {
        return Err(anyhow!("malformed doc key of {} bytes", bytes.len()));
    }
    let mut id = [0u8; 8];
    id.copy_from_slice(&bytes[..8]);
    let doc_type = DocType::from_code(bytes[8]).ok_or_else(|| anyhow!("unknown doc type code {}", bytes[8]))?;
    Ok(DocKey::new(u64::from_be_bytes(id), doc_type))
}

/// Composite `(term, doc_id, doc_type)` key of the postings trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingKey {
    pub term: String,
    pub doc: DocKey,
}

impl PostingKey {
    pub fn new(term: &str, doc: DocKey) -> Self { Self { term: term.to_string(), doc } }

    fn prefix(term: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(term.len() + 1);
        out.extend_from_slice(term.as_bytes());
        out.push(KEY_SEP);
        out
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Self::prefix(&self.term);
        out.extend_from_slice(&encode_doc_key(self.doc));
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DOC_KEY_LEN + 1 {
            return Err(anyhow!("posting key too short"));
        }
        let (head, doc) = bytes.split_at(bytes.len() - DOC_KEY_LEN);
        let term = std::str::from_utf8(&head[..head.len() - 1]).context("posting key term is not utf-8")?;
        Ok(Self { term: term.to_string(), doc: decode_doc_key(doc)? })
    }
}

fn id_key(id: DocId) -> [u8; 8] { id.to_be_bytes() }

fn answer_link_key(question_id: DocId, answer_id: DocId) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&question_id.to_be_bytes());
    out[8..].copy_from_slice(&answer_id.to_be_bytes());
    out
}

fn forward_key(doc: DocKey, kind: u8, term: &str) -> Vec<u8> {
    let mut out = encode_doc_key(doc).to_vec();
    out.push(kind);
    out.extend_from_slice(term.as_bytes());
    out
}

/// [`IndexStore`] backed by an embedded sled database.
///
/// Trees: `questions`, `answers`, `answers_by_question` (parent/child links),
/// `postings`, `biwords`, `doc_stats`, and `doc_terms`, a forward index from a
/// document to the terms it was posted under so it can be removed cleanly.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    questions: sled::Tree,
    answers: sled::Tree,
    answers_by_question: sled::Tree,
    postings: sled::Tree,
    biwords: sled::Tree,
    doc_stats: sled::Tree,
    doc_terms: sled::Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path).with_context(|| format!("opening store at {}", path.display()))?;
        Self::from_db(db)
    }

    /// Throwaway store that lives only as long as the handle.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        Ok(Self {
            questions: db.open_tree("questions")?,
            answers: db.open_tree("answers")?,
            answers_by_question: db.open_tree("answers_by_question")?,
            postings: db.open_tree("postings")?,
            biwords: db.open_tree("biwords")?,
            doc_stats: db.open_tree("doc_stats")?,
            doc_terms: db.open_tree("doc_terms")?,
            db,
        })
    }

    pub fn save_meta(&self, meta: &IndexMeta) -> Result<()> {
        let json = serde_json::to_vec_pretty(meta)?;
        self.db.insert(META_KEY, json)?;
        Ok(())
    }

    pub fn load_meta(&self) -> Result<Option<IndexMeta>> {
        match self.db.get(META_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    /// Rows keyed exactly on `term`. Terms may themselves contain the
    /// separator byte, so longer keys sharing the prefix are skipped.
    fn scan_term(tree: &sled::Tree, term: &str) -> impl Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>> {
        let prefix = PostingKey::prefix(term);
        let key_len = prefix.len() + DOC_KEY_LEN;
        tree.scan_prefix(prefix)
            .filter(move |entry| entry.as_ref().map_or(true, |(key, _)| key.len() == key_len))
    }

    fn scan_postings(tree: &sled::Tree, term: &str) -> Result<Vec<Posting>> {
        let mut out = Vec::new();
        for entry in Self::scan_term(tree, term) {
            let (key, value) = entry?;
            let key = PostingKey::decode(&key)?;
            let value: PostingValue = bincode::deserialize(&value)?;
            out.push(Posting { doc: key.doc, frequency: value.frequency, positions: value.positions });
        }
        Ok(out)
    }

    fn put_posting(&self, tree: &sled::Tree, kind: u8, term: &str, posting: &Posting) -> Result<()> {
        let key = PostingKey::new(term, posting.doc).encode();
        let value = bincode::serialize(&PostingValue { frequency: posting.frequency, positions: posting.positions.clone() })?;
        tree.insert(key, value)?;
        self.doc_terms.insert(forward_key(posting.doc, kind, term), sled::IVec::default())?;
        Ok(())
    }
}

impl IndexStore for SledStore {
    fn get_postings(&self, term: &str) -> Result<Vec<Posting>> {
        Self::scan_postings(&self.postings, term).with_context(|| format!("reading postings for {term:?}"))
    }

    fn get_biword_postings(&self, biword: &str) -> Result<Vec<Posting>> {
        Self::scan_postings(&self.biwords, biword).with_context(|| format!("reading biword postings for {biword:?}"))
    }

    fn insert_index_term(&self, term: &str, posting: &Posting) -> Result<()> {
        self.put_posting(&self.postings, FORWARD_TERM, term, posting)
    }

    fn insert_biword(&self, biword: &str, posting: &Posting) -> Result<()> {
        self.put_posting(&self.biwords, FORWARD_BIWORD, biword, posting)
    }

    fn insert_doc_stats(&self, doc: DocKey, doc_length: u32) -> Result<()> {
        self.doc_stats.insert(encode_doc_key(doc), doc_length.to_be_bytes().to_vec())?;
        Ok(())
    }

    fn get_doc_stats(&self, doc: DocKey) -> Result<Option<u32>> {
        match self.doc_stats.get(encode_doc_key(doc))? {
            Some(raw) => {
                let bytes: [u8; 4] = raw[..].try_into().context("malformed doc length")?;
                Ok(Some(u32::from_be_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    fn get_total_docs(&self) -> Result<u64> { Ok(self.doc_stats.len() as u64) }

    fn get_avg_doc_length(&self) -> Result<f64> {
        let mut total: u64 = 0;
        let mut count: u64 = 0;
        for entry in self.doc_stats.iter() {
            let (_, raw) = entry?;
            let bytes: [u8; 4] = raw[..].try_into().context("malformed doc length")?;
            total += u32::from_be_bytes(bytes) as u64;
            count += 1;
        }
        if count == 0 { return Ok(0.0); }
        Ok(total as f64 / count as f64)
    }

    fn remove_document(&self, doc: DocKey) -> Result<()> {
        let mut forward = sled::Batch::default();
        let mut terms = sled::Batch::default();
        let mut biwords = sled::Batch::default();
        for entry in self.doc_terms.scan_prefix(encode_doc_key(doc)) {
            let (key, _) = entry?;
            let term = std::str::from_utf8(&key[DOC_KEY_LEN + 1..]).context("forward key term is not utf-8")?;
            let posting_key = PostingKey::new(term, doc).encode();
            match key[DOC_KEY_LEN] {
                FORWARD_TERM => terms.remove(posting_key),
                _ => biwords.remove(posting_key),
            }
            forward.remove(key);
        }
        self.postings.apply_batch(terms)?;
        self.biwords.apply_batch(biwords)?;
        self.doc_terms.apply_batch(forward)?;
        self.doc_stats.remove(encode_doc_key(doc))?;
        Ok(())
    }

    fn insert_question(&self, question: &Question) -> Result<()> {
        let value = bincode::serialize(question)?;
        self.questions.insert(id_key(question.question_id), value)
            .with_context(|| format!("writing question {}", question.question_id))?;
        Ok(())
    }

    fn insert_answer(&self, answer: &Answer) -> Result<()> {
        // a re-parented answer must not stay listed under its old question
        if let Some(prev) = self.answers.get(id_key(answer.answer_id))? {
            let prev: Answer = bincode::deserialize(&prev)?;
            if prev.question_id != answer.question_id {
                self.answers_by_question.remove(answer_link_key(prev.question_id, prev.answer_id))?;
            }
        }
        let value = bincode::serialize(answer)?;
        self.answers.insert(id_key(answer.answer_id), value)
            .with_context(|| format!("writing answer {}", answer.answer_id))?;
        self.answers_by_question.insert(answer_link_key(answer.question_id, answer.answer_id), sled::IVec::default())?;
        Ok(())
    }

    fn get_question(&self, question_id: DocId) -> Result<Option<Question>> {
        match self.questions.get(id_key(question_id))? {
            Some(raw) => Ok(Some(bincode::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    fn get_answers(&self, question_id: DocId) -> Result<Vec<Answer>> {
        let mut out: Vec<Answer> = Vec::new();
        for entry in self.answers_by_question.scan_prefix(id_key(question_id)) {
            let (key, _) = entry?;
            let mut id = [0u8; 8];
            id.copy_from_slice(&key[8..16]);
            if let Some(raw) = self.answers.get(id)? {
                out.push(bincode::deserialize(&raw)?);
            }
        }
        out.sort_by(|a, b| {
            b.is_accepted.cmp(&a.is_accepted)
                .then(b.score.cmp(&a.score))
                .then(a.answer_id.cmp(&b.answer_id))
        });
        Ok(out)
    }

    fn question_count(&self) -> Result<u64> { Ok(self.questions.len() as u64) }

    fn all_questions(&self) -> Result<Vec<Question>> {
        let mut out = Vec::with_capacity(self.questions.len());
        for entry in self.questions.iter() {
            let (_, raw) = entry?;
            out.push(bincode::deserialize(&raw)?);
        }
        Ok(out)
    }

    fn document_frequency(&self, term: &str) -> Result<usize> {
        let mut n = 0;
        for entry in Self::scan_term(&self.postings, term) {
            entry?;
            n += 1;
        }
        Ok(n)
    }

    fn term_exists(&self, term: &str) -> Result<bool> {
        Ok(Self::scan_term(&self.postings, term).next().transpose()?.is_some())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}
