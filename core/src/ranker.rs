//! BM25 ranking with title boosting, field weighting and popularity/recency
//! boosts.
//!
//! ```text
//! idf(t)      = ln((N - df + 0.5) / (df + 0.5) + 1)
//! score(t, D) = idf(t) * tf * (k1 + 1) / (tf + k1 * (1 - b + b * |D| / avgdl))
//! ```
//!
//! Corpus statistics and IDF values are cached on the ranker instance until
//! [`Bm25Ranker::clear_cache`] is called.

use crate::config::RankerConfig;
use crate::persist::IndexStore;
use crate::tokenizer::process;
use crate::{DocId, DocKey, DocType, Question, RankedAnswer, RankedResult};
use anyhow::Result;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CorpusStats {
    pub total_docs: u64,
    pub avg_doc_length: f64,
}

/// A unit with its field-weighted BM25 score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc: DocKey,
    pub score: f64,
}

/// A question after aggregation and secondary boosting.
#[derive(Debug, Clone)]
pub struct ScoredQuestion {
    pub question: Question,
    pub bm25_score: f64,
    pub boosted_score: f64,
}

/// term -> (doc -> term frequency)
type TermFrequencies = HashMap<String, HashMap<DocKey, u32>>;

pub struct Bm25Ranker<S> {
    store: S,
    config: RankerConfig,
    corpus: Option<CorpusStats>,
    idf_cache: HashMap<String, f64>,
}

pub fn community_boost(score: i64) -> f64 {
    ((score.unsigned_abs() as f64 + 3.0).max(1.0)).ln() * 1.5
}

/// Newer questions get up to 3.0, halving after a year. Missing or future
/// timestamps get a flat 0.1.
pub fn recency_boost(creation_date: i64, now: i64) -> f64 {
    if creation_date <= 0 || creation_date > now {
        return 0.1;
    }
    let age_days = (now - creation_date) as f64 / SECONDS_PER_DAY;
    3.0 / (1.0 + age_days / 365.0)
}

fn round2(x: f64) -> f64 { (x * 100.0).round() / 100.0 }

fn by_score_desc(a: f64, b: f64) -> Ordering { b.partial_cmp(&a).unwrap_or(Ordering::Equal) }

impl<S: IndexStore> Bm25Ranker<S> {
    pub fn new(store: S, config: RankerConfig) -> Self {
        Self { store, config, corpus: None, idf_cache: HashMap::new() }
    }

    pub fn config(&self) -> &RankerConfig { &self.config }

    pub fn store(&self) -> &S { &self.store }

    /// Forget cached corpus statistics and IDF values. Call after re-indexing.
    pub fn clear_cache(&mut self) {
        self.corpus = None;
        self.idf_cache.clear();
    }

    pub fn corpus_stats(&mut self) -> Result<CorpusStats> {
        if let Some(stats) = self.corpus {
            return Ok(stats);
        }
        let stats = CorpusStats {
            total_docs: self.store.get_total_docs()?,
            avg_doc_length: self.store.get_avg_doc_length()?,
        };
        tracing::debug!(total_docs = stats.total_docs, avg_doc_length = stats.avg_doc_length, "loaded corpus stats");
        self.corpus = Some(stats);
        Ok(stats)
    }

    pub fn idf(&mut self, term: &str) -> Result<f64> {
        if let Some(&idf) = self.idf_cache.get(term) {
            return Ok(idf);
        }
        let df = self.store.document_frequency(term)? as f64;
        let n = self.corpus_stats()?.total_docs as f64;
        let idf = if df == 0.0 { 0.0 } else { ((n - df + 0.5) / (df + 0.5) + 1.0).ln() };
        self.idf_cache.insert(term.to_string(), idf);
        Ok(idf)
    }

    pub fn term_score(&mut self, term: &str, tf: u32, doc_length: u32) -> Result<f64> {
        let idf = self.idf(term)?;
        let mut avgdl = self.corpus_stats()?.avg_doc_length;
        if avgdl <= 0.0 {
            avgdl = 1.0;
        }
        let (k1, b) = (self.config.k1, self.config.b);
        let tf = tf as f64;
        let norm = 1.0 - b + b * (doc_length as f64 / avgdl);
        Ok(idf * (tf * (k1 + 1.0)) / (tf + k1 * norm))
    }

    /// Unweighted BM25 score of one unit, with title terms of questions
    /// multiplied by the title boost.
    pub fn score_document(&mut self, query_terms: &[String], doc: DocKey) -> Result<f64> {
        let tfs = self.term_frequencies(query_terms)?;
        self.score_with(query_terms, doc, &tfs)
    }

    fn term_frequencies(&self, terms: &[String]) -> Result<TermFrequencies> {
        let mut out = TermFrequencies::new();
        for term in terms {
            if out.contains_key(term) { continue; }
            let by_doc = self.store.get_postings(term)?
                .into_iter()
                .map(|p| (p.doc, p.frequency))
                .collect();
            out.insert(term.clone(), by_doc);
        }
        Ok(out)
    }

    fn score_with(&mut self, query_terms: &[String], doc: DocKey, tfs: &TermFrequencies) -> Result<f64> {
        // units without doc stats are scored as length 1
        let doc_length = self.store.get_doc_stats(doc)?.unwrap_or(1);

        let title_terms: HashSet<String> = match doc.doc_type {
            DocType::Question => self.store.get_question(doc.doc_id)?
                .map(|q| process(&q.title).into_iter().collect())
                .unwrap_or_default(),
            _ => HashSet::new(),
        };

        let mut score = 0.0;
        let mut title_score = 0.0;
        for term in query_terms {
            let tf = tfs.get(term).and_then(|m| m.get(&doc)).copied().unwrap_or(0);
            if tf == 0 { continue; }
            let s = self.term_score(term, tf, doc_length)?;
            if doc.doc_type == DocType::Question && title_terms.contains(term) {
                title_score += s * self.config.title_boost;
            } else {
                score += s;
            }
        }
        Ok(score + title_score)
    }

    /// Every unit that contains at least one query term.
    pub fn candidates(&self, query_terms: &[String]) -> Result<HashSet<DocKey>> {
        let tfs = self.term_frequencies(query_terms)?;
        Ok(tfs.values().flat_map(|m| m.keys().copied()).collect())
    }

    /// Score candidates, apply field weights, sort by weighted score descending.
    pub fn rank_documents(&mut self, query_terms: &[String], candidates: &HashSet<DocKey>) -> Result<Vec<ScoredDoc>> {
        let tfs = self.term_frequencies(query_terms)?;
        self.rank_with(query_terms, candidates, &tfs)
    }

    fn rank_with(&mut self, query_terms: &[String], candidates: &HashSet<DocKey>, tfs: &TermFrequencies) -> Result<Vec<ScoredDoc>> {
        let mut docs: Vec<DocKey> = candidates.iter().copied().collect();
        docs.sort();
        let mut scored = Vec::with_capacity(docs.len());
        for doc in docs {
            let base = self.score_with(query_terms, doc, tfs)?;
            let score = base * self.config.field_weights.weight(doc.doc_type);
            scored.push(ScoredDoc { doc, score });
        }
        scored.sort_by(|a, b| by_score_desc(a.score, b.score));
        Ok(scored)
    }

    /// Questions matching `query`, best raw score per question. The top
    /// `boost_top_n` by raw score are boosted and re-sorted by boosted score;
    /// the rest follow in raw-score order with `boosted_score == bm25_score`.
    pub fn rank_questions(&mut self, query: &str, now: i64) -> Result<Vec<ScoredQuestion>> {
        let terms = process(query);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let tfs = self.term_frequencies(&terms)?;
        let candidates: HashSet<DocKey> = tfs.values().flat_map(|m| m.keys().copied()).collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let ranked = self.rank_with(&terms, &candidates, &tfs)?;

        let mut best: HashMap<DocId, f64> = HashMap::new();
        for sd in ranked.iter().filter(|sd| sd.doc.doc_type == DocType::Question) {
            let entry = best.entry(sd.doc.doc_id).or_insert(sd.score);
            if sd.score > *entry {
                *entry = sd.score;
            }
        }
        let mut questions: Vec<(DocId, f64)> = best.into_iter().collect();
        questions.sort_by(|a, b| by_score_desc(a.1, b.1).then(a.0.cmp(&b.0)));

        let mut out = Vec::with_capacity(questions.len());
        let mut boosted = 0;
        for (rank, (id, bm25_score)) in questions.into_iter().enumerate() {
            let Some(question) = self.store.get_question(id)? else {
                tracing::debug!(question_id = id, "indexed question missing from store");
                continue;
            };
            let boosted_score = if rank < self.config.boost_top_n {
                boosted += 1;
                bm25_score + community_boost(question.score) + recency_boost(question.creation_date, now)
            } else {
                bm25_score
            };
            out.push(ScoredQuestion { question, bm25_score, boosted_score });
        }
        out[..boosted].sort_by(|a, b| by_score_desc(a.boosted_score, b.boosted_score));

        tracing::debug!(query, terms = terms.len(), candidates = candidates.len(), questions = out.len(), "ranked query");
        Ok(out)
    }

    /// Ranked questions for `query` with up to `answers_per_result` answers
    /// attached. Iteration stops at the first question whose unboosted score
    /// is below `min_score`; `tag` keeps only questions whose stored tag
    /// string contains it (case-insensitive).
    pub fn search_and_rank(&mut self, query: &str, min_score: f64, tag: Option<&str>) -> Result<Vec<RankedResult>> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        self.search_and_rank_at(query, min_score, tag, now)
    }

    /// [`search_and_rank`](Self::search_and_rank) against a fixed clock (unix seconds).
    pub fn search_and_rank_at(&mut self, query: &str, min_score: f64, tag: Option<&str>, now: i64) -> Result<Vec<RankedResult>> {
        let ranked = self.rank_questions(query, now)?;
        let tag = tag.filter(|t| !t.is_empty()).map(str::to_lowercase);

        let mut results = Vec::new();
        for sq in ranked {
            if results.len() >= self.config.max_results {
                break;
            }
            if sq.bm25_score < min_score {
                break;
            }
            if let Some(tag) = &tag {
                if !sq.question.tag_string().to_lowercase().contains(tag.as_str()) {
                    continue;
                }
            }
            let answers: Vec<RankedAnswer> = self.store.get_answers(sq.question.question_id)?
                .into_iter()
                .take(self.config.answers_per_result)
                .map(RankedAnswer::from)
                .collect();
            let q = sq.question;
            results.push(RankedResult {
                question_id: q.question_id,
                title: q.title,
                body: q.body,
                link: q.link,
                score: q.score,
                tags: q.tags,
                bm25_score: round2(sq.bm25_score),
                boosted_score: round2(sq.boosted_score),
                answers,
            });
        }
        Ok(results)
    }
}
