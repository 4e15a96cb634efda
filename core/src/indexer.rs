use crate::persist::IndexStore;
use crate::tokenizer::{create_biwords, process_with_positions, stem};
use crate::{DocId, DocKey, DocType, Posting, QuestionRecord};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Writes postings, biword postings and doc stats for questions and answers.
pub struct Indexer<S> {
    store: S,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexFailure {
    pub question_id: DocId,
    pub error: String,
}

/// Outcome of a batch: how many questions went through and which did not.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IndexReport {
    pub indexed: usize,
    pub answers: usize,
    pub failed: Vec<IndexFailure>,
}

impl IndexReport {
    fn record(&mut self, question_id: DocId, outcome: Result<usize>) {
        match outcome {
            Ok(answers) => {
                self.indexed += 1;
                self.answers += answers;
            }
            Err(err) => {
                tracing::warn!(question_id, error = %format!("{err:#}"), "failed to index question");
                self.failed.push(IndexFailure { question_id, error: format!("{err:#}") });
            }
        }
        let seen = self.indexed + self.failed.len();
        if seen % 100 == 0 {
            tracing::info!(seen, failed = self.failed.len(), "indexing progress");
        }
    }
}

impl<S: IndexStore> Indexer<S> {
    pub fn new(store: S) -> Self { Self { store } }

    pub fn store(&self) -> &S { &self.store }

    /// Index a question. The title is counted twice ahead of the body so that
    /// title terms carry extra term frequency; tags become presence-only
    /// `question_tag` postings.
    pub fn index_question(&self, id: DocId, title: &str, body: &str, tags: &[String]) -> Result<()> {
        let full_text = format!("{title} {title} {body}");
        let doc = DocKey::question(id);
        self.store.remove_document(doc)?;
        self.store.remove_document(DocKey::new(id, DocType::QuestionTag))?;
        self.index_text(doc, &full_text)?;

        for tag in tags {
            let term = stem(&tag.to_lowercase());
            let posting = Posting::new(DocKey::new(id, DocType::QuestionTag), vec![0]);
            self.store.insert_index_term(&term, &posting)?;
        }
        Ok(())
    }

    pub fn index_answer(&self, id: DocId, question_id: DocId, body: &str) -> Result<()> {
        tracing::trace!(answer_id = id, question_id, "indexing answer");
        let doc = DocKey::answer(id);
        self.store.remove_document(doc)?;
        self.index_text(doc, body)
    }

    fn index_text(&self, doc: DocKey, text: &str) -> Result<()> {
        let tokens = process_with_positions(text);

        let mut term_positions: HashMap<&str, Vec<u32>> = HashMap::new();
        for (term, pos) in &tokens {
            term_positions.entry(term.as_str()).or_default().push(*pos);
        }
        for (term, positions) in term_positions {
            self.store.insert_index_term(term, &Posting::new(doc, positions))?;
        }

        let terms: Vec<&str> = tokens.iter().map(|(t, _)| t.as_str()).collect();
        let mut biword_positions: HashMap<String, Vec<u32>> = HashMap::new();
        for (i, biword) in create_biwords(&terms).into_iter().enumerate() {
            biword_positions.entry(biword).or_default().push(i as u32);
        }
        for (biword, positions) in biword_positions {
            self.store.insert_biword(&biword, &Posting::new(doc, positions))?;
        }

        self.store.insert_doc_stats(doc, tokens.len() as u32)
    }

    /// Upsert a question and its answers, then index all of them.
    /// Returns the number of answers indexed.
    pub fn index_record(&self, record: QuestionRecord) -> Result<usize> {
        let QuestionRecord { question, answers } = record;
        let qid = question.question_id;
        self.store.insert_question(&question)?;
        self.index_question(qid, &question.title, &question.body, &question.tags)?;
        let n = answers.len();
        for answer in answers {
            let answer = answer.into_answer(qid);
            self.store.insert_answer(&answer)
                .with_context(|| format!("storing answer {}", answer.answer_id))?;
            self.index_answer(answer.answer_id, qid, &answer.body)
                .with_context(|| format!("indexing answer {}", answer.answer_id))?;
        }
        Ok(n)
    }

    /// Index every record; one failing question does not stop the rest.
    pub fn index_batch<I>(&self, records: I) -> IndexReport
    where
        I: IntoIterator<Item = QuestionRecord>,
    {
        let mut report = IndexReport::default();
        for record in records {
            let qid = record.question.question_id;
            report.record(qid, self.index_record(record));
        }
        report
    }

    /// Rebuild postings for every stored question and its answers.
    /// Any ranker reading this store must drop its caches afterwards.
    pub fn reindex_all(&self) -> Result<IndexReport> {
        let questions = self.store.all_questions()?;
        tracing::info!(questions = questions.len(), "rebuilding index");
        let mut report = IndexReport::default();
        for q in questions {
            let outcome = (|| -> Result<usize> {
                self.index_question(q.question_id, &q.title, &q.body, &q.tags)?;
                let answers = self.store.get_answers(q.question_id)?;
                for a in &answers {
                    self.index_answer(a.answer_id, q.question_id, &a.body)
                        .with_context(|| format!("indexing answer {}", a.answer_id))?;
                }
                Ok(answers.len())
            })();
            report.record(q.question_id, outcome);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::SledStore;

    fn indexer() -> Indexer<SledStore> { Indexer::new(SledStore::temporary().unwrap()) }

    #[test]
    fn doc_length_counts_positioned_tokens() {
        let ix = indexer();
        ix.index_question(1, "Spring Boot REST API", "How do I return JSON from a controller?", &[]).unwrap();
        let expected = process_with_positions("Spring Boot REST API Spring Boot REST API How do I return JSON from a controller?").len();
        assert_eq!(ix.store().get_doc_stats(DocKey::question(1)).unwrap(), Some(expected as u32));
    }

    #[test]
    fn title_terms_are_counted_twice() {
        let ix = indexer();
        ix.index_question(1, "Tokio Runtime", "tokio rocks", &[]).unwrap();
        let p = ix.store().get_postings("tokio").unwrap();
        assert_eq!(p.len(), 1);
        assert_eq!(p[0].frequency, 3);
        assert_eq!(p[0].positions, vec![0, 2, 4]);
    }

    #[test]
    fn biword_positions_index_the_term_sequence() {
        let ix = indexer();
        // stopwords leave gaps in token positions but not in biword indices
        ix.index_answer(9, 1, "run the tests then run the tests").unwrap();
        let p = ix.store().get_biword_postings("run_test").unwrap();
        assert_eq!(p, vec![Posting::new(DocKey::answer(9), vec![0, 2])]);
        let p = ix.store().get_postings("test").unwrap();
        assert_eq!(p[0].positions, vec![2, 6]);
    }

    #[test]
    fn tags_become_presence_postings() {
        let ix = indexer();
        ix.index_question(4, "Title", "Body", &["Spring-Boot".to_string(), "Databases".to_string()]).unwrap();
        let p = ix.store().get_postings("spring-boot").unwrap();
        assert_eq!(p, vec![Posting::new(DocKey::new(4, DocType::QuestionTag), vec![0])]);
        assert_eq!(ix.store().get_postings("database").unwrap().len(), 1);
    }

    #[test]
    fn reindexing_replaces_stale_terms() {
        let ix = indexer();
        ix.index_answer(3, 1, "postgres connection pooling").unwrap();
        ix.index_answer(3, 1, "sqlite file locking").unwrap();
        assert!(ix.store().get_postings("postgre").unwrap().is_empty());
        assert_eq!(ix.store().get_postings("sqlite").unwrap().len(), 1);
        assert_eq!(ix.store().get_total_docs().unwrap(), 1);
    }
}
