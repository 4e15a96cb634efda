use crate::persist::IndexStore;
use crate::tokenizer::{self, create_biwords, extract_phrases, process};
use crate::{DocKey, Posting};
use anyhow::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A query split into free terms, quoted phrases and term biwords.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedQuery {
    pub original: String,
    pub terms: Vec<String>,
    pub phrases: Vec<String>,
    pub biwords: Vec<String>,
}

pub struct QueryProcessor<S> {
    store: S,
}

fn doc_set(postings: &[Posting]) -> HashSet<DocKey> {
    postings.iter().map(|p| p.doc).collect()
}

fn intersect_all(sets: Vec<HashSet<DocKey>>) -> HashSet<DocKey> {
    let mut iter = sets.into_iter();
    let Some(mut acc) = iter.next() else { return HashSet::new() };
    for set in iter {
        if acc.is_empty() { break; }
        acc.retain(|d| set.contains(d));
    }
    acc
}

impl<S: IndexStore> QueryProcessor<S> {
    pub fn new(store: S) -> Self { Self { store } }

    /// Pull quoted phrases out first; the rest becomes stemmed terms and their biwords.
    pub fn process_query(&self, query: &str) -> ParsedQuery {
        let phrases = extract_phrases(query);
        let mut remainder = query.to_string();
        for phrase in &phrases {
            remainder = remainder.replace(&format!("\"{phrase}\""), "");
        }
        let terms = process(&remainder);
        let biwords = create_biwords(&terms);
        ParsedQuery { original: query.to_string(), terms, phrases, biwords }
    }

    /// Order terms by ascending document frequency, rarest first.
    pub fn optimize_query_terms(&self, terms: &[String]) -> Result<Vec<String>> {
        let mut with_df = Vec::with_capacity(terms.len());
        for term in terms {
            with_df.push((term.clone(), self.store.document_frequency(term)?));
        }
        with_df.sort_by_key(|(_, df)| *df);
        Ok(with_df.into_iter().map(|(t, _)| t).collect())
    }

    /// AND over all terms, intersecting from the rarest term outwards.
    pub fn boolean_retrieval(&self, terms: &[String]) -> Result<HashSet<DocKey>> {
        if terms.is_empty() {
            return Ok(HashSet::new());
        }
        let ordered = self.optimize_query_terms(terms)?;
        let mut sets = Vec::with_capacity(ordered.len());
        for term in &ordered {
            let set = doc_set(&self.store.get_postings(term)?);
            if set.is_empty() {
                return Ok(HashSet::new());
            }
            sets.push(set);
        }
        Ok(intersect_all(sets))
    }

    /// Documents holding the phrase's terms at consecutive positions.
    pub fn phrase_search(&self, phrase: &str) -> Result<HashSet<DocKey>> {
        let terms = process(phrase);
        match terms.len() {
            0 => return Ok(HashSet::new()),
            1 => return Ok(doc_set(&self.store.get_postings(&terms[0])?)),
            _ => {}
        }

        let first = self.store.get_postings(&terms[0])?;
        if first.is_empty() {
            return Ok(HashSet::new());
        }
        // positions of every later term, per document, fetched once
        let mut rest: Vec<HashMap<DocKey, HashSet<u32>>> = Vec::with_capacity(terms.len() - 1);
        for term in &terms[1..] {
            let by_doc: HashMap<DocKey, HashSet<u32>> = self.store.get_postings(term)?
                .into_iter()
                .map(|p| (p.doc, p.positions.into_iter().collect()))
                .collect();
            if by_doc.is_empty() {
                return Ok(HashSet::new());
            }
            rest.push(by_doc);
        }

        let mut matches = HashSet::new();
        for posting in first {
            let starts_a_phrase = posting.positions.iter().any(|&start| {
                rest.iter().enumerate().all(|(i, by_doc)| {
                    by_doc.get(&posting.doc).map_or(false, |ps| ps.contains(&(start + i as u32 + 1)))
                })
            });
            if starts_a_phrase {
                matches.insert(posting.doc);
            }
        }
        Ok(matches)
    }

    /// AND over the biwords formed from `terms`.
    pub fn biword_search(&self, terms: &[String]) -> Result<HashSet<DocKey>> {
        let biwords = create_biwords(terms);
        let mut sets = Vec::with_capacity(biwords.len());
        for biword in &biwords {
            let set = doc_set(&self.store.get_biword_postings(biword)?);
            if set.is_empty() {
                return Ok(HashSet::new());
            }
            sets.push(set);
        }
        Ok(intersect_all(sets))
    }

    /// Replace each unknown query term with its closest indexed neighbour.
    pub fn suggest_terms(&self, query: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for term in process(query) {
            out.push(tokenizer::spell_correct(&term, |w| self.store.term_exists(w))?);
        }
        Ok(out)
    }
}
