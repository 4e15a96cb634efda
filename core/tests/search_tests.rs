use stackrank_core::tokenizer::{process, process_with_positions};
use stackrank_core::{
    AnswerRecord, Bm25Ranker, DocKey, IndexStore, Indexer, Question, QuestionRecord, QueryProcessor, RankerConfig,
    SledStore,
};

const NOW: i64 = 1_750_000_000;
const DAY: i64 = 86_400;

fn question(id: u64, title: &str, body: &str, tags: &[&str], score: i64) -> Question {
    Question {
        question_id: id,
        title: title.to_string(),
        body: body.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        score,
        view_count: 100,
        answer_count: 0,
        creation_date: NOW - 30 * DAY,
        link: format!("https://stackoverflow.com/q/{id}"),
        is_answered: true,
    }
}

fn answer(id: u64, body: &str, score: i64, accepted: bool) -> AnswerRecord {
    AnswerRecord { answer_id: id, body: body.to_string(), score, is_accepted: accepted, creation_date: NOW - DAY }
}

fn record(q: Question, answers: Vec<AnswerRecord>) -> QuestionRecord {
    QuestionRecord { question: q, answers }
}

fn corpus() -> SledStore {
    let store = SledStore::temporary().unwrap();
    let ix = Indexer::new(store.clone());
    let report = ix.index_batch(vec![
        record(
            question(1, "Spring Boot REST API", "How do I build a REST API with Spring Boot controllers?", &["spring-boot", "java"], 25),
            vec![
                answer(10, "Annotate the class with @RestController.", 10, false),
                answer(11, "Use @RestController and return ResponseEntity.", 2, true),
                answer(12, "Check your component scan packages.", 5, false),
                answer(13, "Add spring-boot-starter-web.", 1, false),
            ],
        ),
        record(
            question(2, "REST API in Django", "Build a REST API with Django REST framework serializers", &["django", "python"], 40),
            vec![answer(20, "Use ModelViewSet from the framework.", 3, true)],
        ),
        record(
            question(3, "Tokio runtime panics", "My tokio runtime panics when blocking inside async code", &["rust", "tokio"], 8),
            vec![answer(30, "Use spawn_blocking for zzzunique blocking work.", 12, true)],
        ),
    ]);
    assert!(report.failed.is_empty());
    assert_eq!(report.indexed, 3);
    assert_eq!(report.answers, 6);
    store
}

fn ranker(store: &SledStore) -> Bm25Ranker<SledStore> {
    Bm25Ranker::new(store.clone(), RankerConfig::default())
}

fn ids(results: &[stackrank_core::RankedResult]) -> Vec<u64> {
    results.iter().map(|r| r.question_id).collect()
}

#[test]
fn answers_listed_accepted_first() {
    let store = corpus();
    let answers: Vec<u64> = store.get_answers(1).unwrap().iter().map(|a| a.answer_id).collect();
    assert_eq!(answers, vec![11, 10, 12, 13]);
}

#[test]
fn search_finds_matching_questions_with_top_answers() {
    let store = corpus();
    let mut r = ranker(&store);
    let results = r.search_and_rank_at("rest api", 0.0, None, NOW).unwrap();
    let found = ids(&results);
    assert_eq!(found.len(), 2);
    assert!(found.contains(&1) && found.contains(&2));

    let spring = results.iter().find(|r| r.question_id == 1).unwrap();
    let attached: Vec<u64> = spring.answers.iter().map(|a| a.answer_id).collect();
    assert_eq!(attached, vec![11, 10, 12]);
    assert!(spring.answers[0].is_accepted);
    assert_eq!(spring.tags, vec!["spring-boot", "java"]);
    assert!(spring.boosted_score > spring.bm25_score);
}

#[test]
fn tag_filter_excludes_other_questions() {
    let store = corpus();
    let mut r = ranker(&store);
    let results = r.search_and_rank_at("rest api", 0.0, Some("Spring-Boot"), NOW).unwrap();
    assert_eq!(ids(&results), vec![1]);
    assert!(r.search_and_rank_at("rest api", 0.0, Some("haskell"), NOW).unwrap().is_empty());
}

#[test]
fn empty_and_unmatched_queries_return_nothing() {
    let store = corpus();
    let mut r = ranker(&store);
    assert!(r.search_and_rank_at("", 0.0, None, NOW).unwrap().is_empty());
    assert!(r.search_and_rank_at("the of and", 0.0, None, NOW).unwrap().is_empty());
    assert!(r.search_and_rank_at("haskell monads", 0.0, None, NOW).unwrap().is_empty());
}

#[test]
fn answer_only_matches_are_not_surfaced() {
    let store = corpus();
    let mut r = ranker(&store);
    assert!(r.search_and_rank_at("zzzunique", 0.0, None, NOW).unwrap().is_empty());
}

#[test]
fn threshold_applies_to_unboosted_score() {
    let store = SledStore::temporary().unwrap();
    let ix = Indexer::new(store.clone());
    ix.index_record(record(question(1, "Serde derive", "serde derive serde derive macros", &["rust"], 0), vec![])).unwrap();
    ix.index_record(record(question(2, "Build scripts", "a note mentioning serde once among many other words here", &["rust"], 1_000_000), vec![])).unwrap();
    ix.index_record(record(question(3, "Cargo workspaces", "members and resolver settings", &["rust"], 0), vec![])).unwrap();

    let mut r = ranker(&store);
    let ranked = r.rank_questions("serde", NOW).unwrap();
    let strong = ranked.iter().find(|q| q.question.question_id == 1).unwrap().bm25_score;
    let weak = ranked.iter().find(|q| q.question.question_id == 2).unwrap().bm25_score;
    assert!(strong > weak);
    // popularity lifts the weak match above the strong one
    assert_eq!(ranked[0].question.question_id, 2);

    let min_score = (strong + weak) / 2.0;
    let results = r.search_and_rank_at("serde", min_score, None, NOW).unwrap();
    assert!(!ids(&results).contains(&2));
    assert!(results.iter().all(|res| res.bm25_score >= min_score));

    assert!(r.search_and_rank_at("serde", strong + 1.0, None, NOW).unwrap().is_empty());
}

#[test]
fn title_terms_outrank_body_terms() {
    let store = SledStore::temporary().unwrap();
    let ix = Indexer::new(store.clone());
    ix.index_record(record(question(1, "Serde", "how to rename fields", &[], 0), vec![])).unwrap();
    ix.index_record(record(question(2, "Rename fields", "how to use serde", &[], 0), vec![])).unwrap();
    let mut r = ranker(&store);
    let ranked = r.rank_questions("serde", NOW).unwrap();
    assert_eq!(ranked[0].question.question_id, 1);
    assert!(ranked[0].bm25_score > 5.0 * ranked[1].bm25_score);
}

#[test]
fn results_capped_at_max_results() {
    let store = SledStore::temporary().unwrap();
    let ix = Indexer::new(store.clone());
    let records: Vec<QuestionRecord> = (1..=8)
        .map(|i| record(question(i, &format!("Borrow checker case {i}"), "borrow checker error", &["rust"], 0), vec![]))
        .collect();
    assert!(ix.index_batch(records).failed.is_empty());
    let mut r = ranker(&store);
    assert_eq!(r.search_and_rank_at("borrow checker", 0.0, None, NOW).unwrap().len(), 5);
}

#[test]
fn scores_are_rounded_to_two_places() {
    let store = corpus();
    let mut r = ranker(&store);
    for res in r.search_and_rank_at("rest api", 0.0, None, NOW).unwrap() {
        assert_eq!((res.bm25_score * 100.0).round() / 100.0, res.bm25_score);
        assert_eq!((res.boosted_score * 100.0).round() / 100.0, res.boosted_score);
    }
}

#[test]
fn postings_satisfy_frequency_and_order_invariants() {
    let store = corpus();
    let text = "Spring Boot REST API Spring Boot REST API How do I build a REST API with Spring Boot controllers?";
    for term in process(text) {
        for p in store.get_postings(&term).unwrap() {
            assert_eq!(p.frequency as usize, p.positions.len());
            assert!(p.positions.windows(2).all(|w| w[0] < w[1]));
        }
    }
    let expected = process_with_positions(text).len() as u32;
    assert_eq!(store.get_doc_stats(DocKey::question(1)).unwrap(), Some(expected));
    let expected = process_with_positions("Use @RestController and return ResponseEntity.").len() as u32;
    assert_eq!(store.get_doc_stats(DocKey::answer(11)).unwrap(), Some(expected));
}

#[test]
fn reindexing_identical_content_is_idempotent() {
    let store = corpus();
    let text = "Tokio runtime panics Tokio runtime panics My tokio runtime panics when blocking inside async code";
    let snapshot = |s: &SledStore| {
        let mut rows = Vec::new();
        for term in process(text) {
            rows.push((term.clone(), s.get_postings(&term).unwrap()));
        }
        (rows, s.get_biword_postings("tokio_runtime").unwrap(), s.get_total_docs().unwrap(), s.get_avg_doc_length().unwrap())
    };
    let before = snapshot(&store);
    let ix = Indexer::new(store.clone());
    let q = store.get_question(3).unwrap().unwrap();
    ix.index_question(q.question_id, &q.title, &q.body, &q.tags).unwrap();
    ix.reindex_all().unwrap();
    assert_eq!(snapshot(&store), before);
}

#[test]
fn phrase_search_needs_adjacent_terms_in_order() {
    let store = SledStore::temporary().unwrap();
    let ix = Indexer::new(store.clone());
    ix.index_question(1, "Creating REST API clients", "", &[]).unwrap();
    ix.index_question(2, "REST API creating guide", "", &[]).unwrap();
    ix.index_question(3, "Creating a simple REST API", "", &[]).unwrap();
    let qp = QueryProcessor::new(store);
    let hits = qp.phrase_search("creating rest api").unwrap();
    assert_eq!(hits.into_iter().collect::<Vec<_>>(), vec![DocKey::question(1)]);
}

#[test]
fn cleared_cache_sees_new_documents() {
    let store = corpus();
    let mut r = ranker(&store);
    assert!(r.search_and_rank_at("wasm", 0.0, None, NOW).unwrap().is_empty());
    let before = r.corpus_stats().unwrap().total_docs;
    Indexer::new(store.clone())
        .index_record(record(question(4, "Rust to WASM", "compile rust to wasm with wasm-pack", &["rust"], 3), vec![]))
        .unwrap();
    r.clear_cache();
    assert_eq!(r.corpus_stats().unwrap().total_docs, before + 1);
    assert_eq!(ids(&r.search_and_rank_at("wasm", 0.0, None, NOW).unwrap()), vec![4]);
}

fn crowded_corpus() -> SledStore {
    let store = SledStore::temporary().unwrap();
    let ix = Indexer::new(store.clone());
    let mut records: Vec<QuestionRecord> = (1..=25)
        .map(|i| record(question(i, &format!("Borrow checker case {i}"), "borrow checker error", &["rust"], 50), vec![]))
        .collect();
    records.push(record(question(26, "Lifetime elision", "a note on borrow rules for struct fields", &["niche"], 50), vec![]));
    assert!(ix.index_batch(records).failed.is_empty());
    store
}

#[test]
fn questions_past_boost_window_keep_raw_score() {
    let store = crowded_corpus();
    let mut r = ranker(&store);
    let ranked = r.rank_questions("borrow", NOW).unwrap();
    assert_eq!(ranked.len(), 26);
    for sq in &ranked[..20] {
        assert!(sq.boosted_score > sq.bm25_score);
    }
    for sq in &ranked[20..] {
        assert_eq!(sq.boosted_score, sq.bm25_score);
    }
    let last = ranked.last().unwrap();
    assert_eq!(last.question.question_id, 26);
    assert!(ranked[..25].iter().all(|sq| sq.bm25_score > last.bm25_score));
}

#[test]
fn tag_filter_reaches_past_boost_window() {
    let store = crowded_corpus();
    let mut r = ranker(&store);
    let results = r.search_and_rank_at("borrow", 0.0, Some("niche"), NOW).unwrap();
    assert_eq!(ids(&results), vec![26]);
    assert_eq!(results[0].boosted_score, results[0].bm25_score);
}
