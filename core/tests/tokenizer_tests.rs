use stackrank_core::tokenizer::{create_biwords, process, process_with_positions, tokenize};

#[test]
fn it_strips_markup_and_code() {
    let toks = tokenize("Use <code>foo()</code> to call it.");
    assert!(toks.iter().all(|t| !t.contains('<') && !t.contains('>')));
    assert_eq!(toks, vec!["use", "foo", "to", "call", "it"]);

    let toks = tokenize("Run `cargo build` then ```\nfn main() {}\n``` done");
    assert_eq!(toks, vec!["run", "then", "done"]);
}

#[test]
fn it_normalizes_and_stems() {
    let words = process("Running Runners RUN! Configured queries.");
    // "running" and "runners" both collapse to "runn"
    assert_eq!(words.iter().filter(|w| *w == "runn").count(), 2);
    assert!(words.contains(&"run".to_string()));
    assert!(words.contains(&"configur".to_string()));
    assert!(words.contains(&"queri".to_string()));
}

#[test]
fn it_filters_stopwords() {
    let words = process("The quick brown fox and the lazy dog");
    assert!(!words.contains(&"the".to_string()));
    assert!(!words.contains(&"and".to_string()));
    assert_eq!(words.len(), 5);
}

#[test]
fn positions_reference_unfiltered_stream() {
    let text = "What is the best way to handle errors in Rust";
    let raw = tokenize(text);
    for (term, pos) in process_with_positions(text) {
        let original = &raw[pos as usize];
        assert_eq!(stackrank_core::tokenizer::stem(original), term);
    }
    let positions: Vec<u32> = process_with_positions(text).into_iter().map(|(_, p)| p).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn biwords_are_one_fewer_than_tokens() {
    for n in 0..6 {
        let tokens: Vec<String> = (0..n).map(|i| format!("t{i}")).collect();
        assert_eq!(create_biwords(&tokens).len(), n.max(1) - 1);
    }
}
