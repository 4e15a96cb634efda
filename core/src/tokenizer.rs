use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref MARKUP: Regex = Regex::new(r"<[^>]+>").expect("valid regex");
    static ref FENCED_CODE: Regex = Regex::new(r"(?s)```.*?```").expect("valid regex");
    static ref INLINE_CODE: Regex = Regex::new(r"`[^`]+`").expect("valid regex");
    static ref NON_TERM: Regex = Regex::new(r"[^\w\s+#-]").expect("valid regex");
    static ref QUOTED: Regex = Regex::new(r#""([^"]+)""#).expect("valid regex");
    static ref STOPWORDS: HashSet<&'static str> = {
        let words: &[&str] = &[
            "a","about","above","after","again","against","all","am","an","and","any","are","as","at",
            "be","because","been","before","being","below","between","both","but","by",
            "can","cannot","could",
            "did","do","does","doing","down","during",
            "each","few","for","from","further",
            "had","has","have","having","he","her","here","hers","herself","him","himself","his","how",
            "i","if","in","into","is","it","its","itself",
            "just","me","might","more","most","must","my","myself",
            "no","nor","not","now","of","off","on","once","only","or","other","our","ours","ourselves","out","over","own",
            "same","she","should","so","some","such",
            "than","that","the","their","theirs","them","themselves","then","there","these","they","this","those","through","to","too",
            "under","until","up","very",
            "was","we","were","what","when","where","which","while","who","whom","why","will","with","would",
            "you","your","yours","yourself","yourselves"
        ];
        words.iter().copied().collect()
    };
}

/// Ordered suffix rewrites for the derivational pass: (suffix, replacement, min length).
/// Only the first matching suffix is applied.
const DERIVATIONAL: &[(&str, &str, usize)] = &[
    ("ational", "ate", 0),
    ("tional", "tion", 0),
    ("ization", "ize", 0),
    ("ation", "ate", 0),
    ("ness", "", 0),
    ("ment", "", 0),
    ("ity", "", 0),
    ("er", "", 4),
    ("ly", "", 4),
];

pub fn is_stopword(token: &str) -> bool { STOPWORDS.contains(token) }

/// Split raw text into lowercase terms.
///
/// Markup tags and code spans (fenced and inline) are blanked out first, then
/// every character other than a word character, whitespace, `+`, `#` or `-`
/// becomes a separator. Token order follows the source text.
pub fn tokenize(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let text = MARKUP.replace_all(text, " ");
    let text = FENCED_CODE.replace_all(&text, " ");
    let text = INLINE_CODE.replace_all(&text, " ");
    let lowered = text.to_lowercase();
    let cleaned = NON_TERM.replace_all(&lowered, " ");
    cleaned.split_whitespace().map(str::to_string).collect()
}

pub fn remove_stopwords(tokens: Vec<String>) -> Vec<String> {
    tokens.into_iter().filter(|t| !is_stopword(t)).collect()
}

/// Light suffix stripper. Index and query sides must share it verbatim, so
/// its quirks (e.g. `create` stays `create` while `creating` becomes `creat`)
/// are part of the contract.
pub fn stem(word: &str) -> String {
    if char_len(word) < 3 {
        return word.to_string();
    }
    let mut w = word.to_string();

    if w.ends_with("sses") {
        w.truncate(w.len() - 2);
    } else if w.ends_with("ies") {
        w.truncate(w.len() - 3);
        w.push('i');
    } else if w.ends_with("ss") {
        // kept as is
    } else if w.ends_with('s') {
        w.truncate(w.len() - 1);
    }

    if w.ends_with("eed") {
        if char_len(&w) > 4 {
            w.truncate(w.len() - 1);
        }
    } else if w.ends_with("ed") {
        if char_len(&w) > 3 {
            w.truncate(w.len() - 2);
        }
    } else if w.ends_with("ing") {
        if char_len(&w) > 4 {
            w.truncate(w.len() - 3);
        }
    }

    if let Some(&(suffix, replacement, min_len)) = DERIVATIONAL.iter().find(|(s, _, _)| w.ends_with(s)) {
        if char_len(&w) >= min_len {
            w.truncate(w.len() - suffix.len());
            w.push_str(replacement);
        }
    }
    w
}

fn char_len(s: &str) -> usize { s.chars().count() }

/// Tokenize, then drop stopwords, then stem.
pub fn process(text: &str) -> Vec<String> { process_with(text, true, true) }

pub fn process_with(text: &str, drop_stopwords: bool, apply_stemming: bool) -> Vec<String> {
    let mut tokens = tokenize(text);
    if drop_stopwords {
        tokens = remove_stopwords(tokens);
    }
    if apply_stemming {
        tokens = tokens.iter().map(|t| stem(t)).collect();
    }
    tokens
}

/// Same pipeline as [`process`], but every surviving term keeps the offset it
/// had in the unfiltered [`tokenize`] output. Stopwords leave gaps in the
/// numbering rather than shifting later terms down.
pub fn process_with_positions(text: &str) -> Vec<(String, u32)> {
    process_with_positions_opts(text, true, true)
}

pub fn process_with_positions_opts(text: &str, drop_stopwords: bool, apply_stemming: bool) -> Vec<(String, u32)> {
    let mut out = Vec::new();
    for (pos, token) in tokenize(text).into_iter().enumerate() {
        if drop_stopwords && is_stopword(&token) { continue; }
        let term = if apply_stemming { stem(&token) } else { token };
        out.push((term, pos as u32));
    }
    out
}

/// Double-quoted substrings, in order of appearance.
pub fn extract_phrases(text: &str) -> Vec<String> {
    QUOTED.captures_iter(text).map(|c| c[1].to_string()).collect()
}

/// Adjacent pairs joined with `_`; `n` tokens yield `n - 1` biwords.
pub fn create_biwords<S: AsRef<str>>(tokens: &[S]) -> Vec<String> {
    tokens
        .windows(2)
        .map(|pair| format!("{}_{}", pair[0].as_ref(), pair[1].as_ref()))
        .collect()
}

const EDIT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// Correct `word` against a vocabulary predicate using single edits.
///
/// A known word is returned unchanged. Otherwise the lexicographically
/// smallest known edit-distance-1 candidate wins, falling back to `word`.
pub fn spell_correct<F>(word: &str, mut known: F) -> anyhow::Result<String>
where
    F: FnMut(&str) -> anyhow::Result<bool>,
{
    if known(word)? {
        return Ok(word.to_string());
    }
    let mut candidates: Vec<String> = edits1(word).into_iter().collect();
    candidates.sort();
    for candidate in candidates {
        if known(&candidate)? {
            return Ok(candidate);
        }
    }
    Ok(word.to_string())
}

fn edits1(word: &str) -> HashSet<String> {
    let chars: Vec<char> = word.chars().collect();
    let mut out = HashSet::new();
    for i in 0..=chars.len() {
        let (left, right) = chars.split_at(i);
        if !right.is_empty() {
            out.insert(left.iter().chain(&right[1..]).collect());
        }
        if right.len() > 1 {
            let mut swapped: Vec<char> = left.to_vec();
            swapped.push(right[1]);
            swapped.push(right[0]);
            swapped.extend_from_slice(&right[2..]);
            out.insert(swapped.into_iter().collect());
        }
        for c in EDIT_ALPHABET.chars() {
            if !right.is_empty() {
                out.insert(left.iter().chain(std::iter::once(&c)).chain(&right[1..]).collect());
            }
            out.insert(left.iter().chain(std::iter::once(&c)).chain(right).collect());
        }
    }
    out
}
